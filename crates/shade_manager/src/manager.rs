//! The compilation orchestrator.
//!
//! [`ShaderManager`] is a cheap, cloneable handle. Every clone shares one
//! backend selector, one cache store, one thread pool and one watch list.
//! Synchronous compiles run on the caller's thread; asynchronous compiles
//! run on the pool and report through a [`CompileTask`].
//!
//! Concurrent compiles of an identical request are not deduplicated. Each
//! one invokes the backend and writes the cache, and the last write wins.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use shade_cache::{CacheLimits, CacheStore, DiskUsage, RecordId};
use shade_common::{CompileOptions, Fingerprint, ShaderKey, ShaderModel, ShaderType};
use shade_compiler::{BackendKind, BackendOptions, CompileRequest, CompiledShader, Feature, ShaderCompiler};
use shade_config::loader::validate_config;
use shade_config::ShaderManagerConfig;

use crate::error::ManagerError;
use crate::shader::Shader;
use crate::stats::Statistics;
use crate::task::{CompileTask, InFlight};
use crate::watcher::{FileWatcher, WatchId};

struct Inner {
    config: RwLock<ShaderManagerConfig>,
    compiler: ShaderCompiler,
    cache: CacheStore,
    stats: Mutex<Statistics>,
    pool: rayon::ThreadPool,
    in_flight: Arc<InFlight>,
    pinned: Mutex<HashMap<Fingerprint, usize>>,
    include_dirs: RwLock<Vec<PathBuf>>,
    watcher: FileWatcher,
    last_reload_check: Mutex<Option<Instant>>,
}

/// Owns the backend selector, the cache and the hot-reload watch list.
#[derive(Clone)]
pub struct ShaderManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ShaderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderManager")
            .field("compiler", &self.inner.compiler)
            .field("cache", &self.inner.cache)
            .field("watcher", &self.inner.watcher)
            .finish_non_exhaustive()
    }
}

/// Keeps a fingerprint out of eviction while its compile is running.
struct PinGuard<'a> {
    pinned: &'a Mutex<HashMap<Fingerprint, usize>>,
    fingerprint: Fingerprint,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let mut pinned = self.pinned.lock();
        if let Some(count) = pinned.get_mut(&self.fingerprint) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(&self.fingerprint);
            }
        }
    }
}

impl ShaderManager {
    /// Validates `config` and initializes the backends.
    ///
    /// The modern backend is skipped when `force_legacy_backend` is set or
    /// when it fails to come up; either way construction succeeds.
    pub fn new(config: ShaderManagerConfig) -> Result<Self, ManagerError> {
        validate_config(&config)?;
        let compiler = ShaderCompiler::initialize(&BackendOptions {
            force_legacy: config.force_legacy_backend,
        });
        Self::with_compiler(config, compiler)
    }

    /// Builds a manager around an already initialized selector.
    pub fn with_compiler(config: ShaderManagerConfig, compiler: ShaderCompiler) -> Result<Self, ManagerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.compile_threads)
            .thread_name(|i| format!("shade-compile-{i}"))
            .build()
            .map_err(|err| ManagerError::ThreadPool(err.to_string()))?;
        let cache = CacheStore::new(&config.cache_directory);
        let include_dirs = config.include_paths.clone();
        log::debug!(
            "shader manager ready: backend {}, cache at {}",
            compiler.active_backend(),
            config.cache_directory.display()
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                compiler,
                cache,
                stats: Mutex::new(Statistics::default()),
                pool,
                in_flight: Arc::new(InFlight::default()),
                pinned: Mutex::new(HashMap::new()),
                include_dirs: RwLock::new(include_dirs),
                watcher: FileWatcher::new(),
                last_reload_check: Mutex::new(None),
            }),
        })
    }

    // ---- compilation ----

    /// Compiles in-memory source, consulting the cache first.
    ///
    /// `name` labels diagnostics and cache records. Only successful results
    /// are cached, so a broken shader is recompiled on every request.
    pub fn compile_shader(
        &self,
        source: &str,
        entry_point: &str,
        shader_type: ShaderType,
        options: &CompileOptions,
        name: &str,
    ) -> Arc<CompiledShader> {
        self.compile_with_origin(source, entry_point, shader_type, options, name, None)
    }

    /// Reads and compiles a file. A missing or unreadable file yields a
    /// failed result.
    pub fn compile_shader_from_file(
        &self,
        path: &Path,
        entry_point: &str,
        shader_type: ShaderType,
        options: &CompileOptions,
    ) -> Arc<CompiledShader> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("cannot read shader {}: {err}", path.display());
                return Arc::new(CompiledShader::failure(format!(
                    "failed to read shader file '{}': {err}",
                    path.display()
                )));
            }
        };
        let name = path.display().to_string();
        let dir = path.parent().map(|dir| dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));
        self.compile_with_origin(&source, entry_point, shader_type, options, &name, dir.as_deref())
    }

    /// Schedules [`ShaderManager::compile_shader`] on the thread pool.
    ///
    /// With `async_compilation` disabled the compile runs immediately and
    /// the returned task is already complete.
    pub fn compile_shader_async(
        &self,
        source: impl Into<String>,
        entry_point: impl Into<String>,
        shader_type: ShaderType,
        options: CompileOptions,
        name: impl Into<String>,
    ) -> CompileTask {
        let (source, entry_point, name) = (source.into(), entry_point.into(), name.into());
        self.spawn(move |manager| manager.compile_shader(&source, &entry_point, shader_type, &options, &name))
    }

    /// Schedules [`ShaderManager::compile_shader_from_file`] on the thread
    /// pool.
    pub fn compile_shader_from_file_async(
        &self,
        path: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        shader_type: ShaderType,
        options: CompileOptions,
    ) -> CompileTask {
        let (path, entry_point) = (path.into(), entry_point.into());
        self.spawn(move |manager| manager.compile_shader_from_file(&path, &entry_point, shader_type, &options))
    }

    fn spawn<F>(&self, job: F) -> CompileTask
    where
        F: FnOnce(&ShaderManager) -> Arc<CompiledShader> + Send + 'static,
    {
        if !self.inner.config.read().async_compilation {
            return CompileTask::ready(job(self));
        }
        self.record(|s| s.async_compilations += 1);
        let (tx, task) = CompileTask::channel();
        let guard = self.inner.in_flight.enter();
        let manager = self.clone();
        self.inner.pool.spawn(move || {
            let _guard = guard;
            let result = job(&manager);
            // The caller may have dropped the task; the cache is already written.
            let _ = tx.send(result);
        });
        task
    }

    fn compile_with_origin(
        &self,
        source: &str,
        entry_point: &str,
        shader_type: ShaderType,
        options: &CompileOptions,
        name: &str,
        source_dir: Option<&Path>,
    ) -> Arc<CompiledShader> {
        let options = self.effective_options(options);
        let key = ShaderKey::new(source, entry_point, shader_type, &options).in_directory(source_dir);
        let _pin = self.pin(key.fingerprint());
        let id = RecordId::new(name, key.fingerprint());
        let caching = self.inner.config.read().caching;

        if caching {
            if let Some(bytes) = self.inner.cache.get(&id) {
                match CompiledShader::from_bytecode(bytes.to_vec(), options.flags.debug_info) {
                    Ok(shader) => {
                        self.record(|s| s.cache_hits += 1);
                        return Arc::new(shader);
                    }
                    Err(err) => {
                        log::debug!("discarding cached {id}: {err}");
                        self.inner.cache.remove(&id);
                    }
                }
            }
        }

        let request = CompileRequest::new(key.source(), key.entry_point(), key.shader_type(), key.options())
            .with_origin(name, key.source_dir());
        let started = Instant::now();
        let result = self.inner.compiler.compile(&request);
        let elapsed = started.elapsed();

        if result.success {
            self.record(|s| {
                s.cache_misses += 1;
                s.total_compilations += 1;
                s.total_compile_time += elapsed;
            });
            if caching {
                if let Err(err) = self.inner.cache.insert(&id, Arc::from(result.bytecode.as_slice())) {
                    log::warn!("failed to persist {id}: {err}");
                }
                self.compact_if_over_limits();
            }
        } else {
            self.record(|s| s.compilation_errors += 1);
            log::debug!("compile of '{entry_point}' in {name} failed:\n{}", result.error_text());
        }
        Arc::new(result)
    }

    /// Request options plus the manager's include directories.
    fn effective_options(&self, options: &CompileOptions) -> CompileOptions {
        let mut options = options.clone();
        for dir in self.inner.include_dirs.read().iter() {
            if !options.include_paths.contains(dir) {
                options.include_paths.push(dir.clone());
            }
        }
        options
    }

    fn pin(&self, fingerprint: Fingerprint) -> PinGuard<'_> {
        *self.inner.pinned.lock().entry(fingerprint).or_insert(0) += 1;
        PinGuard {
            pinned: &self.inner.pinned,
            fingerprint,
        }
    }

    fn record(&self, update: impl FnOnce(&mut Statistics)) {
        if self.inner.config.read().statistics {
            update(&mut *self.inner.stats.lock());
        }
    }

    /// Options for the configured default model.
    pub fn default_options(&self) -> CompileOptions {
        CompileOptions::for_model(self.inner.config.read().default_model)
    }

    pub(crate) fn pool(&self) -> &rayon::ThreadPool {
        &self.inner.pool
    }

    // ---- cache maintenance ----

    /// Empties both cache tiers. Returns the number of record files deleted.
    pub fn clear_cache(&self) -> Result<usize, ManagerError> {
        Ok(self.inner.cache.clear()?)
    }

    /// Evicts least-recently-used entries until the configured limits hold.
    /// Entries of in-flight compiles are kept. Returns the number evicted.
    pub fn compact_cache(&self) -> usize {
        let limits = {
            let config = self.inner.config.read();
            CacheLimits {
                max_entries: config.max_cache_entries,
                max_memory_bytes: config.max_cache_memory_bytes(),
            }
        };
        let pinned: HashSet<Fingerprint> = self.inner.pinned.lock().keys().copied().collect();
        let evicted = self.inner.cache.compact(limits, &pinned);
        if !evicted.is_empty() {
            log::debug!("compacted shader cache, evicted {} entries", evicted.len());
        }
        evicted.len()
    }

    fn compact_if_over_limits(&self) {
        let over = {
            let config = self.inner.config.read();
            self.inner.cache.len() > config.max_cache_entries
                || self.inner.cache.memory_bytes() > config.max_cache_memory_bytes()
        };
        if over {
            self.compact_cache();
        }
    }

    /// Loads every valid record in the cache directory into memory.
    pub fn warm_cache(&self) -> Result<usize, ManagerError> {
        let loaded = self.inner.cache.warm_from_disk()?;
        self.compact_if_over_limits();
        Ok(loaded)
    }

    /// Record files currently on disk.
    pub fn cache_disk_usage(&self) -> Result<DiskUsage, ManagerError> {
        Ok(self.inner.cache.disk_usage()?)
    }

    // ---- hot reload ----

    /// Calls `callback` whenever `path` changes.
    pub fn watch_file<F>(&self, path: impl Into<PathBuf>, callback: F) -> WatchId
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.inner.watcher.watch(path, Arc::new(callback))
    }

    /// Recompiles `path` whenever it changes and hands the result to
    /// `on_reload`, successful or not.
    pub fn watch_shader<F>(
        &self,
        path: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        shader_type: ShaderType,
        options: CompileOptions,
        on_reload: F,
    ) -> WatchId
    where
        F: Fn(Arc<CompiledShader>) + Send + Sync + 'static,
    {
        let entry_point = entry_point.into();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.watch_file(path, move |changed: &Path| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = ShaderManager { inner };
            let result = manager.compile_shader_from_file(changed, &entry_point, shader_type, &options);
            if !result.success {
                log::warn!("reload of {} failed:\n{}", changed.display(), result.error_text());
            }
            on_reload(result);
        })
    }

    /// Removes a registration made with [`ShaderManager::watch_file`] or
    /// [`ShaderManager::watch_shader`].
    pub fn unwatch(&self, id: WatchId) -> bool {
        self.inner.watcher.unwatch(id)
    }

    /// Removes every registration for `path`.
    pub fn unwatch_file(&self, path: &Path) -> usize {
        self.inner.watcher.unwatch_path(path)
    }

    /// Polls watched files and fires callbacks for changed ones.
    ///
    /// Does nothing when hot reload is disabled or when called again
    /// within `hot_reload_interval_ms` of the previous poll. Returns the
    /// number of callbacks fired.
    pub fn check_for_file_changes(&self) -> usize {
        let (enabled, interval) = {
            let config = self.inner.config.read();
            (config.hot_reload, config.hot_reload_interval())
        };
        if !enabled {
            return 0;
        }
        {
            let mut last = self.inner.last_reload_check.lock();
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < interval {
                    return 0;
                }
            }
            *last = Some(now);
        }
        let fired = self.inner.watcher.check();
        if fired > 0 {
            self.record(|s| s.hot_reloads += fired as u64);
        }
        fired
    }

    // ---- configuration ----

    /// Replaces the configuration. The cache directory change applies to
    /// subsequent lookups; backends are not re-initialized.
    ///
    /// Include directories from the previous configuration are swapped for
    /// the new ones. Directories added with
    /// [`ShaderManager::add_include_directory`] stay.
    pub fn update_config(&self, config: ShaderManagerConfig) -> Result<(), ManagerError> {
        validate_config(&config)?;
        self.inner.cache.set_directory(&config.cache_directory);
        let mut current = self.inner.config.write();
        {
            let mut dirs = self.inner.include_dirs.write();
            dirs.retain(|dir| !current.include_paths.contains(dir));
            for dir in &config.include_paths {
                if !dirs.contains(dir) {
                    dirs.push(dir.clone());
                }
            }
        }
        *current = config;
        drop(current);
        self.compact_if_over_limits();
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> ShaderManagerConfig {
        self.inner.config.read().clone()
    }

    /// Snapshot of the counters, including current cache occupancy.
    pub fn statistics(&self) -> Statistics {
        let mut stats = *self.inner.stats.lock();
        stats.cache_entries = self.inner.cache.len();
        stats.cache_memory_bytes = self.inner.cache.memory_bytes();
        stats
    }

    /// Zeroes the counters.
    pub fn reset_statistics(&self) {
        *self.inner.stats.lock() = Statistics::default();
    }

    /// Adds a directory searched for `#include` files by every request.
    pub fn add_include_directory(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        let mut dirs = self.inner.include_dirs.write();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    /// Removes an include directory. Returns `false` if it was not present.
    pub fn remove_include_directory(&self, dir: &Path) -> bool {
        let mut dirs = self.inner.include_dirs.write();
        let before = dirs.len();
        dirs.retain(|d| d != dir);
        dirs.len() != before
    }

    /// Include directories in search order.
    pub fn include_directories(&self) -> Vec<PathBuf> {
        self.inner.include_dirs.read().clone()
    }

    /// Finds `name` in the include directories. Absolute paths are
    /// returned as-is when they exist.
    pub fn resolve_include_path(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        self.inner
            .include_dirs
            .read()
            .iter()
            .map(|dir| dir.join(candidate))
            .find(|path| path.is_file())
    }

    // ---- lifecycle and capabilities ----

    /// Blocks until every scheduled compile has finished, then writes any
    /// memory-only cache entries to disk.
    ///
    /// Must not be called from a compile callback running on the pool.
    pub fn shutdown(&self) {
        self.inner.in_flight.wait_idle();
        if self.inner.config.read().caching {
            match self.inner.cache.persist_all() {
                Ok(0) => {}
                Ok(n) => log::debug!("persisted {n} cache entries at shutdown"),
                Err(err) => log::warn!("failed to persist shader cache: {err}"),
            }
        }
    }

    /// Number of compiles scheduled and not yet finished.
    pub fn pending_compilations(&self) -> usize {
        self.inner.in_flight.count()
    }

    /// See [`ShaderCompiler::supports_model`].
    pub fn supports_model(&self, model: ShaderModel) -> bool {
        self.inner.compiler.supports_model(model)
    }

    /// See [`ShaderCompiler::supports_feature`].
    pub fn supports_feature(&self, feature: Feature) -> bool {
        self.inner.compiler.supports_feature(feature)
    }

    /// Backend used for the highest supported model.
    pub fn active_backend(&self) -> BackendKind {
        self.inner.compiler.active_backend()
    }

    /// Highest model any backend accepts.
    pub fn max_model(&self) -> ShaderModel {
        self.inner.compiler.max_model()
    }

    // ---- high-level shaders ----

    /// A reloadable shader backed by a file. Nothing is compiled until
    /// [`Shader::load`] or [`Shader::load_async`].
    pub fn create_shader(
        &self,
        path: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        shader_type: ShaderType,
        options: CompileOptions,
    ) -> Shader {
        Shader::from_file(self.clone(), path.into(), entry_point.into(), shader_type, options)
    }

    /// A shader backed by in-memory source.
    pub fn create_shader_from_source(
        &self,
        source: impl Into<String>,
        name: impl Into<String>,
        entry_point: impl Into<String>,
        shader_type: ShaderType,
        options: CompileOptions,
    ) -> Shader {
        Shader::from_source(
            self.clone(),
            source.into(),
            name.into(),
            entry_point.into(),
            shader_type,
            options,
        )
    }
}
