//! Configuration types deserialized from `shade.toml`.

use serde::{Deserialize, Serialize};
use shade_common::ShaderModel;
use std::path::PathBuf;
use std::time::Duration;

/// The top-level layout of `shade.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Shader manager settings.
    #[serde(default)]
    pub manager: ShaderManagerConfig,
}

/// Settings consumed by the shader manager.
///
/// Supplied once at construction. Replacing the configuration later affects
/// subsequent compiles; lowered cache limits are enforced right away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderManagerConfig {
    /// Allow compiles to be scheduled on the background pool.
    pub async_compilation: bool,
    /// Poll watched files for changes.
    pub hot_reload: bool,
    /// Allow batch precompilation.
    pub precompilation: bool,
    /// Record statistics counters.
    pub statistics: bool,
    /// Look up and insert compiled shaders in the cache.
    pub caching: bool,
    /// Maximum number of in-memory cache entries.
    pub max_cache_entries: usize,
    /// Maximum total bytecode held in memory, in mebibytes.
    pub max_cache_memory_mb: u64,
    /// Directory holding persisted cache records.
    pub cache_directory: PathBuf,
    /// Directory holding shader sources.
    pub shader_directory: PathBuf,
    /// Include directories appended to every request.
    pub include_paths: Vec<PathBuf>,
    /// Tier used when a request does not name one.
    pub default_model: ShaderModel,
    /// Minimum interval between file-change polls, in milliseconds.
    pub hot_reload_interval_ms: u64,
    /// Skip the modern backend entirely.
    pub force_legacy_backend: bool,
    /// Background compile threads; `0` means one per available core.
    pub compile_threads: usize,
}

impl Default for ShaderManagerConfig {
    fn default() -> Self {
        Self {
            async_compilation: true,
            hot_reload: true,
            precompilation: true,
            statistics: true,
            caching: true,
            max_cache_entries: 1000,
            max_cache_memory_mb: 256,
            cache_directory: PathBuf::from("cache/shaders"),
            shader_directory: PathBuf::from("shaders"),
            include_paths: Vec::new(),
            default_model: ShaderModel::SM_6_4,
            hot_reload_interval_ms: 1000,
            force_legacy_backend: false,
            compile_threads: 0,
        }
    }
}

impl ShaderManagerConfig {
    /// Memory ceiling in bytes.
    pub fn max_cache_memory_bytes(&self) -> u64 {
        self.max_cache_memory_mb.saturating_mul(1024 * 1024)
    }

    /// Hot-reload poll interval.
    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }
}
