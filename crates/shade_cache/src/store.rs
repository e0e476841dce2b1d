//! The two-tier cache store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use shade_common::Fingerprint;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::record::{decode_record, encode_record};

const RECORD_EXT: &str = "cache";

/// Identity of a cache record: logical file stem plus request fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId {
    stem: String,
    fingerprint: Fingerprint,
}

impl RecordId {
    /// Derives an id from a logical shader name (a path or a label).
    ///
    /// The stem keeps only `[A-Za-z0-9_-]`; an empty result becomes `inline`.
    pub fn new(name: &str, fingerprint: Fingerprint) -> Self {
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        let stem: String = stem
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        Self {
            stem: if stem.is_empty() { "inline".to_string() } else { stem },
            fingerprint,
        }
    }

    /// Sanitized stem.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Request fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Record file name, `<stem>_<fingerprint>.cache`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.{RECORD_EXT}", self.stem, self.fingerprint)
    }

    /// Parses a record file name back into an id.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let base = name.strip_suffix(RECORD_EXT)?.strip_suffix('.')?;
        let (stem, hex) = base.rsplit_once('_')?;
        if hex.len() != 16 || stem.is_empty() {
            return None;
        }
        let raw = u64::from_str_radix(hex, 16).ok()?;
        Some(Self {
            stem: stem.to_string(),
            fingerprint: Fingerprint::from_raw(raw),
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.stem, self.fingerprint)
    }
}

/// Ceilings enforced by [`CacheStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Maximum number of memory entries.
    pub max_entries: usize,
    /// Maximum bytes held in memory.
    pub max_memory_bytes: u64,
}

/// Record files found in the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    /// Number of record files.
    pub records: usize,
    /// Total size of record files.
    pub bytes: u64,
}

struct State {
    directory: PathBuf,
    entries: HashMap<RecordId, CacheEntry>,
    memory_bytes: u64,
    seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn put(&mut self, id: RecordId, bytecode: Arc<[u8]>, persisted: bool) {
        let seq = self.next_seq();
        let entry = CacheEntry::new(bytecode, persisted, seq);
        self.memory_bytes += entry.size() as u64;
        if let Some(old) = self.entries.insert(id, entry) {
            self.memory_bytes -= old.size() as u64;
        }
    }

    fn take(&mut self, id: &RecordId) -> Option<CacheEntry> {
        let old = self.entries.remove(id)?;
        self.memory_bytes -= old.size() as u64;
        Some(old)
    }
}

/// Memory tier plus record files, guarded by one mutex.
///
/// The mutex is held for map lookups and updates only. Disk reads and
/// writes happen outside it, so concurrent compiles never wait on I/O.
pub struct CacheStore {
    state: Mutex<State>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CacheStore")
            .field("directory", &state.directory)
            .field("entries", &state.entries.len())
            .field("memory_bytes", &state.memory_bytes)
            .finish()
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CacheStore {
    /// Creates a store writing records under `directory`. Nothing is read
    /// until the first lookup or [`CacheStore::warm_from_disk`].
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(State {
                directory: directory.into(),
                entries: HashMap::new(),
                memory_bytes: 0,
                seq: 0,
            }),
        }
    }

    /// Current record directory.
    pub fn directory(&self) -> PathBuf {
        self.state.lock().directory.clone()
    }

    /// Points future record reads and writes at `directory`.
    pub fn set_directory(&self, directory: impl Into<PathBuf>) {
        self.state.lock().directory = directory.into();
    }

    /// Path of the record file for `id`.
    pub fn record_path(&self, id: &RecordId) -> PathBuf {
        self.directory().join(id.file_name())
    }

    /// Looks `id` up in memory, then on disk. A disk hit repopulates memory.
    pub fn get(&self, id: &RecordId) -> Option<Arc<[u8]>> {
        let path = {
            let mut state = self.state.lock();
            let seq = state.next_seq();
            if let Some(entry) = state.entries.get_mut(id) {
                entry.touch(seq);
                log::debug!("cache hit (memory) {id}");
                return Some(entry.bytecode.clone());
            }
            state.directory.join(id.file_name())
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::debug!("cache record {} unreadable: {err}", path.display());
                }
                log::debug!("cache miss {id}");
                return None;
            }
        };
        let payload: Arc<[u8]> = match decode_record(&bytes, id.fingerprint) {
            Ok(payload) => Arc::from(payload),
            Err(err) => {
                log::debug!("ignoring cache record {}: {err}", path.display());
                return None;
            }
        };

        let mut state = self.state.lock();
        state.put(id.clone(), payload.clone(), true);
        let seq = state.next_seq();
        if let Some(entry) = state.entries.get_mut(id) {
            entry.touch(seq);
        }
        log::debug!("cache hit (disk) {id}");
        Some(payload)
    }

    /// Returns `true` if `id` is in the memory tier.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    /// Writes a record for `id` and stores the bytes in memory.
    ///
    /// The memory tier is updated even when the write fails; the entry is
    /// then marked transient and the error returned for logging.
    pub fn insert(&self, id: &RecordId, bytecode: Arc<[u8]>) -> Result<(), CacheError> {
        let directory = self.directory();
        let written = write_record(&directory, id, &bytecode);
        self.state.lock().put(id.clone(), bytecode, written.is_ok());
        written
    }

    /// Removes `id` from memory and deletes its record file.
    pub fn remove(&self, id: &RecordId) -> bool {
        let (path, removed) = {
            let mut state = self.state.lock();
            (state.directory.join(id.file_name()), state.take(id).is_some())
        };
        let deleted = std::fs::remove_file(&path).is_ok();
        removed || deleted
    }

    /// Empties memory and deletes every record file. Returns the number of
    /// files deleted.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let directory = {
            let mut state = self.state.lock();
            state.entries.clear();
            state.memory_bytes = 0;
            state.directory.clone()
        };
        let mut removed = 0;
        for path in record_files(&directory)? {
            std::fs::remove_file(&path).map_err(io_err(&path))?;
            removed += 1;
        }
        log::debug!("cleared {removed} cache records from {}", directory.display());
        Ok(removed)
    }

    /// Evicts least-recently-used entries until both limits hold.
    ///
    /// Entries whose fingerprint is in `pinned` are never evicted. Evicted
    /// entries lose their record file too. Returns the evicted ids.
    pub fn compact(&self, limits: CacheLimits, pinned: &HashSet<Fingerprint>) -> Vec<RecordId> {
        let (directory, evicted) = {
            let mut state = self.state.lock();
            let mut evicted = Vec::new();
            while state.entries.len() > limits.max_entries || state.memory_bytes > limits.max_memory_bytes {
                let victim = state
                    .entries
                    .iter()
                    .filter(|(id, _)| !pinned.contains(&id.fingerprint))
                    .min_by_key(|(_, e)| e.eviction_key())
                    .map(|(id, _)| id.clone());
                let Some(victim) = victim else {
                    break;
                };
                state.take(&victim);
                evicted.push(victim);
            }
            (state.directory.clone(), evicted)
        };
        for id in &evicted {
            log::debug!("evicted {id}");
            let path = directory.join(id.file_name());
            match std::fs::remove_file(&path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                    log::debug!("cannot delete evicted record {}: {err}", path.display());
                }
                _ => {}
            }
        }
        evicted
    }

    /// Loads every valid record file into memory. Entries already in memory
    /// are kept. Returns the number of records loaded.
    pub fn warm_from_disk(&self) -> Result<usize, CacheError> {
        let directory = self.directory();
        let mut loaded = 0;
        for path in record_files(&directory)? {
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(RecordId::from_file_name)
            else {
                continue;
            };
            if self.contains(&id) {
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match decode_record(&bytes, id.fingerprint) {
                Ok(payload) => {
                    self.state.lock().put(id, Arc::from(payload), true);
                    loaded += 1;
                }
                Err(err) => log::debug!("skipping {}: {err}", path.display()),
            }
        }
        Ok(loaded)
    }

    /// Writes a record for every transient memory entry. Returns the number
    /// written.
    pub fn persist_all(&self) -> Result<usize, CacheError> {
        let (directory, pending): (PathBuf, Vec<(RecordId, Arc<[u8]>)>) = {
            let state = self.state.lock();
            let pending = state
                .entries
                .iter()
                .filter(|(_, e)| !e.persisted)
                .map(|(id, e)| (id.clone(), e.bytecode.clone()))
                .collect();
            (state.directory.clone(), pending)
        };
        let mut written = 0;
        for (id, bytes) in pending {
            write_record(&directory, &id, &bytes)?;
            if let Some(entry) = self.state.lock().entries.get_mut(&id) {
                entry.persisted = true;
            }
            written += 1;
        }
        Ok(written)
    }

    /// Number of memory entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` when the memory tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held in memory.
    pub fn memory_bytes(&self) -> u64 {
        self.state.lock().memory_bytes
    }

    /// Snapshot of one memory entry.
    pub fn entry(&self, id: &RecordId) -> Option<CacheEntry> {
        self.state.lock().entries.get(id).cloned()
    }

    /// Counts record files on disk.
    pub fn disk_usage(&self) -> Result<DiskUsage, CacheError> {
        let mut usage = DiskUsage::default();
        for path in record_files(&self.directory())? {
            usage.records += 1;
            usage.bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(usage)
    }
}

/// Writes `<directory>/<id>.cache` through a temporary file and a rename.
fn write_record(directory: &Path, id: &RecordId, bytecode: &[u8]) -> Result<(), CacheError> {
    std::fs::create_dir_all(directory).map_err(io_err(directory))?;
    let path = directory.join(id.file_name());
    let mut tmp = tempfile::NamedTempFile::new_in(directory).map_err(io_err(directory))?;
    tmp.write_all(&encode_record(id.fingerprint, bytecode))
        .map_err(io_err(tmp.path()))?;
    tmp.persist(&path).map_err(|e| CacheError::Io {
        path: path.clone(),
        source: e.error,
    })?;
    Ok(())
}

/// Lists `*.cache` files in `directory`; a missing directory is empty.
fn record_files(directory: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_err(directory)(err)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_err(directory))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::HEADER_LEN;

    fn id(name: &str, fp: u64) -> RecordId {
        RecordId::new(name, Fingerprint::from_raw(fp))
    }

    fn bytes(s: &str) -> Arc<[u8]> {
        Arc::from(s.as_bytes())
    }

    #[test]
    fn record_ids() {
        let a = id("shaders/post/blur.ps.hlsl", 0xff);
        assert_eq!(a.stem(), "blurps");
        assert_eq!(a.file_name(), "blurps_00000000000000ff.cache");
        assert_eq!(RecordId::from_file_name(&a.file_name()), Some(a));
        assert_eq!(id("", 1).stem(), "inline");
        assert_eq!(id("<memory>", 1).stem(), "memory");
        assert_eq!(RecordId::from_file_name("junk.cache"), None);
        assert_ne!(id("blur.hlsl", 1).file_name(), id("blur.hlsl", 2).file_name());
    }

    #[test]
    fn survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let key = id("blur.hlsl", 42);
        let store = CacheStore::new(dir.path());
        store.insert(&key, bytes("bytecode")).unwrap();
        assert!(store.record_path(&key).exists());

        let restarted = CacheStore::new(dir.path());
        assert!(!restarted.contains(&key));
        assert_eq!(&*restarted.get(&key).unwrap(), b"bytecode");
        assert!(restarted.contains(&key));
        assert!(restarted.entry(&key).unwrap().persisted);
    }

    #[test]
    fn corrupt_records_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let key = id("blur.hlsl", 42);
        CacheStore::new(dir.path()).insert(&key, bytes("bytecode")).unwrap();
        let path = dir.path().join(key.file_name());

        let mut raw = std::fs::read(&path).unwrap();
        raw[0] ^= 0xff;
        std::fs::write(&path, &raw).unwrap();
        assert!(CacheStore::new(dir.path()).get(&key).is_none());

        raw[0] ^= 0xff;
        raw[4] = 9;
        std::fs::write(&path, &raw).unwrap();
        assert!(CacheStore::new(dir.path()).get(&key).is_none());

        raw[4] = 1;
        raw.truncate(HEADER_LEN + 2);
        std::fs::write(&path, &raw).unwrap();
        assert!(CacheStore::new(dir.path()).get(&key).is_none());

        let other = RecordId::from_file_name(&key.file_name()).unwrap();
        std::fs::write(&path, encode_record(Fingerprint::from_raw(7), b"x")).unwrap();
        assert!(CacheStore::new(dir.path()).get(&other).is_none());
    }

    #[test]
    fn lru_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let (a, b, c, d) = (id("a", 1), id("b", 2), id("c", 3), id("d", 4));
        store.insert(&a, bytes("a")).unwrap();
        store.insert(&b, bytes("b")).unwrap();
        store.insert(&c, bytes("c")).unwrap();
        store.get(&a);
        store.insert(&d, bytes("d")).unwrap();

        let limits = CacheLimits {
            max_entries: 3,
            max_memory_bytes: u64::MAX,
        };
        let evicted = store.compact(limits, &HashSet::new());
        assert_eq!(evicted, vec![b.clone()]);
        assert!(!store.record_path(&b).exists());
        assert!(store.contains(&a));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn eviction_survives_undeletable_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let (a, b) = (id("a", 1), id("b", 2));
        store.insert(&a, bytes("a")).unwrap();
        store.insert(&b, bytes("b")).unwrap();
        let path = store.record_path(&a);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let limits = CacheLimits {
            max_entries: 1,
            max_memory_bytes: u64::MAX,
        };
        assert_eq!(store.compact(limits, &HashSet::new()), vec![a.clone()]);
        assert!(!store.contains(&a));
        assert!(path.is_dir());
        assert!(store.contains(&b));
    }

    #[test]
    fn pinned_entries_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let (a, b) = (id("a", 1), id("b", 2));
        store.insert(&a, bytes("aaaa")).unwrap();
        store.insert(&b, bytes("bbbb")).unwrap();
        let pinned: HashSet<_> = [a.fingerprint()].into_iter().collect();
        let evicted = store.compact(
            CacheLimits {
                max_entries: 0,
                max_memory_bytes: 0,
            },
            &pinned,
        );
        assert_eq!(evicted, vec![b]);
        assert!(store.contains(&a));
        assert_eq!(store.memory_bytes(), 4);
    }

    #[test]
    fn memory_limit_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.insert(&id("a", 1), bytes("0123456789")).unwrap();
        store.insert(&id("b", 2), bytes("0123456789")).unwrap();
        let evicted = store.compact(
            CacheLimits {
                max_entries: 10,
                max_memory_bytes: 15,
            },
            &HashSet::new(),
        );
        assert_eq!(evicted, vec![id("a", 1)]);
        assert_eq!(store.memory_bytes(), 10);
    }

    #[test]
    fn clear_removes_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.insert(&id("a", 1), bytes("a")).unwrap();
        store.insert(&id("b", 2), bytes("b")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty());
        assert_eq!(store.disk_usage().unwrap(), DiskUsage::default());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn failed_write_keeps_transient_entry() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = CacheStore::new(&blocker);
        let key = id("a", 1);
        assert!(store.insert(&key, bytes("abc")).is_err());
        assert!(!store.entry(&key).unwrap().persisted);
        assert_eq!(&*store.get(&key).unwrap(), b"abc");

        store.set_directory(dir.path().join("ok"));
        assert_eq!(store.persist_all().unwrap(), 1);
        assert!(store.entry(&key).unwrap().persisted);
        assert!(dir.path().join("ok").join(key.file_name()).exists());
    }

    #[test]
    fn warm_loads_valid_records() {
        let dir = tempfile::tempdir().unwrap();
        let first = CacheStore::new(dir.path());
        first.insert(&id("a", 1), bytes("a")).unwrap();
        first.insert(&id("b", 2), bytes("b")).unwrap();
        std::fs::write(dir.path().join("c_0000000000000003.cache"), b"garbage").unwrap();

        let second = CacheStore::new(dir.path());
        assert_eq!(second.warm_from_disk().unwrap(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(second.disk_usage().unwrap().records, 3);
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("absent"));
        assert_eq!(store.warm_from_disk().unwrap(), 0);
        assert_eq!(store.clear().unwrap(), 0);
        assert!(store.get(&id("a", 1)).is_none());
    }
}
