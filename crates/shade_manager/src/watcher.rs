//! Modification-time polling for hot reload.
//!
//! Each watch remembers the last modification time it observed. A check
//! compares the current time against it and fires the callback once per
//! change. The remembered time is updated before the callback runs, so a
//! callback that fails does not cause the next check to fire again.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

/// Callback invoked with the changed path.
pub type WatchCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Identifies one registration with [`FileWatcher::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

struct Watch {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    callback: WatchCallback,
}

/// Polling file watcher with its own lock, independent of the cache.
#[derive(Default)]
pub struct FileWatcher {
    watches: Mutex<HashMap<WatchId, Watch>>,
    next_id: AtomicU64,
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watches", &self.len())
            .finish()
    }
}

impl FileWatcher {
    /// Creates an empty watcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for changes to `path`.
    ///
    /// The file's current modification time becomes the baseline, so the
    /// callback does not fire for the state at registration.
    pub fn watch(&self, path: impl Into<PathBuf>, callback: WatchCallback) -> WatchId {
        let path = path.into();
        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let last_modified = modified_time(&path);
        self.watches.lock().insert(
            id,
            Watch {
                path,
                last_modified,
                callback,
            },
        );
        id
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unwatch(&self, id: WatchId) -> bool {
        self.watches.lock().remove(&id).is_some()
    }

    /// Removes every registration for `path` and returns how many.
    pub fn unwatch_path(&self, path: &Path) -> usize {
        let mut watches = self.watches.lock();
        let before = watches.len();
        watches.retain(|_, w| w.path != path);
        before - watches.len()
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.watches.lock().len()
    }

    /// `true` when nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths currently watched, sorted and deduplicated.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.watches.lock().values().map(|w| w.path.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Polls every watched file and fires callbacks for the ones that
    /// changed. Returns the number of callbacks fired.
    ///
    /// Files that cannot be stat'ed are skipped and keep their previous
    /// baseline.
    pub fn check(&self) -> usize {
        let fired: Vec<(PathBuf, WatchCallback)> = {
            let mut watches = self.watches.lock();
            watches
                .values_mut()
                .filter_map(|w| {
                    let current = modified_time(&w.path)?;
                    if w.last_modified == Some(current) {
                        return None;
                    }
                    w.last_modified = Some(current);
                    Some((w.path.clone(), Arc::clone(&w.callback)))
                })
                .collect()
        };
        for (path, callback) in &fired {
            log::info!("{} changed, reloading", path.display());
            callback(path);
        }
        fired.len()
    }
}

/// Modification time of `path`, `None` if it cannot be read.
pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, WatchCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, Arc::new(move |_: &Path| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn bump(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn fires_once_per_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hlsl");
        fs::write(&path, "x").unwrap();
        bump(&path, 1_000);

        let watcher = FileWatcher::new();
        let (hits, cb) = counter();
        watcher.watch(&path, cb);
        assert_eq!(watcher.check(), 0);

        bump(&path, 2_000);
        assert_eq!(watcher.check(), 1);
        assert_eq!(watcher.check(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bump(&path, 3_000);
        assert_eq!(watcher.check(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileWatcher::new();
        let (hits, cb) = counter();
        watcher.watch(dir.path().join("gone.hlsl"), cb);
        assert_eq!(watcher.check(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn file_appearing_counts_as_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.hlsl");
        let watcher = FileWatcher::new();
        let (hits, cb) = counter();
        watcher.watch(&path, cb);
        fs::write(&path, "x").unwrap();
        assert_eq!(watcher.check(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hlsl");
        fs::write(&path, "x").unwrap();
        bump(&path, 1_000);
        let watcher = FileWatcher::new();
        let (hits, cb) = counter();
        let id = watcher.watch(&path, Arc::clone(&cb));
        watcher.watch(&path, cb);
        assert_eq!(watcher.paths(), vec![path.clone()]);
        assert!(watcher.unwatch(id));
        assert!(!watcher.unwatch(id));
        bump(&path, 2_000);
        assert_eq!(watcher.check(), 1);
        assert_eq!(watcher.unwatch_path(&path), 1);
        assert!(watcher.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
