//! In-memory cache bookkeeping.

use std::sync::Arc;
use std::time::Instant;

/// One cached bytecode blob with its access history.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Compiled bytecode.
    pub bytecode: Arc<[u8]>,
    /// When the entry entered the memory tier.
    pub created_at: Instant,
    /// Last lookup or insertion.
    pub last_access: Instant,
    /// Number of lookups served.
    pub access_count: u64,
    /// `true` once a record file holds the same bytes.
    pub persisted: bool,
    /// Store-wide sequence number of the last access; breaks timestamp ties.
    pub(crate) seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(bytecode: Arc<[u8]>, persisted: bool, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            bytecode,
            created_at: now,
            last_access: now,
            access_count: 0,
            persisted,
            seq,
        }
    }

    pub(crate) fn touch(&mut self, seq: u64) {
        self.last_access = Instant::now();
        self.access_count += 1;
        self.seq = seq;
    }

    /// Bytes held by this entry.
    pub fn size(&self) -> usize {
        self.bytecode.len()
    }

    /// Eviction order: oldest access first, then fewest accesses.
    pub(crate) fn eviction_key(&self) -> (Instant, u64, u64) {
        (self.last_access, self.access_count, self.seq)
    }
}
