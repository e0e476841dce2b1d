//! Two-tier cache of compiled shader bytecode.
//!
//! Entries live in memory and in `<stem>_<fingerprint>.cache` record files.
//! Reads are fail-safe: a missing, truncated or stale record is a miss,
//! never an error, so callers simply recompile.

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod record;
pub mod store;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use store::{CacheLimits, CacheStore, DiskUsage, RecordId};
