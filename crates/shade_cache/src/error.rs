//! Error types for cache operations.

use std::path::PathBuf;

use shade_common::Fingerprint;

/// Errors raised by the cache store.
///
/// Lookups turn every one of these into a miss; only writes and maintenance
/// operations report them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The record does not start with the cache magic.
    #[error("invalid cache record: {reason}")]
    InvalidRecord {
        /// Description of the problem.
        reason: String,
    },

    /// The record was written by a different format version.
    #[error("cache record version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Current format version.
        expected: u32,
        /// Version found in the record.
        actual: u32,
    },

    /// The record belongs to a different request.
    #[error("cache record fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch {
        /// Fingerprint that was asked for.
        expected: Fingerprint,
        /// Fingerprint stored in the record.
        actual: Fingerprint,
    },

    /// The record is shorter than its header claims.
    #[error("cache record truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/cache/blur_00.cache"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("blur_00.cache"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = CacheError::VersionMismatch {
            expected: 1,
            actual: 7,
        };
        assert_eq!(err.to_string(), "cache record version mismatch: expected 1, got 7");
    }

    #[test]
    fn fingerprint_mismatch_display() {
        let err = CacheError::FingerprintMismatch {
            expected: Fingerprint::from_raw(0xab),
            actual: Fingerprint::from_raw(0xcd),
        };
        let msg = err.to_string();
        assert!(msg.contains("00000000000000ab"));
        assert!(msg.contains("00000000000000cd"));
    }
}
