//! On-disk record format.
//!
//! ```text
//! offset 0   magic        b"SHDC"
//! offset 4   version      u32 LE
//! offset 8   fingerprint  u64 LE
//! offset 16  payload_size u32 LE
//! offset 20  payload
//! ```

use shade_common::Fingerprint;

use crate::error::CacheError;

/// Magic bytes identifying a cache record.
pub const RECORD_MAGIC: [u8; 4] = *b"SHDC";

/// Current record format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 20;

/// Serializes a record.
pub fn encode_record(fingerprint: Fingerprint, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&RECORD_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&fingerprint.as_u64().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validates a record against `expected` and returns its payload.
pub fn decode_record(bytes: &[u8], expected: Fingerprint) -> Result<&[u8], CacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[..4] != RECORD_MAGIC {
        return Err(CacheError::InvalidRecord {
            reason: format!("bad magic {:02x?}", &bytes[..4]),
        });
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[4..8]);
    let version = u32::from_le_bytes(word);
    if version != FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            expected: FORMAT_VERSION,
            actual: version,
        });
    }
    let mut long = [0u8; 8];
    long.copy_from_slice(&bytes[8..16]);
    let actual = Fingerprint::from_raw(u64::from_le_bytes(long));
    if actual != expected {
        return Err(CacheError::FingerprintMismatch { expected, actual });
    }
    word.copy_from_slice(&bytes[16..20]);
    let size = u32::from_le_bytes(word) as usize;
    let end = HEADER_LEN + size;
    if bytes.len() < end {
        return Err(CacheError::Truncated {
            expected: end,
            actual: bytes.len(),
        });
    }
    Ok(&bytes[HEADER_LEN..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP: Fingerprint = Fingerprint::from_raw(0x1234_5678_9abc_def0);

    #[test]
    fn header_layout() {
        let rec = encode_record(FP, b"abc");
        assert_eq!(&rec[..4], b"SHDC");
        assert_eq!(&rec[4..8], &1u32.to_le_bytes());
        assert_eq!(&rec[8..16], &FP.as_u64().to_le_bytes());
        assert_eq!(&rec[16..20], &3u32.to_le_bytes());
        assert_eq!(decode_record(&rec, FP).unwrap(), b"abc");
    }

    #[test]
    fn flipped_magic_is_rejected() {
        let mut rec = encode_record(FP, b"abc");
        rec[0] ^= 0x20;
        assert!(matches!(decode_record(&rec, FP), Err(CacheError::InvalidRecord { .. })));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut rec = encode_record(FP, b"abc");
        rec[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            decode_record(&rec, FP),
            Err(CacheError::VersionMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn other_fingerprint_is_rejected() {
        let rec = encode_record(FP, b"abc");
        assert!(matches!(
            decode_record(&rec, Fingerprint::from_raw(1)),
            Err(CacheError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let rec = encode_record(FP, b"abcdef");
        assert!(matches!(
            decode_record(&rec[..rec.len() - 1], FP),
            Err(CacheError::Truncated { .. })
        ));
        assert!(matches!(decode_record(&rec[..10], FP), Err(CacheError::Truncated { .. })));
    }
}
