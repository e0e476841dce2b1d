//! Request fingerprinting for cache lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// A 64-bit fingerprint computed with XXH3 over every input that affects
/// compilation output.
///
/// Two requests with the same `Fingerprint` are assumed to produce identical
/// bytecode. Collisions are accepted, not mitigated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Wraps a raw 64-bit value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw 64-bit value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

/// Streaming fingerprint builder.
///
/// Variable-length fields are length-prefixed so that moving bytes between
/// adjacent fields (`"ab" + "c"` vs `"a" + "bc"`) changes the result.
pub struct FingerprintBuilder {
    state: Xxh3,
}

impl FingerprintBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self { state: Xxh3::new() }
    }

    /// Adds a length-prefixed byte string.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(&(data.len() as u64).to_le_bytes());
        self.state.update(data);
        self
    }

    /// Adds a length-prefixed UTF-8 string.
    pub fn str(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    /// Adds a fixed-width integer.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.state.update(&value.to_le_bytes());
        self
    }

    /// Adds a single byte.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.state.update(&[value]);
        self
    }

    /// Adds a boolean as one byte.
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(u8::from(value))
    }

    /// Finishes the stream.
    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.state.digest())
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = FingerprintBuilder::new().str("hello world").u8(7).finish();
        let b = FingerprintBuilder::new().str("hello world").u8(7).finish();
        assert_eq!(a, b);
    }

    #[test]
    fn length_prefix_separates_fields() {
        let a = FingerprintBuilder::new().str("ab").str("c").finish();
        let b = FingerprintBuilder::new().str("a").str("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_sixteen_hex_digits() {
        let s = Fingerprint::from_raw(0xbeef).to_string();
        assert_eq!(s, "000000000000beef");
    }

    #[test]
    fn debug_format() {
        let s = format!("{:?}", Fingerprint::from_raw(1));
        assert!(s.starts_with("Fingerprint("));
    }
}
