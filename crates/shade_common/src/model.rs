//! Shader-model tiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An ordered shader-model capability tier.
///
/// Tiers are encoded as `major << 4 | minor` and compare by that integer value,
/// so `SM_5_1 < SM_6_0 < SM_6_4`.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ShaderModel {
    /// Shader model 5.0.
    SM_5_0 = 0x50,
    /// Shader model 5.1.
    SM_5_1 = 0x51,
    /// Shader model 6.0 (wave intrinsics).
    SM_6_0 = 0x60,
    /// Shader model 6.1.
    SM_6_1 = 0x61,
    /// Shader model 6.2.
    SM_6_2 = 0x62,
    /// Shader model 6.3.
    SM_6_3 = 0x63,
    /// Shader model 6.4 (variable-rate shading, packed dot products).
    SM_6_4 = 0x64,
    /// Shader model 6.5 (mesh shaders, DXR 1.1).
    SM_6_5 = 0x65,
    /// Shader model 6.6 (dynamic resources).
    SM_6_6 = 0x66,
}

impl ShaderModel {
    /// Every known tier in ascending order.
    pub const ALL: [ShaderModel; 9] = [
        ShaderModel::SM_5_0,
        ShaderModel::SM_5_1,
        ShaderModel::SM_6_0,
        ShaderModel::SM_6_1,
        ShaderModel::SM_6_2,
        ShaderModel::SM_6_3,
        ShaderModel::SM_6_4,
        ShaderModel::SM_6_5,
        ShaderModel::SM_6_6,
    ];

    /// Highest tier the legacy backend can target.
    pub const LEGACY_CEILING: ShaderModel = ShaderModel::SM_5_1;

    /// Lowest tier routed to the modern backend.
    pub const MODERN_FLOOR: ShaderModel = ShaderModel::SM_6_0;

    /// Returns the `major << 4 | minor` encoding.
    pub fn encoding(self) -> u32 {
        self as u32
    }

    /// Returns the major version number.
    pub fn major(self) -> u32 {
        self.encoding() >> 4
    }

    /// Returns the minor version number.
    pub fn minor(self) -> u32 {
        self.encoding() & 0xF
    }

    /// Looks up a tier from its `major << 4 | minor` encoding.
    pub fn from_encoding(encoding: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.encoding() == encoding)
    }

    /// Looks up a tier from its major and minor version numbers.
    pub fn from_parts(major: u32, minor: u32) -> Option<Self> {
        if minor > 0xF {
            return None;
        }
        Self::from_encoding((major << 4) | minor)
    }

    /// Returns the `<major>_<minor>` suffix used in target profiles.
    pub fn profile_suffix(self) -> String {
        format!("{}_{}", self.major(), self.minor())
    }
}

impl Default for ShaderModel {
    fn default() -> Self {
        ShaderModel::SM_6_4
    }
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// Error returned when parsing an unrecognized shader-model string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shader model '{0}'")]
pub struct ParseModelError(pub String);

impl FromStr for ShaderModel {
    type Err = ParseModelError;

    /// Parses `"6.4"`, `"6_4"`, `"sm_6_4"` or `"sm6.4"` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseModelError(s.to_string());
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower
            .strip_prefix("sm_")
            .or_else(|| lower.strip_prefix("sm"))
            .unwrap_or(&lower);
        let (major, minor) = digits
            .split_once(['.', '_'])
            .ok_or_else(err)?;
        let major: u32 = major.parse().map_err(|_| err())?;
        let minor: u32 = minor.parse().map_err(|_| err())?;
        Self::from_parts(major, minor).ok_or_else(err)
    }
}

impl Serialize for ShaderModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShaderModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_orders_tiers() {
        assert!(ShaderModel::SM_5_1 < ShaderModel::SM_6_0);
        assert!(ShaderModel::SM_6_4 > ShaderModel::SM_6_3);
        assert_eq!(ShaderModel::SM_6_4.encoding(), 0x64);
        assert_eq!(ShaderModel::SM_6_4.major(), 6);
        assert_eq!(ShaderModel::SM_6_4.minor(), 4);
    }

    #[test]
    fn parse_accepts_common_spellings() {
        assert_eq!("6.4".parse::<ShaderModel>().unwrap(), ShaderModel::SM_6_4);
        assert_eq!("5_1".parse::<ShaderModel>().unwrap(), ShaderModel::SM_5_1);
        assert_eq!("sm_6_0".parse::<ShaderModel>().unwrap(), ShaderModel::SM_6_0);
        assert_eq!("SM6.6".parse::<ShaderModel>().unwrap(), ShaderModel::SM_6_6);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("4.0".parse::<ShaderModel>().is_err());
        assert!("six".parse::<ShaderModel>().is_err());
        assert!("6".parse::<ShaderModel>().is_err());
    }

    #[test]
    fn display_and_profile_suffix() {
        assert_eq!(ShaderModel::SM_5_0.to_string(), "5.0");
        assert_eq!(ShaderModel::SM_6_5.profile_suffix(), "6_5");
    }

    #[test]
    fn serde_uses_dotted_string() {
        let json = serde_json::to_string(&ShaderModel::SM_6_2).unwrap();
        assert_eq!(json, "\"6.2\"");
        let back: ShaderModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ShaderModel::SM_6_2);
    }
}
