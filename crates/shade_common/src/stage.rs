//! Shader pipeline stages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::model::ShaderModel;

/// The pipeline stage a shader entry point is compiled for.
///
/// This is a closed set: every consumer matches exhaustively, so adding a
/// stage is a compile error at each site that must handle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderType {
    /// Vertex shader.
    Vertex,
    /// Hull (tessellation control) shader.
    Hull,
    /// Domain (tessellation evaluation) shader.
    Domain,
    /// Geometry shader.
    Geometry,
    /// Pixel shader.
    Pixel,
    /// Compute shader.
    Compute,
    /// Amplification (task) shader.
    Amplification,
    /// Mesh shader.
    Mesh,
    /// Ray-generation shader.
    RayGeneration,
    /// Miss shader.
    Miss,
    /// Closest-hit shader.
    ClosestHit,
    /// Any-hit shader.
    AnyHit,
}

impl ShaderType {
    /// Every stage, in declaration order.
    pub const ALL: [ShaderType; 12] = [
        ShaderType::Vertex,
        ShaderType::Hull,
        ShaderType::Domain,
        ShaderType::Geometry,
        ShaderType::Pixel,
        ShaderType::Compute,
        ShaderType::Amplification,
        ShaderType::Mesh,
        ShaderType::RayGeneration,
        ShaderType::Miss,
        ShaderType::ClosestHit,
        ShaderType::AnyHit,
    ];

    /// Returns a small stable tag used when fingerprinting requests.
    pub fn tag(self) -> u8 {
        match self {
            ShaderType::Vertex => 0,
            ShaderType::Hull => 1,
            ShaderType::Domain => 2,
            ShaderType::Geometry => 3,
            ShaderType::Pixel => 4,
            ShaderType::Compute => 5,
            ShaderType::Amplification => 6,
            ShaderType::Mesh => 7,
            ShaderType::RayGeneration => 8,
            ShaderType::Miss => 9,
            ShaderType::ClosestHit => 10,
            ShaderType::AnyHit => 11,
        }
    }

    /// Returns the short stage prefix (`vs`, `ps`, ...).
    pub fn short_name(self) -> &'static str {
        match self {
            ShaderType::Vertex => "vs",
            ShaderType::Hull => "hs",
            ShaderType::Domain => "ds",
            ShaderType::Geometry => "gs",
            ShaderType::Pixel => "ps",
            ShaderType::Compute => "cs",
            ShaderType::Amplification => "as",
            ShaderType::Mesh => "ms",
            ShaderType::RayGeneration => "raygeneration",
            ShaderType::Miss => "miss",
            ShaderType::ClosestHit => "closesthit",
            ShaderType::AnyHit => "anyhit",
        }
    }

    /// Returns `true` for the six stages of the classic Direct3D 11 pipeline.
    pub fn is_classic(self) -> bool {
        match self {
            ShaderType::Vertex
            | ShaderType::Hull
            | ShaderType::Domain
            | ShaderType::Geometry
            | ShaderType::Pixel
            | ShaderType::Compute => true,
            ShaderType::Amplification
            | ShaderType::Mesh
            | ShaderType::RayGeneration
            | ShaderType::Miss
            | ShaderType::ClosestHit
            | ShaderType::AnyHit => false,
        }
    }

    /// Returns `true` for ray-tracing stages, which compile as libraries.
    pub fn is_raytracing(self) -> bool {
        matches!(
            self,
            ShaderType::RayGeneration | ShaderType::Miss | ShaderType::ClosestHit | ShaderType::AnyHit
        )
    }

    /// Returns the lowest shader model that can express this stage.
    pub fn minimum_model(self) -> ShaderModel {
        match self {
            ShaderType::Vertex
            | ShaderType::Hull
            | ShaderType::Domain
            | ShaderType::Geometry
            | ShaderType::Pixel
            | ShaderType::Compute => ShaderModel::SM_5_0,
            ShaderType::Amplification
            | ShaderType::Mesh
            | ShaderType::RayGeneration
            | ShaderType::Miss
            | ShaderType::ClosestHit
            | ShaderType::AnyHit => ShaderModel::SM_6_5,
        }
    }

    /// Returns the human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            ShaderType::Vertex => "Vertex",
            ShaderType::Hull => "Hull",
            ShaderType::Domain => "Domain",
            ShaderType::Geometry => "Geometry",
            ShaderType::Pixel => "Pixel",
            ShaderType::Compute => "Compute",
            ShaderType::Amplification => "Amplification",
            ShaderType::Mesh => "Mesh",
            ShaderType::RayGeneration => "RayGeneration",
            ShaderType::Miss => "Miss",
            ShaderType::ClosestHit => "ClosestHit",
            ShaderType::AnyHit => "AnyHit",
        }
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unrecognized stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shader stage '{0}'")]
pub struct ParseStageError(pub String);

impl FromStr for ShaderType {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stage = match s.trim().to_ascii_lowercase().as_str() {
            "vs" | "vert" | "vertex" => ShaderType::Vertex,
            "hs" | "hull" => ShaderType::Hull,
            "ds" | "domain" => ShaderType::Domain,
            "gs" | "geom" | "geometry" => ShaderType::Geometry,
            "ps" | "frag" | "pixel" | "fragment" => ShaderType::Pixel,
            "cs" | "comp" | "compute" => ShaderType::Compute,
            "as" | "amplification" | "task" => ShaderType::Amplification,
            "ms" | "mesh" => ShaderType::Mesh,
            "rgen" | "raygen" | "raygeneration" => ShaderType::RayGeneration,
            "rmiss" | "miss" => ShaderType::Miss,
            "rchit" | "closesthit" => ShaderType::ClosestHit,
            "rahit" | "anyhit" => ShaderType::AnyHit,
            _ => return Err(ParseStageError(s.to_string())),
        };
        Ok(stage)
    }
}

impl Serialize for ShaderType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.short_name())
    }
}

impl<'de> Deserialize<'de> for ShaderType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<u8> = ShaderType::ALL.iter().map(|t| t.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), ShaderType::ALL.len());
    }

    #[test]
    fn parse_short_and_long_names() {
        assert_eq!("ps".parse::<ShaderType>().unwrap(), ShaderType::Pixel);
        assert_eq!("Compute".parse::<ShaderType>().unwrap(), ShaderType::Compute);
        assert_eq!("ms".parse::<ShaderType>().unwrap(), ShaderType::Mesh);
        assert!("tess".parse::<ShaderType>().is_err());
    }

    #[test]
    fn classic_stages() {
        let classic: Vec<_> = ShaderType::ALL.iter().filter(|t| t.is_classic()).collect();
        assert_eq!(classic.len(), 6);
        assert!(!ShaderType::Mesh.is_classic());
        assert!(ShaderType::Miss.is_raytracing());
    }

    #[test]
    fn minimum_models() {
        assert_eq!(ShaderType::Pixel.minimum_model(), ShaderModel::SM_5_0);
        assert_eq!(ShaderType::Mesh.minimum_model(), ShaderModel::SM_6_5);
    }
}
