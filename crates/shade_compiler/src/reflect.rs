//! Reflection over compiled containers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::bind::Binding;
use crate::container::{Container, FourCC};
use crate::error::ContainerError;
use crate::syntax::RegisterClass;

/// Scalar type of a vertex attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// 32-bit float.
    Float32,
    /// 16-bit float.
    Float16,
    /// 32-bit unsigned integer.
    Uint32,
    /// 32-bit signed integer.
    Sint32,
}

impl ComponentType {
    fn bits(self) -> u32 {
        match self {
            ComponentType::Float16 => 16,
            _ => 32,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ComponentType::Float32 | ComponentType::Float16 => "FLOAT",
            ComponentType::Uint32 => "UINT",
            ComponentType::Sint32 => "SINT",
        }
    }
}

/// Format of one input element, e.g. `R32G32B32_FLOAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexFormat {
    /// Component type.
    pub component: ComponentType,
    /// Component count, 1 to 4.
    pub components: u8,
}

impl VertexFormat {
    /// Creates a format, padding 3-component 16-bit types to 4 components.
    pub fn new(component: ComponentType, components: u8) -> Self {
        let components = match (component, components) {
            (ComponentType::Float16, 3) => 4,
            (_, n) => n.clamp(1, 4),
        };
        Self {
            component,
            components,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> u32 {
        self.component.bits() / 8 * u32::from(self.components)
    }
}

impl fmt::Display for VertexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.component.bits();
        for channel in ['R', 'G', 'B', 'A'].iter().take(usize::from(self.components)) {
            write!(f, "{channel}{bits}")?;
        }
        write!(f, "_{}", self.component.suffix())
    }
}

/// One vertex input element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputElement {
    /// Semantic without its trailing index.
    pub semantic_name: String,
    /// Trailing semantic index.
    pub semantic_index: u32,
    /// Element format.
    pub format: VertexFormat,
    /// Input assembler slot.
    pub input_slot: u32,
    /// Byte offset within the vertex.
    pub aligned_byte_offset: u32,
}

/// Resource bindings and input layout recovered from bytecode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reflection {
    /// Vertex input elements; empty for non-vertex stages.
    pub input_layout: Vec<InputElement>,
    /// Constant buffer name to slot.
    pub constant_buffers: BTreeMap<String, u32>,
    /// Texture and typed buffer name to slot.
    pub textures: BTreeMap<String, u32>,
    /// Sampler name to slot.
    pub samplers: BTreeMap<String, u32>,
    /// Unordered-access resource name to slot.
    pub uavs: BTreeMap<String, u32>,
    /// Full binding records, including register spaces.
    pub resources: Vec<Binding>,
}

impl Reflection {
    /// Returns `true` if a constant buffer called `name` is bound.
    pub fn has_constant_buffer(&self, name: &str) -> bool {
        self.constant_buffers.contains_key(name)
    }

    /// Returns `true` if a texture called `name` is bound.
    pub fn has_texture(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    /// Returns `true` if a sampler called `name` is bound.
    pub fn has_sampler(&self, name: &str) -> bool {
        self.samplers.contains_key(name)
    }

    /// Returns `true` if a UAV called `name` is bound.
    pub fn has_uav(&self, name: &str) -> bool {
        self.uavs.contains_key(name)
    }
}

pub(crate) fn encode_chunk<T: Serialize>(fourcc: FourCC, value: &T) -> Result<Vec<u8>, ContainerError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|err| ContainerError::EncodeChunk {
        fourcc,
        reason: err.to_string(),
    })
}

pub(crate) fn decode_chunk<T: DeserializeOwned>(
    fourcc: FourCC,
    data: &[u8],
) -> Result<T, ContainerError> {
    bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| ContainerError::MalformedChunk {
            fourcc,
            reason: e.to_string(),
        })
}

/// Extracts reflection from a compiled container.
pub fn reflect(bytecode: &[u8]) -> Result<Reflection, ContainerError> {
    let container = Container::parse(bytecode)?;
    container.verify_checksum()?;
    let resources: Vec<Binding> = decode_chunk(FourCC::RDEF, container.require(FourCC::RDEF)?)?;
    let input_layout = match container.chunk(FourCC::ISGN) {
        Some(data) => decode_chunk(FourCC::ISGN, data)?,
        None => Vec::new(),
    };

    let mut out = Reflection {
        input_layout,
        ..Reflection::default()
    };
    for b in &resources {
        let map = match b.class {
            RegisterClass::ConstantBuffer => &mut out.constant_buffers,
            RegisterClass::ShaderResource => &mut out.textures,
            RegisterClass::Sampler => &mut out.samplers,
            RegisterClass::UnorderedAccess => &mut out.uavs,
        };
        map.insert(b.name.clone(), b.slot);
    }
    out.resources = resources;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerBuilder;
    use crate::syntax::ResourceKind;

    fn binding(name: &str, kind: ResourceKind, slot: u32) -> Binding {
        Binding {
            name: name.into(),
            type_name: "T".into(),
            kind,
            class: kind.class(),
            slot,
            space: 0,
            count: Some(1),
        }
    }

    #[test]
    fn formats() {
        let f = VertexFormat::new(ComponentType::Float32, 3);
        assert_eq!(f.to_string(), "R32G32B32_FLOAT");
        assert_eq!(f.size(), 12);
        let h = VertexFormat::new(ComponentType::Float16, 3);
        assert_eq!(h.to_string(), "R16G16B16A16_FLOAT");
        assert_eq!(h.size(), 8);
        assert_eq!(VertexFormat::new(ComponentType::Uint32, 1).to_string(), "R32_UINT");
    }

    #[test]
    fn maps_by_register_class() {
        let rdef = vec![
            binding("Frame", ResourceKind::ConstantBuffer, 0),
            binding("albedo", ResourceKind::Texture, 2),
            binding("linear", ResourceKind::Sampler, 1),
            binding("out_tex", ResourceKind::Uav, 0),
        ];
        let bytes = ContainerBuilder::new()
            .chunk(FourCC::DXIL, Vec::new())
            .chunk(FourCC::RDEF, encode_chunk(FourCC::RDEF, &rdef).unwrap())
            .build();
        let r = reflect(&bytes).unwrap();
        assert!(r.has_constant_buffer("Frame"));
        assert_eq!(r.textures.get("albedo"), Some(&2));
        assert!(r.has_sampler("linear"));
        assert!(r.has_uav("out_tex"));
        assert!(!r.has_texture("Frame"));
        assert!(r.input_layout.is_empty());
        assert_eq!(r.resources.len(), 4);
    }

    #[test]
    fn missing_rdef_is_an_error() {
        let bytes = ContainerBuilder::new().chunk(FourCC::DXIL, Vec::new()).build();
        assert_eq!(reflect(&bytes), Err(ContainerError::MissingChunk(FourCC::RDEF)));
    }

    #[test]
    fn garbage_rdef_is_malformed() {
        let bytes = ContainerBuilder::new()
            .chunk(FourCC::RDEF, vec![0xff; 3])
            .build();
        assert!(matches!(
            reflect(&bytes),
            Err(ContainerError::MalformedChunk { .. })
        ));
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no wire form"))
        }
    }

    #[test]
    fn encode_failure_names_the_chunk() {
        let err = encode_chunk(FourCC::RDEF, &Unencodable).unwrap_err();
        assert!(matches!(err, ContainerError::EncodeChunk { fourcc: FourCC::RDEF, .. }));
        assert!(err.to_string().contains("no wire form"));
    }
}
