//! The result of a compilation.

use crate::backend::BackendKind;
use crate::codegen::ProgramChunk;
use crate::container::{Container, FourCC};
use crate::disasm::disassemble;
use crate::error::ContainerError;
use crate::reflect::{decode_chunk, reflect, InputElement, Reflection};

/// Bytecode, diagnostics and reflection produced by one compile.
///
/// Check [`CompiledShader::success`] before using the bytecode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledShader {
    /// Container bytes; empty on failure.
    pub bytecode: Vec<u8>,
    /// Listing, present when debug info was requested.
    pub disassembly: Option<String>,
    /// Rendered error messages.
    pub errors: Vec<String>,
    /// Rendered warnings.
    pub warnings: Vec<String>,
    /// `true` when the bytecode is usable.
    pub success: bool,
    /// Reflection data; default on failure.
    pub reflection: Reflection,
    /// Backend that produced the result.
    pub backend: Option<BackendKind>,
    /// Target profile, e.g. `ps_6_4`.
    pub profile: String,
}

impl CompiledShader {
    /// A failed result carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// Rebuilds a successful result from previously emitted bytecode, e.g.
    /// a cache record. Fails if the container does not verify.
    pub fn from_bytecode(bytecode: Vec<u8>, with_disassembly: bool) -> Result<Self, ContainerError> {
        let reflection = reflect(&bytecode)?;
        let container = Container::parse(&bytecode)?;
        let (backend, fourcc) = if container.chunk(FourCC::DXIL).is_some() {
            (BackendKind::Modern, FourCC::DXIL)
        } else {
            (BackendKind::Legacy, FourCC::SHEX)
        };
        let program: ProgramChunk = decode_chunk(fourcc, container.require(fourcc)?)?;
        let disassembly = if with_disassembly {
            Some(disassemble(&bytecode)?)
        } else {
            None
        };
        Ok(Self {
            bytecode,
            disassembly,
            errors: Vec::new(),
            warnings: Vec::new(),
            success: true,
            reflection,
            backend: Some(backend),
            profile: program.profile,
        })
    }

    /// Vertex input layout.
    pub fn input_layout(&self) -> &[InputElement] {
        &self.reflection.input_layout
    }

    /// See [`Reflection::has_constant_buffer`].
    pub fn has_constant_buffer(&self, name: &str) -> bool {
        self.reflection.has_constant_buffer(name)
    }

    /// See [`Reflection::has_texture`].
    pub fn has_texture(&self, name: &str) -> bool {
        self.reflection.has_texture(name)
    }

    /// See [`Reflection::has_sampler`].
    pub fn has_sampler(&self, name: &str) -> bool {
        self.reflection.has_sampler(name)
    }

    /// Errors joined with newlines, for logging.
    pub fn error_text(&self) -> String {
        self.errors.join("\n")
    }
}
