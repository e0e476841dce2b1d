//! Shader compilation for the shade pipeline.
//!
//! A shared front end (preprocessor, tokenizer, declaration scanner,
//! register allocation and entry validation) feeds two backends: a modern
//! one for shader model 6.x and a legacy one for 5.x. [`ShaderCompiler`]
//! picks between them and attaches reflection to successful results.
//!
//! Output is a chunked container; see [`container`] for the layout,
//! [`reflect()`] and [`disassemble`] for reading it back.

#![warn(missing_docs)]

pub mod backend;
pub mod bind;
pub mod codegen;
pub mod compiled;
pub mod compiler;
pub mod container;
pub mod disasm;
pub mod error;
pub mod lexer;
pub mod message;
pub mod preprocess;
pub mod reflect;
pub mod syntax;
pub mod validate;

pub use backend::{BackendKind, BackendOptions, CompileRequest, Feature, ShaderBackend};
pub use compiled::CompiledShader;
pub use compiler::ShaderCompiler;
pub use disasm::disassemble;
pub use error::{BackendError, ContainerError};
pub use message::{Message, MessageStyle, Severity};
pub use reflect::{reflect, ComponentType, InputElement, Reflection, VertexFormat};
