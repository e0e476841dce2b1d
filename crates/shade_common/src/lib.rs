//! Shared foundational types used across the shade shader pipeline.
//!
//! This crate provides shader-model tiers, shader stages, compile options,
//! the 64-bit request fingerprint and the [`ShaderKey`] cache identity.

#![warn(missing_docs)]

pub mod hash;
pub mod key;
pub mod model;
pub mod options;
pub mod stage;

pub use hash::Fingerprint;
pub use key::ShaderKey;
pub use model::{ParseModelError, ShaderModel};
pub use options::{CompileFlags, CompileOptions, ShaderMacro};
pub use stage::{ParseStageError, ShaderType};
