//! Parsing and validation of `shade.toml` manager configuration and
//! precompile manifests.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`ShaderManagerConfig`], and parses `[[shader]]` manifests into
//! ready-to-compile [`ManifestRequest`]s.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod manifest;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, load_config_or_default, CONFIG_FILE_NAME};
pub use manifest::{load_manifest, load_manifest_from_str, ManifestEntry, ManifestRequest, PrecompileManifest};
pub use types::*;
