//! Precompile manifests: a TOML list of shaders to compile ahead of use.
//!
//! ```toml
//! [[shader]]
//! file = "post/blur.hlsl"
//! entry = "main"
//! stage = "ps"
//! defines = ["QUALITY=2", "FAST"]
//! ```
//!
//! Relative `file` and `include_paths` values resolve against the directory
//! containing the manifest.

use crate::error::ConfigError;
use serde::Deserialize;
use shade_common::{CompileFlags, CompileOptions, ShaderMacro, ShaderModel, ShaderType};
use std::path::{Path, PathBuf};

/// A parsed manifest.
#[derive(Debug, Default, Deserialize)]
pub struct PrecompileManifest {
    /// Shader entries, in file order.
    #[serde(default)]
    pub shader: Vec<ManifestEntry>,
}

/// One `[[shader]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// Source file path.
    pub file: PathBuf,
    /// Entry point name.
    #[serde(default = "default_entry")]
    pub entry: String,
    /// Pipeline stage.
    pub stage: ShaderType,
    /// Target tier; the configured default when absent.
    #[serde(default)]
    pub model: Option<ShaderModel>,
    /// Ordered `NAME=VALUE` or `NAME` defines.
    #[serde(default)]
    pub defines: Vec<String>,
    /// Additional include directories.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    /// Embed debug information.
    #[serde(default)]
    pub debug: bool,
    /// Enable the optimizer.
    #[serde(default = "default_true")]
    pub optimize: bool,
    /// Optimizer level.
    #[serde(default = "default_level")]
    pub optimization_level: u8,
    /// Promote warnings to errors.
    #[serde(default)]
    pub warnings_as_errors: bool,
    /// Strict IEEE numerics.
    #[serde(default)]
    pub strict_numerics: bool,
    /// Allow unbounded resource arrays.
    #[serde(default)]
    pub unbounded_arrays: bool,
}

fn default_entry() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_level() -> u8 {
    CompileOptions::MAX_OPTIMIZATION_LEVEL
}

/// A manifest entry with paths resolved and options built.
#[derive(Debug, Clone)]
pub struct ManifestRequest {
    /// Absolute or manifest-relative-resolved source path.
    pub path: PathBuf,
    /// Entry point.
    pub entry: String,
    /// Stage.
    pub stage: ShaderType,
    /// Compile options.
    pub options: CompileOptions,
}

impl ManifestEntry {
    /// Builds compile options, falling back to `default_model` for the tier.
    pub fn to_options(&self, base_dir: &Path, default_model: ShaderModel) -> CompileOptions {
        CompileOptions {
            target_model: self.model.unwrap_or(default_model),
            macros: self.defines.iter().map(|d| ShaderMacro::parse_define(d)).collect(),
            include_paths: self.include_paths.iter().map(|p| base_dir.join(p)).collect(),
            flags: CompileFlags {
                debug_info: self.debug,
                optimize: self.optimize,
                warnings_as_errors: self.warnings_as_errors,
                strict_numerics: self.strict_numerics,
                unbounded_resource_arrays: self.unbounded_arrays,
            },
            optimization_level: self.optimization_level,
        }
    }
}

impl PrecompileManifest {
    /// Resolves every entry against `base_dir`.
    pub fn requests(&self, base_dir: &Path, default_model: ShaderModel) -> Vec<ManifestRequest> {
        self.shader
            .iter()
            .map(|e| ManifestRequest {
                path: base_dir.join(&e.file),
                entry: e.entry.clone(),
                stage: e.stage,
                options: e.to_options(base_dir, default_model),
            })
            .collect()
    }
}

/// Reads and validates a manifest file.
pub fn load_manifest(path: &Path) -> Result<PrecompileManifest, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(ConfigError::io(path))?;
    load_manifest_from_str(&content)
}

/// Parses and validates a manifest from a string.
pub fn load_manifest_from_str(content: &str) -> Result<PrecompileManifest, ConfigError> {
    let manifest: PrecompileManifest =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    for (i, entry) in manifest.shader.iter().enumerate() {
        if entry.file.as_os_str().is_empty() {
            return Err(ConfigError::MissingField(format!("shader[{i}].file")));
        }
        if entry.entry.is_empty() {
            return Err(ConfigError::MissingField(format!("shader[{i}].entry")));
        }
        if entry.optimization_level > CompileOptions::MAX_OPTIMIZATION_LEVEL {
            return Err(ConfigError::ValidationError(format!(
                "shader[{i}].optimization_level must be at most {}",
                CompileOptions::MAX_OPTIMIZATION_LEVEL
            )));
        }
    }
    Ok(manifest)
}
