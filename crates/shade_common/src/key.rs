//! Cache identity of a compile request.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::hash::{Fingerprint, FingerprintBuilder};
use crate::options::CompileOptions;
use crate::stage::ShaderType;

/// The identity of one compile request.
///
/// Keys are derived, never assembled by hand: [`ShaderKey::new`] computes the
/// fingerprint from every other field. Equality and hashing use the
/// fingerprint alone.
///
/// A key built with [`ShaderKey::in_directory`] also covers the directory
/// that relative `#include "..."` directives resolve against, so identical
/// text in two directories never shares a cache record.
#[derive(Debug, Clone)]
pub struct ShaderKey {
    source: Arc<str>,
    entry_point: String,
    shader_type: ShaderType,
    options: CompileOptions,
    source_dir: Option<PathBuf>,
    fingerprint: Fingerprint,
}

impl ShaderKey {
    /// Derives the key for a request.
    pub fn new(
        source: impl Into<Arc<str>>,
        entry_point: &str,
        shader_type: ShaderType,
        options: &CompileOptions,
    ) -> Self {
        let source = source.into();
        let fingerprint = fingerprint(&source, entry_point, shader_type, options);
        Self {
            source,
            entry_point: entry_point.to_string(),
            shader_type,
            options: options.clone(),
            source_dir: None,
            fingerprint,
        }
    }

    /// Binds the key to the directory its source was read from.
    ///
    /// `None` leaves the key unchanged.
    pub fn in_directory(mut self, dir: Option<&Path>) -> Self {
        self.source_dir = dir.map(Path::to_path_buf);
        let mut b = builder(&self.source, &self.entry_point, self.shader_type, &self.options);
        if let Some(dir) = &self.source_dir {
            b.str(&dir.to_string_lossy());
        }
        self.fingerprint = b.finish();
        self
    }

    /// The source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The entry point name.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// The pipeline stage.
    pub fn shader_type(&self) -> ShaderType {
        self.shader_type
    }

    /// The compile options.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Directory relative includes resolve against, if any.
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    /// The derived fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl PartialEq for ShaderKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for ShaderKey {}

impl Hash for ShaderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

/// Computes the fingerprint of a compile request with no source directory.
///
/// Macros are hashed in the order supplied, so reordering them yields a
/// different fingerprint.
pub fn fingerprint(
    source: &str,
    entry_point: &str,
    shader_type: ShaderType,
    options: &CompileOptions,
) -> Fingerprint {
    builder(source, entry_point, shader_type, options).finish()
}

fn builder(source: &str, entry_point: &str, shader_type: ShaderType, options: &CompileOptions) -> FingerprintBuilder {
    let mut b = FingerprintBuilder::new();
    b.str(source)
        .str(entry_point)
        .u8(shader_type.tag())
        .u32(options.target_model.encoding())
        .bool(options.flags.debug_info)
        .bool(options.flags.optimize)
        .bool(options.flags.warnings_as_errors)
        .bool(options.flags.strict_numerics)
        .bool(options.flags.unbounded_resource_arrays)
        .u8(options.optimization_level);

    b.u32(options.macros.len() as u32);
    for m in &options.macros {
        b.str(&m.name).str(&m.definition);
    }

    b.u32(options.include_paths.len() as u32);
    for path in &options.include_paths {
        b.str(&path.to_string_lossy());
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShaderModel;

    const SRC: &str = "float4 main(): SV_Target { return float4(1,0,0,1); }";

    fn base() -> ShaderKey {
        ShaderKey::new(SRC, "main", ShaderType::Pixel, &CompileOptions::default())
    }

    fn with_opts(f: impl FnOnce(&mut CompileOptions)) -> ShaderKey {
        let mut opts = CompileOptions::default();
        f(&mut opts);
        ShaderKey::new(SRC, "main", ShaderType::Pixel, &opts)
    }

    #[test]
    fn same_request_same_fingerprint() {
        assert_eq!(base().fingerprint(), base().fingerprint());
        assert_eq!(base(), base());
    }

    #[test]
    fn source_entry_and_stage_participate() {
        let k = base();
        let src = ShaderKey::new(
            "float4 main(): SV_Target { return 0; }",
            "main",
            ShaderType::Pixel,
            &CompileOptions::default(),
        );
        let entry = ShaderKey::new(SRC, "other", ShaderType::Pixel, &CompileOptions::default());
        let stage = ShaderKey::new(SRC, "main", ShaderType::Vertex, &CompileOptions::default());
        assert_ne!(k.fingerprint(), src.fingerprint());
        assert_ne!(k.fingerprint(), entry.fingerprint());
        assert_ne!(k.fingerprint(), stage.fingerprint());
    }

    #[test]
    fn every_flag_participates() {
        let k = base().fingerprint();
        assert_ne!(k, with_opts(|o| o.flags.debug_info = true).fingerprint());
        assert_ne!(k, with_opts(|o| o.flags.optimize = false).fingerprint());
        assert_ne!(k, with_opts(|o| o.flags.warnings_as_errors = true).fingerprint());
        assert_ne!(k, with_opts(|o| o.flags.strict_numerics = true).fingerprint());
        assert_ne!(k, with_opts(|o| o.flags.unbounded_resource_arrays = true).fingerprint());
        assert_ne!(k, with_opts(|o| o.optimization_level = 2).fingerprint());
        assert_ne!(k, with_opts(|o| o.target_model = ShaderModel::SM_6_0).fingerprint());
    }

    #[test]
    fn macros_participate_in_order() {
        let a = with_opts(|o| {
            o.macros.push(crate::ShaderMacro::new("A", "1"));
            o.macros.push(crate::ShaderMacro::new("B", "2"));
        });
        let b = with_opts(|o| {
            o.macros.push(crate::ShaderMacro::new("B", "2"));
            o.macros.push(crate::ShaderMacro::new("A", "1"));
        });
        let c = with_opts(|o| {
            o.macros.push(crate::ShaderMacro::new("A", "1"));
            o.macros.push(crate::ShaderMacro::new("B", "3"));
        });
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), base().fingerprint());
    }

    #[test]
    fn source_directory_participates() {
        let a = base().in_directory(Some(Path::new("shaders/a")));
        let b = base().in_directory(Some(Path::new("shaders/b")));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), base().fingerprint());
        assert_eq!(a.fingerprint(), base().in_directory(Some(Path::new("shaders/a"))).fingerprint());
        assert_eq!(a.source_dir(), Some(Path::new("shaders/a")));
        assert_eq!(base().in_directory(None), base());
    }

    #[test]
    fn include_paths_participate() {
        let a = with_opts(|o| o.include_paths.push("shaders/include".into()));
        assert_ne!(a.fingerprint(), base().fingerprint());
    }
}
