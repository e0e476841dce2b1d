//! Backend selection.
//!
//! The modern backend handles shader model 6.0 and up when it initialized;
//! everything else goes to the legacy backend. The choice of available
//! backends is made once, at construction.

use std::path::Path;

use shade_common::{CompileOptions, ShaderModel, ShaderType};

use crate::backend::{
    BackendKind, BackendOptions, CompileRequest, Feature, LegacyBackend, ModernBackend, ShaderBackend,
};
use crate::compiled::CompiledShader;
use crate::reflect::reflect;

/// Routes compile requests to the right backend and attaches reflection.
pub struct ShaderCompiler {
    modern: Option<Box<dyn ShaderBackend>>,
    legacy: Box<dyn ShaderBackend>,
}

impl std::fmt::Debug for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCompiler")
            .field("modern", &self.modern.as_ref().map(|b| b.kind()))
            .field("legacy", &self.legacy.kind())
            .finish()
    }
}

impl ShaderCompiler {
    /// Initializes the backends, falling back to legacy-only when the modern
    /// backend cannot be brought up.
    pub fn initialize(opts: &BackendOptions) -> Self {
        let modern = match ModernBackend::initialize(opts) {
            Ok(backend) => {
                log::info!("using modern shader backend (shader model up to {})", backend.max_model());
                Some(Box::new(backend) as Box<dyn ShaderBackend>)
            }
            Err(err) => {
                log::warn!("{err}; falling back to the legacy backend");
                None
            }
        };
        Self {
            modern,
            legacy: Box::new(LegacyBackend::new()),
        }
    }

    /// Builds a selector from explicit backends.
    pub fn with_backends(modern: Option<Box<dyn ShaderBackend>>, legacy: Box<dyn ShaderBackend>) -> Self {
        Self { modern, legacy }
    }

    /// Returns `true` if the modern backend is available.
    pub fn has_modern(&self) -> bool {
        self.modern.is_some()
    }

    /// The backend used for the highest tiers.
    pub fn active_backend(&self) -> BackendKind {
        self.modern.as_ref().map_or(self.legacy.kind(), |b| b.kind())
    }

    /// Highest tier any available backend accepts.
    pub fn max_model(&self) -> ShaderModel {
        self.modern
            .as_ref()
            .map_or(self.legacy.max_model(), |b| b.max_model().max(self.legacy.max_model()))
    }

    /// Returns `true` if some available backend accepts `model`.
    pub fn supports_model(&self, model: ShaderModel) -> bool {
        self.backend_for(model).supports_model(model)
    }

    /// Feature support; always `false` without the modern backend.
    pub fn supports_feature(&self, feature: Feature) -> bool {
        self.modern.as_ref().is_some_and(|b| b.supports_feature(feature))
    }

    fn backend_for(&self, model: ShaderModel) -> &dyn ShaderBackend {
        match &self.modern {
            Some(modern) if model >= ShaderModel::MODERN_FLOOR => modern.as_ref(),
            _ => self.legacy.as_ref(),
        }
    }

    /// Compiles a request with the selected backend.
    ///
    /// # Panics
    ///
    /// Panics if the optimization level is above 3.
    pub fn compile(&self, request: &CompileRequest<'_>) -> CompiledShader {
        let backend = self.backend_for(request.options.target_model);
        log::trace!(
            "compiling '{}' ({}) with the {} backend",
            request.entry_point,
            request.source_name,
            backend.kind()
        );
        let mut out = backend.compile(request);
        if out.success {
            match reflect(&out.bytecode) {
                Ok(reflection) => out.reflection = reflection,
                Err(err) => {
                    out.success = false;
                    out.bytecode.clear();
                    out.errors.push(format!("reflection failed: {err}"));
                }
            }
        }
        out
    }

    /// Compiles in-memory source.
    pub fn compile_source(
        &self,
        source: &str,
        entry_point: &str,
        shader_type: ShaderType,
        options: &CompileOptions,
    ) -> CompiledShader {
        self.compile(&CompileRequest::new(source, entry_point, shader_type, options))
    }

    /// Reads and compiles a file. A read failure yields a failed result.
    pub fn compile_from_file(
        &self,
        path: &Path,
        entry_point: &str,
        shader_type: ShaderType,
        options: &CompileOptions,
    ) -> CompiledShader {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(err) => {
                return CompiledShader::failure(format!(
                    "failed to read shader file '{}': {err}",
                    path.display()
                ))
            }
        };
        let name = path.display().to_string();
        self.compile(
            &CompileRequest::new(&source, entry_point, shader_type, options).with_origin(&name, path.parent()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS: &str = "float4 main(): SV_Target { return float4(1,0,0,1); }";

    fn legacy_only() -> ShaderCompiler {
        ShaderCompiler::initialize(&BackendOptions { force_legacy: true })
    }

    #[test]
    fn routes_by_tier() {
        let c = ShaderCompiler::initialize(&BackendOptions::default());
        assert!(c.has_modern());
        let modern = c.compile_source(PS, "main", ShaderType::Pixel, &CompileOptions::for_model(ShaderModel::SM_6_4));
        assert_eq!(modern.backend, Some(BackendKind::Modern));
        let legacy = c.compile_source(PS, "main", ShaderType::Pixel, &CompileOptions::for_model(ShaderModel::SM_5_1));
        assert_eq!(legacy.backend, Some(BackendKind::Legacy));
        assert_eq!(legacy.profile, "ps_5_1");
        assert!(c.supports_feature(Feature::Raytracing));
        assert_eq!(c.max_model(), ShaderModel::SM_6_6);
    }

    #[test]
    fn fallback_keeps_legacy_tiers_working() {
        let c = legacy_only();
        assert_eq!(c.active_backend(), BackendKind::Legacy);
        for model in [ShaderModel::SM_5_0, ShaderModel::SM_5_1] {
            let out = c.compile_source(PS, "main", ShaderType::Pixel, &CompileOptions::for_model(model));
            assert!(out.success, "{:?}", out.errors);
        }
        assert!(Feature::ALL.iter().all(|f| !c.supports_feature(*f)));
        assert!(!c.supports_model(ShaderModel::SM_6_0));
        let out = c.compile_source(PS, "main", ShaderType::Pixel, &CompileOptions::for_model(ShaderModel::SM_6_4));
        assert!(!out.success);
        assert!(!out.errors.is_empty());
    }

    #[test]
    fn reflection_only_on_success() {
        let c = ShaderCompiler::initialize(&BackendOptions::default());
        let src = "cbuffer Frame { float4 tint; }; Texture2D albedo; SamplerState smp;\n\
                   float4 main(float2 uv : TEXCOORD0) : SV_Target { return albedo.Sample(smp, uv) * tint; }";
        let out = c.compile_source(src, "main", ShaderType::Pixel, &CompileOptions::default());
        assert!(out.success, "{:?}", out.errors);
        assert!(out.has_constant_buffer("Frame"));
        assert!(out.has_texture("albedo"));
        assert!(out.has_sampler("smp"));

        let bad = c.compile_source(src, "missing", ShaderType::Pixel, &CompileOptions::default());
        assert!(!bad.success);
        assert_eq!(bad.reflection, Default::default());
    }

    #[test]
    fn missing_file_is_a_failed_result() {
        let c = legacy_only();
        let dir = tempfile::tempdir().unwrap();
        let out = c.compile_from_file(&dir.path().join("nope.hlsl"), "main", ShaderType::Pixel, &CompileOptions::default());
        assert!(!out.success);
        assert!(out.errors[0].contains("nope.hlsl"));
    }

    #[test]
    fn includes_resolve_next_to_the_file() {
        let c = ShaderCompiler::initialize(&BackendOptions::default());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("common.hlsli"), "#define RED float4(1,0,0,1)\n").unwrap();
        let path = dir.path().join("red.hlsl");
        std::fs::write(&path, "#include \"common.hlsli\"\nfloat4 main() : SV_Target { return RED; }\n").unwrap();
        let out = c.compile_from_file(&path, "main", ShaderType::Pixel, &CompileOptions::default());
        assert!(out.success, "{:?}", out.errors);
    }
}
