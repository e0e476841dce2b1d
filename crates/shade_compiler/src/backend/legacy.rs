//! Shader model 5.x backend.
//!
//! Accepts the six classic stages at tiers 5.0 and 5.1. Switches travel as a
//! `D3DCOMPILE_*` style bitmask.

use shade_common::{CompileOptions, ShaderModel};

use super::{check_contract, BackendKind, CompileRequest, Feature, Pipeline, ShaderBackend};
use crate::compiled::CompiledShader;
use crate::container::FourCC;
use crate::message::{code, MessageStyle};
use crate::validate::Dialect;

/// Compile flag bits.
pub mod flags {
    /// Embed debug information.
    pub const DEBUG: u32 = 1 << 0;
    /// Disable the optimizer.
    pub const SKIP_OPTIMIZATION: u32 = 1 << 2;
    /// Strict IEEE numerics.
    pub const IEEE_STRICTNESS: u32 = 1 << 13;
    /// Optimization level 0.
    pub const OPTIMIZATION_LEVEL0: u32 = 1 << 14;
    /// Optimization level 1 (no bits set).
    pub const OPTIMIZATION_LEVEL1: u32 = 0;
    /// Optimization level 2.
    pub const OPTIMIZATION_LEVEL2: u32 = (1 << 14) | (1 << 15);
    /// Optimization level 3.
    pub const OPTIMIZATION_LEVEL3: u32 = 1 << 15;
    /// Fail on warnings.
    pub const WARNINGS_ARE_ERRORS: u32 = 1 << 18;
    /// Allow unbounded descriptor tables.
    pub const ENABLE_UNBOUNDED_DESCRIPTOR_TABLES: u32 = 1 << 20;

    pub(super) const OPTIMIZATION_MASK: u32 = (1 << 14) | (1 << 15);
}

const MAX_MODEL: ShaderModel = ShaderModel::LEGACY_CEILING;

/// Encodes `options` as a flag bitmask.
pub fn compile_flags(options: &CompileOptions) -> u32 {
    let mut bits = 0;
    if options.flags.debug_info {
        bits |= flags::DEBUG;
    }
    bits |= match options.effective_optimization() {
        None => flags::SKIP_OPTIMIZATION,
        Some(0) => flags::OPTIMIZATION_LEVEL0,
        Some(1) => flags::OPTIMIZATION_LEVEL1,
        Some(2) => flags::OPTIMIZATION_LEVEL2,
        Some(_) => flags::OPTIMIZATION_LEVEL3,
    };
    if options.flags.strict_numerics {
        bits |= flags::IEEE_STRICTNESS;
    }
    if options.flags.warnings_as_errors {
        bits |= flags::WARNINGS_ARE_ERRORS;
    }
    if options.flags.unbounded_resource_arrays {
        bits |= flags::ENABLE_UNBOUNDED_DESCRIPTOR_TABLES;
    }
    bits
}

fn optimization(bits: u32) -> Option<u8> {
    if bits & flags::SKIP_OPTIMIZATION != 0 {
        return None;
    }
    Some(match bits & flags::OPTIMIZATION_MASK {
        flags::OPTIMIZATION_LEVEL0 => 0,
        flags::OPTIMIZATION_LEVEL2 => 2,
        flags::OPTIMIZATION_LEVEL3 => 3,
        _ => 1,
    })
}

fn flag_names(bits: u32) -> Vec<String> {
    let named = [
        (flags::DEBUG, "DEBUG"),
        (flags::SKIP_OPTIMIZATION, "SKIP_OPTIMIZATION"),
        (flags::IEEE_STRICTNESS, "IEEE_STRICTNESS"),
        (flags::WARNINGS_ARE_ERRORS, "WARNINGS_ARE_ERRORS"),
        (flags::ENABLE_UNBOUNDED_DESCRIPTOR_TABLES, "ENABLE_UNBOUNDED_DESCRIPTOR_TABLES"),
    ];
    let mut out: Vec<String> = named
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| format!("D3DCOMPILE_{name}"))
        .collect();
    if let Some(level) = optimization(bits) {
        out.push(format!("D3DCOMPILE_OPTIMIZATION_LEVEL{level}"));
    }
    out
}

/// The shader model 5.x backend. Always available.
#[derive(Debug, Default)]
pub struct LegacyBackend;

impl LegacyBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        LegacyBackend
    }
}

impl ShaderBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn max_model(&self) -> ShaderModel {
        MAX_MODEL
    }

    fn supports_model(&self, model: ShaderModel) -> bool {
        model <= MAX_MODEL
    }

    fn supports_feature(&self, _feature: Feature) -> bool {
        false
    }

    /// # Panics
    ///
    /// Panics if the optimization level is above 3.
    fn compile(&self, request: &CompileRequest<'_>) -> CompiledShader {
        check_contract(request.options);
        let model = request.options.target_model;
        let stage = request.shader_type;
        let profile = format!("{}_{}", stage.short_name(), model.profile_suffix());
        let bits = compile_flags(request.options);
        let pipeline = Pipeline {
            kind: BackendKind::Legacy,
            dialect: Dialect::Legacy,
            style: MessageStyle::Legacy,
            program: FourCC::SHEX,
            profile: profile.clone(),
            switches: flag_names(bits),
            debug_info: bits & flags::DEBUG != 0,
            optimization: optimization(bits),
            warnings_as_errors: bits & flags::WARNINGS_ARE_ERRORS != 0,
            allow_unbounded: bits & flags::ENABLE_UNBOUNDED_DESCRIPTOR_TABLES != 0,
        };

        if !stage.is_classic() {
            return pipeline.reject(
                code::UNSUPPORTED_TARGET,
                format!("Unsupported shader type for legacy compiler: {}", stage.name()),
            );
        }
        if !self.supports_model(model) {
            return pipeline.reject(
                code::UNSUPPORTED_TARGET,
                format!("invalid target '{profile}': the legacy compiler supports shader model {MAX_MODEL} and below"),
            );
        }
        pipeline.run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_common::ShaderType;

    fn compile(src: &str, stage: ShaderType, opts: &CompileOptions) -> CompiledShader {
        LegacyBackend::new().compile(&CompileRequest::new(src, "main", stage, opts).with_origin("t.hlsl", None))
    }

    #[test]
    fn flag_encoding() {
        let opts = CompileOptions::for_model(ShaderModel::SM_5_0);
        assert_eq!(compile_flags(&opts), flags::OPTIMIZATION_LEVEL3);
        let mut opts = opts.with_debug_info(true).with_optimization_level(0);
        opts.flags.warnings_as_errors = true;
        let bits = compile_flags(&opts);
        assert_eq!(bits, flags::DEBUG | flags::OPTIMIZATION_LEVEL0 | flags::WARNINGS_ARE_ERRORS);
        assert_eq!(optimization(bits), Some(0));
        opts.flags.optimize = false;
        assert_eq!(optimization(compile_flags(&opts)), None);
        assert_eq!(optimization(flags::OPTIMIZATION_LEVEL1), Some(1));
        assert_eq!(optimization(flags::OPTIMIZATION_LEVEL2), Some(2));
    }

    #[test]
    fn compiles_classic_stage_at_5_0() {
        let opts = CompileOptions::for_model(ShaderModel::SM_5_0);
        let out = compile("float4 main(float4 p : POSITION) : SV_Position { return p; }", ShaderType::Vertex, &opts);
        assert!(out.success, "{:?}", out.errors);
        assert_eq!(out.profile, "vs_5_0");
        assert_eq!(out.backend, Some(BackendKind::Legacy));
    }

    #[test]
    fn rejects_modern_only_stages() {
        let opts = CompileOptions::for_model(ShaderModel::SM_5_1);
        let out = compile("[numthreads(1,1,1)] void main() { }", ShaderType::Mesh, &opts);
        assert!(!out.success);
        assert!(out.errors[0].contains("Unsupported shader type for legacy compiler"));
    }

    #[test]
    fn rejects_tiers_above_ceiling() {
        let opts = CompileOptions::for_model(ShaderModel::SM_6_0);
        let out = compile("float4 main() : SV_Target { return 0; }", ShaderType::Pixel, &opts);
        assert!(!out.success);
        assert!(out.errors[0].contains("error X6000"));
    }

    #[test]
    fn legacy_style_diagnostics() {
        let opts = CompileOptions::for_model(ShaderModel::SM_5_0);
        let out = compile(
            "[numthreads(8,1,1)] void main() { uint x = WaveActiveSum(1); }",
            ShaderType::Compute,
            &opts,
        );
        assert!(!out.success);
        assert!(out.errors[0].starts_with("t.hlsl(1,"), "{:?}", out.errors);
        assert!(out.errors[0].contains("error X3004: undeclared identifier 'WaveActiveSum'"));
    }

    #[test]
    fn no_features() {
        let b = LegacyBackend::new();
        assert!(Feature::ALL.iter().all(|f| !b.supports_feature(*f)));
        assert!(b.supports_model(ShaderModel::SM_5_1));
        assert!(!b.supports_model(ShaderModel::SM_6_0));
    }
}
