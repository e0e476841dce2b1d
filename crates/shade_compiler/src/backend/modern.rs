//! Shader model 6.x backend.

use shade_common::{CompileOptions, ShaderModel, ShaderType};

use super::{check_contract, BackendKind, BackendOptions, CompileRequest, Feature, Pipeline, ShaderBackend};
use crate::compiled::CompiledShader;
use crate::container::FourCC;
use crate::error::BackendError;
use crate::message::{code, MessageStyle};
use crate::validate::Dialect;

const NAME: &str = "modern";
const MAX_MODEL: ShaderModel = ShaderModel::SM_6_6;
const SELF_TEST: &str = "float4 main() : SV_Target { return float4(0, 0, 0, 1); }";

/// Returns the target profile for `stage` at `model`, e.g. `ps_6_4`.
///
/// Ray-tracing stages compile as a library (`lib_6_5`).
pub fn target_profile(stage: ShaderType, model: ShaderModel) -> String {
    let prefix = if stage.is_raytracing() {
        "lib"
    } else {
        stage.short_name()
    };
    format!("{prefix}_{}", model.profile_suffix())
}

/// Builds the command-line style switch list for a request.
pub fn build_arguments(entry: &str, profile: &str, options: &CompileOptions) -> Vec<String> {
    let mut args = Vec::new();
    if options.flags.debug_info {
        args.push("-Zi".to_string());
        args.push("-Qembed_debug".to_string());
    }
    match options.effective_optimization() {
        Some(level) => args.push(format!("-O{level}")),
        None => args.push("-Od".to_string()),
    }
    if options.flags.warnings_as_errors {
        args.push("-WX".to_string());
    }
    if options.flags.strict_numerics {
        args.push("-Gis".to_string());
    }
    if options.flags.unbounded_resource_arrays {
        args.push("-enable-unbounded-descriptor-tables".to_string());
    }
    args.push("-E".to_string());
    args.push(entry.to_string());
    args.push("-T".to_string());
    args.push(profile.to_string());
    args
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Switches {
    debug_info: bool,
    optimization: Option<u8>,
    warnings_as_errors: bool,
    unbounded: bool,
}

fn parse_arguments(args: &[String]) -> Switches {
    let mut s = Switches::default();
    for arg in args {
        match arg.as_str() {
            "-Zi" => s.debug_info = true,
            "-Od" => s.optimization = None,
            "-WX" => s.warnings_as_errors = true,
            "-enable-unbounded-descriptor-tables" => s.unbounded = true,
            other => {
                if let Some(level) = other.strip_prefix("-O").and_then(|l| l.parse().ok()) {
                    s.optimization = Some(level);
                }
            }
        }
    }
    s
}

/// The shader model 6.x backend.
#[derive(Debug)]
pub struct ModernBackend {
    _private: (),
}

impl ModernBackend {
    /// Brings the backend up and compiles a trivial shader to prove it works.
    pub fn initialize(opts: &BackendOptions) -> Result<Self, BackendError> {
        if opts.force_legacy {
            return Err(BackendError::Disabled { backend: NAME });
        }
        let backend = ModernBackend { _private: () };
        let options = CompileOptions::for_model(ShaderModel::MODERN_FLOOR);
        let self_test = backend.compile(&CompileRequest::new(SELF_TEST, "main", ShaderType::Pixel, &options));
        if !self_test.success {
            return Err(BackendError::SelfTest {
                backend: NAME,
                detail: self_test.errors.first().cloned().unwrap_or_default(),
            });
        }
        log::debug!("modern backend ready, shader models {} to {MAX_MODEL}", ShaderModel::MODERN_FLOOR);
        Ok(backend)
    }
}

impl ShaderBackend for ModernBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn max_model(&self) -> ShaderModel {
        MAX_MODEL
    }

    fn supports_model(&self, model: ShaderModel) -> bool {
        (ShaderModel::MODERN_FLOOR..=MAX_MODEL).contains(&model)
    }

    fn supports_feature(&self, feature: Feature) -> bool {
        feature.minimum_model() <= MAX_MODEL
    }

    /// # Panics
    ///
    /// Panics if the optimization level is above 3.
    fn compile(&self, request: &CompileRequest<'_>) -> CompiledShader {
        check_contract(request.options);
        let model = request.options.target_model;
        let stage = request.shader_type;
        let profile = target_profile(stage, model);
        let args = build_arguments(request.entry_point, &profile, request.options);
        let switches = parse_arguments(&args);
        let pipeline = Pipeline {
            kind: BackendKind::Modern,
            dialect: Dialect::Modern,
            style: MessageStyle::Clang,
            program: FourCC::DXIL,
            profile: profile.clone(),
            switches: args,
            debug_info: switches.debug_info,
            optimization: switches.optimization,
            warnings_as_errors: switches.warnings_as_errors,
            allow_unbounded: switches.unbounded,
        };

        if !self.supports_model(model) {
            return pipeline.reject(
                code::UNSUPPORTED_TARGET,
                format!("invalid profile '{profile}': shader model {model} is not supported by the modern compiler"),
            );
        }
        if model < stage.minimum_model() {
            return pipeline.reject(
                code::UNSUPPORTED_TARGET,
                format!(
                    "{} shaders require shader model {} or higher (target '{profile}')",
                    stage.name().to_ascii_lowercase(),
                    stage.minimum_model()
                ),
            );
        }
        pipeline.run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> ModernBackend {
        ModernBackend::initialize(&BackendOptions::default()).unwrap()
    }

    #[test]
    fn profiles() {
        assert_eq!(target_profile(ShaderType::Pixel, ShaderModel::SM_6_4), "ps_6_4");
        assert_eq!(target_profile(ShaderType::Mesh, ShaderModel::SM_6_5), "ms_6_5");
        assert_eq!(target_profile(ShaderType::Amplification, ShaderModel::SM_6_6), "as_6_6");
        assert_eq!(target_profile(ShaderType::ClosestHit, ShaderModel::SM_6_5), "lib_6_5");
    }

    #[test]
    fn arguments_follow_options() {
        let mut opts = CompileOptions::default().with_debug_info(true);
        opts.flags.warnings_as_errors = true;
        opts.flags.strict_numerics = true;
        opts.flags.unbounded_resource_arrays = true;
        let args = build_arguments("main", "ps_6_4", &opts);
        assert_eq!(
            args,
            vec![
                "-Zi",
                "-Qembed_debug",
                "-O3",
                "-WX",
                "-Gis",
                "-enable-unbounded-descriptor-tables",
                "-E",
                "main",
                "-T",
                "ps_6_4"
            ]
        );
        let parsed = parse_arguments(&args);
        assert!(parsed.debug_info && parsed.warnings_as_errors && parsed.unbounded);
        assert_eq!(parsed.optimization, Some(3));

        opts.flags.optimize = false;
        let args = build_arguments("main", "ps_6_4", &opts);
        assert!(args.contains(&"-Od".to_string()));
        assert_eq!(parse_arguments(&args).optimization, None);
    }

    #[test]
    fn forced_legacy_disables() {
        let err = ModernBackend::initialize(&BackendOptions { force_legacy: true }).unwrap_err();
        assert!(matches!(err, BackendError::Disabled { .. }));
    }

    #[test]
    fn compiles_pixel_shader() {
        let opts = CompileOptions::for_model(ShaderModel::SM_6_4);
        let out = backend().compile(&CompileRequest::new(
            "float4 main(): SV_Target { return float4(1,0,0,1); }",
            "main",
            ShaderType::Pixel,
            &opts,
        ));
        assert!(out.success, "{:?}", out.errors);
        assert!(!out.bytecode.is_empty());
        assert_eq!(out.profile, "ps_6_4");
        assert_eq!(out.backend, Some(BackendKind::Modern));
        assert!(out.disassembly.is_none());
    }

    #[test]
    fn clang_style_diagnostics() {
        let opts = CompileOptions::default();
        let out = backend().compile(
            &CompileRequest::new("float4 main() : SV_Target { return 0; ) }", "main", ShaderType::Pixel, &opts)
                .with_origin("broken.hlsl", None),
        );
        assert!(!out.success);
        assert!(out.bytecode.is_empty());
        assert!(out.errors[0].starts_with("broken.hlsl:1:"), "{:?}", out.errors);
        assert!(out.errors[0].contains(": error: "));
    }

    #[test]
    fn rejects_stage_below_its_tier() {
        let opts = CompileOptions::for_model(ShaderModel::SM_6_4);
        let out = backend().compile(&CompileRequest::new(
            "[numthreads(32,1,1)] void main() { }",
            "main",
            ShaderType::Mesh,
            &opts,
        ));
        assert!(!out.success);
        assert!(out.errors[0].contains("6.5"));
    }

    #[test]
    fn warnings_as_errors_fails_compile() {
        let src = "#pragma something_unknown\nfloat4 main() : SV_Target { return 0; }";
        let opts = CompileOptions::default();
        let out = backend().compile(&CompileRequest::new(src, "main", ShaderType::Pixel, &opts));
        assert!(out.success);
        assert_eq!(out.warnings.len(), 1);

        let mut strict = CompileOptions::default();
        strict.flags.warnings_as_errors = true;
        let out = backend().compile(&CompileRequest::new(src, "main", ShaderType::Pixel, &strict));
        assert!(!out.success);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn debug_info_adds_disassembly() {
        let opts = CompileOptions::default().with_debug_info(true);
        let out = backend().compile(&CompileRequest::new(
            "float4 main() : SV_Target { return 1; }",
            "main",
            ShaderType::Pixel,
            &opts,
        ));
        assert!(out.disassembly.unwrap().contains("-Zi"));
    }

    #[test]
    #[should_panic(expected = "optimization level")]
    fn out_of_range_optimization_panics() {
        let mut opts = CompileOptions::default();
        opts.optimization_level = 7;
        backend().compile(&CompileRequest::new("", "main", ShaderType::Pixel, &opts));
    }
}
