//! Compiler backends.
//!
//! Both backends share one front end (preprocess, lex, scan, bind, validate)
//! and differ in profile naming, switch encoding, the tiers they accept and
//! how they phrase diagnostics.

mod legacy;
mod modern;

pub use legacy::{compile_flags, flags as legacy_flags, LegacyBackend};
pub use modern::{build_arguments, target_profile, ModernBackend};

use std::fmt;
use std::path::Path;

use shade_common::{CompileOptions, ShaderMacro, ShaderModel, ShaderType};

use crate::bind::{allocate, BindOptions};
use crate::codegen::{emit, CodegenSettings, EmitInput};
use crate::compiled::CompiledShader;
use crate::container::FourCC;
use crate::disasm::disassemble;
use crate::lexer::lex;
use crate::message::{code, Messages, MessageStyle};
use crate::preprocess::{preprocess, PreprocessInput};
use crate::syntax::scan;
use crate::validate::{validate_entry, Dialect, ValidateOptions};

/// Which backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Shader model 6.x toolchain.
    Modern,
    /// Shader model 5.x toolchain.
    Legacy,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Modern => write!(f, "modern"),
            BackendKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// Optional GPU features a backend may be able to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// `Wave*` intrinsics.
    WaveIntrinsics,
    /// `SV_ShadingRate`.
    VariableRateShading,
    /// Amplification and mesh stages.
    MeshShaders,
    /// Ray-tracing library stages.
    Raytracing,
}

impl Feature {
    /// Every feature.
    pub const ALL: [Feature; 4] = [
        Feature::WaveIntrinsics,
        Feature::VariableRateShading,
        Feature::MeshShaders,
        Feature::Raytracing,
    ];

    /// Lowest tier providing the feature.
    pub fn minimum_model(self) -> ShaderModel {
        match self {
            Feature::WaveIntrinsics => ShaderModel::SM_6_0,
            Feature::VariableRateShading => ShaderModel::SM_6_4,
            Feature::MeshShaders | Feature::Raytracing => ShaderModel::SM_6_5,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Feature::WaveIntrinsics => "wave intrinsics",
            Feature::VariableRateShading => "variable-rate shading",
            Feature::MeshShaders => "mesh shaders",
            Feature::Raytracing => "raytracing",
        }
    }
}

/// Backend initialization switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendOptions {
    /// Refuse to bring up the modern backend.
    pub force_legacy: bool,
}

/// One compile request.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Shader source text.
    pub source: &'a str,
    /// Entry function name.
    pub entry_point: &'a str,
    /// Pipeline stage.
    pub shader_type: ShaderType,
    /// Compile options.
    pub options: &'a CompileOptions,
    /// Name used in diagnostics.
    pub source_name: &'a str,
    /// Directory searched first for `#include "..."`.
    pub source_dir: Option<&'a Path>,
}

impl<'a> CompileRequest<'a> {
    /// A request for in-memory source.
    pub fn new(
        source: &'a str,
        entry_point: &'a str,
        shader_type: ShaderType,
        options: &'a CompileOptions,
    ) -> Self {
        Self {
            source,
            entry_point,
            shader_type,
            options,
            source_name: "<memory>",
            source_dir: None,
        }
    }

    /// Sets the diagnostic name and include directory.
    pub fn with_origin(mut self, source_name: &'a str, source_dir: Option<&'a Path>) -> Self {
        self.source_name = source_name;
        self.source_dir = source_dir;
        self
    }
}

/// A compiler for a range of shader-model tiers.
pub trait ShaderBackend: Send + Sync {
    /// Backend identity.
    fn kind(&self) -> BackendKind;

    /// Highest tier this backend accepts.
    fn max_model(&self) -> ShaderModel;

    /// Returns `true` if `model` can be targeted.
    fn supports_model(&self, model: ShaderModel) -> bool;

    /// Returns `true` if `feature` can be targeted.
    fn supports_feature(&self, feature: Feature) -> bool;

    /// Compiles one request. Source problems are reported in the result.
    fn compile(&self, request: &CompileRequest<'_>) -> CompiledShader;
}

/// Settings resolved by a backend before running the shared front end.
pub(crate) struct Pipeline {
    pub kind: BackendKind,
    pub dialect: Dialect,
    pub style: MessageStyle,
    pub program: FourCC,
    pub profile: String,
    pub switches: Vec<String>,
    pub debug_info: bool,
    pub optimization: Option<u8>,
    pub warnings_as_errors: bool,
    pub allow_unbounded: bool,
}

impl Pipeline {
    fn finish(&self, bytecode: Vec<u8>, messages: &Messages) -> CompiledShader {
        let (errors, warnings) = messages.render_split(self.style);
        let success = errors.is_empty() && !bytecode.is_empty();
        let disassembly = if success && self.debug_info {
            disassemble(&bytecode).ok()
        } else {
            None
        };
        CompiledShader {
            bytecode: if success { bytecode } else { Vec::new() },
            disassembly,
            errors,
            warnings,
            success,
            reflection: Default::default(),
            backend: Some(self.kind),
            profile: self.profile.clone(),
        }
    }

    /// A failed result with a single diagnostic.
    pub fn reject(&self, code: u16, text: impl Into<String>) -> CompiledShader {
        let mut messages = Messages::new();
        messages.error(code, None, text);
        self.finish(Vec::new(), &messages)
    }

    /// Runs the front end and emitter.
    pub fn run(&self, request: &CompileRequest<'_>) -> CompiledShader {
        let model = request.options.target_model;
        let mut macros = vec![
            ShaderMacro::new("__SHADER_TARGET_MAJOR", model.major().to_string()),
            ShaderMacro::new("__SHADER_TARGET_MINOR", model.minor().to_string()),
        ];
        macros.extend(request.options.macros.iter().cloned());

        let mut pre = preprocess(&PreprocessInput {
            source: request.source,
            source_name: request.source_name,
            source_dir: request.source_dir,
            macros: &macros,
            include_paths: &request.options.include_paths,
        });
        let mut messages = std::mem::take(&mut pre.messages);
        let bytecode = self.front_end(request, &pre, &mut messages);
        if self.warnings_as_errors {
            messages.promote_warnings();
        }
        self.finish(bytecode.unwrap_or_default(), &messages)
    }

    fn front_end(
        &self,
        request: &CompileRequest<'_>,
        pre: &crate::preprocess::Preprocessed,
        messages: &mut Messages,
    ) -> Option<Vec<u8>> {
        if messages.has_errors() {
            return None;
        }
        let tokens = lex(pre, messages);
        let unit = scan(&tokens, pre, messages);
        if messages.has_errors() {
            return None;
        }
        let model = request.options.target_model;
        let bindings = allocate(
            &unit,
            BindOptions {
                allow_unbounded: self.allow_unbounded,
                model,
            },
            pre,
            messages,
        );
        let info = validate_entry(
            &unit,
            ValidateOptions {
                entry: request.entry_point,
                stage: request.shader_type,
                model,
                dialect: self.dialect,
            },
            pre,
            messages,
        )?;
        if messages.has_errors() {
            return None;
        }
        log::trace!(
            "{} backend: {} functions reachable from '{}'",
            self.kind,
            info.reachable.len(),
            request.entry_point
        );
        let emitted = emit(
            &EmitInput {
                unit: &unit,
                entry: request.entry_point,
                stage: request.shader_type,
                info: &info,
                bindings: &bindings,
                pre,
                source_name: request.source_name,
            },
            &CodegenSettings {
                program: self.program,
                profile: self.profile.clone(),
                optimization: self.optimization,
                debug_info: self.debug_info,
                switches: self.switches.clone(),
            },
        );
        match emitted {
            Ok(bytecode) => Some(bytecode),
            Err(err) => {
                messages.error(code::CODE_GENERATION, None, err.to_string());
                None
            }
        }
    }
}

/// Panics if `options` carries an optimization level above 3.
pub(crate) fn check_contract(options: &CompileOptions) {
    assert!(
        options.optimization_level <= CompileOptions::MAX_OPTIMIZATION_LEVEL,
        "optimization level {} is out of range 0..={}",
        options.optimization_level,
        CompileOptions::MAX_OPTIMIZATION_LEVEL
    );
}
