//! Bytecode emission.
//!
//! The program chunk records the target profile, the backend switches that
//! produced it and the normalized body of every emitted function. With the
//! optimizer enabled only functions reachable from the entry are kept.

use serde::{Deserialize, Serialize};
use shade_common::ShaderType;

use crate::bind::Binding;
use crate::container::{ContainerBuilder, FourCC};
use crate::error::ContainerError;
use crate::preprocess::Preprocessed;
use crate::reflect::encode_chunk;
use crate::syntax::{Function, TranslationUnit};
use crate::validate::EntryInfo;

/// Version of the program chunk encoding.
pub const PROGRAM_VERSION: u32 = 1;

/// One emitted function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCode {
    /// Function name.
    pub name: String,
    /// Rendered signature.
    pub signature: String,
    /// Normalized body text.
    pub body: String,
}

/// Contents of the `SHEX` / `DXIL` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramChunk {
    /// [`PROGRAM_VERSION`] at emission time.
    pub version: u32,
    /// Target profile, e.g. `ps_6_4`.
    pub profile: String,
    /// Pipeline stage.
    pub stage: ShaderType,
    /// Entry function name.
    pub entry: String,
    /// Backend switches in effect.
    pub switches: Vec<String>,
    /// Emitted functions, in declaration order.
    pub functions: Vec<FunctionCode>,
}

/// Contents of the `SDBG` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugChunk {
    /// Name of the main source.
    pub source_name: String,
    /// Preprocessed text the program was built from.
    pub text: String,
}

/// What the backend asks the emitter to produce.
#[derive(Debug, Clone)]
pub struct CodegenSettings {
    /// Program chunk identifier.
    pub program: FourCC,
    /// Target profile.
    pub profile: String,
    /// Optimization level, `None` with the optimizer disabled.
    pub optimization: Option<u8>,
    /// Embed the `SDBG` chunk.
    pub debug_info: bool,
    /// Backend switches, recorded verbatim.
    pub switches: Vec<String>,
}

/// Everything the emitter reads from the front end.
pub struct EmitInput<'a> {
    /// Scanned declarations.
    pub unit: &'a TranslationUnit,
    /// Entry function name.
    pub entry: &'a str,
    /// Pipeline stage.
    pub stage: ShaderType,
    /// Result of entry validation.
    pub info: &'a EntryInfo,
    /// Allocated registers.
    pub bindings: &'a [Binding],
    /// Preprocessor output.
    pub pre: &'a Preprocessed,
    /// Name of the main source.
    pub source_name: &'a str,
}

fn signature(f: &Function) -> String {
    let params: Vec<String> = f
        .params
        .iter()
        .map(|p| {
            let mut s = String::new();
            for q in &p.qualifiers {
                s.push_str(q);
                s.push(' ');
            }
            s.push_str(&p.ty);
            s.push(' ');
            s.push_str(&p.name);
            if let Some(sem) = &p.semantic {
                s.push_str(" : ");
                s.push_str(sem);
            }
            s
        })
        .collect();
    let mut out = format!("{} {}({})", f.return_type, f.name, params.join(", "));
    if let Some(sem) = &f.return_semantic {
        out.push_str(" : ");
        out.push_str(sem);
    }
    out
}

/// Builds the container for a validated entry.
pub fn emit(input: &EmitInput<'_>, settings: &CodegenSettings) -> Result<Vec<u8>, ContainerError> {
    let keep_reachable = settings.optimization.is_some_and(|level| level > 0);
    let functions = input
        .unit
        .functions
        .iter()
        .filter(|f| {
            !keep_reachable || input.info.reachable.iter().any(|name| *name == f.name)
        })
        .filter_map(|f| {
            let body = f.body.as_ref()?;
            Some(FunctionCode {
                name: f.name.clone(),
                signature: signature(f),
                body: body.text.clone(),
            })
        })
        .collect();

    let program = ProgramChunk {
        version: PROGRAM_VERSION,
        profile: settings.profile.clone(),
        stage: input.stage,
        entry: input.entry.to_string(),
        switches: settings.switches.clone(),
        functions,
    };

    let mut builder = ContainerBuilder::new()
        .chunk(settings.program, encode_chunk(settings.program, &program)?)
        .chunk(FourCC::RDEF, encode_chunk(FourCC::RDEF, &input.bindings)?);
    if input.stage == ShaderType::Vertex {
        builder = builder.chunk(FourCC::ISGN, encode_chunk(FourCC::ISGN, &input.info.input_layout)?);
    }
    if settings.debug_info {
        let debug = DebugChunk {
            source_name: input.source_name.to_string(),
            text: input.pre.text.clone(),
        };
        builder = builder.chunk(FourCC::SDBG, encode_chunk(FourCC::SDBG, &debug)?);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::message::Messages;
    use crate::preprocess::{preprocess, PreprocessInput};
    use crate::reflect::decode_chunk;
    use crate::validate::{validate_entry, Dialect, ValidateOptions};
    use crate::{lexer::lex, syntax::scan};
    use shade_common::ShaderModel;

    const SRC: &str = "float helper(float x) { return x * 2; }\n\
                       float unused() { return 3; }\n\
                       float4 main(float2 uv : TEXCOORD0) : SV_Target { return helper(uv.x); }";

    fn build(optimization: Option<u8>, debug_info: bool) -> Vec<u8> {
        let pre = preprocess(&PreprocessInput {
            source: SRC,
            source_name: "t.hlsl",
            source_dir: None,
            macros: &[],
            include_paths: &[],
        });
        let mut msgs = Messages::new();
        let toks = lex(&pre, &mut msgs);
        let unit = scan(&toks, &pre, &mut msgs);
        let info = validate_entry(
            &unit,
            ValidateOptions {
                entry: "main",
                stage: ShaderType::Pixel,
                model: ShaderModel::SM_6_4,
                dialect: Dialect::Modern,
            },
            &pre,
            &mut msgs,
        )
        .unwrap();
        emit(
            &EmitInput {
                unit: &unit,
                entry: "main",
                stage: ShaderType::Pixel,
                info: &info,
                bindings: &[],
                pre: &pre,
                source_name: "t.hlsl",
            },
            &CodegenSettings {
                program: FourCC::DXIL,
                profile: "ps_6_4".into(),
                optimization,
                debug_info,
                switches: vec!["-O3".into()],
            },
        )
        .unwrap()
    }

    fn program(bytes: &[u8]) -> ProgramChunk {
        let c = Container::parse(bytes).unwrap();
        decode_chunk(FourCC::DXIL, c.chunk(FourCC::DXIL).unwrap()).unwrap()
    }

    #[test]
    fn optimizer_drops_unreachable_functions() {
        let names: Vec<_> = program(&build(Some(3), false))
            .functions
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["helper", "main"]);

        let all = program(&build(None, false)).functions.len();
        assert_eq!(all, 3);
        assert_eq!(program(&build(Some(0), false)).functions.len(), 3);
    }

    #[test]
    fn debug_chunk_only_with_debug_info() {
        let plain = build(Some(3), false);
        assert!(Container::parse(&plain).unwrap().chunk(FourCC::SDBG).is_none());
        let dbg = build(Some(3), true);
        assert!(Container::parse(&dbg).unwrap().chunk(FourCC::SDBG).is_some());
    }

    #[test]
    fn emission_is_deterministic() {
        assert_eq!(build(Some(3), false), build(Some(3), false));
        let p = program(&build(Some(3), false));
        assert_eq!(p.profile, "ps_6_4");
        assert!(p.functions[1].signature.starts_with("float4 main(float2 uv : TEXCOORD0)"));
    }
}
