//! Entry-point validation.
//!
//! Checks that the entry exists and carries what its stage requires, rejects
//! intrinsics and semantics the target tier cannot express, and derives the
//! vertex input layout.

use std::collections::BTreeSet;

use crate::message::{code, Location, Messages, Severity};
use crate::preprocess::Preprocessed;
use crate::reflect::{ComponentType, InputElement, VertexFormat};
use crate::syntax::{Field, Function, Param, Pos, TranslationUnit};
use shade_common::{ShaderModel, ShaderType};

const MAX_THREADS_PER_GROUP: u64 = 1024;

/// How the active backend reports symbols its tier does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Report "requires shader model X" errors.
    Modern,
    /// Report unknown symbols as undeclared.
    Legacy,
}

/// Validation inputs.
#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions<'a> {
    /// Entry point name.
    pub entry: &'a str,
    /// Pipeline stage.
    pub stage: ShaderType,
    /// Target tier.
    pub model: ShaderModel,
    /// Message dialect.
    pub dialect: Dialect,
}

/// What validation learned about a valid entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryInfo {
    /// Functions reachable from the entry, in declaration order.
    pub reachable: Vec<String>,
    /// Vertex input layout; empty for other stages.
    pub input_layout: Vec<InputElement>,
}

/// Returns the lowest tier that provides `name`, if it is tier-gated.
///
/// `is_call` distinguishes intrinsic calls from the descriptor-heap objects,
/// which are indexed rather than called.
pub fn required_model(name: &str, is_call: bool) -> Option<ShaderModel> {
    match name {
        "ResourceDescriptorHeap" | "SamplerDescriptorHeap" => return Some(ShaderModel::SM_6_6),
        _ if !is_call => return None,
        _ => {}
    }
    if name == "WaveMatch" || name.starts_with("WaveMultiPrefix") {
        Some(ShaderModel::SM_6_5)
    } else if name.starts_with("dot4add_") || name == "dot2add" {
        Some(ShaderModel::SM_6_4)
    } else if name.starts_with("Wave") || name.starts_with("QuadReadAcross") {
        Some(ShaderModel::SM_6_0)
    } else {
        None
    }
}

/// Returns the lowest tier that accepts `semantic`, if it is tier-gated.
pub fn semantic_model(semantic: &str) -> Option<ShaderModel> {
    semantic
        .eq_ignore_ascii_case("SV_ShadingRate")
        .then_some(ShaderModel::SM_6_4)
}

/// Validates the entry point and returns its reachable set and input layout.
pub fn validate_entry(
    unit: &TranslationUnit,
    opts: ValidateOptions<'_>,
    pre: &Preprocessed,
    messages: &mut Messages,
) -> Option<EntryInfo> {
    let Some(entry) = unit.function(opts.entry).filter(|f| f.body.is_some()) else {
        messages.error(
            code::ENTRY_NOT_FOUND,
            None,
            format!("'{}': entrypoint not found", opts.entry),
        );
        return None;
    };

    let errors_before = error_count(messages);
    check_stage_attributes(unit, entry, opts.stage, pre, messages);
    check_signature_semantics(unit, entry, opts.stage, pre, messages);

    let reachable = reachable_functions(unit, entry);
    for name in &reachable {
        if let Some(f) = unit.function(name) {
            check_gated_symbols(unit, f, opts, pre, messages);
        }
    }
    for (semantic, pos) in signature_semantics(unit, entry) {
        if let Some(min) = semantic_model(&semantic).filter(|&m| opts.model < m) {
            let loc = pos.locate(pre);
            match opts.dialect {
                Dialect::Modern => messages.error(
                    code::MODEL_REQUIRED,
                    loc,
                    format!("semantic '{semantic}' requires shader model {min} or higher"),
                ),
                Dialect::Legacy => messages.error(
                    code::INVALID_SEMANTIC,
                    loc,
                    format!("invalid semantic '{semantic}'"),
                ),
            }
        }
    }

    let input_layout = if opts.stage == ShaderType::Vertex {
        input_layout(unit, entry, pre, messages)
    } else {
        Vec::new()
    };

    if error_count(messages) > errors_before {
        return None;
    }
    Some(EntryInfo {
        reachable,
        input_layout,
    })
}

fn error_count(messages: &Messages) -> usize {
    messages.iter().filter(|m| m.severity == Severity::Error).count()
}

fn check_stage_attributes(
    unit: &TranslationUnit,
    entry: &Function,
    stage: ShaderType,
    pre: &Preprocessed,
    messages: &mut Messages,
) {
    let at = entry.pos.locate(pre);
    let name = &entry.name;
    match stage {
        ShaderType::Compute | ShaderType::Mesh | ShaderType::Amplification => {
            let Some(attr) = entry.attribute("numthreads") else {
                messages.error(
                    code::STAGE_ATTRIBUTE,
                    at,
                    format!("'{name}': {} entry point must have a numthreads attribute", stage.name().to_ascii_lowercase()),
                );
                return;
            };
            let dims: Vec<Option<u32>> = (0..3).map(|i| attr.arg_u32(i)).collect();
            if attr.args.len() != 3 || dims.iter().any(|d| d.map_or(true, |v| v == 0)) {
                messages.error(
                    code::STAGE_ATTRIBUTE,
                    attr.pos.locate(pre),
                    "numthreads requires three positive integer dimensions",
                );
                return;
            }
            let total: u64 = dims.iter().flatten().map(|&d| u64::from(d)).product();
            if total > MAX_THREADS_PER_GROUP {
                messages.error(
                    code::STAGE_ATTRIBUTE,
                    attr.pos.locate(pre),
                    format!("thread group size {total} exceeds the maximum of {MAX_THREADS_PER_GROUP}"),
                );
            }
        }
        ShaderType::Geometry => match entry.attribute("maxvertexcount") {
            Some(attr) if attr.arg_u32(0).is_some_and(|n| n > 0) => {}
            Some(attr) => messages.error(
                code::STAGE_ATTRIBUTE,
                attr.pos.locate(pre),
                "maxvertexcount requires a positive integer",
            ),
            None => messages.error(
                code::STAGE_ATTRIBUTE,
                at,
                format!("'{name}': geometry entry point must have a maxvertexcount attribute"),
            ),
        },
        ShaderType::Hull => match entry.attribute("patchconstantfunc") {
            Some(attr) => {
                let target = attr.args.first().map(String::as_str).unwrap_or("");
                if unit.function(target).and_then(|f| f.body.as_ref()).is_none() {
                    messages.error(
                        code::STAGE_ATTRIBUTE,
                        attr.pos.locate(pre),
                        format!("patch constant function '{target}' not found"),
                    );
                }
            }
            None => messages.error(
                code::STAGE_ATTRIBUTE,
                at,
                format!("'{name}': hull entry point must have a patchconstantfunc attribute"),
            ),
        },
        ShaderType::Domain => match entry.attribute("domain") {
            Some(attr) if matches!(attr.args.first().map(String::as_str), Some("tri" | "quad" | "isoline")) => {}
            Some(attr) => messages.error(
                code::STAGE_ATTRIBUTE,
                attr.pos.locate(pre),
                "domain must be \"tri\", \"quad\" or \"isoline\"",
            ),
            None => messages.error(
                code::STAGE_ATTRIBUTE,
                at,
                format!("'{name}': domain entry point must have a domain attribute"),
            ),
        },
        ShaderType::RayGeneration | ShaderType::Miss | ShaderType::ClosestHit | ShaderType::AnyHit => {
            let expected = stage.short_name();
            match entry.attribute("shader") {
                Some(attr) if attr.args.first().is_some_and(|a| a.eq_ignore_ascii_case(expected)) => {}
                Some(attr) => messages.error(
                    code::STAGE_ATTRIBUTE,
                    attr.pos.locate(pre),
                    format!("'{name}': shader attribute does not match stage '{expected}'"),
                ),
                None => messages.error(
                    code::STAGE_ATTRIBUTE,
                    at,
                    format!("'{name}': missing [shader(\"{expected}\")] attribute"),
                ),
            }
        }
        ShaderType::Vertex | ShaderType::Pixel => {}
    }
}

/// Returns `true` if a value of type `ty` with `semantic` is fully described.
fn has_semantics(unit: &TranslationUnit, ty: &str, semantic: Option<&str>) -> bool {
    if semantic.is_some() || ty == "void" {
        return true;
    }
    match unit.struct_decl(ty) {
        Some(s) => s.fields.iter().all(|f| f.semantic.is_some()),
        None => false,
    }
}

fn check_signature_semantics(
    unit: &TranslationUnit,
    entry: &Function,
    stage: ShaderType,
    pre: &Preprocessed,
    messages: &mut Messages,
) {
    if !matches!(stage, ShaderType::Vertex | ShaderType::Pixel) {
        return;
    }
    if !has_semantics(unit, &entry.return_type, entry.return_semantic.as_deref()) {
        messages.error(
            code::MISSING_RETURN_SEMANTIC,
            entry.pos.locate(pre),
            format!("'{}': function return value missing semantics", entry.name),
        );
    }
    for p in entry.params.iter().filter(|p| !p.qualifiers.iter().any(|q| q == "uniform")) {
        if !has_semantics(unit, &p.ty, p.semantic.as_deref()) {
            let what = if p.is_output() { "output" } else { "input" };
            messages.error(
                code::MISSING_INPUT_SEMANTIC,
                p.pos.locate(pre),
                format!("'{}': {what} parameter '{}' missing semantics", entry.name, p.name),
            );
        }
    }
}

/// Semantics in the entry signature, including struct members one level deep.
fn signature_semantics(unit: &TranslationUnit, entry: &Function) -> Vec<(String, Pos)> {
    let mut out = Vec::new();
    let add_type = |ty: &str, out: &mut Vec<(String, Pos)>| {
        if let Some(s) = unit.struct_decl(ty) {
            for f in &s.fields {
                if let Some(sem) = &f.semantic {
                    out.push((sem.clone(), f.pos));
                }
            }
        }
    };
    if let Some(sem) = &entry.return_semantic {
        out.push((sem.clone(), entry.pos));
    }
    add_type(&entry.return_type, &mut out);
    for p in &entry.params {
        if let Some(sem) = &p.semantic {
            out.push((sem.clone(), p.pos));
        }
        add_type(&p.ty, &mut out);
    }
    out
}

/// Functions reachable from `entry` through calls, in declaration order.
pub fn reachable_functions(unit: &TranslationUnit, entry: &Function) -> Vec<String> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut stack = vec![entry.name.as_str()];
    if let Some(pcf) = entry.attribute("patchconstantfunc").and_then(|a| a.args.first()) {
        stack.push(pcf.as_str());
    }
    while let Some(name) = stack.pop() {
        let Some(f) = unit.function(name).filter(|f| f.body.is_some()) else {
            continue;
        };
        if !seen.insert(f.name.as_str()) {
            continue;
        }
        stack.extend(f.calls());
    }
    let mut ordered = Vec::new();
    for f in &unit.functions {
        if f.body.is_some() && seen.contains(f.name.as_str()) && !ordered.contains(&f.name) {
            ordered.push(f.name.clone());
        }
    }
    ordered
}

fn check_gated_symbols(
    unit: &TranslationUnit,
    f: &Function,
    opts: ValidateOptions<'_>,
    pre: &Preprocessed,
    messages: &mut Messages,
) {
    let Some(body) = &f.body else {
        return;
    };
    let mut reported: BTreeSet<&str> = BTreeSet::new();
    for ident in &body.idents {
        if unit.function(&ident.name).is_some() {
            continue;
        }
        let Some(min) = required_model(&ident.name, ident.is_call) else {
            continue;
        };
        if opts.model >= min || !reported.insert(ident.name.as_str()) {
            continue;
        }
        let loc = ident.pos.locate(pre);
        match opts.dialect {
            Dialect::Modern => messages.error(
                code::MODEL_REQUIRED,
                loc,
                format!("'{}' requires shader model {min} or higher", ident.name),
            ),
            Dialect::Legacy => messages.error(
                code::UNDECLARED,
                loc,
                format!("undeclared identifier '{}'", ident.name),
            ),
        }
    }
}

/// Splits `TEXCOORD3` into `("TEXCOORD", 3)`.
pub fn split_semantic(semantic: &str) -> (&str, u32) {
    let digits = semantic.len() - semantic.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, index) = semantic.split_at(semantic.len() - digits);
    (name, index.parse().unwrap_or(0))
}

/// Parses a numeric type name into (component, columns, rows).
pub fn numeric_shape(ty: &str) -> Option<(ComponentType, u8, u8)> {
    let ty = ty.trim();
    if let Some(inner) = ty.strip_prefix("vector<").and_then(|t| t.strip_suffix('>')) {
        let (scalar, n) = inner.split_once(',')?;
        let (component, _, _) = numeric_shape(scalar)?;
        return Some((component, n.trim().parse().ok()?, 1));
    }
    let scalars: &[(&str, ComponentType)] = &[
        ("min16float", ComponentType::Float16),
        ("float16_t", ComponentType::Float16),
        ("half", ComponentType::Float16),
        ("float", ComponentType::Float32),
        ("dword", ComponentType::Uint32),
        ("uint", ComponentType::Uint32),
        ("int", ComponentType::Sint32),
        ("bool", ComponentType::Uint32),
    ];
    let (prefix, component) = scalars.iter().find(|(p, _)| ty.starts_with(p))?;
    let dims = &ty[prefix.len()..];
    let (cols, rows) = match dims.split_once('x') {
        Some((r, c)) => (c.parse().ok()?, r.parse().ok()?),
        None if dims.is_empty() => (1, 1),
        None => (dims.parse().ok()?, 1),
    };
    ((1..=4).contains(&cols) && (1..=4).contains(&rows)).then_some((*component, cols, rows))
}

fn input_layout(
    unit: &TranslationUnit,
    entry: &Function,
    pre: &Preprocessed,
    messages: &mut Messages,
) -> Vec<InputElement> {
    let mut layout = Vec::new();
    let mut offset = 0u32;
    let mut push = |ty: &str, semantic: &str, loc: Option<Location>, messages: &mut Messages| {
        if semantic.len() >= 3 && semantic[..3].eq_ignore_ascii_case("SV_") {
            return;
        }
        let Some((component, cols, rows)) = numeric_shape(ty) else {
            messages.warning(
                code::INVALID_SEMANTIC,
                loc,
                format!("type '{ty}' of '{semantic}' cannot be described in the input layout"),
            );
            return;
        };
        let (name, index) = split_semantic(semantic);
        for row in 0..u32::from(rows) {
            let format = VertexFormat::new(component, cols);
            layout.push(InputElement {
                semantic_name: name.to_string(),
                semantic_index: index + row,
                format,
                input_slot: 0,
                aligned_byte_offset: offset,
            });
            offset += format.size();
        }
    };
    let inputs: Vec<&Param> = entry
        .params
        .iter()
        .filter(|p| !p.is_output() && !p.qualifiers.iter().any(|q| q == "uniform"))
        .collect();
    for p in inputs {
        if let Some(sem) = &p.semantic {
            push(&p.ty, sem, p.pos.locate(pre), messages);
        } else if let Some(s) = unit.struct_decl(&p.ty) {
            for Field { ty, semantic, pos, .. } in &s.fields {
                if let Some(sem) = semantic {
                    push(ty, sem, pos.locate(pre), messages);
                }
            }
        }
    }
    layout
}
