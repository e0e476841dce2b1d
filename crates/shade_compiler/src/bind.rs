//! Register allocation for resources and constant buffers.
//!
//! Explicit `register(...)` annotations are honored first. Remaining
//! declarations receive the lowest free slots of their class in space 0, in
//! declaration order. Loose uniforms are gathered into a `$Globals` constant
//! buffer allocated ahead of other implicit buffers.

use crate::message::{code, Messages};
use crate::preprocess::Preprocessed;
use crate::syntax::{ArraySize, Pos, RegisterClass, RegisterSpec, ResourceKind, TranslationUnit};
use serde::{Deserialize, Serialize};
use shade_common::ShaderModel;

/// Name of the implicit constant buffer holding loose uniforms.
pub const GLOBALS_BUFFER: &str = "$Globals";

/// A resource with its assigned register range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Declared name.
    pub name: String,
    /// Declared type text.
    pub type_name: String,
    /// Resource classification.
    pub kind: ResourceKind,
    /// Register class.
    pub class: RegisterClass,
    /// First slot.
    pub slot: u32,
    /// Register space.
    pub space: u32,
    /// Number of slots, `None` for unbounded arrays.
    pub count: Option<u32>,
}

impl Binding {
    fn last_slot(&self) -> u32 {
        match self.count {
            Some(n) => self.slot.saturating_add(n.max(1) - 1),
            None => u32::MAX,
        }
    }

    fn overlaps(&self, other: &Binding) -> bool {
        self.class == other.class
            && self.space == other.space
            && self.slot <= other.last_slot()
            && other.slot <= self.last_slot()
    }
}

/// Constraints on what may be bound.
#[derive(Debug, Clone, Copy)]
pub struct BindOptions {
    /// Unbounded arrays are permitted.
    pub allow_unbounded: bool,
    /// Target tier.
    pub model: ShaderModel,
}

struct Candidate<'u> {
    name: &'u str,
    type_name: &'u str,
    kind: ResourceKind,
    array: Option<ArraySize>,
    register: Option<RegisterSpec>,
    pos: Pos,
}

/// Assigns registers to every resource in `unit`.
pub fn allocate(
    unit: &TranslationUnit,
    opts: BindOptions,
    pre: &Preprocessed,
    messages: &mut Messages,
) -> Vec<Binding> {
    let mut candidates = Vec::new();
    if let Some(first) = unit.globals.first() {
        candidates.push(Candidate {
            name: GLOBALS_BUFFER,
            type_name: "cbuffer",
            kind: ResourceKind::ConstantBuffer,
            array: None,
            register: None,
            pos: first.pos,
        });
    }
    candidates.extend(unit.resources.iter().map(|r| Candidate {
        name: &r.name,
        type_name: &r.type_name,
        kind: r.kind,
        array: r.array,
        register: r.register,
        pos: r.pos,
    }));

    let mut slots: Vec<Option<Binding>> = vec![None; candidates.len()];

    for (i, c) in candidates.iter().enumerate() {
        let loc = c.pos.locate(pre);
        let count = match c.array {
            Some(ArraySize::Fixed(n)) => Some(n),
            Some(ArraySize::Unbounded) => None,
            None => Some(1),
        };
        if count.is_none() {
            if !opts.allow_unbounded {
                messages.error(
                    code::UNBOUNDED_ARRAY,
                    loc.clone(),
                    format!("'{}': unbounded resource arrays require the unbounded resource arrays option", c.name),
                );
                continue;
            }
            if opts.model < ShaderModel::SM_5_1 {
                messages.error(
                    code::MODEL_REQUIRED,
                    loc.clone(),
                    format!("'{}': unbounded resource arrays require shader model 5.1 or higher", c.name),
                );
                continue;
            }
            if c.register.is_none() {
                messages.error(
                    code::UNBOUNDED_ARRAY,
                    loc.clone(),
                    format!("'{}': unbounded resource arrays require an explicit register", c.name),
                );
                continue;
            }
        }
        let Some(reg) = c.register else {
            continue;
        };
        if reg.class != c.kind.class() {
            messages.error(
                code::REGISTER_CLASS,
                loc,
                format!(
                    "'{}': register '{}{}' is not valid for type '{}'",
                    c.name,
                    reg.class.prefix(),
                    reg.slot,
                    c.type_name
                ),
            );
            continue;
        }
        if reg.space != 0 && opts.model < ShaderModel::SM_5_1 {
            messages.error(
                code::MODEL_REQUIRED,
                loc,
                format!("'{}': register spaces require shader model 5.1 or higher", c.name),
            );
            continue;
        }
        let binding = Binding {
            name: c.name.to_string(),
            type_name: c.type_name.to_string(),
            kind: c.kind,
            class: reg.class,
            slot: reg.slot,
            space: reg.space,
            count,
        };
        if let Some(other) = slots.iter().flatten().find(|b| b.overlaps(&binding)) {
            messages.error(
                code::REGISTER_OVERLAP,
                loc,
                format!(
                    "'{}': register '{}{}' in space {} is already bound to '{}'",
                    c.name,
                    reg.class.prefix(),
                    reg.slot,
                    reg.space,
                    other.name
                ),
            );
            continue;
        }
        slots[i] = Some(binding);
    }

    for (i, c) in candidates.iter().enumerate() {
        if c.register.is_some() || matches!(c.array, Some(ArraySize::Unbounded)) {
            continue;
        }
        let count = match c.array {
            Some(ArraySize::Fixed(n)) => n.max(1),
            _ => 1,
        };
        let class = c.kind.class();
        let mut slot = 0u32;
        loop {
            let attempt = Binding {
                name: c.name.to_string(),
                type_name: c.type_name.to_string(),
                kind: c.kind,
                class,
                slot,
                space: 0,
                count: Some(count),
            };
            match slots.iter().flatten().find(|b| b.overlaps(&attempt)) {
                Some(taken) => match taken.count {
                    Some(n) if taken.slot.saturating_add(n.max(1)) > slot => {
                        slot = taken.slot.saturating_add(n.max(1));
                    }
                    _ => {
                        messages.error(
                            code::REGISTER_OVERLAP,
                            c.pos.locate(pre),
                            format!("'{}': no free '{}' register in space 0", c.name, class.prefix()),
                        );
                        break;
                    }
                },
                None => {
                    slots[i] = Some(attempt);
                    break;
                }
            }
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::preprocess::{preprocess, PreprocessInput};
    use crate::syntax::scan;

    fn bind(src: &str, allow_unbounded: bool, model: ShaderModel) -> (Vec<Binding>, Messages) {
        let pre = preprocess(&PreprocessInput {
            source: src,
            source_name: "t.hlsl",
            source_dir: None,
            macros: &[],
            include_paths: &[],
        });
        let mut msgs = Messages::new();
        let toks = lex(&pre, &mut msgs);
        let unit = scan(&toks, &pre, &mut msgs);
        let b = allocate(
            &unit,
            BindOptions {
                allow_unbounded,
                model,
            },
            &pre,
            &mut msgs,
        );
        (b, msgs)
    }

    fn slot_of(b: &[Binding], name: &str) -> (char, u32, u32) {
        let x = b.iter().find(|x| x.name == name).unwrap();
        (x.class.prefix(), x.slot, x.space)
    }

    #[test]
    fn explicit_first_then_ascending() {
        let src = "Texture2D a; Texture2D b : register(t0); Texture2D c[2]; SamplerState s;";
        let (b, msgs) = bind(src, false, ShaderModel::SM_6_4);
        assert!(msgs.is_empty(), "{msgs:?}");
        assert_eq!(slot_of(&b, "b"), ('t', 0, 0));
        assert_eq!(slot_of(&b, "a"), ('t', 1, 0));
        assert_eq!(slot_of(&b, "c"), ('t', 2, 0));
        assert_eq!(slot_of(&b, "s"), ('s', 0, 0));
    }

    #[test]
    fn globals_buffer_takes_first_free_b() {
        let src = "cbuffer Frame : register(b0) { float t; }; float exposure; cbuffer Obj { float4x4 m; };";
        let (b, msgs) = bind(src, false, ShaderModel::SM_6_4);
        assert!(msgs.is_empty(), "{msgs:?}");
        assert_eq!(b[0].name, GLOBALS_BUFFER);
        assert_eq!(slot_of(&b, GLOBALS_BUFFER), ('b', 1, 0));
        assert_eq!(slot_of(&b, "Obj"), ('b', 2, 0));
    }

    #[test]
    fn class_mismatch_is_error() {
        let (_, msgs) = bind("SamplerState s : register(t0);", false, ShaderModel::SM_6_4);
        assert_eq!(msgs.iter().next().unwrap().code, code::REGISTER_CLASS);
    }

    #[test]
    fn double_binding_is_error() {
        let (_, msgs) = bind(
            "Texture2D a : register(t3); Texture2D b[4] : register(t0);",
            false,
            ShaderModel::SM_6_4,
        );
        assert_eq!(msgs.iter().next().unwrap().code, code::REGISTER_OVERLAP);
    }

    #[test]
    fn spaces_do_not_collide() {
        let (b, msgs) = bind(
            "Texture2D a : register(t0); Texture2D b : register(t0, space1);",
            false,
            ShaderModel::SM_6_0,
        );
        assert!(msgs.is_empty());
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn unbounded_rules() {
        let src = "Texture2D all[] : register(t0, space1);";
        let (_, msgs) = bind(src, false, ShaderModel::SM_6_4);
        assert_eq!(msgs.iter().next().unwrap().code, code::UNBOUNDED_ARRAY);
        let (b, msgs) = bind(src, true, ShaderModel::SM_6_4);
        assert!(msgs.is_empty());
        assert_eq!(b[0].count, None);
        let (_, msgs) = bind("Texture2D all[];", true, ShaderModel::SM_6_4);
        assert!(msgs.has_errors());
        let (_, msgs) = bind("Texture2D all[] : register(t0);", true, ShaderModel::SM_5_0);
        assert_eq!(msgs.iter().next().unwrap().code, code::MODEL_REQUIRED);
    }

    #[test]
    fn implicit_skips_past_unbounded_in_other_space() {
        let (b, msgs) = bind(
            "Texture2D all[] : register(t0, space1); Texture2D x;",
            true,
            ShaderModel::SM_6_4,
        );
        assert!(msgs.is_empty());
        assert_eq!(slot_of(&b, "x"), ('t', 0, 0));
    }
}
