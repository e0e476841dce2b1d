//! Textual listing of a compiled container.

use std::fmt::Write as _;

use crate::bind::Binding;
use crate::codegen::{DebugChunk, ProgramChunk};
use crate::container::{Container, FourCC};
use crate::error::ContainerError;
use crate::reflect::{decode_chunk, InputElement};

/// Renders `bytecode` as a human-readable listing.
pub fn disassemble(bytecode: &[u8]) -> Result<String, ContainerError> {
    let container = Container::parse(bytecode)?;
    let checksum = match container.verify_checksum() {
        Ok(()) => "ok",
        Err(_) => "MISMATCH",
    };
    let (fourcc, data) = container
        .chunk(FourCC::DXIL)
        .map(|d| (FourCC::DXIL, d))
        .or_else(|| container.chunk(FourCC::SHEX).map(|d| (FourCC::SHEX, d)))
        .ok_or(ContainerError::MissingChunk(FourCC::DXIL))?;
    let program: ProgramChunk = decode_chunk(fourcc, data)?;

    // Writing into a String never fails.
    let mut out = String::new();
    let _ = writeln!(out, "//");
    let _ = writeln!(
        out,
        "// container: {} bytes, {} chunks, checksum {checksum}",
        container.total_size(),
        container.chunks().count()
    );
    let chunks: Vec<String> = container.chunks().map(|(f, d)| format!("{f}({})", d.len())).collect();
    let _ = writeln!(out, "// chunks: {}", chunks.join(" "));
    let _ = writeln!(out, "// profile: {}  entry: {}  stage: {}", program.profile, program.entry, program.stage.name());
    if !program.switches.is_empty() {
        let _ = writeln!(out, "// switches: {}", program.switches.join(" "));
    }

    if let Some(rdef) = container.chunk(FourCC::RDEF) {
        let bindings: Vec<Binding> = decode_chunk(FourCC::RDEF, rdef)?;
        if !bindings.is_empty() {
            let _ = writeln!(out, "//\n// Resource bindings:\n//");
            let _ = writeln!(out, "// {:<24} {:<28} {:>6} {:>6} {:>6}", "Name", "Type", "Slot", "Space", "Count");
            for b in &bindings {
                let count = b.count.map_or_else(|| "unbounded".to_string(), |n| n.to_string());
                let _ = writeln!(
                    out,
                    "// {:<24} {:<28} {:>5}{} {:>6} {:>6}",
                    b.name,
                    b.type_name,
                    b.class.prefix(),
                    b.slot,
                    b.space,
                    count
                );
            }
        }
    }

    if let Some(isgn) = container.chunk(FourCC::ISGN) {
        let layout: Vec<InputElement> = decode_chunk(FourCC::ISGN, isgn)?;
        let _ = writeln!(out, "//\n// Input signature:\n//");
        for e in &layout {
            let _ = writeln!(
                out,
                "// {:<16} {:>2} {:<22} slot {} offset {}",
                e.semantic_name, e.semantic_index, e.format.to_string(), e.input_slot, e.aligned_byte_offset
            );
        }
    }

    if let Some(sdbg) = container.chunk(FourCC::SDBG) {
        let debug: DebugChunk = decode_chunk(FourCC::SDBG, sdbg)?;
        let _ = writeln!(
            out,
            "//\n// debug info: {} ({} lines)",
            debug.source_name,
            debug.text.lines().count()
        );
    }
    let _ = writeln!(out, "//");

    for f in &program.functions {
        let _ = writeln!(out, "\n{} {{", f.signature);
        for stmt in f.body.split_inclusive([';', '{', '}']) {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                let _ = writeln!(out, "    {stmt}");
            }
        }
        let _ = writeln!(out, "}}");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerBuilder;
    use crate::reflect::encode_chunk;
    use shade_common::ShaderType;

    #[test]
    fn lists_program_and_bindings() {
        let program = ProgramChunk {
            version: 1,
            profile: "ps_6_4".into(),
            stage: ShaderType::Pixel,
            entry: "main".into(),
            switches: vec!["-O3".into()],
            functions: vec![crate::codegen::FunctionCode {
                name: "main".into(),
                signature: "float4 main() : SV_Target".into(),
                body: "return float4(1, 0, 0, 1);".into(),
            }],
        };
        let bytes = ContainerBuilder::new()
            .chunk(FourCC::DXIL, encode_chunk(FourCC::DXIL, &program).unwrap())
            .chunk(FourCC::RDEF, encode_chunk(FourCC::RDEF, &Vec::<Binding>::new()).unwrap())
            .build();
        let text = disassemble(&bytes).unwrap();
        assert!(text.contains("profile: ps_6_4"));
        assert!(text.contains("checksum ok"));
        assert!(text.contains("float4 main() : SV_Target {"));
        assert!(text.contains("return float4(1, 0, 0, 1);"));
    }

    #[test]
    fn rejects_containers_without_program() {
        let bytes = ContainerBuilder::new().chunk(FourCC::RDEF, Vec::new()).build();
        assert_eq!(
            disassemble(&bytes),
            Err(ContainerError::MissingChunk(FourCC::DXIL))
        );
    }
}
