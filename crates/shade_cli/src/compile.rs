//! `shade compile`: build one file and report diagnostics.

use std::fs;

use shade_common::{CompileOptions, ShaderMacro};

use crate::{resolve_stage, CompileArgs, GlobalArgs};

/// Compiles `args.file`. Returns exit code 0 on success, 1 on failure.
pub fn run(args: &CompileArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = global.load_config()?;
    let stage = resolve_stage(&args.file, args.stage)?;
    let options = build_options(args, config.default_model);
    let manager = shade_manager::ShaderManager::new(config)?;

    let result = manager.compile_shader_from_file(&args.file, &args.entry, stage, &options);
    manager.shutdown();

    for warning in &result.warnings {
        eprintln!("{warning}");
    }
    if !result.success {
        for error in &result.errors {
            eprintln!("{error}");
        }
        return Ok(1);
    }

    if !global.quiet {
        eprintln!(
            "   Compiled {} ({}, {} bytes)",
            args.file.display(),
            result.profile,
            result.bytecode.len()
        );
    }
    if let Some(out) = &args.output {
        fs::write(out, &result.bytecode).map_err(|e| format!("cannot write {}: {e}", out.display()))?;
    }
    if args.disasm {
        let listing = match &result.disassembly {
            Some(listing) => listing.clone(),
            None => shade_compiler::disassemble(&result.bytecode)?,
        };
        println!("{listing}");
    }
    if args.reflect {
        println!("{}", serde_json::to_string_pretty(&result.reflection)?);
    }
    Ok(0)
}

/// Maps command-line switches onto compile options.
fn build_options(args: &CompileArgs, default_model: shade_common::ShaderModel) -> CompileOptions {
    let mut options = CompileOptions::for_model(args.model.unwrap_or(default_model)).with_debug_info(args.debug);
    options.macros = args.defines.iter().map(|d| ShaderMacro::parse_define(d)).collect();
    options.include_paths = args.include_paths.clone();
    options.flags.optimize = !args.no_opt;
    options.flags.warnings_as_errors = args.werror;
    options.flags.strict_numerics = args.strict;
    options.flags.unbounded_resource_arrays = args.unbounded;
    if let Some(level) = args.opt_level {
        options.optimization_level = level;
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Command};
    use clap::Parser;
    use shade_common::ShaderModel;

    fn args(argv: &[&str]) -> CompileArgs {
        match Cli::parse_from(argv.iter().copied()).command {
            Command::Compile(args) => args,
            _ => panic!("expected Compile command"),
        }
    }

    #[test]
    fn defaults_follow_config_model() {
        let opts = build_options(&args(&["shade", "compile", "a.hlsl"]), ShaderModel::SM_6_0);
        assert_eq!(opts.target_model, ShaderModel::SM_6_0);
        assert!(opts.flags.optimize);
        assert_eq!(opts.optimization_level, CompileOptions::MAX_OPTIMIZATION_LEVEL);
        assert!(opts.macros.is_empty());
    }

    #[test]
    fn switches_map_to_flags() {
        let opts = build_options(
            &args(&[
                "shade", "compile", "a.hlsl", "-m", "6.5", "-D", "A=1", "-D", "B", "--debug", "--no-opt", "--strict",
                "--unbounded",
            ]),
            ShaderModel::SM_6_0,
        );
        assert_eq!(opts.target_model, ShaderModel::SM_6_5);
        assert_eq!(opts.macros, vec![ShaderMacro::new("A", "1"), ShaderMacro::new("B", "1")]);
        assert!(opts.flags.debug_info);
        assert!(!opts.flags.optimize);
        assert!(opts.flags.strict_numerics);
        assert!(opts.flags.unbounded_resource_arrays);
        assert_eq!(opts.effective_optimization(), None);
    }
}
