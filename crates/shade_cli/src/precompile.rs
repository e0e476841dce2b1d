//! `shade precompile`: warm the cache from a directory or a manifest.

use crate::{GlobalArgs, PrecompileArgs};

/// Runs a batch. Returns exit code 1 if any shader failed.
pub fn run(args: &PrecompileArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let manager = global.open_manager()?;
    let report = match (&args.manifest, &args.dir) {
        (Some(manifest), _) => manager.precompile_from_manifest(manifest)?,
        (None, Some(dir)) => manager.precompile_directory(dir, !args.no_recursive)?,
        (None, None) => {
            let dir = manager.config().shader_directory;
            manager.precompile_directory(&dir, !args.no_recursive)?
        }
    };
    manager.shutdown();

    for path in &report.failed {
        eprintln!("     Failed {}", path.display());
    }
    if !global.quiet {
        eprintln!("   Precompiled {}/{} shaders", report.succeeded, report.attempted);
    }
    Ok(if report.is_clean() { 0 } else { 1 })
}
