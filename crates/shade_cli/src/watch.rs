//! `shade watch`: poll files and recompile them when they change.

use std::thread;
use std::time::Duration;

use crate::{resolve_stage, GlobalArgs, WatchArgs};

const MIN_POLL: Duration = Duration::from_millis(50);

/// Compiles every file once, then polls until `--iterations` runs out or
/// the process is interrupted.
pub fn run(args: &WatchArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = global.load_config()?;
    config.hot_reload = true;
    let poll = config.hot_reload_interval().max(MIN_POLL);
    let manager = shade_manager::ShaderManager::new(config)?;
    let options = manager.default_options();

    let mut failed = 0;
    for file in &args.files {
        let stage = resolve_stage(file, args.stage)?;
        let first = manager.compile_shader_from_file(file, &args.entry, stage, &options);
        report(&file.display().to_string(), &first.errors, first.success, global.quiet);
        if !first.success {
            failed += 1;
        }
        let name = file.display().to_string();
        let quiet = global.quiet;
        manager.watch_shader(file, args.entry.clone(), stage, options.clone(), move |result| {
            report(&name, &result.errors, result.success, quiet);
        });
    }

    if !global.quiet {
        eprintln!("   Watching {} files", args.files.len());
    }
    let mut remaining = args.iterations;
    while remaining != Some(0) {
        thread::sleep(poll);
        manager.check_for_file_changes();
        remaining = remaining.map(|n| n - 1);
    }
    manager.shutdown();
    Ok(if failed > 0 && args.iterations.is_some() { 1 } else { 0 })
}

fn report(name: &str, errors: &[String], success: bool, quiet: bool) {
    if success {
        if !quiet {
            eprintln!("   Compiled {name}");
        }
    } else {
        eprintln!("     Failed {name}");
        for error in errors {
            eprintln!("{error}");
        }
    }
}
