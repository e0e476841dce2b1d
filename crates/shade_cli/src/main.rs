//! Shade CLI: compile, precompile and hot-reload shaders from the command line.
//!
//! `shade compile` builds one file, `shade precompile` warms the cache from a
//! directory or manifest, `shade cache` inspects and maintains the cache,
//! `shade watch` recompiles files as they change and `shade info` reports
//! backend capabilities.

#![warn(missing_docs)]

mod cache;
mod compile;
mod info;
mod precompile;
mod watch;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use shade_common::{ShaderModel, ShaderType};
use shade_config::ShaderManagerConfig;
use shade_manager::ShaderManager;

/// Shade, a shader compiler with a persistent cache.
#[derive(Parser, Debug)]
#[command(name = "shade", version, about = "Shader compiler and cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Path to a `shade.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile one shader file.
    Compile(CompileArgs),
    /// Compile a directory or manifest of shaders into the cache.
    Precompile(PrecompileArgs),
    /// Inspect or maintain the shader cache.
    Cache {
        /// Maintenance action.
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Recompile shader files whenever they change.
    Watch(WatchArgs),
    /// Show the active backend and supported features.
    Info,
}

/// Arguments for `shade compile`.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Shader source file.
    pub file: PathBuf,

    /// Entry point function.
    #[arg(short, long, default_value = "main")]
    pub entry: String,

    /// Pipeline stage (`vs`, `ps`, `cs`, ...). Inferred from names such as
    /// `blur.ps.hlsl` when omitted.
    #[arg(short, long)]
    pub stage: Option<ShaderType>,

    /// Target shader model, e.g. `6.4`. Defaults to the configured model.
    #[arg(short, long)]
    pub model: Option<ShaderModel>,

    /// Preprocessor define, `NAME` or `NAME=VALUE`. Order matters.
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Additional include directory.
    #[arg(short = 'I', long = "include")]
    pub include_paths: Vec<PathBuf>,

    /// Embed debug information.
    #[arg(long)]
    pub debug: bool,

    /// Optimization level.
    #[arg(short = 'O', value_parser = clap::value_parser!(u8).range(0..=3), conflicts_with = "no_opt")]
    pub opt_level: Option<u8>,

    /// Disable the optimizer.
    #[arg(long)]
    pub no_opt: bool,

    /// Treat warnings as errors.
    #[arg(long)]
    pub werror: bool,

    /// Strict IEEE numerics.
    #[arg(long)]
    pub strict: bool,

    /// Allow unbounded resource arrays.
    #[arg(long)]
    pub unbounded: bool,

    /// Write the bytecode container here.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the disassembly.
    #[arg(long)]
    pub disasm: bool,

    /// Print reflection data as JSON.
    #[arg(long)]
    pub reflect: bool,
}

/// Arguments for `shade precompile`.
#[derive(Parser, Debug)]
pub struct PrecompileArgs {
    /// Directory to scan. Defaults to the configured shader directory.
    pub dir: Option<PathBuf>,

    /// Compile the entries of a manifest instead of scanning.
    #[arg(long, conflicts_with = "dir")]
    pub manifest: Option<PathBuf>,

    /// Only scan the top level of the directory.
    #[arg(long)]
    pub no_recursive: bool,
}

/// `shade cache` actions.
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Delete every cache record.
    Clear,
    /// Evict records beyond the configured limits.
    Compact,
    /// Show cache occupancy.
    Stats {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

/// Arguments for `shade watch`.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Files to watch.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Entry point function.
    #[arg(short, long, default_value = "main")]
    pub entry: String,

    /// Pipeline stage for every file. Inferred per file when omitted.
    #[arg(short, long)]
    pub stage: Option<ShaderType>,

    /// Stop after this many polls.
    #[arg(long)]
    pub iterations: Option<u64>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Optional path to a configuration file.
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Loads the configuration from `--config`, or from `shade.toml` in the
    /// current directory, or the defaults.
    pub fn load_config(&self) -> Result<ShaderManagerConfig, Box<dyn std::error::Error>> {
        match &self.config {
            Some(path) => {
                log::debug!("using configuration {}", path.display());
                Ok(shade_config::load_config_file(path)?)
            }
            None => Ok(shade_config::load_config_or_default(Path::new("."))?),
        }
    }

    /// Builds a manager from the loaded configuration.
    pub fn open_manager(&self) -> Result<ShaderManager, Box<dyn std::error::Error>> {
        Ok(ShaderManager::new(self.load_config()?)?)
    }
}

/// Stage from `--stage` or from the file name.
pub fn resolve_stage(path: &Path, stage: Option<ShaderType>) -> Result<ShaderType, String> {
    stage.or_else(|| shade_manager::infer_stage(path)).ok_or_else(|| {
        format!(
            "cannot infer the stage of {}; pass --stage or name it like `name.ps.hlsl`",
            path.display()
        )
    })
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Compile(ref args) => compile::run(args, &global),
        Command::Precompile(ref args) => precompile::run(args, &global),
        Command::Cache { ref action } => cache::run(action, &global),
        Command::Watch(ref args) => watch::run(args, &global),
        Command::Info => info::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
