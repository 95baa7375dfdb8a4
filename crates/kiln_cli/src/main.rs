//! Kiln CLI: a cached compiler wrapper and build-cache maintenance tool.
//!
//! Provides `kiln compile` for running a compile through the object cache,
//! `kiln cache` for inspecting and clearing it, and `kiln explain` for
//! asking why a unit would be rebuilt.

#![warn(missing_docs)]

mod cache;
mod compile;
mod explain;
mod project;

use std::process;

use clap::{Parser, Subcommand};

/// Kiln, an incremental C and C++ build cache.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln build cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile one unit through the object cache.
    Compile(CompileArgs),
    /// Inspect or clear the object cache.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Report whether a unit is stale and why.
    Explain(ExplainArgs),
}

/// Arguments for the `kiln compile` subcommand.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Print cache statistics after compiling.
    #[arg(long)]
    pub stats: bool,

    /// Compiler program followed by its arguments.
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Operations of the `kiln cache` subcommand.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Print entry count and total size.
    Info,
    /// Delete every cached object.
    Clean,
}

/// Arguments for the `kiln explain` subcommand.
#[derive(Parser, Debug)]
pub struct ExplainArgs {
    /// Path of the dependency record to check.
    pub record: String,

    /// A file the unit is built from now.
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// A value the unit is built with now, in order.
    #[arg(long = "value")]
    pub values: Vec<String>,

    /// Require the tracked file list to match exactly.
    #[arg(long)]
    pub exact: bool,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Compile(ref args) => compile::run(args, &global),
        Command::Cache { action } => cache::run(action, &global),
        Command::Explain(ref args) => explain::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the log subscriber. `RUST_LOG` applies unless `--verbose` or
/// `--quiet` is given.
fn init_tracing(global: &GlobalArgs) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if global.verbose {
        EnvFilter::new("debug")
    } else if global.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}
