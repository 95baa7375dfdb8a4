//! `kiln compile`: run one compile through the object cache.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use kiln_cache::{ArtifactCache, CacheKey, CacheStats, CachedCompile, CommandSteps, CompileOutcome};
use kiln_common::ToolchainKind;
use kiln_toolchain::{CompileFailure, Compiler, ProcessCompiler};

use crate::project::{load_project, Project};
use crate::{CompileArgs, GlobalArgs};

/// Scratch directory for preprocessed sources, under the build directory.
const PREPROCESS_SUBDIR: &str = ".preprocessed";

/// Runs the `compile` subcommand. Returns the compiler's exit code on a
/// compile error.
pub fn run(args: &CompileArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let (program, rest) = args
        .command
        .split_first()
        .ok_or("no compiler program given")?;

    let mut compiler = ProcessCompiler::new();
    for (key, value) in &project.config.toolchain.env {
        compiler = compiler.with_env(key.clone(), value.clone());
    }
    let stats = Arc::new(CacheStats::new());
    let result = compile_unit(&project, compiler, Path::new(program), rest, &stats);

    if args.stats && !global.quiet {
        println!("{}", stats.report());
    }

    match result {
        Ok(_) => Ok(0),
        Err(CompileFailure::Failed {
            status, diagnostic, ..
        }) => {
            eprint!("{diagnostic}");
            Ok(status.filter(|code| *code != 0).unwrap_or(1))
        }
        Err(e) => Err(e.into()),
    }
}

/// Compiles one unit, through the cache when the project and toolchain
/// allow it, otherwise directly.
fn compile_unit<C: Compiler>(
    project: &Project,
    compiler: C,
    program: &Path,
    args: &[String],
    stats: &Arc<CacheStats>,
) -> Result<CompileOutcome, CompileFailure> {
    let toolchain =
        ToolchainKind::detect(program).or_else(|| project.config.toolchain.toolchain_kind());
    let toolchain = match toolchain {
        Some(kind) if project.config.cache.enabled => kind,
        Some(_) => {
            tracing::debug!("object cache disabled");
            compiler.run(program, args)?;
            return Ok(CompileOutcome::Uncached);
        }
        None => {
            tracing::warn!(program = %program.display(), "unknown compiler, compiling without cache");
            compiler.run(program, args)?;
            return Ok(CompileOutcome::Uncached);
        }
    };

    let steps = CommandSteps::new(
        compiler,
        toolchain,
        project.paths.build_dir.join(PREPROCESS_SUBDIR),
    );
    let cache = ArtifactCache::new(&project.paths.cache_dir, Arc::clone(stats));
    let env = key_env(&project.config.toolchain.env);

    let outcome = CachedCompile::new(&cache).build(program, args, &steps, Some(&env))?;
    match &outcome {
        CompileOutcome::CacheHit { object } => {
            tracing::info!(object = %object.display(), "cache hit");
        }
        CompileOutcome::Compiled { object, stored } => {
            tracing::info!(object = %object.display(), stored, "compiled");
        }
        CompileOutcome::Uncached => steps.compile_direct(program, args)?,
    }
    Ok(outcome)
}

/// Environment folded into cache keys: this process's values, overridden
/// by the configured toolchain environment.
fn key_env(configured: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env = CacheKey::process_env();
    env.extend(configured.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}
