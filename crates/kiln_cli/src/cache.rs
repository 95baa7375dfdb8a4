//! `kiln cache`: object cache maintenance.

use std::path::Path;
use std::sync::Arc;

use kiln_cache::{ArtifactCache, CacheError, CacheStats};

use crate::project::load_project;
use crate::{CacheAction, GlobalArgs};

/// Runs the `cache` subcommand.
pub fn run(action: CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    tracing::debug!(
        project = %project.config.project.name,
        root = %project.root.display(),
        cache = %project.paths.cache_dir.display(),
        "cache command"
    );
    let message = execute(action, &project.paths.cache_dir)?;
    if !global.quiet {
        println!("{message}");
    }
    Ok(0)
}

fn execute(action: CacheAction, cache_dir: &Path) -> Result<String, CacheError> {
    let cache = ArtifactCache::new(cache_dir, Arc::new(CacheStats::new()));
    match action {
        CacheAction::Info => {
            let info = cache.info()?;
            Ok(format!(
                "cache directory: {}\n  entries: {}\n  size:    {}",
                cache_dir.display(),
                info.entries,
                format_size(info.bytes)
            ))
        }
        CacheAction::Clean => {
            let info = cache.info()?;
            cache.clean()?;
            Ok(format!(
                "removed {} cached objects ({})",
                info.entries,
                format_size(info.bytes)
            ))
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
