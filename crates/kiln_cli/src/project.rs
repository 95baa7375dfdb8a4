//! Project discovery shared by every command.

use std::path::{Path, PathBuf};

use kiln_config::{load_config, load_config_file, resolve_paths, BuildPaths, ProjectConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// A loaded project: its root, configuration and resolved layout.
pub struct Project {
    /// The project root directory.
    pub root: PathBuf,
    /// The parsed configuration, or defaults when there is no `kiln.toml`.
    pub config: ProjectConfig,
    /// The resolved on-disk layout.
    pub paths: BuildPaths,
}

impl Project {
    fn new(root: PathBuf, config: ProjectConfig) -> Self {
        let paths = resolve_paths(&config, &root);
        Self {
            root,
            config,
            paths,
        }
    }
}

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Loads the project selected by the global CLI args.
///
/// If `--config` is specified, uses that path (file: read it, directory: read
/// its `kiln.toml`). Otherwise walks up from the current directory. A
/// directory tree with no `kiln.toml` is treated as an unnamed project
/// rooted at the current directory with default settings.
pub fn load_project(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    load_project_from(global.config.as_deref(), &cwd)
}

fn load_project_from(
    config: Option<&str>,
    cwd: &Path,
) -> Result<Project, Box<dyn std::error::Error>> {
    if let Some(config_path) = config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            let root = p
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            return Ok(Project::new(root, load_config_file(&p)?));
        }
        return Ok(Project::new(p.clone(), load_config(&p)?));
    }

    match find_project_root(cwd) {
        Some(root) => {
            let config = load_config(&root)?;
            Ok(Project::new(root, config))
        }
        None => {
            tracing::debug!(dir = %cwd.display(), "no {CONFIG_FILE} found, using defaults");
            let name = cwd
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "kiln".to_string());
            Ok(Project::new(cwd.to_path_buf(), ProjectConfig::with_defaults(name)))
        }
    }
}
