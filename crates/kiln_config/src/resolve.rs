//! Resolution of configured directories into absolute build paths.

use crate::types::ProjectConfig;
use std::path::{Path, PathBuf};

/// Directory name of the object cache inside the build directory.
const DEFAULT_CACHE_SUBDIR: &str = ".build_cache";

/// The on-disk layout of a build, with every configured path resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    /// The project root directory.
    pub project_root: PathBuf,
    /// The build output directory.
    pub build_dir: PathBuf,
    /// Root of the content-addressed object cache.
    pub cache_dir: PathBuf,
    /// Root under which each target gets its own module cache directory.
    pub module_cache_root: PathBuf,
    /// Shared directory for standard-library header-unit BMIs.
    pub stl_module_dir: PathBuf,
    /// Root for persisted dependency records.
    pub record_dir: PathBuf,
}

impl BuildPaths {
    /// Module cache directory owned by `target`.
    pub fn target_module_dir(&self, target: &str) -> PathBuf {
        self.module_cache_root.join(target)
    }

    /// Dependency record directory owned by `target`.
    pub fn target_record_dir(&self, target: &str) -> PathBuf {
        self.record_dir.join(target)
    }
}

/// Resolves the configured layout against `project_root`.
///
/// Relative paths are joined onto the project root; absolute paths are kept.
pub fn resolve_paths(config: &ProjectConfig, project_root: &Path) -> BuildPaths {
    let build_dir = anchor(project_root, &config.build.dir);
    let cache_dir = config
        .cache
        .dir
        .as_deref()
        .map(|d| anchor(project_root, d))
        .unwrap_or_else(|| build_dir.join(DEFAULT_CACHE_SUBDIR));
    let gens = build_dir.join(".gens");
    let module_cache_root = config
        .modules
        .cache_dir
        .as_deref()
        .map(|d| anchor(project_root, d))
        .unwrap_or_else(|| gens.join("modules"));
    let stl_module_dir = config
        .modules
        .stl_cache_dir
        .as_deref()
        .map(|d| anchor(project_root, d))
        .unwrap_or_else(|| gens.join("stlmodules"));

    BuildPaths {
        project_root: project_root.to_path_buf(),
        record_dir: build_dir.join(".deps"),
        build_dir,
        cache_dir,
        module_cache_root,
        stl_module_dir,
    }
}

fn anchor(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn defaults_live_under_build_dir() {
        let config = load_config_from_str("[project]\nname = \"p\"\n").unwrap();
        let paths = resolve_paths(&config, Path::new("/src/p"));
        assert_eq!(paths.build_dir, PathBuf::from("/src/p/build"));
        assert_eq!(paths.cache_dir, PathBuf::from("/src/p/build/.build_cache"));
        assert_eq!(
            paths.module_cache_root,
            PathBuf::from("/src/p/build/.gens/modules")
        );
        assert_eq!(
            paths.stl_module_dir,
            PathBuf::from("/src/p/build/.gens/stlmodules")
        );
        assert_eq!(paths.record_dir, PathBuf::from("/src/p/build/.deps"));
    }

    #[test]
    fn overrides_are_respected() {
        let toml = r#"
[project]
name = "p"

[build]
dir = "out"

[cache]
dir = "/tmp/objcache"

[modules]
cache_dir = "bmi"
"#;
        let config = load_config_from_str(toml).unwrap();
        let paths = resolve_paths(&config, Path::new("/src/p"));
        assert_eq!(paths.build_dir, PathBuf::from("/src/p/out"));
        assert_eq!(paths.cache_dir, PathBuf::from("/tmp/objcache"));
        assert_eq!(paths.module_cache_root, PathBuf::from("/src/p/bmi"));
        assert_eq!(paths.target_module_dir("core"), PathBuf::from("/src/p/bmi/core"));
        assert_eq!(
            paths.target_record_dir("core"),
            PathBuf::from("/src/p/out/.deps/core")
        );
    }
}
