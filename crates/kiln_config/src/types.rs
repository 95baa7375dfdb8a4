//! Configuration types deserialized from `kiln.toml`.

use kiln_common::ToolchainKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The top-level configuration parsed from `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Build directory settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Object cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// C++ module and header-unit settings.
    #[serde(default)]
    pub modules: ModulesConfig,
    /// Compiler selection.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

impl ProjectConfig {
    /// A configuration with every section at its default, used when a
    /// project has no `kiln.toml`.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self {
            project: ProjectMeta {
                name: name.into(),
                version: None,
            },
            build: BuildConfig::default(),
            cache: CacheConfig::default(),
            modules: ModulesConfig::default(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

/// Core project metadata required in every `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: Option<String>,
}

/// Build output layout.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Build directory, relative to the project root unless absolute.
    #[serde(default = "default_build_dir")]
    pub dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dir: default_build_dir(),
        }
    }
}

fn default_build_dir() -> String {
    "build".to_string()
}

/// Content-addressed object cache settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Whether compiled objects are cached at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache root override. Defaults to `<build dir>/.build_cache`.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// C++ module settings.
#[derive(Debug, Default, Deserialize)]
pub struct ModulesConfig {
    /// Root of per-target module cache directories.
    /// Defaults to `<build dir>/.gens/modules`.
    #[serde(default)]
    pub cache_dir: Option<String>,
    /// Shared directory for standard-library header units.
    /// Defaults to `<build dir>/.gens/stlmodules`.
    #[serde(default)]
    pub stl_cache_dir: Option<String>,
}

/// Compiler selection and environment.
#[derive(Debug, Deserialize)]
pub struct ToolchainConfig {
    /// The C++ compiler program.
    #[serde(default = "default_cxx")]
    pub cxx: String,
    /// Toolchain family override (`gcc`, `clang`, `msvc`); detected from
    /// `cxx` when absent.
    #[serde(default)]
    pub kind: Option<String>,
    /// Extra environment passed to the compiler and folded into cache keys
    /// for environment-sensitive toolchains.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cxx: default_cxx(),
            kind: None,
            env: BTreeMap::new(),
        }
    }
}

impl ToolchainConfig {
    /// The toolchain family: the explicit `kind` if set, otherwise detected
    /// from the `cxx` program name.
    pub fn toolchain_kind(&self) -> Option<ToolchainKind> {
        match &self.kind {
            Some(kind) => kind.parse().ok(),
            None => ToolchainKind::detect(Path::new(&self.cxx)),
        }
    }
}

fn default_cxx() -> String {
    "c++".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_file() {
        let config = ProjectConfig::with_defaults("scratch");
        assert_eq!(config.project.name, "scratch");
        assert_eq!(config.build.dir, "build");
        assert!(config.cache.enabled);
    }

    #[test]
    fn explicit_kind_wins_over_detection() {
        let mut toolchain = ToolchainConfig {
            cxx: "clang++-17".to_string(),
            ..ToolchainConfig::default()
        };
        assert_eq!(toolchain.toolchain_kind(), Some(ToolchainKind::Clang));
        toolchain.kind = Some("msvc".to_string());
        assert_eq!(toolchain.toolchain_kind(), Some(ToolchainKind::Msvc));
    }
}
