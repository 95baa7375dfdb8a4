//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use kiln_common::ToolchainKind;
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name"));
    }
    if config.build.dir.is_empty() {
        return Err(ConfigError::Invalid {
            field: "build.dir",
            reason: "must not be empty".to_string(),
        });
    }
    if config.toolchain.cxx.is_empty() {
        return Err(ConfigError::MissingField("toolchain.cxx"));
    }
    if let Some(ref kind) = config.toolchain.kind {
        kind.parse::<ToolchainKind>()
            .map_err(|e| ConfigError::Invalid {
                field: "toolchain.kind",
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[project]
name = "engine"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.name, "engine");
        assert_eq!(config.build.dir, "build");
        assert!(config.cache.enabled);
        assert!(config.cache.dir.is_none());
        assert_eq!(config.toolchain.cxx, "c++");
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "engine"
version = "1.2.0"

[build]
dir = "out"

[cache]
enabled = false
dir = "/var/cache/kiln"

[modules]
cache_dir = "out/bmi"
stl_cache_dir = "/var/cache/kiln/stl"

[toolchain]
cxx = "clang++-17"
kind = "clang"

[toolchain.env]
WindowsSDKVersion = "10.0.22621.0"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.version.as_deref(), Some("1.2.0"));
        assert_eq!(config.build.dir, "out");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.dir.as_deref(), Some("/var/cache/kiln"));
        assert_eq!(config.modules.cache_dir.as_deref(), Some("out/bmi"));
        assert_eq!(config.toolchain.kind.as_deref(), Some("clang"));
        assert_eq!(config.toolchain.env["WindowsSDKVersion"], "10.0.22621.0");
    }

    #[test]
    fn missing_name_errors() {
        let toml = r#"
[project]
name = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("project.name")));
    }

    #[test]
    fn unknown_toolchain_kind_errors() {
        let toml = r#"
[project]
name = "engine"

[toolchain]
kind = "icc"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "toolchain.kind",
                ..
            }
        ));
    }

    #[test]
    fn empty_build_dir_errors() {
        let toml = r#"
[project]
name = "engine"

[build]
dir = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "build.dir", .. }));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[project]\nname = \"x\"\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.project.name, "x");
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/dir").join(CONFIG_FILE))
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alt.toml");
        std::fs::write(&path, "[project]\nname = \"alt\"\n").unwrap();
        assert_eq!(load_config_file(&path).unwrap().project.name, "alt");
    }
}
