//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors that can occur when loading or validating a `kiln.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}", path = .path.display())]
    Io {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The content is not valid TOML or does not match the schema.
    #[error("invalid kiln.toml: {reason}")]
    Parse {
        /// The parser's message.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field holds a value kiln cannot use.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted name of the field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_file() {
        let err = ConfigError::Io {
            path: PathBuf::from("/p/kiln.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        assert_eq!(err.to_string(), "cannot read /p/kiln.toml: file not found");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_value_names_the_field() {
        let err = ConfigError::Invalid {
            field: "toolchain.kind",
            reason: "unknown toolchain 'icc'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for toolchain.kind: unknown toolchain 'icc'"
        );
    }
}
