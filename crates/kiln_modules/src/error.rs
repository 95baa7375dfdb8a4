//! Error types for module orchestration.

use std::path::PathBuf;

use kiln_cache::CacheError;
use kiln_common::ToolchainKind;
use kiln_toolchain::CompileFailure;

/// Errors that abort building a target's modules.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The toolchain has no module support this crate can drive.
    #[error("C++ modules are not supported with the {toolchain} toolchain")]
    UnsupportedToolchain {
        /// The detected toolchain.
        toolchain: ToolchainKind,
    },

    /// A translation unit declares more than one module.
    #[error("{} provides more than one module: {}", .object.display(), .names.join(", "))]
    MultipleProvides {
        /// The object file of the offending unit.
        object: PathBuf,
        /// Every module it provides.
        names: Vec<String>,
    },

    /// Two units of one target provide the same module.
    #[error("module '{name}' is provided by both {} and {}", .first.display(), .second.display())]
    DuplicateModule {
        /// The module name.
        name: String,
        /// Source of the first provider.
        first: PathBuf,
        /// Source of the second provider.
        second: PathBuf,
    },

    /// Modules of one target import each other in a cycle.
    #[error("module dependency cycle involving '{module}'")]
    Cycle {
        /// A module on the cycle.
        module: String,
    },

    /// An imported module is built by neither the target nor its dependencies.
    #[error("{} imports module '{module}', but no BMI for it is available", .unit.display())]
    MissingBmi {
        /// The imported module.
        module: String,
        /// The importing source file.
        unit: PathBuf,
    },

    /// The compiler cannot build header units.
    #[error("{} does not support header units", .program.display())]
    HeaderUnitsUnsupported {
        /// The compiler that was probed.
        program: PathBuf,
    },

    /// A compiler invocation failed.
    #[error("{stage} for {unit} failed: {source}")]
    Compile {
        /// What was being built ("generating module BMI", ...).
        stage: &'static str,
        /// The module, header or file being built.
        unit: String,
        /// The compiler failure.
        source: CompileFailure,
    },

    /// Scanning a unit failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Reading or writing a dependency record failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The target graph rejected an operation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A filesystem operation outside the cache failed.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl ModuleError {
    pub(crate) fn compile(stage: &'static str, unit: impl Into<String>, source: CompileFailure) -> Self {
        Self::Compile {
            stage,
            unit: unit.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors produced while discovering module dependencies.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The source or scanner output could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Scanner output is malformed.
    #[error("invalid dependency scan for {}: {reason}", .path.display())]
    Invalid {
        /// The unit or scanner output file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// An external scanner failed to run.
    #[error("dependency scanner failed for {}: {source}", .path.display())]
    Scanner {
        /// The unit being scanned.
        path: PathBuf,
        /// The scanner's failure.
        source: CompileFailure,
    },

    /// A scanner pattern failed to compile.
    #[error("invalid scanner pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Errors from the target graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// No target with this name exists.
    #[error("unknown target '{name}'")]
    UnknownTarget {
        /// The requested name.
        name: String,
    },

    /// A target with this name already exists.
    #[error("target '{name}' is defined twice")]
    DuplicateTarget {
        /// The duplicated name.
        name: String,
    },

    /// Targets depend on each other in a cycle.
    #[error("dependency cycle involving target '{name}'")]
    Cycle {
        /// A target on the cycle.
        name: String,
    },

    /// A value was exported after the target finished building.
    #[error("target '{target}' is already built; cannot export '{key}'")]
    Sealed {
        /// The sealed target.
        target: String,
        /// The key that was being written.
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_names_stage_and_unit() {
        let err = ModuleError::compile(
            "generating module BMI",
            "math",
            CompileFailure::failed(std::path::Path::new("clang++"), "math.cppm:3: error: expected ';'"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("generating module BMI for math failed"));
        assert!(msg.contains("expected ';'"));
    }

    #[test]
    fn missing_bmi_display() {
        let err = ModuleError::MissingBmi {
            module: "D".to_string(),
            unit: PathBuf::from("src/main.cpp"),
        };
        assert_eq!(
            err.to_string(),
            "src/main.cpp imports module 'D', but no BMI for it is available"
        );
    }

    #[test]
    fn multiple_provides_lists_names() {
        let err = ModuleError::MultipleProvides {
            object: PathBuf::from("build/a.o"),
            names: vec!["A".to_string(), "B".to_string()],
        };
        assert!(err.to_string().ends_with("A, B"));
    }
}
