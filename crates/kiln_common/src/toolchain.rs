//! Toolchain family detection from a compiler program path.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The family a compiler program belongs to.
///
/// Determines flag syntax, BMI extension, and whether compiled output depends
/// on ambient environment variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolchainKind {
    /// GCC (`gcc`, `g++`, `cc`, `c++`, cross prefixed variants).
    Gcc,
    /// Clang with the GCC-compatible driver (`clang`, `clang++`).
    Clang,
    /// MSVC `cl.exe` or the `clang-cl` driver.
    Msvc,
}

impl ToolchainKind {
    /// Detects the toolchain family from a program path.
    ///
    /// Only the file stem is inspected, so `/opt/llvm/bin/clang++-17` and
    /// `C:\VS\bin\cl.exe` are both recognized. Returns `None` when the name
    /// matches no known family.
    pub fn detect(program: &Path) -> Option<Self> {
        let stem = program.file_stem()?.to_str()?.to_ascii_lowercase();
        if stem == "cl" || stem.starts_with("clang-cl") {
            return Some(Self::Msvc);
        }
        if stem.contains("clang") {
            return Some(Self::Clang);
        }
        if stem.ends_with("gcc")
            || stem.ends_with("g++")
            || stem.contains("gcc-")
            || stem.contains("g++-")
            || stem == "cc"
            || stem == "c++"
        {
            return Some(Self::Gcc);
        }
        None
    }

    /// Returns `true` if compiler output depends on environment variables
    /// (SDK and toolset versions, library search path).
    pub fn is_env_sensitive(self) -> bool {
        matches!(self, Self::Msvc)
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gcc => "gcc",
            Self::Clang => "clang",
            Self::Msvc => "msvc",
        };
        f.write_str(name)
    }
}

/// Error returned when a toolchain name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown toolchain '{input}'")]
pub struct ParseToolchainError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for ToolchainKind {
    type Err = ParseToolchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gcc" => Ok(Self::Gcc),
            "clang" => Ok(Self::Clang),
            "msvc" | "cl" => Ok(Self::Msvc),
            _ => Err(ParseToolchainError {
                input: s.to_string(),
            }),
        }
    }
}
