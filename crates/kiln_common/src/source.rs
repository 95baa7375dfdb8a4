//! Classification of translation units by source language.

use std::path::Path;

/// The language of a translation unit, derived from its file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// C (`.c`).
    C,
    /// C++ (`.cpp`, `.cc`, `.cxx`, `.c++`, `.C`).
    Cxx,
    /// C++ module interface unit (`.cppm`, `.ixx`, `.mpp`, `.mxx`).
    CxxModule,
    /// Objective-C (`.m`).
    ObjC,
    /// Objective-C++ (`.mm`).
    ObjCxx,
    /// Assembly (`.s`, `.S`, `.asm`).
    Asm,
}

impl SourceKind {
    /// Detects the source kind from a path's extension.
    ///
    /// Returns `None` for headers and unknown extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        let kind = match ext {
            "c" => Self::C,
            "C" | "cpp" | "cc" | "cxx" | "c++" => Self::Cxx,
            "cppm" | "ixx" | "mpp" | "mxx" => Self::CxxModule,
            "m" => Self::ObjC,
            "mm" => Self::ObjCxx,
            "s" | "S" | "asm" => Self::Asm,
            _ => return None,
        };
        Some(kind)
    }

    /// Language name accepted by GCC-style `-x` for this kind's preprocessed form.
    pub fn preprocessed_language(self) -> &'static str {
        match self {
            Self::C => "cpp-output",
            Self::Cxx | Self::CxxModule => "c++-cpp-output",
            Self::ObjC => "objective-c-cpp-output",
            Self::ObjCxx => "objective-c++-cpp-output",
            Self::Asm => "assembler",
        }
    }

    /// Extension used for the preprocessed output of this kind.
    pub fn preprocessed_extension(self) -> &'static str {
        match self {
            Self::C => "i",
            Self::Cxx | Self::CxxModule => "ii",
            Self::ObjC => "mi",
            Self::ObjCxx => "mii",
            Self::Asm => "s",
        }
    }
}
