//! Toolchain-specific module command lines.

use std::path::Path;

use kiln_common::ToolchainKind;

use crate::error::ModuleError;
use crate::header_units::{HeaderOrigin, HeaderUnit};

/// Builds module-related compiler arguments for one toolchain family.
///
/// Clang produces `.pcm` files with `--precompile` and consumes them with
/// `-fmodule-file=`. MSVC produces `.ifc` files with `-interface` and
/// consumes them with `-reference`. GCC is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleFlavor {
    toolchain: ToolchainKind,
}

impl ModuleFlavor {
    /// Selects the flavor for `toolchain`.
    pub fn for_toolchain(toolchain: ToolchainKind) -> Result<Self, ModuleError> {
        match toolchain {
            ToolchainKind::Clang | ToolchainKind::Msvc => Ok(Self { toolchain }),
            ToolchainKind::Gcc => Err(ModuleError::UnsupportedToolchain { toolchain }),
        }
    }

    /// The toolchain this flavor targets.
    pub fn toolchain(&self) -> ToolchainKind {
        self.toolchain
    }

    fn is_msvc(&self) -> bool {
        self.toolchain == ToolchainKind::Msvc
    }

    /// BMI file extension.
    pub fn bmi_extension(&self) -> &'static str {
        if self.is_msvc() {
            "ifc"
        } else {
            "pcm"
        }
    }

    /// Flag whose acceptance indicates header-unit support.
    pub fn header_unit_probe_flag(&self) -> &'static str {
        if self.is_msvc() {
            "-exportHeader"
        } else {
            "-fmodule-header"
        }
    }

    /// Arguments that precompile a module interface into `bmi`.
    pub fn precompile_args(&self, flags: &[String], source: &Path, bmi: &Path) -> Vec<String> {
        let mut args = flags.to_vec();
        if self.is_msvc() {
            args.extend([
                "-c".to_string(),
                "-interface".to_string(),
                "-ifcOnly".to_string(),
                "-TP".to_string(),
                source.display().to_string(),
                "-ifcOutput".to_string(),
                bmi.display().to_string(),
            ]);
        } else {
            args.extend([
                "-x".to_string(),
                "c++-module".to_string(),
                "--precompile".to_string(),
                source.display().to_string(),
                "-o".to_string(),
                bmi.display().to_string(),
            ]);
        }
        args
    }

    /// Arguments that compile a module's object file.
    ///
    /// Clang compiles the object from the BMI; MSVC compiles the interface
    /// source again, referencing the BMI it already produced.
    pub fn module_object_args(
        &self,
        flags: &[String],
        name: &str,
        source: &Path,
        bmi: &Path,
        object: &Path,
    ) -> Vec<String> {
        let mut args = flags.to_vec();
        if self.is_msvc() {
            args.extend([
                "-c".to_string(),
                "-TP".to_string(),
                source.display().to_string(),
                "-reference".to_string(),
                format!("{name}={}", bmi.display()),
                format!("-Fo{}", object.display()),
            ]);
        } else {
            args.extend([
                "-c".to_string(),
                bmi.display().to_string(),
                "-o".to_string(),
                object.display().to_string(),
            ]);
        }
        args
    }

    /// Arguments that compile an ordinary unit that imports modules.
    pub fn object_args(&self, flags: &[String], source: &Path, object: &Path) -> Vec<String> {
        let mut args = flags.to_vec();
        if self.is_msvc() {
            args.extend([
                "-c".to_string(),
                "-TP".to_string(),
                source.display().to_string(),
                format!("-Fo{}", object.display()),
            ]);
        } else {
            args.extend([
                "-c".to_string(),
                source.display().to_string(),
                "-o".to_string(),
                object.display().to_string(),
            ]);
        }
        args
    }

    /// Arguments that let a unit import module `name` from `bmi`.
    pub fn consume_args(&self, name: &str, bmi: &Path) -> Vec<String> {
        if self.is_msvc() {
            vec!["-reference".to_string(), format!("{name}={}", bmi.display())]
        } else {
            vec![format!("-fmodule-file={name}={}", bmi.display())]
        }
    }

    /// Arguments that add `dir` to the prebuilt module search path.
    pub fn module_dir_args(&self, dir: &Path) -> Vec<String> {
        if self.is_msvc() {
            vec!["-ifcSearchDir".to_string(), dir.display().to_string()]
        } else {
            vec![format!("-fprebuilt-module-path={}", dir.display())]
        }
    }

    /// Arguments that precompile `unit` into `bmi`.
    pub fn header_unit_args(&self, flags: &[String], unit: &HeaderUnit, bmi: &Path) -> Vec<String> {
        let mut args = flags.to_vec();
        let include_dir = match unit.origin {
            HeaderOrigin::UserAngled => unit.path.as_deref().and_then(Path::parent),
            _ => None,
        };
        if let Some(dir) = include_dir {
            args.push(format!("-I{}", dir.display()));
        }
        let angle = unit.origin != HeaderOrigin::UserQuoted;
        let header = unit.spelled();
        if self.is_msvc() {
            args.extend([
                "-c".to_string(),
                "-exportHeader".to_string(),
                if angle { "-headerName:angle" } else { "-headerName:quote" }.to_string(),
                header,
                "-ifcOutput".to_string(),
                bmi.display().to_string(),
            ]);
        } else {
            args.extend([
                if angle { "-fmodule-header=system" } else { "-fmodule-header=user" }.to_string(),
                if angle { "-xc++-system-header" } else { "-xc++-user-header" }.to_string(),
                header,
                "-o".to_string(),
                bmi.display().to_string(),
            ]);
        }
        args
    }

    /// Arguments that let a unit import header unit `unit` from `bmi`.
    pub fn header_consume_args(&self, unit: &HeaderUnit, bmi: &Path) -> Vec<String> {
        if self.is_msvc() {
            let method = if unit.origin == HeaderOrigin::UserQuoted {
                "-headerUnit:quote"
            } else {
                "-headerUnit:angle"
            };
            vec![
                method.to_string(),
                format!("{}={}", unit.spelled(), bmi.display()),
            ]
        } else {
            vec![format!("-fmodule-file={}", bmi.display())]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn clang() -> ModuleFlavor {
        ModuleFlavor::for_toolchain(ToolchainKind::Clang).unwrap()
    }

    fn msvc() -> ModuleFlavor {
        ModuleFlavor::for_toolchain(ToolchainKind::Msvc).unwrap()
    }

    #[test]
    fn gcc_is_rejected() {
        let err = ModuleFlavor::for_toolchain(ToolchainKind::Gcc).unwrap_err();
        assert!(matches!(
            err,
            ModuleError::UnsupportedToolchain {
                toolchain: ToolchainKind::Gcc
            }
        ));
    }

    #[test]
    fn clang_interface_commands() {
        let f = clang();
        let flags = vec!["-std=c++20".to_string()];
        let args = f.precompile_args(&flags, Path::new("src/a.cppm"), Path::new("m/A.pcm"));
        assert_eq!(
            args,
            ["-std=c++20", "-x", "c++-module", "--precompile", "src/a.cppm", "-o", "m/A.pcm"]
        );
        let args = f.module_object_args(
            &flags,
            "A",
            Path::new("src/a.cppm"),
            Path::new("m/A.pcm"),
            Path::new("obj/a.o"),
        );
        assert_eq!(args, ["-std=c++20", "-c", "m/A.pcm", "-o", "obj/a.o"]);
        assert_eq!(f.consume_args("A", Path::new("m/A.pcm")), ["-fmodule-file=A=m/A.pcm"]);
        assert_eq!(f.bmi_extension(), "pcm");
    }

    #[test]
    fn msvc_interface_commands() {
        let f = msvc();
        let args = f.module_object_args(
            &[],
            "A",
            Path::new("a.ixx"),
            Path::new("m/A.ifc"),
            Path::new("a.obj"),
        );
        assert!(args.contains(&"A=m/A.ifc".to_string()));
        assert!(args.contains(&"-Foa.obj".to_string()));
        assert_eq!(f.bmi_extension(), "ifc");
        assert_eq!(f.header_unit_probe_flag(), "-exportHeader");
        assert_eq!(f.consume_args("A", Path::new("m/A.ifc")), ["-reference", "A=m/A.ifc"]);
        assert_eq!(f.module_dir_args(Path::new("m")), ["-ifcSearchDir", "m"]);
    }

    #[test]
    fn header_unit_commands() {
        let f = clang();
        let stl = HeaderUnit::system("vector");
        let args = f.header_unit_args(&[], &stl, Path::new("stl/vector.pcm"));
        assert_eq!(
            args,
            [
                "-fmodule-header=system",
                "-xc++-system-header",
                "vector",
                "-o",
                "stl/vector.pcm"
            ]
        );

        let angled = HeaderUnit::user_angled("util.h", PathBuf::from("/p/include/util.h"));
        let args = f.header_unit_args(&[], &angled, Path::new("m/include/util.h.pcm"));
        assert_eq!(args[0], "-I/p/include");
        assert_eq!(args[3], "util.h");

        let quoted = HeaderUnit::user_quoted(PathBuf::from("/p/src/config.h"));
        let args = msvc().header_unit_args(&[], &quoted, Path::new("m/src/config.h.ifc"));
        assert!(args.contains(&"-headerName:quote".to_string()));
        assert_eq!(
            msvc().header_consume_args(&quoted, Path::new("m/src/config.h.ifc")),
            ["-headerUnit:quote", "/p/src/config.h=m/src/config.h.ifc"]
        );
    }
}
