//! Header-unit precompilation.
//!
//! A header unit is built at most once per cache directory. An existing BMI
//! is reused as-is: standard-library headers change only with the
//! toolchain, which gets its own cache directory, and user header units are
//! cleaned with the target's module cache.

use std::path::{Path, PathBuf};

use filetime::FileTime;
use rayon::prelude::*;

use kiln_cache::file_mtime;
use kiln_toolchain::{Compiler, FlagProbe};

use crate::error::ModuleError;
use crate::flavor::ModuleFlavor;
use crate::graph::Target;
use crate::scanner::{LookupMethod, ScanRule};

/// Where a header unit comes from and how it was included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderOrigin {
    /// A standard-library or other system header, named logically.
    System,
    /// A project header imported with quotes.
    UserQuoted,
    /// A project header imported with angle brackets.
    UserAngled,
}

/// One header to precompile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderUnit {
    /// Include origin.
    pub origin: HeaderOrigin,
    /// The header as written in the import.
    pub name: String,
    /// The resolved file, for user headers.
    pub path: Option<PathBuf>,
}

impl HeaderUnit {
    /// A system header such as `vector`.
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            origin: HeaderOrigin::System,
            name: name.into(),
            path: None,
        }
    }

    /// A project header imported as `import "path";`.
    pub fn user_quoted(path: PathBuf) -> Self {
        Self {
            origin: HeaderOrigin::UserQuoted,
            name: path.display().to_string(),
            path: Some(path),
        }
    }

    /// A project header imported as `import <name>;` that resolves to `path`.
    pub fn user_angled(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            origin: HeaderOrigin::UserAngled,
            name: name.into(),
            path: Some(path),
        }
    }

    /// How the header is passed to the compiler: the resolved path for
    /// quoted imports, the name as written otherwise.
    pub fn spelled(&self) -> String {
        match (self.origin, &self.path) {
            (HeaderOrigin::UserQuoted, Some(path)) => path.display().to_string(),
            _ => self.name.clone(),
        }
    }
}

/// Derives the header units a set of units import.
///
/// Quoted imports and angle imports whose resolved path lies inside
/// `project_root` are user headers; other angle imports are system headers.
/// Relative resolved paths are taken relative to `project_root`. Each
/// distinct header appears once, in first-seen order.
pub fn classify_header_units(rules: &[ScanRule], project_root: &Path) -> Vec<HeaderUnit> {
    let mut units: Vec<HeaderUnit> = Vec::new();
    for req in rules.iter().flat_map(ScanRule::required_headers) {
        let resolved = req.source_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                project_root.join(p)
            }
        });
        let unit = match (req.lookup_method, resolved) {
            (Some(LookupMethod::IncludeQuote), Some(path)) => HeaderUnit::user_quoted(path),
            (Some(LookupMethod::IncludeQuote), None) => {
                HeaderUnit::user_quoted(project_root.join(&req.logical_name))
            }
            (_, Some(path)) if path.starts_with(project_root) => {
                HeaderUnit::user_angled(req.logical_name.clone(), path)
            }
            _ => HeaderUnit::system(req.logical_name.clone()),
        };
        if !units.contains(&unit) {
            units.push(unit);
        }
    }
    units
}

/// Result of generating a batch of header units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderUnitReport {
    /// Flags that make the batch importable, in input order.
    pub flags: Vec<String>,
    /// Latest BMI modification time in the batch.
    pub max_bmi_mtime: FileTime,
    /// How many BMIs were compiled (the rest already existed).
    pub built: usize,
}

/// Precompiles header units for targets.
pub struct HeaderUnitBuilder<'a, C: ?Sized, P: ?Sized> {
    compiler: &'a C,
    probe: &'a P,
    program: PathBuf,
    flavor: ModuleFlavor,
    stl_dir: PathBuf,
    project_root: PathBuf,
}

impl<'a, C, P> HeaderUnitBuilder<'a, C, P>
where
    C: Compiler + ?Sized,
    P: FlagProbe + ?Sized,
{
    /// Creates a builder.
    ///
    /// STL header units go to `stl_dir`, shared by every target built with
    /// this toolchain. User header BMIs mirror their path relative to
    /// `project_root` inside the owning target's module cache.
    pub fn new(
        compiler: &'a C,
        probe: &'a P,
        program: impl Into<PathBuf>,
        flavor: ModuleFlavor,
        stl_dir: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            compiler,
            probe,
            program: program.into(),
            flavor,
            stl_dir: stl_dir.into(),
            project_root: project_root.into(),
        }
    }

    /// Precompiles standard-library header units into the shared directory.
    pub fn generate_stl_header_units(
        &self,
        target: &mut Target,
        headers: &[HeaderUnit],
    ) -> Result<HeaderUnitReport, ModuleError> {
        let stl_dir = self.stl_dir.clone();
        let ext = self.flavor.bmi_extension();
        self.generate(target, headers, |unit| {
            stl_dir.join(format!("{}.{ext}", sanitize(&unit.name)))
        })
    }

    /// Precompiles project header units into the target's module cache.
    pub fn generate_user_header_units(
        &self,
        target: &mut Target,
        headers: &[HeaderUnit],
    ) -> Result<HeaderUnitReport, ModuleError> {
        let module_dir = target.module_cache_dir.clone();
        let ext = self.flavor.bmi_extension();
        let root = self.project_root.clone();
        self.generate(target, headers, |unit| {
            let path = unit
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(&unit.name));
            let relative = path
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(sanitize(&path.display().to_string())));
            let mut file = module_dir.join(relative).into_os_string();
            file.push(".");
            file.push(ext);
            PathBuf::from(file)
        })
    }

    fn generate<F>(
        &self,
        target: &mut Target,
        headers: &[HeaderUnit],
        bmi_path: F,
    ) -> Result<HeaderUnitReport, ModuleError>
    where
        F: Fn(&HeaderUnit) -> PathBuf + Sync,
    {
        if !self
            .probe
            .has_flag(&self.program, self.flavor.header_unit_probe_flag())
        {
            return Err(ModuleError::HeaderUnitsUnsupported {
                program: self.program.clone(),
            });
        }

        let flags = target.flags.clone();
        let results = headers
            .par_iter()
            .map(|unit| {
                let bmi = bmi_path(unit);
                let built = self.build_one(&flags, unit, &bmi)?;
                Ok((unit, bmi, built))
            })
            .collect::<Result<Vec<_>, ModuleError>>()?;

        let mut report = HeaderUnitReport {
            flags: Vec::new(),
            max_bmi_mtime: FileTime::zero(),
            built: 0,
        };
        for (unit, bmi, built) in results {
            let consume = self.flavor.header_consume_args(unit, &bmi);
            target.add_flag_args(&consume);
            report.flags.extend(consume);
            report.max_bmi_mtime = report.max_bmi_mtime.max(file_mtime(&bmi));
            report.built += usize::from(built);
        }
        Ok(report)
    }

    fn build_one(&self, flags: &[String], unit: &HeaderUnit, bmi: &Path) -> Result<bool, ModuleError> {
        if bmi.is_file() {
            tracing::trace!(header = %unit.name, "header unit up to date");
            return Ok(false);
        }
        if let Some(dir) = bmi.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ModuleError::io(dir, e))?;
        }
        tracing::info!(header = %unit.name, bmi = %bmi.display(), "generating header unit");
        let args = self.flavor.header_unit_args(flags, unit, bmi);
        self.compiler
            .run(&self.program, &args)
            .map_err(|e| ModuleError::compile("generating header unit", unit.name.clone(), e))?;
        Ok(true)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '<' | '>' | '"' => '_',
            c => c,
        })
        .collect()
}
