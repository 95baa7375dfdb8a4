//! Module dependency discovery.
//!
//! Scan results use the P1689 dependency format (`clang-scan-deps
//! -format=p1689`, MSVC `/scanDependencies`): one rule per translation unit
//! listing the modules it provides and requires. [`FallbackScanner`] derives
//! the same rules from source text for toolchains without a scanner.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use kiln_cache::{RecordUpdate, RunOptions, StalenessEngine, TrackedValue};

use crate::error::{ModuleError, ScanError};

/// Record key under which a unit's scan result is memoized.
pub const MODULEINFO_KEY: &str = "moduleinfo";

/// A P1689 scanner output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct P1689File {
    /// Format version.
    #[serde(default)]
    pub version: u32,
    /// Format revision.
    #[serde(default)]
    pub revision: u32,
    /// One rule per scanned unit.
    #[serde(default)]
    pub rules: Vec<ScanRule>,
}

impl P1689File {
    /// Parses scanner output. `origin` names the output in errors.
    pub fn parse(json: &str, origin: &Path) -> Result<Self, ScanError> {
        serde_json::from_str(json).map_err(|e| ScanError::Invalid {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Reads and parses a scanner output file.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let json = std::fs::read_to_string(path).map_err(|e| ScanError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&json, path)
    }
}

/// What one translation unit provides and requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScanRule {
    /// The object file the rule describes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_output: Option<PathBuf>,
    /// Modules the unit declares.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<ProvidedModule>,
    /// Modules and header units the unit imports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<RequiredModule>,
}

impl ScanRule {
    /// Names of required named modules, excluding header units.
    pub fn required_modules(&self) -> impl Iterator<Item = &str> {
        self.requires
            .iter()
            .filter(|r| !r.is_header_unit())
            .map(|r| r.logical_name.as_str())
    }

    /// Required header units.
    pub fn required_headers(&self) -> impl Iterator<Item = &RequiredModule> {
        self.requires.iter().filter(|r| r.is_header_unit())
    }
}

/// A module declared by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProvidedModule {
    /// Module name, with `:partition` suffix for partitions.
    pub logical_name: String,
    /// Source file, when the scanner reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    /// `false` for implementation partitions.
    #[serde(default = "default_true")]
    pub is_interface: bool,
}

fn default_true() -> bool {
    true
}

/// How an import names what it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupMethod {
    /// A named module.
    ByName,
    /// `import <header>;`
    IncludeAngle,
    /// `import "header";`
    IncludeQuote,
}

/// A module or header unit imported by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequiredModule {
    /// Module name, or the header as written for header units.
    pub logical_name: String,
    /// Resolved header path, when the scanner reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    /// How the import was written; absent means by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_method: Option<LookupMethod>,
}

impl RequiredModule {
    /// A named-module import.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            logical_name: name.into(),
            source_path: None,
            lookup_method: None,
        }
    }

    /// Returns `true` for `import <h>;` and `import "h";`.
    pub fn is_header_unit(&self) -> bool {
        matches!(
            self.lookup_method,
            Some(LookupMethod::IncludeAngle | LookupMethod::IncludeQuote)
        )
    }
}

/// Produces a [`ScanRule`] for one translation unit.
pub trait DependencyScanner: Send + Sync {
    /// Scans `source`, which compiles to `object`.
    fn scan(&self, source: &Path, object: &Path) -> Result<ScanRule, ScanError>;
}

/// Scans module declarations and imports out of the source text.
///
/// Understands `export module M;`, `module M:part;`, `module M;`
/// (implementation units, which require `M`), `import M;`, `import :part;`
/// and header-unit imports. Declarations inside comments or behind the
/// preprocessor are not evaluated.
pub struct FallbackScanner {
    module_decl: Regex,
    import_decl: Regex,
    header_import: Regex,
}

impl FallbackScanner {
    /// Creates a scanner.
    pub fn new() -> Result<Self, ScanError> {
        Ok(Self {
            module_decl: Regex::new(r"^\s*(export\s+)?module\s+([\w.]+)(:[\w.]+)?\s*;")?,
            import_decl: Regex::new(r"^\s*(export\s+)?import\s+([\w.]*)(:[\w.]+)?\s*;")?,
            header_import: Regex::new(r#"^\s*(export\s+)?import\s+(<[^>]+>|"[^"]+")\s*;"#)?,
        })
    }

    /// Scans source text already in memory.
    pub fn scan_text(&self, text: &str, object: &Path) -> ScanRule {
        let mut rule = ScanRule {
            primary_output: Some(object.to_path_buf()),
            ..Default::default()
        };
        let mut primary: Option<String> = None;
        let mut partition_imports = Vec::new();
        let mut in_block_comment = false;

        for line in text.lines() {
            let line = line.trim_start();
            if in_block_comment {
                if line.contains("*/") {
                    in_block_comment = false;
                }
                continue;
            }
            if line.starts_with("/*") {
                in_block_comment = !line.contains("*/");
                continue;
            }
            if line.starts_with("//") {
                continue;
            }

            if let Some(caps) = self.module_decl.captures(line) {
                let exported = caps.get(1).is_some();
                let name = caps[2].to_string();
                match caps.get(3) {
                    Some(part) => rule.provides.push(ProvidedModule {
                        logical_name: format!("{name}{}", part.as_str()),
                        source_path: None,
                        is_interface: exported,
                    }),
                    None if exported => rule.provides.push(ProvidedModule {
                        logical_name: name.clone(),
                        source_path: None,
                        is_interface: true,
                    }),
                    None => rule.requires.push(RequiredModule::by_name(name.clone())),
                }
                primary = Some(name);
            } else if let Some(caps) = self.header_import.captures(line) {
                let written = &caps[2];
                let (name, method) = if written.starts_with('<') {
                    (written.trim_matches(|c| c == '<' || c == '>'), LookupMethod::IncludeAngle)
                } else {
                    (written.trim_matches('"'), LookupMethod::IncludeQuote)
                };
                rule.requires.push(RequiredModule {
                    logical_name: name.to_string(),
                    source_path: None,
                    lookup_method: Some(method),
                });
            } else if let Some(caps) = self.import_decl.captures(line) {
                let name = &caps[2];
                match caps.get(3) {
                    Some(part) if name.is_empty() => partition_imports.push(part.as_str().to_string()),
                    Some(part) => rule
                        .requires
                        .push(RequiredModule::by_name(format!("{name}{}", part.as_str()))),
                    None if !name.is_empty() => rule.requires.push(RequiredModule::by_name(name)),
                    None => {}
                }
            }
        }

        if let Some(primary) = primary {
            for part in partition_imports {
                rule.requires.push(RequiredModule::by_name(format!("{primary}{part}")));
            }
        }
        rule
    }
}

impl DependencyScanner for FallbackScanner {
    fn scan(&self, source: &Path, object: &Path) -> Result<ScanRule, ScanError> {
        let text = std::fs::read_to_string(source).map_err(|e| ScanError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let mut rule = self.scan_text(&text, object);
        for provided in &mut rule.provides {
            provided.source_path = Some(source.to_path_buf());
        }
        Ok(rule)
    }
}

/// Scans `source` unless the record at `record` already holds a rule for
/// the same source and values.
///
/// The rule is stored in the record under [`MODULEINFO_KEY`].
pub fn scan_cached<S: DependencyScanner + ?Sized>(
    scanner: &S,
    engine: &StalenessEngine<'_>,
    record: &Path,
    source: &Path,
    object: &Path,
    values: Vec<TrackedValue>,
) -> Result<ScanRule, ModuleError> {
    let mut opts = RunOptions::new(record).file(source);
    opts.values = values;

    let mut scanned = None;
    let outcome = engine.on_changed(&opts, || {
        let rule = scanner.scan(source, object)?;
        let info = serde_json::to_value(&rule).map_err(|e| ScanError::Invalid {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        scanned = Some(rule);
        Ok::<_, ModuleError>(RecordUpdate::none().with_extra(MODULEINFO_KEY, info))
    })?;

    if let Some(rule) = scanned {
        return Ok(rule);
    }
    let memoized = outcome
        .record()
        .and_then(|r| r.extras.get(MODULEINFO_KEY))
        .and_then(|info| serde_json::from_value::<ScanRule>(info.clone()).ok());
    match memoized {
        Some(rule) => Ok(rule),
        None => {
            tracing::debug!(source = %source.display(), "record has no usable scan result; rescanning");
            let rule = scanner.scan(source, object)?;
            Ok(rule)
        }
    }
}
