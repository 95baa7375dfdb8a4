//! C++ module and header-unit orchestration.
//!
//! Module interfaces must be compiled before anything that imports them, and
//! the flags needed to consume a target's modules must reach every target
//! that depends on it. This crate scans translation units for
//! provides/requires relationships ([`scanner`]), orders and builds module
//! interfaces and objects per target ([`builder`]), precompiles header units
//! ([`header_units`]), and carries the resulting flags across the
//! [`TargetGraph`].
//!
//! Every expensive step runs through
//! [`StalenessEngine::on_changed`](kiln_cache::StalenessEngine::on_changed),
//! so a rebuild with no changed inputs invokes no compiler.

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod flavor;
pub mod graph;
pub mod header_units;
pub mod scanner;

pub use builder::{ModuleBuildReport, ModuleBuilder, ModuleUnit};
pub use error::{GraphError, ModuleError, ScanError};
pub use flavor::ModuleFlavor;
pub use graph::{ExportBag, Target, TargetGraph};
pub use header_units::{
    classify_header_units, HeaderOrigin, HeaderUnit, HeaderUnitBuilder, HeaderUnitReport,
};
pub use scanner::{
    scan_cached, DependencyScanner, FallbackScanner, LookupMethod, P1689File, ProvidedModule,
    RequiredModule, ScanRule,
};
