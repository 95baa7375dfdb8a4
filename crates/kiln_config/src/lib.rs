//! Parsing and validation of `kiln.toml` build configuration files.
//!
//! This crate reads the project configuration and produces a strongly-typed
//! [`ProjectConfig`], plus the resolved on-disk layout ([`BuildPaths`]) used
//! by the cache and module crates.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_paths, BuildPaths};
pub use types::*;
