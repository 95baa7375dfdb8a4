//! Shared foundational types used across the Kiln build core.
//!
//! This crate provides content hashing, toolchain-family detection, and
//! source-kind classification used by the cache and module crates.

#![warn(missing_docs)]

pub mod hash;
pub mod source;
pub mod toolchain;

pub use hash::{ContentHash, ContentHasher};
pub use source::SourceKind;
pub use toolchain::{ParseToolchainError, ToolchainKind};
