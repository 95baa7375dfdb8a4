//! Incremental dependency tracking and content-addressed object caching.
//!
//! Two questions are answered here. [`StalenessEngine`] decides whether a
//! unit must be rebuilt, based on a persisted [`DependencyRecord`] of tracked
//! file modification times and opaque build values. [`ArtifactCache`] decides
//! whether a compiled object can be reused, keyed by a hash of the program,
//! its flags, and the preprocessed source. [`CachedCompile`] composes the two
//! halves of a compile around the cache.

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod key;
pub mod mtime;
pub mod pipeline;
pub mod record;
pub mod staleness;
pub mod stats;
pub mod value;

pub use artifact::{ArtifactCache, CacheInfo};
pub use error::CacheError;
pub use key::CacheKey;
pub use mtime::{file_mtime, MtimeCache};
pub use pipeline::{
    CachedCompile, CommandSteps, CompileOutcome, CompileSteps, PreprocessFailure, Preprocessed,
};
pub use record::{DependencyRecord, RecordStore, RecordUpdate};
pub use staleness::{ChangeReason, CurrentInputs, Outcome, RunOptions, StalenessEngine};
pub use stats::{CacheStats, StatsReport};
pub use value::TrackedValue;
