//! Process-wide cache counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss accounting for one build process.
///
/// Created once per process and shared (usually through an `Arc`) by every
/// [`ArtifactCache`](crate::ArtifactCache) and
/// [`CachedCompile`](crate::CachedCompile) in it.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    total: AtomicU64,
    new_entries: AtomicU64,
    errors: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one lookup.
    pub fn record_lookup(&self, hit: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts one newly stored entry.
    pub fn record_new_entry(&self) {
        self.new_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one compile that could not go through the cache.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups that found an entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// All lookups.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing.
    pub fn misses(&self) -> u64 {
        self.total().saturating_sub(self.hits())
    }

    /// Entries stored.
    pub fn new_entries(&self) -> u64 {
        self.new_entries.load(Ordering::Relaxed)
    }

    /// Compiles that fell back to the uncached path.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Hit rate as a floored percentage; 0 before any lookup.
    pub fn hit_rate(&self) -> u64 {
        let total = self.total();
        if total == 0 {
            0
        } else {
            self.hits() * 100 / total
        }
    }

    /// Snapshot of the counters for display.
    pub fn report(&self) -> StatsReport {
        StatsReport {
            hit_rate: self.hit_rate(),
            hits: self.hits(),
            misses: self.misses(),
            new_entries: self.new_entries(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsReport {
    /// Floored hit percentage.
    pub hit_rate: u64,
    /// Hits.
    pub hits: u64,
    /// Misses.
    pub misses: u64,
    /// New entries stored.
    pub new_entries: u64,
    /// Preprocess failures.
    pub errors: u64,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "build cache stats:")?;
        writeln!(f, "  cache hit rate:   {}%", self.hit_rate)?;
        writeln!(f, "  cache hits:       {}", self.hits)?;
        writeln!(f, "  cache misses:     {}", self.misses)?;
        writeln!(f, "  new cached files: {}", self.new_entries)?;
        write!(f, "  preprocess errors: {}", self.errors)
    }
}
