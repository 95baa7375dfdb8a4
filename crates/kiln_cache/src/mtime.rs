//! Memoized file modification times.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use parking_lot::Mutex;

/// Reads a file's modification time, or [`FileTime::zero`] if it is missing.
pub fn file_mtime(path: &Path) -> FileTime {
    std::fs::metadata(path)
        .map(|m| FileTime::from_last_modification_time(&m))
        .unwrap_or_else(|_| FileTime::zero())
}

/// Process-scoped cache of file modification times.
///
/// A build checks the same headers for many translation units; each path is
/// stat'ed once per build. Create one per build process and pass it by
/// reference. Anything the build itself rewrites must be
/// [invalidated](MtimeCache::invalidate) before it is checked again.
#[derive(Debug, Default)]
pub struct MtimeCache {
    entries: Mutex<HashMap<PathBuf, FileTime>>,
}

impl MtimeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the modification time of `path`, zero if it does not exist.
    pub fn mtime(&self, path: &Path) -> FileTime {
        if let Some(&t) = self.entries.lock().get(path) {
            return t;
        }
        let t = file_mtime(path);
        self.entries.lock().insert(path.to_path_buf(), t);
        t
    }

    /// Forgets the memoized time of `path`.
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    /// Forgets every memoized time.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of memoized paths.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_zero() {
        assert_eq!(file_mtime(Path::new("/nonexistent/a.h")), FileTime::zero());
        let cache = MtimeCache::new();
        assert_eq!(cache.mtime(Path::new("/nonexistent/a.h")), FileTime::zero());
    }

    #[test]
    fn memoizes_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.h");
        std::fs::write(&path, "#pragma once").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000, 0)).unwrap();

        let cache = MtimeCache::new();
        assert_eq!(cache.mtime(&path), FileTime::from_unix_time(1_000, 0));
        assert_eq!(cache.len(), 1);

        filetime::set_file_mtime(&path, FileTime::from_unix_time(2_000, 0)).unwrap();
        assert_eq!(cache.mtime(&path), FileTime::from_unix_time(1_000, 0));

        cache.invalidate(&path);
        assert_eq!(cache.mtime(&path), FileTime::from_unix_time(2_000, 0));

        cache.clear();
        assert!(cache.is_empty());
    }
}
