//! Content-addressed object file storage.
//!
//! Objects are stored at `<root>/<key[0..2]>/<key>`. Entries are immutable
//! once written; a store of an existing key replaces it atomically, so
//! concurrent writers of the same key end with exactly one complete copy.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_common::SourceKind;

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::stats::CacheStats;

/// Summary of what the store holds on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheInfo {
    /// Number of stored objects.
    pub entries: u64,
    /// Total size of stored objects in bytes.
    pub bytes: u64,
}

/// On-disk store of compiled objects keyed by [`CacheKey`].
pub struct ArtifactCache {
    root: PathBuf,
    stats: Arc<CacheStats>,
}

impl ArtifactCache {
    /// Creates a cache rooted at `root`, counting into `stats`.
    pub fn new(root: impl Into<PathBuf>, stats: Arc<CacheStats>) -> Self {
        Self {
            root: root.into(),
            stats,
        }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The counters this cache reports into.
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Returns `true` if units of this kind may go through the cache.
    pub fn is_supported(kind: SourceKind) -> bool {
        matches!(
            kind,
            SourceKind::C | SourceKind::Cxx | SourceKind::ObjC | SourceKind::ObjCxx
        )
    }

    /// Computes the key for compiling `preprocessed` with `program` and
    /// `flags`. See [`CacheKey::compute`].
    pub fn compute_key(
        &self,
        program: &Path,
        preprocessed: &Path,
        flags: &[String],
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<CacheKey, CacheError> {
        CacheKey::compute(program, preprocessed, flags, env)
    }

    /// Where the entry for `key` lives, whether or not it exists.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.shard()).join(key.to_hex())
    }

    /// Returns the stored object for `key`, counting the lookup.
    pub fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.entry_path(key);
        let hit = path.is_file();
        self.stats.record_lookup(hit);
        tracing::debug!(%key, hit, "cache lookup");
        hit.then_some(path)
    }

    /// Copies `object` into the store under `key`.
    pub fn store(&self, key: &CacheKey, object: &Path) -> Result<PathBuf, CacheError> {
        let dest = self.entry_path(key);
        let shard = dest.parent().unwrap_or(&self.root).to_path_buf();
        std::fs::create_dir_all(&shard).map_err(|e| CacheError::io(&shard, e))?;

        let data = std::fs::read(object).map_err(|e| CacheError::io(object, e))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&shard).map_err(|e| CacheError::io(&shard, e))?;
        tmp.write_all(&data)
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&dest)
            .map_err(|e| CacheError::io(&dest, e.error))?;

        self.stats.record_new_entry();
        tracing::debug!(%key, object = %object.display(), "stored object");
        Ok(dest)
    }

    /// Hit rate of the shared counters.
    pub fn hit_rate(&self) -> u64 {
        self.stats.hit_rate()
    }

    /// Removes every stored object. A missing root is not an error.
    pub fn clean(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.root, e)),
        }
    }

    /// Counts stored objects and their total size.
    pub fn info(&self) -> Result<CacheInfo, CacheError> {
        let mut info = CacheInfo::default();
        let shards = match std::fs::read_dir(&self.root) {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(info),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };
        for shard in shards {
            let shard = shard.map_err(|e| CacheError::io(&self.root, e))?.path();
            if !shard.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&shard).map_err(|e| CacheError::io(&shard, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| CacheError::io(&shard, e))?;
                let meta = entry
                    .metadata()
                    .map_err(|e| CacheError::io(entry.path(), e))?;
                if meta.is_file() {
                    info.entries += 1;
                    info.bytes += meta.len();
                }
            }
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::ContentHash;

    fn make_cache() -> (tempfile::TempDir, ArtifactCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache"), Arc::new(CacheStats::new()));
        (dir, cache)
    }

    fn key(source: &str) -> CacheKey {
        CacheKey::from_parts(
            Path::new("clang++"),
            ContentHash::from_bytes(source.as_bytes()),
            &["-O2".to_string()],
            None,
        )
    }

    #[test]
    fn lookup_after_store_returns_same_bytes() {
        let (dir, cache) = make_cache();
        let obj = dir.path().join("main.o");
        std::fs::write(&obj, b"\x7fELF object").unwrap();
        let k = key("int main() {}");

        assert_eq!(cache.lookup(&k), None);
        let stored = cache.store(&k, &obj).unwrap();
        assert_eq!(stored, cache.entry_path(&k));
        assert!(stored.starts_with(cache.root().join(k.shard())));

        let found = cache.lookup(&k).unwrap();
        assert_eq!(std::fs::read(found).unwrap(), b"\x7fELF object");

        let stats = cache.stats();
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.new_entries(), 1);
        assert_eq!(cache.hit_rate(), 50);
    }

    #[test]
    fn restore_replaces_entry() {
        let (dir, cache) = make_cache();
        let obj = dir.path().join("main.o");
        let k = key("x");
        std::fs::write(&obj, b"first").unwrap();
        cache.store(&k, &obj).unwrap();
        std::fs::write(&obj, b"second").unwrap();
        cache.store(&k, &obj).unwrap();
        assert_eq!(std::fs::read(cache.entry_path(&k)).unwrap(), b"second");
        assert_eq!(cache.info().unwrap().entries, 1);
    }

    #[test]
    fn store_missing_object_fails() {
        let (dir, cache) = make_cache();
        let err = cache.store(&key("x"), &dir.path().join("absent.o"));
        assert!(matches!(err, Err(CacheError::Io { .. })));
        assert_eq!(cache.stats().new_entries(), 0);
    }

    #[test]
    fn info_and_clean() {
        let (dir, cache) = make_cache();
        assert_eq!(cache.info().unwrap(), CacheInfo::default());
        cache.clean().unwrap();

        let obj = dir.path().join("a.o");
        std::fs::write(&obj, b"1234").unwrap();
        cache.store(&key("a"), &obj).unwrap();
        cache.store(&key("b"), &obj).unwrap();
        assert_eq!(
            cache.info().unwrap(),
            CacheInfo {
                entries: 2,
                bytes: 8
            }
        );

        cache.clean().unwrap();
        assert!(!cache.root().exists());
        assert_eq!(cache.lookup(&key("a")), None);
    }

    #[test]
    fn cacheable_source_kinds() {
        assert!(ArtifactCache::is_supported(SourceKind::C));
        assert!(ArtifactCache::is_supported(SourceKind::Cxx));
        assert!(ArtifactCache::is_supported(SourceKind::ObjCxx));
        assert!(!ArtifactCache::is_supported(SourceKind::CxxModule));
        assert!(!ArtifactCache::is_supported(SourceKind::Asm));
    }
}
