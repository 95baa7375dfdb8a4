//! Persisted per-unit dependency records.
//!
//! A record lists the files and opaque values a unit was last built from.
//! Records are stored as pretty-printed JSON at a caller-chosen location.
//! Loading is fail-safe: a missing, truncated, or otherwise unparsable
//! record loads as `None`, which forces a rebuild. An interrupted build can
//! leave a half-written record behind, and that must never be fatal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::value::TrackedValue;

/// The inputs a unit was last successfully built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Files whose modification time affects validity, in insertion order:
    /// the caller's inputs first, then files discovered while building.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// How many leading entries of `files` the caller supplied.
    #[serde(default)]
    pub inputs: usize,

    /// Non-file invalidation inputs, compared positionally.
    #[serde(default)]
    pub values: Vec<TrackedValue>,

    /// Caller-defined data stored next to the dependency lists, for example
    /// `"moduleinfo"` holding a unit's scanner output.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// What a rebuild action reports back for its unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    /// Files discovered while building (e.g. headers from a depfile).
    pub files: Vec<PathBuf>,
    /// Extra keys to store on the record, replacing same-named ones.
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl RecordUpdate {
    /// An update with nothing to add.
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a discovered file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Adds discovered files.
    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Stores an extra key.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

impl DependencyRecord {
    /// Creates a record from the current file and value inputs.
    pub fn new(files: Vec<PathBuf>, values: Vec<TrackedValue>) -> Self {
        Self {
            inputs: files.len(),
            files,
            values,
            extras: BTreeMap::new(),
        }
    }

    /// The files the caller supplied, without discovered ones.
    pub fn input_files(&self) -> &[PathBuf] {
        &self.files[..self.inputs.min(self.files.len())]
    }

    /// Returns `true` if the record tracks no files and no values.
    ///
    /// An empty record can never prove a unit is up to date.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.values.is_empty()
    }

    /// Appends files not already tracked, preserving order, and overlays
    /// extras.
    pub fn merge(&mut self, update: RecordUpdate) {
        for file in update.files {
            if !self.files.contains(&file) {
                self.files.push(file);
            }
        }
        self.extras.extend(update.extras);
    }

    /// Loads a record, returning `None` if it is absent or unparsable.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ignoring unreadable dependency record");
                None
            }
        }
    }

    /// Writes the record, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CacheError::io(path, e))
    }

    /// Deletes the record at `path`. A missing record is not an error.
    pub fn remove(path: &Path) -> Result<(), CacheError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }
}

/// Maps unit identifiers to record locations under one directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record location for `unit`.
    ///
    /// Path separators and drive colons in the identifier are flattened so
    /// every record lives directly under the root.
    pub fn location(&self, unit: &str) -> PathBuf {
        let flat: String = unit
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                other => other,
            })
            .collect();
        self.root.join(format!("{flat}.json"))
    }

    /// Loads the record for `unit`.
    pub fn load(&self, unit: &str) -> Option<DependencyRecord> {
        DependencyRecord::load(&self.location(unit))
    }

    /// Saves the record for `unit`.
    pub fn save(&self, unit: &str, record: &DependencyRecord) -> Result<(), CacheError> {
        record.save(&self.location(unit))
    }

    /// Deletes the record for `unit`, forcing its next build.
    pub fn invalidate(&self, unit: &str) -> Result<(), CacheError> {
        DependencyRecord::remove(&self.location(unit))
    }

    /// Removes every record in the store.
    pub fn clean(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.root, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DependencyRecord {
        let mut r = DependencyRecord::new(
            vec![PathBuf::from("src/main.cpp"), PathBuf::from("include/a.h")],
            vec!["clang++".into(), TrackedValue::list(["-O2", "-g"])],
        );
        r.extras.insert(
            "moduleinfo".to_string(),
            serde_json::json!({"provides": ["core"]}),
        );
        r
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps").join("main.o.json");
        let record = sample();
        record.save(&path).unwrap();
        assert_eq!(DependencyRecord::load(&path).unwrap(), record);
    }

    #[test]
    fn extras_are_top_level_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("files").is_some());
        assert!(json.get("values").is_some());
        assert_eq!(json["moduleinfo"]["provides"][0], "core");
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DependencyRecord::load(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn load_truncated_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.o.json");
        let full = serde_json::to_string_pretty(&sample()).unwrap();
        std::fs::write(&path, &full[..full.len() / 2]).unwrap();
        assert!(DependencyRecord::load(&path).is_none());
    }

    #[test]
    fn load_wrong_shape_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.o.json");
        std::fs::write(&path, r#"{"files": 42}"#).unwrap();
        assert!(DependencyRecord::load(&path).is_none());
    }

    #[test]
    fn empty_record() {
        assert!(DependencyRecord::default().is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn merge_appends_without_duplicates() {
        let mut record = DependencyRecord::new(vec![PathBuf::from("a.cpp")], vec![]);
        record.merge(
            RecordUpdate::none()
                .with_files(["a.cpp", "a.h", "b.h"])
                .with_extra("moduleinfo", serde_json::json!(1)),
        );
        assert_eq!(
            record.files,
            vec![
                PathBuf::from("a.cpp"),
                PathBuf::from("a.h"),
                PathBuf::from("b.h")
            ]
        );
        assert_eq!(record.extras["moduleinfo"], serde_json::json!(1));
        assert_eq!(record.input_files(), [PathBuf::from("a.cpp")]);
    }

    #[test]
    fn records_without_input_count_have_no_inputs() {
        let record: DependencyRecord =
            serde_json::from_str(r#"{"files": ["a.h"], "values": ["-O2"]}"#).unwrap();
        assert_eq!(record.inputs, 0);
        assert!(record.input_files().is_empty());
    }

    #[test]
    fn store_locations_are_flat() {
        let store = RecordStore::new("/b/.deps/app");
        assert_eq!(
            store.location("src/core/io.cpp.o"),
            PathBuf::from("/b/.deps/app/src_core_io.cpp.o.json")
        );
    }

    #[test]
    fn store_invalidate_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("deps"));
        store.save("main.o", &sample()).unwrap();
        assert!(store.load("main.o").is_some());
        store.invalidate("main.o").unwrap();
        assert!(store.load("main.o").is_none());
        store.invalidate("main.o").unwrap();
        store.save("main.o", &sample()).unwrap();
        store.clean().unwrap();
        assert!(!store.root().exists());
        store.clean().unwrap();
    }
}
