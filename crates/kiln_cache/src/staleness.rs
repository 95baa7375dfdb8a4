//! Change detection and the scoped run-if-changed protocol.
//!
//! A unit is stale when its record cannot prove that the current inputs are
//! the ones it was last built from. File inputs are compared by modification
//! time against a reference time, normally the record file's own mtime. The
//! record is only written after a successful build, so an interrupted
//! compile that left a fresh-looking output behind is still rebuilt.

use std::fmt;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::error::CacheError;
use crate::mtime::{file_mtime, MtimeCache};
use crate::record::{DependencyRecord, RecordUpdate};
use crate::value::{TrackedValue, ValueDiff};

/// Why a unit must be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// No record exists, or it could not be parsed.
    NoRecord,
    /// The record tracks nothing.
    EmptyRecord,
    /// A tracked file no longer exists.
    FileMissing(PathBuf),
    /// A tracked file is newer than the reference time.
    FileModified(PathBuf),
    /// The number of tracked values changed.
    ValueCount {
        /// Count in the record.
        previous: usize,
        /// Count supplied now.
        current: usize,
    },
    /// A tracked value changed.
    ValueChanged {
        /// Position in the value list.
        index: usize,
        /// How it changed.
        diff: ValueDiff,
    },
    /// The set of input files itself changed.
    FileListChanged,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecord => f.write_str("no previous build record"),
            Self::EmptyRecord => f.write_str("previous build record is empty"),
            Self::FileMissing(p) => write!(f, "{} is missing", p.display()),
            Self::FileModified(p) => write!(f, "{} was modified", p.display()),
            Self::ValueCount { previous, current } => {
                write!(f, "value count changed from {previous} to {current}")
            }
            Self::ValueChanged { index, diff } => match diff {
                ValueDiff::Element(i) => write!(f, "value #{index} changed at element {i}"),
                ValueDiff::Length => write!(f, "value #{index} changed length"),
                ValueDiff::Kind => write!(f, "value #{index} changed kind"),
                ValueDiff::Content => write!(f, "value #{index} changed"),
            },
            Self::FileListChanged => f.write_str("input file list changed"),
        }
    }
}

/// The inputs a unit would be built from now.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentInputs<'a> {
    /// Current opaque values, compared positionally with the record's.
    pub values: &'a [TrackedValue],
    /// The caller's explicit input files. When non-empty they must equal,
    /// in length and order, the inputs the record was built from; files the
    /// build discovered on its own are not compared.
    pub files: &'a [PathBuf],
    /// When set, `files` must match the record's whole file list, discovered
    /// files included.
    pub exact_files: bool,
}

/// Options for [`StalenessEngine::on_changed`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Where the unit's record is persisted.
    pub record: PathBuf,
    /// Tracked input files known before building (e.g. the source file).
    pub files: Vec<PathBuf>,
    /// Tracked opaque values (program, flags, versions).
    pub values: Vec<TrackedValue>,
    /// Require `files` to equal the record's file list exactly.
    pub exact_files: bool,
    /// Reference time for file comparisons; defaults to the record's mtime.
    pub reference_time: Option<FileTime>,
    /// Run unconditionally without reading or writing the record
    /// (dry runs and explicitly requested rebuilds).
    pub force: bool,
}

impl RunOptions {
    /// Options tracking nothing yet, persisted at `record`.
    pub fn new(record: impl Into<PathBuf>) -> Self {
        Self {
            record: record.into(),
            files: Vec::new(),
            values: Vec::new(),
            exact_files: false,
            reference_time: None,
            force: false,
        }
    }

    /// Tracks a file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Tracks a value.
    pub fn value(mut self, value: impl Into<TrackedValue>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Requires an exact file-list match.
    pub fn exact_files(mut self) -> Self {
        self.exact_files = true;
        self
    }

    /// Sets whether the action runs unconditionally.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of a run-if-changed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Inputs were unchanged; the action did not run. Carries the record.
    Skipped(DependencyRecord),
    /// The action ran and the returned record was persisted.
    Ran(DependencyRecord),
    /// The action ran unconditionally; nothing was persisted.
    Forced,
}

impl Outcome {
    /// Returns `true` if the action ran.
    pub fn ran(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }

    /// The record describing the unit after this call, if one was involved.
    pub fn record(&self) -> Option<&DependencyRecord> {
        match self {
            Self::Skipped(r) | Self::Ran(r) => Some(r),
            Self::Forced => None,
        }
    }
}

/// Decides whether units are stale and gates rebuild actions on it.
pub struct StalenessEngine<'a> {
    mtimes: &'a MtimeCache,
}

impl<'a> StalenessEngine<'a> {
    /// Creates an engine reading file times through `mtimes`.
    pub fn new(mtimes: &'a MtimeCache) -> Self {
        Self { mtimes }
    }

    /// The mtime cache this engine reads through.
    pub fn mtimes(&self) -> &'a MtimeCache {
        self.mtimes
    }

    /// Returns the first reason `record` fails to cover `current`, or `None`
    /// if the unit is up to date relative to `reference`.
    pub fn check(
        &self,
        record: Option<&DependencyRecord>,
        current: &CurrentInputs<'_>,
        reference: FileTime,
    ) -> Option<ChangeReason> {
        let Some(record) = record else {
            return Some(ChangeReason::NoRecord);
        };
        if record.is_empty() {
            return Some(ChangeReason::EmptyRecord);
        }

        for file in &record.files {
            let mtime = self.mtimes.mtime(file);
            if mtime == FileTime::zero() {
                return Some(ChangeReason::FileMissing(file.clone()));
            }
            if mtime > reference {
                return Some(ChangeReason::FileModified(file.clone()));
            }
        }

        if record.values.len() != current.values.len() {
            return Some(ChangeReason::ValueCount {
                previous: record.values.len(),
                current: current.values.len(),
            });
        }
        for (index, (prev, now)) in record.values.iter().zip(current.values).enumerate() {
            if let Some(diff) = prev.diff(now) {
                return Some(ChangeReason::ValueChanged { index, diff });
            }
        }

        let files_changed = if current.exact_files {
            record.files.as_slice() != current.files
        } else {
            !current.files.is_empty() && record.input_files() != current.files
        };
        if files_changed {
            return Some(ChangeReason::FileListChanged);
        }

        None
    }

    /// Returns `true` if the unit must be rebuilt.
    pub fn should_run(
        &self,
        record: Option<&DependencyRecord>,
        current: &CurrentInputs<'_>,
        reference: FileTime,
    ) -> bool {
        self.check(record, current, reference).is_some()
    }

    /// Loads the record at `location` and checks it, using the record
    /// file's mtime as the reference time.
    pub fn check_location(
        &self,
        location: &Path,
        current: &CurrentInputs<'_>,
    ) -> Option<ChangeReason> {
        let record = DependencyRecord::load(location);
        self.check(record.as_ref(), current, file_mtime(location))
    }

    /// Runs `action` only if the unit described by `opts` changed.
    ///
    /// On a rebuild, the new record tracks the caller's files followed by
    /// any files the action discovered, and the caller's current values.
    /// Extras from the previous record are kept unless the action replaces
    /// them. If the action fails nothing is written, so a half-built unit is
    /// never recorded as complete.
    pub fn on_changed<E, F>(&self, opts: &RunOptions, action: F) -> Result<Outcome, E>
    where
        F: FnOnce() -> Result<RecordUpdate, E>,
        E: From<CacheError>,
    {
        if opts.force {
            action()?;
            return Ok(Outcome::Forced);
        }

        let previous = DependencyRecord::load(&opts.record);
        let reference = opts
            .reference_time
            .unwrap_or_else(|| file_mtime(&opts.record));
        let current = CurrentInputs {
            values: &opts.values,
            files: &opts.files,
            exact_files: opts.exact_files,
        };
        let reason = match self.check(previous.as_ref(), &current, reference) {
            Some(reason) => reason,
            None => {
                tracing::trace!(record = %opts.record.display(), "up to date");
                return Ok(Outcome::Skipped(previous.unwrap_or_default()));
            }
        };
        tracing::debug!(record = %opts.record.display(), %reason, "rebuilding");

        let update = action()?;

        let mut record = DependencyRecord::new(opts.files.clone(), opts.values.clone());
        if let Some(previous) = previous {
            record.extras = previous.extras;
        }
        record.merge(update);
        record.save(&opts.record)?;
        self.mtimes.invalidate(&opts.record);
        Ok(Outcome::Ran(record))
    }
}
