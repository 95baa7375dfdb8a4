//! Opaque build-affecting values tracked alongside files.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A non-file input whose change invalidates a unit: the compiler path, a
/// flag list, a toolchain version string.
///
/// Equality is structural: values of different variants are never equal,
/// scalars compare by content, and lists compare element by element in
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackedValue {
    /// A boolean switch.
    Bool(bool),
    /// An integer, e.g. a language standard level.
    Int(i64),
    /// A string, e.g. a program path or version.
    Str(String),
    /// An ordered list, e.g. a flag vector.
    List(Vec<TrackedValue>),
}

/// How two tracked values differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDiff {
    /// The values are of different kinds (scalar vs list, string vs integer).
    Kind,
    /// Two scalars of the same kind hold different content.
    Content,
    /// Two lists have different lengths.
    Length,
    /// Two lists first differ at this position.
    Element(usize),
}

impl TrackedValue {
    /// Compares `self` against `other` and describes the first difference.
    ///
    /// Returns `None` when the values are structurally equal.
    pub fn diff(&self, other: &TrackedValue) -> Option<ValueDiff> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => (a != b).then_some(ValueDiff::Content),
            (Self::Int(a), Self::Int(b)) => (a != b).then_some(ValueDiff::Content),
            (Self::Str(a), Self::Str(b)) => (a != b).then_some(ValueDiff::Content),
            (Self::List(a), Self::List(b)) => {
                if a.len() != b.len() {
                    return Some(ValueDiff::Length);
                }
                a.iter()
                    .zip(b)
                    .position(|(x, y)| x.diff(y).is_some())
                    .map(ValueDiff::Element)
            }
            _ => Some(ValueDiff::Kind),
        }
    }

    /// Builds a list value from anything yielding strings.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Str(s.into())).collect())
    }
}

impl fmt::Display for TrackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for TrackedValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for TrackedValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&Path> for TrackedValue {
    fn from(p: &Path) -> Self {
        Self::Str(p.to_string_lossy().into_owned())
    }
}

impl From<i64> for TrackedValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for TrackedValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for TrackedValue {
    fn from(v: Vec<String>) -> Self {
        Self::list(v)
    }
}

impl From<&[String]> for TrackedValue {
    fn from(v: &[String]) -> Self {
        Self::list(v.iter().cloned())
    }
}
