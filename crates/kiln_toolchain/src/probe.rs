//! Toolchain flag support queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Answers "does this compiler accept flag X".
pub trait FlagProbe: Send + Sync {
    /// Returns `true` if `program` accepts `flag`.
    fn has_flag(&self, program: &Path, flag: &str) -> bool;
}

/// Wraps a probe with a process-scoped answer cache.
///
/// Create one per build process and pass it by reference; each
/// `(program, flag)` pair reaches the inner probe at most once.
pub struct MemoizedProbe<P> {
    inner: P,
    answers: Mutex<HashMap<(PathBuf, String), bool>>,
}

impl<P: FlagProbe> MemoizedProbe<P> {
    /// Wraps `inner`.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            answers: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: FlagProbe> FlagProbe for MemoizedProbe<P> {
    fn has_flag(&self, program: &Path, flag: &str) -> bool {
        let key = (program.to_path_buf(), flag.to_string());
        if let Some(&known) = self.answers.lock().get(&key) {
            return known;
        }
        let answer = self.inner.has_flag(program, flag);
        self.answers.lock().insert(key, answer);
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
    }

    impl FlagProbe for CountingProbe {
        fn has_flag(&self, _program: &Path, flag: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            flag.starts_with("-fmodule")
        }
    }

    #[test]
    fn answers_are_memoized() {
        let probe = MemoizedProbe::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        let clang = Path::new("clang++");
        assert!(probe.has_flag(clang, "-fmodule-header"));
        assert!(probe.has_flag(clang, "-fmodule-header"));
        assert!(!probe.has_flag(clang, "-exportHeader"));
        assert_eq!(probe.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn keyed_by_program() {
        let probe = MemoizedProbe::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        probe.has_flag(Path::new("clang++-16"), "-fmodule-header");
        probe.has_flag(Path::new("clang++-17"), "-fmodule-header");
        assert_eq!(probe.inner.calls.load(Ordering::SeqCst), 2);
    }
}
