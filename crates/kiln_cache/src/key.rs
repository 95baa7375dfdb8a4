//! Cache keys for compiled objects.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use kiln_common::{ContentHash, ContentHasher, ToolchainKind};

use crate::error::CacheError;

/// Environment variables whose values change MSVC-family output.
pub const ENV_SENSITIVE_VARS: [&str; 3] = ["WindowsSDKVersion", "VCToolsVersion", "LIB"];

/// A 128-bit key identifying one compilation's cacheable output.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(ContentHash);

impl CacheKey {
    /// Computes the key for compiling `preprocessed` with `program` and `flags`.
    ///
    /// Flags are sorted first, so call sites that assemble the same flags in
    /// a different order share entries. `env` is consulted only for
    /// toolchains whose output depends on it.
    pub fn compute(
        program: &Path,
        preprocessed: &Path,
        flags: &[String],
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<Self, CacheError> {
        let source_hash =
            ContentHash::from_file(preprocessed).map_err(|e| CacheError::io(preprocessed, e))?;
        Ok(Self::from_parts(program, source_hash, flags, env))
    }

    /// Computes the key from an already-hashed preprocessed source.
    pub fn from_parts(
        program: &Path,
        source_hash: ContentHash,
        flags: &[String],
        env: Option<&BTreeMap<String, String>>,
    ) -> Self {
        let mut sorted: Vec<&String> = flags.iter().collect();
        sorted.sort();

        let mut hasher = ContentHasher::new();
        hasher.item(program.to_string_lossy().as_bytes());
        for flag in sorted {
            hasher.item(flag);
        }
        hasher.item(source_hash.to_hex());

        let env_sensitive = ToolchainKind::detect(program).is_some_and(ToolchainKind::is_env_sensitive);
        if let (true, Some(env)) = (env_sensitive, env) {
            for name in ENV_SENSITIVE_VARS {
                if let Some(value) = env.get(name) {
                    hasher.item(format!("{name}={value}"));
                }
            }
        }
        Self(hasher.finish())
    }

    /// Captures the environment-sensitive variables from this process.
    pub fn process_env() -> BTreeMap<String, String> {
        ENV_SENSITIVE_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect()
    }

    /// The two-character shard directory name.
    pub fn shard(&self) -> String {
        let hex = self.0.to_hex();
        hex[..2].to_string()
    }

    /// The full hex rendering.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.0)
    }
}
