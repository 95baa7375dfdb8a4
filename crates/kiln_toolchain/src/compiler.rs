//! The compiler invocation primitive.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured output of a successful compiler run.
#[derive(Debug, Clone, Default)]
pub struct CompilerOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error (warnings are reported here even on success).
    pub stderr: String,
}

/// A failed compiler invocation.
#[derive(Debug, thiserror::Error)]
pub enum CompileFailure {
    /// The program could not be started.
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        /// The program that failed to start.
        program: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The program ran and reported failure.
    #[error("{} exited with status {}\n{diagnostic}", .program.display(), exit_status(.status))]
    Failed {
        /// The program that failed.
        program: PathBuf,
        /// Exit code, or `None` if terminated by a signal.
        status: Option<i32>,
        /// The compiler diagnostic (stderr, falling back to stdout).
        diagnostic: String,
    },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

impl CompileFailure {
    /// Convenience constructor for a failed run with a diagnostic.
    pub fn failed(program: &Path, diagnostic: impl Into<String>) -> Self {
        Self::Failed {
            program: program.to_path_buf(),
            status: Some(1),
            diagnostic: diagnostic.into(),
        }
    }

    /// Returns the compiler diagnostic text, if the compiler ran.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Spawn { .. } => None,
            Self::Failed { diagnostic, .. } => Some(diagnostic),
        }
    }
}

/// Runs a compiler program with an argument vector.
///
/// Implementations must be shareable across threads: header units are built
/// in parallel against one compiler.
pub trait Compiler: Send + Sync {
    /// Runs `program` with `args`, returning its output on success.
    fn run(&self, program: &Path, args: &[String]) -> Result<CompilerOutput, CompileFailure>;
}

/// A [`Compiler`] that spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessCompiler {
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl ProcessCompiler {
    /// Creates a compiler runner inheriting the current directory and environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every invocation from `dir`.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Adds an environment variable to every invocation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Compiler for ProcessCompiler {
    fn run(&self, program: &Path, args: &[String]) -> Result<CompilerOutput, CompileFailure> {
        tracing::debug!(program = %program.display(), args = ?args, "running compiler");
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        let output = cmd.output().map_err(|e| CompileFailure::Spawn {
            program: program.to_path_buf(),
            source: e,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(CompilerOutput { stdout, stderr })
        } else {
            // MSVC writes its diagnostics to stdout.
            let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(CompileFailure::Failed {
                program: program.to_path_buf(),
                status: output.status.code(),
                diagnostic,
            })
        }
    }
}
