//! Child process execution.
//!
//! [`ProcessRunner`] is the only place in the crate that spawns a process.
//! Callers pass an argument vector; no shell ever sees it.

mod control;
mod runner;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use control::{exit_code_of, force_kill_tree};
pub use runner::ProcessRunner;

/// Exit code reported when a child was killed at its timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code for rejected arguments and spawn failures.
pub const EXIT_FAILURE: i32 = 1;

/// Default limit for dependency-manager operations.
pub const COMPOSER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default limit for Artisan commands.
pub const ARTISAN_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Captured output beyond this many bytes per stream is dropped.
const MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024;

/// Grace period for output readers after a child was killed.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one child process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub success: bool,
    /// stdout followed by stderr.
    pub output: String,
    pub exit_code: i32,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl ProcessResult {
    /// Result for an invocation that was refused before spawning.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            exit_code: EXIT_FAILURE,
            duration_ms: 0,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.exit_code == EXIT_TIMEOUT && !self.success
    }

    /// Last non-empty lines of the output, for error messages.
    pub fn tail(&self, lines: usize) -> String {
        let collected: Vec<&str> = self
            .output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = collected.len().saturating_sub(lines);
        collected[start..].join("\n")
    }
}

/// Executable plus any leading arguments the addon resolved itself, such as
/// the path to `composer.phar` or `artisan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub executable: PathBuf,
    pub leading_args: Vec<PathBuf>,
}

impl Program {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            leading_args: Vec::new(),
        }
    }

    /// Run `script` with `interpreter`, e.g. `php composer.phar`.
    pub fn script(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            executable: interpreter.into(),
            leading_args: vec![script.into()],
        }
    }

    pub fn display_name(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.leading_args.iter().map(|a| a.display().to_string()));
        parts.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
    /// Skip the per-invocation info logs.
    pub quiet: bool,
}

impl RunOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cwd: None,
            timeout,
            env: Vec::new(),
            quiet: false,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(ARTISAN_TIMEOUT)
    }
}

/// Something that runs a program to completion and reports a [`ProcessResult`].
///
/// Implementations never fail: spawn errors, non-zero exits and timeouts are
/// all reported inside the result.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(&self, program: &Program, args: &[String], options: &RunOptions) -> ProcessResult;
}
