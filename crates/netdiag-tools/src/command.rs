//! Raw outcome of running one command on one host

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported when the command never ran (executor failure)
pub const EXIT_NOT_RUN: i32 = -1;

/// Output of a single command execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Command text as executed
    pub command: String,
    /// Host the command ran on
    pub host: String,
    /// Whether the command exited with status 0
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Process exit code, `-1` when the command could not be run at all
    pub exit_code: i32,
    /// Wall time in seconds
    pub execution_time: f64,
    /// When the command finished
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    /// Successful, empty result for `command` on `host`
    #[must_use]
    pub fn new(host: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            host: host.into(),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            execution_time: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Result for a command that could not be run
    #[must_use]
    pub fn not_run(
        host: impl Into<String>,
        command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            stderr: error.into(),
            exit_code: EXIT_NOT_RUN,
            ..Self::new(host, command)
        }
    }

    /// Set stdout
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Set stderr
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Set the exit code; success follows it
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self.success = exit_code == 0;
        self
    }

    /// Set the execution time in seconds
    #[must_use]
    pub fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = seconds;
        self
    }

    /// stdout followed by stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }
}
