//! Executor - runs probes and raw commands on hosts
//!
//! The executor is the only component that touches real machines. Two
//! implementations ship with the crate:
//! - [`LocalExecutor`]: runs commands through `sh -c` on this machine, for
//!   hosts that resolve to it
//! - [`ReplayExecutor`]: answers from a scripted scenario, for offline
//!   diagnosis and tests

use crate::command::CommandResult;
use crate::error::{Error, Result};
use crate::probe::{Probe, ProbeKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported by the replay executor for unscripted commands
pub const EXIT_UNSCRIPTED: i32 = 127;

/// Runs commands on hosts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Run a typed probe on `host`
    async fn run_probe(&self, host: &str, probe: &Probe, timeout: Duration)
        -> Result<CommandResult>;

    /// Run a free-form command on `host`
    async fn run_command(&self, host: &str, command: &str, timeout: Duration)
        -> Result<CommandResult>;
}

/// Executes commands on the local machine
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    local_hosts: Vec<String>,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            local_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "::1".to_string(),
            ],
        }
    }
}

impl LocalExecutor {
    /// Executor that treats the loopback names as local
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `host` as this machine as well
    #[must_use]
    pub fn with_local_host(mut self, host: impl Into<String>) -> Self {
        self.local_hosts.push(host.into());
        self
    }

    fn is_local(&self, host: &str) -> bool {
        self.local_hosts.iter().any(|h| h == host)
    }

    async fn spawn(&self, host: &str, command: &str, limit: Duration) -> Result<CommandResult> {
        if !self.is_local(host) {
            return Err(Error::Execution(format!(
                "no transport configured for host {host}"
            )));
        }

        debug!(host = %host, command = %command, "Running local command");
        let start = Instant::now();

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(command = %command, error = %e, "Failed to spawn command");
                Error::Execution(e.to_string())
            })?;

        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(limit.as_millis() as u64))?
            .map_err(|e| Error::Execution(e.to_string()))?;

        Ok(CommandResult::new(host, command)
            .with_stdout(String::from_utf8_lossy(&output.stdout))
            .with_stderr(String::from_utf8_lossy(&output.stderr))
            .with_exit_code(output.status.code().unwrap_or(-1))
            .with_execution_time(start.elapsed().as_secs_f64()))
    }
}

#[async_trait::async_trait]
impl Executor for LocalExecutor {
    async fn run_probe(
        &self,
        host: &str,
        probe: &Probe,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.spawn(host, &probe.command(), timeout).await
    }

    async fn run_command(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.spawn(host, command, timeout).await
    }
}

/// One scripted answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayRule {
    /// Host the rule applies to; any host when absent
    #[serde(default)]
    pub host: Option<String>,
    /// Probe kind the rule answers; when set, raw commands never match
    #[serde(default)]
    pub probe: Option<ProbeKind>,
    /// Substring the command text must contain
    #[serde(default)]
    pub command_contains: Option<String>,
    /// Scripted stdout
    #[serde(default)]
    pub stdout: String,
    /// Scripted stderr
    #[serde(default)]
    pub stderr: String,
    /// Scripted exit code
    #[serde(default)]
    pub exit_code: i32,
    /// Reported execution time in seconds
    #[serde(default)]
    pub execution_time: f64,
    /// Real delay before answering, in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}

impl ReplayRule {
    /// Rule answering every probe of `kind`
    #[must_use]
    pub fn for_probe(kind: ProbeKind) -> Self {
        Self {
            probe: Some(kind),
            ..Default::default()
        }
    }

    /// Rule answering commands containing `needle`
    #[must_use]
    pub fn for_command(needle: impl Into<String>) -> Self {
        Self {
            command_contains: Some(needle.into()),
            ..Default::default()
        }
    }

    /// Restrict to one host
    #[must_use]
    pub fn on_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set stdout
    #[must_use]
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Set stderr
    #[must_use]
    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Set the exit code
    #[must_use]
    pub fn exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Set the reported execution time
    #[must_use]
    pub fn execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = seconds;
        self
    }

    /// Delay the answer
    #[must_use]
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    fn matches(&self, host: &str, probe: Option<ProbeKind>, command: &str) -> bool {
        if self.host.as_deref().is_some_and(|h| h != host) {
            return false;
        }
        if let Some(kind) = self.probe {
            if probe != Some(kind) {
                return false;
            }
        }
        match &self.command_contains {
            Some(needle) => command.contains(needle.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Scenario {
    #[serde(default, rename = "rule")]
    rules: Vec<ReplayRule>,
}

/// Executor answering from scripted rules; first matching rule wins
#[derive(Debug, Default)]
pub struct ReplayExecutor {
    rules: Vec<ReplayRule>,
    history: Mutex<Vec<String>>,
}

impl ReplayExecutor {
    /// Create from rules
    #[must_use]
    pub fn new(rules: Vec<ReplayRule>) -> Self {
        Self {
            rules,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Append a rule
    #[must_use]
    pub fn with_rule(mut self, rule: ReplayRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Parse a TOML scenario made of `[[rule]]` tables
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)
            .map_err(|e| Error::InvalidInput(format!("scenario: {e}")))?;
        Ok(Self::new(scenario.rules))
    }

    /// Load a TOML scenario file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Commands answered so far, as `host: command`
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    async fn answer(
        &self,
        host: &str,
        probe: Option<ProbeKind>,
        command: &str,
        limit: Duration,
    ) -> Result<CommandResult> {
        if let Ok(mut history) = self.history.lock() {
            history.push(format!("{host}: {command}"));
        }

        let Some(rule) = self.rules.iter().find(|r| r.matches(host, probe, command)) else {
            debug!(host = %host, command = %command, "No scripted answer");
            return Ok(CommandResult::new(host, command)
                .with_stderr(format!("no scripted output for '{command}' on {host}"))
                .with_exit_code(EXIT_UNSCRIPTED));
        };

        if rule.delay_ms > 0 {
            let delay = Duration::from_millis(rule.delay_ms);
            if delay > limit {
                tokio::time::sleep(limit).await;
                return Err(Error::Timeout(limit.as_millis() as u64));
            }
            tokio::time::sleep(delay).await;
        }

        Ok(CommandResult::new(host, command)
            .with_stdout(rule.stdout.clone())
            .with_stderr(rule.stderr.clone())
            .with_exit_code(rule.exit_code)
            .with_execution_time(rule.execution_time))
    }
}

#[async_trait::async_trait]
impl Executor for ReplayExecutor {
    async fn run_probe(
        &self,
        host: &str,
        probe: &Probe,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.answer(host, Some(probe.kind()), &probe.command(), timeout)
            .await
    }

    async fn run_command(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.answer(host, None, command, timeout).await
    }
}
