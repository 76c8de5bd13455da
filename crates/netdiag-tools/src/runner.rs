//! Runner - Tool execution engine
//!
//! Looks tools up by name, validates their input and enforces the
//! per-invocation timeout. A tool that returns an error is reported as a
//! failed [`ToolResult`]; a tool that overruns its timeout is reported as
//! [`Error::Timeout`] so the caller can record it as such.

use crate::error::{Error, Result};
use crate::registry::{ToolOutcome, ToolRegistry, ToolResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

/// Configuration for the tool runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Timeout used when the caller supplies none
    pub default_timeout: Duration,
    /// Upper bound on any caller-supplied timeout
    pub max_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(300),
        }
    }
}

impl RunnerConfig {
    /// Set the default timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the maximum timeout
    #[must_use]
    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }
}

/// Options for a single tool execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Timeout for this execution
    pub timeout: Option<Duration>,
}

impl ExecutionOptions {
    /// Options with a specific timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Tool execution result with additional metadata
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// What the tool produced
    pub outcome: ToolOutcome,
    /// Tool name
    pub tool_name: String,
    /// Wall time spent in the tool
    pub elapsed: Duration,
}

/// Executes registered tools
#[derive(Clone)]
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    config: RunnerConfig,
}

impl ToolRunner {
    /// Create a new tool runner
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(registry: Arc<ToolRegistry>) -> Self {
        Self::new(registry, RunnerConfig::default())
    }

    /// Get the registry
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a tool with the default timeout
    pub async fn execute(&self, tool_name: &str, input: serde_json::Value) -> Result<ExecutionResult> {
        self.execute_with_options(tool_name, input, ExecutionOptions::default())
            .await
    }

    /// Execute a tool with custom options
    #[instrument(skip(self, input, options), fields(tool = %tool_name))]
    pub async fn execute_with_options(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| Error::NotFound(tool_name.to_string()))?;

        tool.validate_input(&input)?;

        let execution_timeout = options
            .timeout
            .unwrap_or(self.config.default_timeout)
            .min(self.config.max_timeout);

        let start = Instant::now();
        debug!(tool = %tool_name, timeout_ms = %execution_timeout.as_millis(), "Executing tool");

        let outcome = match timeout(execution_timeout, tool.execute(input)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let duration = start.elapsed().as_millis() as u64;
                error!(tool = %tool_name, error = %e, "Tool execution failed");
                ToolOutcome::Completed(ToolResult::failure(e.to_string(), duration))
            }
            Err(_) => {
                warn!(tool = %tool_name, timeout_ms = %execution_timeout.as_millis(), "Tool execution timed out");
                return Err(Error::Timeout(execution_timeout.as_millis() as u64));
            }
        };

        let elapsed = start.elapsed();
        debug!(
            tool = %tool_name,
            completed = %outcome.result().is_some(),
            elapsed_ms = %elapsed.as_millis(),
            "Tool execution finished"
        );

        Ok(ExecutionResult {
            outcome,
            tool_name: tool_name.to_string(),
            elapsed,
        })
    }
}
