//! execute_command - free-form command on a host

use crate::command::CommandResult;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::registry::{Tool, ToolDefinition, ToolOutcome, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Runs an arbitrary command through the executor
pub struct ExecuteCommandTool {
    definition: ToolDefinition,
    executor: Arc<dyn Executor>,
}

impl ExecuteCommandTool {
    /// Create the tool
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let definition = ToolDefinition::new(
            "execute_command",
            "Run a shell command on a host and return stdout, stderr and exit code",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "host": {"type": "string", "description": "Host to run on"},
                "command": {"type": "string", "description": "Command line"},
                "timeout": {"type": "integer", "description": "Timeout in seconds", "default": DEFAULT_TIMEOUT_SECS}
            },
            "required": ["host", "command"]
        }));
        Self {
            definition,
            executor,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ExecuteCommandTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value) -> Result<ToolOutcome> {
        let start = Instant::now();
        let host = input
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("missing 'host'".to_string()))?;
        let command = input
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidInput("missing 'command'".to_string()))?;
        let timeout = input
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        debug!(host = %host, command = %command, "Executing command");

        let result = match self
            .executor
            .run_command(host, command, Duration::from_secs(timeout))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(host = %host, error = %e, "Command could not run");
                CommandResult::not_run(host, command, e.to_string())
            }
        };

        let success = result.success;
        let error = (!success).then(|| format!("exit code {}", result.exit_code));
        let output = serde_json::to_value(&result).map_err(|e| Error::Execution(e.to_string()))?;
        Ok(ToolOutcome::Completed(ToolResult {
            success,
            output,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        }))
    }
}
