//! Probe tools - one tool per probe kind

use crate::command::CommandResult;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::probe::{Probe, ProbeKind};
use crate::registry::{Tool, ToolDefinition, ToolOutcome, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs one kind of probe through the executor
pub struct ProbeTool {
    kind: ProbeKind,
    definition: ToolDefinition,
    executor: Arc<dyn Executor>,
}

fn host_property() -> Value {
    json!({"type": "string", "description": "Host to run the probe on"})
}

fn definition_for(kind: ProbeKind) -> ToolDefinition {
    let (description, parameters) = match kind {
        ProbeKind::ConnectTest => (
            "Open a TCP connection from host to target:port and report whether it succeeded",
            json!({
                "type": "object",
                "properties": {
                    "host": host_property(),
                    "target": {"type": "string", "description": "Destination address"},
                    "port": {"type": "integer", "description": "Destination port"},
                    "timeout": {"type": "integer", "description": "Connect timeout in seconds", "default": 5}
                },
                "required": ["host", "target", "port"]
            }),
        ),
        ProbeKind::PortListen => (
            "List listening sockets on host bound to the given port",
            json!({
                "type": "object",
                "properties": {
                    "host": host_property(),
                    "port": {"type": "integer", "description": "Port to look for"}
                },
                "required": ["host", "port"]
            }),
        ),
        ProbeKind::Ping => (
            "Send ICMP echo requests from host to target",
            json!({
                "type": "object",
                "properties": {
                    "host": host_property(),
                    "target": {"type": "string", "description": "Destination address"},
                    "count": {"type": "integer", "description": "Packets to send", "default": 4},
                    "timeout": {"type": "integer", "description": "Per-packet timeout in seconds", "default": 5}
                },
                "required": ["host", "target"]
            }),
        ),
        ProbeKind::FirewallRules => (
            "List the packet-filter rules of a chain on host",
            json!({
                "type": "object",
                "properties": {
                    "host": host_property(),
                    "port": {"type": "integer", "description": "Port of interest"},
                    "chain": {"type": "string", "enum": ["INPUT", "OUTPUT", "FORWARD"], "default": "INPUT"}
                },
                "required": ["host", "port"]
            }),
        ),
        ProbeKind::Traceroute => (
            "Trace the route from host to target",
            json!({
                "type": "object",
                "properties": {
                    "host": host_property(),
                    "target": {"type": "string", "description": "Destination address"},
                    "max_hops": {"type": "integer", "default": 30},
                    "timeout": {"type": "integer", "description": "Per-hop wait in seconds", "default": 3}
                },
                "required": ["host", "target"]
            }),
        ),
    };
    ToolDefinition::new(kind.as_str(), description).with_parameters(parameters)
}

impl ProbeTool {
    /// Create the tool for `kind`
    #[must_use]
    pub fn new(kind: ProbeKind, executor: Arc<dyn Executor>) -> Self {
        Self {
            kind,
            definition: definition_for(kind),
            executor,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ProbeTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value) -> Result<ToolOutcome> {
        let start = Instant::now();
        let host = input
            .get("host")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        crate::probe::validate_address(&host)?;
        let probe = Probe::from_arguments(self.kind, &input)?;
        let limit = probe.expected_duration();

        debug!(host = %host, probe = %self.kind, "Running probe");

        // Caller deadline is enforced by the runner.
        let command = match self
            .executor
            .run_probe(&host, &probe, limit.max(Duration::from_secs(1)))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(host = %host, probe = %self.kind, error = %e, "Probe could not run");
                CommandResult::not_run(&host, probe.command(), e.to_string())
            }
        };

        let duration = start.elapsed().as_millis() as u64;
        let success = command.success;
        let error = (!success).then(|| format!("exit code {}", command.exit_code));
        let output = serde_json::to_value(&command)
            .map_err(|e| Error::Execution(e.to_string()))?;

        Ok(ToolOutcome::Completed(ToolResult {
            success,
            output,
            error,
            duration_ms: duration,
        }))
    }
}
