//! One executed step

use crate::parsers::{
    ConnectSignal, FailedHop, FirewallVerdict, HostCheck, PingStats, PortStatus, Signal,
    TraceRoute,
};
use netdiag_tools::CommandResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of one planned-and-executed action. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Sequence number, strictly increasing within a session
    pub step_number: u32,
    /// Human-readable step name
    pub step_name: String,
    /// Tool that ran
    pub action: String,
    /// Whether the action succeeded
    pub success: bool,
    /// Raw command outcome, for command-backed actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_result: Option<CommandResult>,
    /// Signals derived from the outcome
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Arguments, errors and other annotations
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Step the deterministic plan schedules next, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<u32>,
}

impl StepResult {
    /// Create a step with no command, signals or metadata
    #[must_use]
    pub fn new(
        step_number: u32,
        step_name: impl Into<String>,
        action: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            step_number,
            step_name: step_name.into(),
            action: action.into(),
            success,
            command_result: None,
            signals: Vec::new(),
            metadata: Map::new(),
            next_step: None,
        }
    }

    /// Attach the command outcome
    #[must_use]
    pub fn with_command(mut self, result: CommandResult) -> Self {
        self.command_result = Some(result);
        self
    }

    /// Attach a signal
    #[must_use]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the next planned step
    #[must_use]
    pub fn with_next_step(mut self, next: Option<u32>) -> Self {
        self.next_step = next;
        self
    }

    /// Command execution time in seconds, zero when no command ran
    #[must_use]
    pub fn execution_time(&self) -> f64 {
        self.command_result
            .as_ref()
            .map_or(0.0, |c| c.execution_time)
    }

    /// Connect-test classification, if this step carries one
    #[must_use]
    pub fn connect(&self) -> Option<&ConnectSignal> {
        self.signals.iter().find_map(|s| match s {
            Signal::Connect(c) => Some(c),
            _ => None,
        })
    }

    /// Port-listen status
    #[must_use]
    pub fn port_listen(&self) -> Option<&PortStatus> {
        self.signals.iter().find_map(|s| match s {
            Signal::PortListen(p) => Some(p),
            _ => None,
        })
    }

    /// Ping statistics
    #[must_use]
    pub fn ping(&self) -> Option<&PingStats> {
        self.signals.iter().find_map(|s| match s {
            Signal::Ping(p) => Some(p),
            _ => None,
        })
    }

    /// Firewall verdict
    #[must_use]
    pub fn firewall(&self) -> Option<&FirewallVerdict> {
        self.signals.iter().find_map(|s| match s {
            Signal::Firewall(f) => Some(f),
            _ => None,
        })
    }

    /// Traceroute result
    #[must_use]
    pub fn traceroute(&self) -> Option<&TraceRoute> {
        self.signals.iter().find_map(|s| match s {
            Signal::Traceroute(t) => Some(t),
            _ => None,
        })
    }

    /// Failed-hop inference
    #[must_use]
    pub fn failed_hop(&self) -> Option<&FailedHop> {
        self.signals.iter().find_map(|s| match s {
            Signal::FailedHop(f) => Some(f),
            _ => None,
        })
    }

    /// Inventory check
    #[must_use]
    pub fn host_check(&self) -> Option<&HostCheck> {
        self.signals.iter().find_map(|s| match s {
            Signal::HostCheck(h) => Some(h),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{ConnectOutcome, ConnectSignal};

    #[test]
    fn test_signal_accessors() {
        let step = StepResult::new(2, "Connect test", "telnet_test", false)
            .with_command(CommandResult::new("10.0.1.10", "telnet").with_execution_time(1.5))
            .with_signal(Signal::Connect(ConnectSignal {
                error_type: ConnectOutcome::Refused,
                confidence: 0.95,
            }))
            .with_next_step(Some(3));

        assert_eq!(step.connect().unwrap().error_type, ConnectOutcome::Refused);
        assert!(step.ping().is_none());
        assert!((step.execution_time() - 1.5).abs() < f64::EPSILON);
        assert_eq!(step.next_step, Some(3));
    }

    #[test]
    fn test_serde_round_trip() {
        let step = StepResult::new(1, "Verify hosts", "query_cmdb", true)
            .with_metadata("arguments", serde_json::json!({"hosts": ["a", "b"]}));
        let json = serde_json::to_string(&step).unwrap();
        let back: StepResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
        assert_eq!(back.execution_time(), 0.0);
    }
}
