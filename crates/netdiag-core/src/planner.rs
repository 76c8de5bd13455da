//! Planner - the deterministic fault-isolation step graph
//!
//! Steps are numbered so that every transition moves strictly forward:
//!
//! ```text
//! port_unreachable: 1 hosts -> 2 connect -> refused: 3 port listen
//!                                        -> timeout: 4 ping -> reachable:   5 firewall
//!                                                            -> unreachable: 6 traceroute
//! connectivity:     1 hosts -> 2 ping    -> unreachable: 6 traceroute
//!                                        -> reachable (port known): 5 firewall
//! ```
//!
//! Slow and DNS faults have no plan; they conclude immediately.

use crate::models::{DiagnosticTask, FaultType, StepResult};
use crate::parsers::ConnectOutcome;
use crate::policy::ToolInvocation;
use netdiag_tools::{Chain, Probe};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Inventory check of both hosts
pub const STEP_HOST_CHECK: u32 = 1;
/// First probe of the plan (connect test or ping)
pub const STEP_FIRST_PROBE: u32 = 2;
/// Listening-socket check on the target
pub const STEP_PORT_LISTEN: u32 = 3;
/// Ping after a connect timeout
pub const STEP_PING: u32 = 4;
/// Inbound firewall inspection on the target
pub const STEP_FIREWALL: u32 = 5;
/// Traceroute from the source
pub const STEP_TRACEROUTE: u32 = 6;

const HOST_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Display name of a step running `tool`
#[must_use]
pub fn step_label(tool: &str) -> &str {
    match tool {
        "query_cmdb" => "Verify hosts in inventory",
        "telnet_test" => "Connect test",
        "check_port_listen" => "Check port listening",
        "ping_test" => "Ping test",
        "check_firewall" => "Inspect firewall rules",
        "traceroute" => "Traceroute",
        "execute_command" => "Execute command",
        "ask_user" => "Ask operator",
        other => other,
    }
}

/// What a planned step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Look the hosts up in the inventory
    HostCheck {
        /// Hosts to verify
        hosts: Vec<String>,
    },
    /// Run a probe on a host
    Probe {
        /// Host the probe runs on
        host: String,
        /// The probe
        probe: Probe,
    },
}

/// One step of the deterministic plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step number
    pub number: u32,
    /// Display name
    pub name: String,
    /// Action
    pub kind: StepKind,
}

impl PlanStep {
    fn new(number: u32, kind: StepKind) -> Self {
        let mut step = Self {
            number,
            name: String::new(),
            kind,
        };
        step.name = step_label(step.tool_name()).to_string();
        step
    }

    /// Tool that performs this step
    #[must_use]
    pub fn tool_name(&self) -> &'static str {
        match &self.kind {
            StepKind::HostCheck { .. } => "query_cmdb",
            StepKind::Probe { probe, .. } => probe.kind().as_str(),
        }
    }

    /// Tool arguments
    #[must_use]
    pub fn arguments(&self) -> Value {
        match &self.kind {
            StepKind::HostCheck { hosts } => json!({ "hosts": hosts }),
            StepKind::Probe { host, probe } => probe.to_arguments(host),
        }
    }

    /// Invocation timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match &self.kind {
            StepKind::HostCheck { .. } => HOST_CHECK_TIMEOUT,
            StepKind::Probe { probe, .. } => probe.expected_duration(),
        }
    }

    /// Tool invocation carrying this step's number
    #[must_use]
    pub fn to_invocation(&self) -> ToolInvocation {
        ToolInvocation {
            call_id: format!("plan-{}", self.number),
            step_name: self.name.clone(),
            tool: self.tool_name().to_string(),
            arguments: self.arguments(),
            planned_step: Some(self.number),
            timeout: self.timeout(),
        }
    }
}

/// Deterministic decision engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    /// Create a planner
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build step `number` for `task`, if the task supports it
    #[must_use]
    pub fn plan_step(&self, task: &DiagnosticTask, number: u32) -> Option<PlanStep> {
        let source = || task.source.clone();
        let target = || task.target.clone();
        let kind = match number {
            STEP_HOST_CHECK => StepKind::HostCheck {
                hosts: vec![source(), target()],
            },
            STEP_FIRST_PROBE => match task.fault_type {
                FaultType::PortUnreachable => StepKind::Probe {
                    host: source(),
                    probe: Probe::connect_test(target(), task.port?),
                },
                FaultType::Connectivity => StepKind::Probe {
                    host: source(),
                    probe: Probe::ping(target()),
                },
                FaultType::Slow | FaultType::Dns => return None,
            },
            STEP_PORT_LISTEN => StepKind::Probe {
                host: target(),
                probe: Probe::PortListen { port: task.port? },
            },
            STEP_PING => StepKind::Probe {
                host: source(),
                probe: Probe::ping(target()),
            },
            STEP_FIREWALL => StepKind::Probe {
                host: target(),
                probe: Probe::FirewallRules {
                    chain: Chain::Input,
                    port: task.port?,
                },
            },
            STEP_TRACEROUTE => StepKind::Probe {
                host: source(),
                probe: Probe::traceroute(target()),
            },
            _ => return None,
        };
        Some(PlanStep::new(number, kind))
    }

    /// Steps every diagnosis of this fault category starts with
    #[must_use]
    pub fn seed_plan(&self, task: &DiagnosticTask) -> Vec<PlanStep> {
        match task.fault_type {
            FaultType::PortUnreachable | FaultType::Connectivity => [STEP_HOST_CHECK, STEP_FIRST_PROBE]
                .into_iter()
                .filter_map(|n| self.plan_step(task, n))
                .collect(),
            FaultType::Slow | FaultType::Dns => Vec::new(),
        }
    }

    /// Number of the step that follows `step`, chosen from its signal
    #[must_use]
    pub fn next_step_number(&self, task: &DiagnosticTask, step: &StepResult) -> Option<u32> {
        match (task.fault_type, step.step_number) {
            (FaultType::PortUnreachable, STEP_FIRST_PROBE) => match step.connect()?.error_type {
                ConnectOutcome::Refused => Some(STEP_PORT_LISTEN),
                ConnectOutcome::Timeout => Some(STEP_PING),
                ConnectOutcome::Success | ConnectOutcome::Unknown => None,
            },
            (FaultType::PortUnreachable, STEP_PING) => {
                if step.ping()?.is_reachable {
                    Some(STEP_FIREWALL)
                } else {
                    Some(STEP_TRACEROUTE)
                }
            }
            (FaultType::Connectivity, STEP_FIRST_PROBE) => {
                if !step.ping()?.is_reachable {
                    Some(STEP_TRACEROUTE)
                } else if task.port.is_some() {
                    Some(STEP_FIREWALL)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Step that follows `step`, or `None` when the plan is exhausted
    #[must_use]
    pub fn next_step(&self, task: &DiagnosticTask, step: &StepResult) -> Option<PlanStep> {
        self.next_step_number(task, step)
            .and_then(|n| self.plan_step(task, n))
    }
}
