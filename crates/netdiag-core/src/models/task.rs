//! Diagnostic task descriptor

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use netdiag_tools::validate_address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Transport protocol of the failing flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// ICMP
    Icmp,
    /// TCP
    #[default]
    Tcp,
    /// UDP
    Udp,
}

impl Protocol {
    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" => Ok(Self::Icmp),
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(Error::InvalidTask(format!("unknown protocol: {other}"))),
        }
    }
}

/// Fault category, selects the seed plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    /// Host unreachable
    Connectivity,
    /// Port closed, filtered or not listening
    #[default]
    PortUnreachable,
    /// Degraded latency or throughput
    Slow,
    /// Name resolution failure
    Dns,
}

impl FaultType {
    /// snake_case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::PortUnreachable => "port_unreachable",
            Self::Slow => "slow",
            Self::Dns => "dns",
        }
    }
}

impl std::fmt::Display for FaultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FaultType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "connectivity" => Ok(Self::Connectivity),
            "port_unreachable" => Ok(Self::PortUnreachable),
            "slow" => Ok(Self::Slow),
            "dns" => Ok(Self::Dns),
            other => Err(Error::InvalidTask(format!("unknown fault type: {other}"))),
        }
    }
}

/// What to diagnose. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticTask {
    /// Task id
    pub task_id: Uuid,
    /// Operator's description of the problem
    pub description: String,
    /// Host the traffic originates from
    pub source: String,
    /// Host the traffic is destined for
    pub target: String,
    /// Protocol
    pub protocol: Protocol,
    /// Destination port, required for port faults
    pub port: Option<u16>,
    /// Fault category
    pub fault_type: FaultType,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl DiagnosticTask {
    /// Create a TCP task between two hosts
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        fault_type: FaultType,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            task_id: Uuid::new_v4(),
            description: format!("{source} cannot reach {target}"),
            source,
            target,
            protocol: Protocol::Tcp,
            port: None,
            fault_type,
            created_at: Utc::now(),
        }
    }

    /// Set the destination port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the protocol
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the task is runnable
    pub fn validate(&self) -> Result<()> {
        validate_address(&self.source)
            .map_err(|e| Error::InvalidTask(format!("source: {e}")))?;
        validate_address(&self.target)
            .map_err(|e| Error::InvalidTask(format!("target: {e}")))?;
        if self.fault_type == FaultType::PortUnreachable && self.port.is_none() {
            return Err(Error::InvalidTask(
                "port_unreachable diagnosis requires a port".to_string(),
            ));
        }
        if self.port == Some(0) {
            return Err(Error::InvalidTask("port 0 is not a valid target".to_string()));
        }
        Ok(())
    }
}
