//! Diagnostic probes
//!
//! A probe is a typed description of one measurement. Probes render to the
//! shell command an executor runs, and to the flat argument object the
//! matching tool accepts, so policies can build them without string
//! formatting of their own.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Default timeout for a TCP connect test, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Default ping packet count
pub const DEFAULT_PING_COUNT: u32 = 4;
/// Default per-packet ping timeout, in seconds
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 5;
/// Default traceroute hop limit
pub const DEFAULT_MAX_HOPS: u32 = 30;
/// Default traceroute per-hop wait, in seconds
pub const DEFAULT_TRACE_WAIT_SECS: u64 = 3;

/// Largest connect, ping or per-hop timeout accepted from tool arguments
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 60;
/// Largest ping packet count accepted from tool arguments
pub const MAX_PING_COUNT: u32 = 100;
/// Largest traceroute hop limit accepted from tool arguments
pub const MAX_HOPS: u32 = 64;

/// Packet-filter chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    /// Inbound traffic
    #[default]
    Input,
    /// Outbound traffic
    Output,
    /// Routed traffic
    Forward,
}

impl Chain {
    /// Chain name as iptables prints it
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::Forward => "FORWARD",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Probe discriminant, also the tool name exposing the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// TCP connect test
    ConnectTest,
    /// Listening-socket check
    PortListen,
    /// ICMP echo
    Ping,
    /// Packet-filter listing
    FirewallRules,
    /// Path trace
    Traceroute,
}

impl ProbeKind {
    /// All probe kinds
    pub const ALL: [ProbeKind; 5] = [
        Self::ConnectTest,
        Self::PortListen,
        Self::Ping,
        Self::FirewallRules,
        Self::Traceroute,
    ];

    /// Tool name for this probe
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectTest => "telnet_test",
            Self::PortListen => "check_port_listen",
            Self::Ping => "ping_test",
            Self::FirewallRules => "check_firewall",
            Self::Traceroute => "traceroute",
        }
    }

    /// Look up a probe kind by tool name
    #[must_use]
    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single diagnostic measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Open a TCP connection to `target:port`
    ConnectTest {
        /// Destination address
        target: String,
        /// Destination port
        port: u16,
        /// Connect timeout in seconds
        timeout_secs: u64,
    },
    /// List listening sockets bound to `port`
    PortListen {
        /// Port to look for
        port: u16,
    },
    /// Send ICMP echo requests to `target`
    Ping {
        /// Destination address
        target: String,
        /// Packets to send
        count: u32,
        /// Per-packet timeout in seconds
        timeout_secs: u64,
    },
    /// Dump the packet-filter rules of `chain`
    FirewallRules {
        /// Chain to list
        chain: Chain,
        /// Port the caller cares about
        port: u16,
    },
    /// Trace the route to `target`
    Traceroute {
        /// Destination address
        target: String,
        /// Hop limit
        max_hops: u32,
        /// Per-hop wait in seconds
        wait_secs: u64,
    },
}

/// Flat argument object accepted by the probe tools
#[derive(Debug, Default, Deserialize)]
struct ProbeArgs {
    target: Option<String>,
    port: Option<u16>,
    count: Option<u32>,
    timeout: Option<u64>,
    chain: Option<Chain>,
    max_hops: Option<u32>,
}

impl Probe {
    /// TCP connect test with the default timeout
    #[must_use]
    pub fn connect_test(target: impl Into<String>, port: u16) -> Self {
        Self::ConnectTest {
            target: target.into(),
            port,
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Ping with default count and timeout
    #[must_use]
    pub fn ping(target: impl Into<String>) -> Self {
        Self::Ping {
            target: target.into(),
            count: DEFAULT_PING_COUNT,
            timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
        }
    }

    /// Traceroute with default hop limit and wait
    #[must_use]
    pub fn traceroute(target: impl Into<String>) -> Self {
        Self::Traceroute {
            target: target.into(),
            max_hops: DEFAULT_MAX_HOPS,
            wait_secs: DEFAULT_TRACE_WAIT_SECS,
        }
    }

    /// Probe kind
    #[must_use]
    pub fn kind(&self) -> ProbeKind {
        match self {
            Self::ConnectTest { .. } => ProbeKind::ConnectTest,
            Self::PortListen { .. } => ProbeKind::PortListen,
            Self::Ping { .. } => ProbeKind::Ping,
            Self::FirewallRules { .. } => ProbeKind::FirewallRules,
            Self::Traceroute { .. } => ProbeKind::Traceroute,
        }
    }

    /// Port the probe concerns, if any
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::ConnectTest { port, .. }
            | Self::PortListen { port }
            | Self::FirewallRules { port, .. } => Some(*port),
            _ => None,
        }
    }

    /// Shell command that performs the probe
    #[must_use]
    pub fn command(&self) -> String {
        match self {
            Self::ConnectTest {
                target,
                port,
                timeout_secs,
            } => format!(
                "timeout {timeout_secs} bash -c 'cat < /dev/tcp/{target}/{port}' && echo SUCCESS || echo FAILED"
            ),
            Self::PortListen { port } => format!("ss -tunlp | grep ':{port}'"),
            Self::Ping {
                target,
                count,
                timeout_secs,
            } => format!("ping -c {count} -W {timeout_secs} {target}"),
            Self::FirewallRules { chain, .. } => format!("iptables -L {chain} -n -v"),
            Self::Traceroute {
                target,
                max_hops,
                wait_secs,
            } => format!("traceroute {target} -m {max_hops} -w {wait_secs}"),
        }
    }

    /// Upper bound on how long the probe should take
    #[must_use]
    pub fn expected_duration(&self) -> Duration {
        let secs = match self {
            Self::ConnectTest { timeout_secs, .. } => timeout_secs.saturating_add(5),
            Self::Ping {
                count,
                timeout_secs,
                ..
            } => u64::from(*count)
                .saturating_mul(*timeout_secs)
                .saturating_add(5),
            Self::Traceroute {
                max_hops,
                wait_secs,
                ..
            } => u64::from(*max_hops)
                .saturating_mul(*wait_secs)
                .saturating_mul(3)
                .min(300),
            Self::PortListen { .. } | Self::FirewallRules { .. } => 30,
        };
        Duration::from_secs(secs)
    }

    /// Tool arguments for running this probe on `host`
    #[must_use]
    pub fn to_arguments(&self, host: &str) -> Value {
        match self {
            Self::ConnectTest {
                target,
                port,
                timeout_secs,
            } => json!({"host": host, "target": target, "port": port, "timeout": timeout_secs}),
            Self::PortListen { port } => json!({"host": host, "port": port}),
            Self::Ping {
                target,
                count,
                timeout_secs,
            } => json!({"host": host, "target": target, "count": count, "timeout": timeout_secs}),
            Self::FirewallRules { chain, port } => {
                json!({"host": host, "chain": chain, "port": port})
            }
            Self::Traceroute {
                target,
                max_hops,
                wait_secs,
            } => json!({"host": host, "target": target, "max_hops": max_hops, "timeout": wait_secs}),
        }
    }

    /// Build a probe of `kind` from tool arguments, filling defaults.
    /// Counts, hop limits and timeouts are clamped to the `MAX_*` bounds.
    pub fn from_arguments(kind: ProbeKind, args: &Value) -> Result<Self> {
        let args: ProbeArgs = serde_json::from_value(args.clone())
            .map_err(|e| Error::InvalidInput(format!("{kind}: {e}")))?;
        let timeout = |default: u64| args.timeout.unwrap_or(default).min(MAX_PROBE_TIMEOUT_SECS);

        let target = || -> Result<String> {
            let target = args
                .target
                .clone()
                .ok_or_else(|| Error::InvalidInput(format!("{kind}: missing 'target'")))?;
            validate_address(&target)?;
            Ok(target)
        };
        let port = || -> Result<u16> {
            args.port
                .ok_or_else(|| Error::InvalidInput(format!("{kind}: missing 'port'")))
        };

        Ok(match kind {
            ProbeKind::ConnectTest => Self::ConnectTest {
                target: target()?,
                port: port()?,
                timeout_secs: timeout(DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            ProbeKind::PortListen => Self::PortListen { port: port()? },
            ProbeKind::Ping => Self::Ping {
                target: target()?,
                count: args.count.unwrap_or(DEFAULT_PING_COUNT).min(MAX_PING_COUNT),
                timeout_secs: timeout(DEFAULT_PING_TIMEOUT_SECS),
            },
            ProbeKind::FirewallRules => Self::FirewallRules {
                chain: args.chain.unwrap_or_default(),
                port: port()?,
            },
            ProbeKind::Traceroute => Self::Traceroute {
                target: target()?,
                max_hops: args.max_hops.unwrap_or(DEFAULT_MAX_HOPS).min(MAX_HOPS),
                wait_secs: timeout(DEFAULT_TRACE_WAIT_SECS),
            },
        })
    }
}

/// Reject host strings that could smuggle shell syntax into a probe command
pub fn validate_address(address: &str) -> Result<()> {
    let ok = !address.is_empty()
        && address.len() <= 253
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid address: {address:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_text() {
        assert_eq!(
            Probe::connect_test("10.0.2.20", 80).command(),
            "timeout 5 bash -c 'cat < /dev/tcp/10.0.2.20/80' && echo SUCCESS || echo FAILED"
        );
        assert_eq!(
            Probe::PortListen { port: 8080 }.command(),
            "ss -tunlp | grep ':8080'"
        );
        assert_eq!(Probe::ping("10.0.2.20").command(), "ping -c 4 -W 5 10.0.2.20");
        assert_eq!(
            Probe::FirewallRules {
                chain: Chain::Input,
                port: 80
            }
            .command(),
            "iptables -L INPUT -n -v"
        );
        assert_eq!(
            Probe::traceroute("10.0.2.20").command(),
            "traceroute 10.0.2.20 -m 30 -w 3"
        );
    }

    #[test]
    fn test_arguments_round_trip_with_defaults() {
        let args = json!({"host": "10.0.1.10", "target": "10.0.2.20"});
        let probe = Probe::from_arguments(ProbeKind::Ping, &args).unwrap();
        assert_eq!(probe, Probe::ping("10.0.2.20"));

        let trace = Probe::traceroute("10.0.2.20");
        let back =
            Probe::from_arguments(ProbeKind::Traceroute, &trace.to_arguments("10.0.1.10")).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn test_oversized_arguments_are_clamped() {
        let args = json!({"target": "10.0.2.20", "count": u32::MAX, "timeout": u64::MAX});
        let probe = Probe::from_arguments(ProbeKind::Ping, &args).unwrap();
        assert_eq!(
            probe,
            Probe::Ping {
                target: "10.0.2.20".to_string(),
                count: MAX_PING_COUNT,
                timeout_secs: MAX_PROBE_TIMEOUT_SECS,
            }
        );
        assert_eq!(probe.expected_duration(), Duration::from_secs(100 * 60 + 5));

        let args = json!({"target": "10.0.2.20", "max_hops": 1000, "timeout": 1_000_000});
        let trace = Probe::from_arguments(ProbeKind::Traceroute, &args).unwrap();
        assert!(matches!(trace, Probe::Traceroute { max_hops: MAX_HOPS, .. }));
        assert_eq!(trace.expected_duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_expected_duration_saturates() {
        let ping = Probe::Ping {
            target: "10.0.2.20".to_string(),
            count: u32::MAX,
            timeout_secs: u64::MAX,
        };
        assert_eq!(ping.expected_duration(), Duration::from_secs(u64::MAX));

        let connect = Probe::ConnectTest {
            target: "10.0.2.20".to_string(),
            port: 80,
            timeout_secs: u64::MAX,
        };
        assert_eq!(connect.expected_duration(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_missing_port_rejected() {
        let args = json!({"host": "h", "target": "10.0.2.20"});
        let err = Probe::from_arguments(ProbeKind::ConnectTest, &args).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        let args = json!({"host": "h", "target": "10.0.2.20; rm -rf /"});
        assert!(Probe::from_arguments(ProbeKind::Ping, &args).is_err());
        assert!(validate_address("db-01.example.com").is_ok());
        assert!(validate_address("fe80::1").is_ok());
        assert!(validate_address("").is_err());
    }

    #[test]
    fn test_kind_names() {
        for kind in ProbeKind::ALL {
            assert_eq!(ProbeKind::from_tool_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ProbeKind::from_tool_name("ask_user"), None);
    }

    #[test]
    fn test_serde_tagging() {
        let value = serde_json::to_value(Probe::PortListen { port: 22 }).unwrap();
        assert_eq!(value["kind"], "port_listen");
        let chain: Chain = serde_json::from_value(json!("FORWARD")).unwrap();
        assert_eq!(chain, Chain::Forward);
    }
}
