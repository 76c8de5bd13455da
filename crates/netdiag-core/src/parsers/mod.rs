//! Parsers - raw command output to structured signals
//!
//! Every parser is a pure function of its input. None of them fail: output
//! that does not match the expected shape yields a conservative default
//! (unknown classification, not listening, 100% loss, and so on).

mod connect;
mod firewall;
mod host;
mod ping;
mod port;
mod topology;
mod traceroute;

pub use connect::{classify_connect, ConnectOutcome, ConnectSignal};
pub use firewall::{parse_firewall, FirewallVerdict};
pub use host::{parse_host_check, HostCheck, HostRecord};
pub use ping::{parse_ping, PingStats};
pub use port::{parse_port_listen, PortStatus};
pub use topology::{identify_failed_hop, DeviceType, FailedHop};
pub use traceroute::{parse_traceroute, TraceHop, TraceRoute};

use netdiag_tools::{Chain, CommandResult, Probe};
use serde::{Deserialize, Serialize};

/// Structured interpretation of one probe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Connect-test classification
    Connect(ConnectSignal),
    /// Listening-socket status
    PortListen(PortStatus),
    /// Ping statistics
    Ping(PingStats),
    /// Packet-filter verdict
    Firewall(FirewallVerdict),
    /// Traceroute hops
    Traceroute(TraceRoute),
    /// Inferred failing device on the path
    FailedHop(FailedHop),
    /// Inventory existence check
    HostCheck(HostCheck),
}

impl Signal {
    /// Short kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::PortListen(_) => "port_listen",
            Self::Ping(_) => "ping",
            Self::Firewall(_) => "firewall",
            Self::Traceroute(_) => "traceroute",
            Self::FailedHop(_) => "failed_hop",
            Self::HostCheck(_) => "host_check",
        }
    }
}

/// Interpret the result of `probe`
#[must_use]
pub fn parse_probe(probe: &Probe, result: &CommandResult) -> Signal {
    match probe {
        Probe::ConnectTest { .. } => Signal::Connect(classify_connect(result)),
        Probe::PortListen { port } => Signal::PortListen(parse_port_listen(result, *port)),
        Probe::Ping { .. } => Signal::Ping(parse_ping(result)),
        Probe::FirewallRules { chain, port } => {
            Signal::Firewall(parse_firewall(result, *chain, *port))
        }
        Probe::Traceroute { .. } => Signal::Traceroute(parse_traceroute(result)),
    }
}

/// Interpret a free-form command by recognising the probe it performs.
///
/// Returns `None` for commands that are not one of the known probes.
#[must_use]
pub fn parse_command(command: &str, result: &CommandResult, port: Option<u16>) -> Option<Signal> {
    let command = command.trim_start();
    let program = command.split_whitespace().next().unwrap_or_default();
    let signal = match program {
        "ping" => Signal::Ping(parse_ping(result)),
        "traceroute" | "tracepath" => Signal::Traceroute(parse_traceroute(result)),
        "iptables" if command.contains(" -L") => {
            let chain = [Chain::Output, Chain::Forward]
                .into_iter()
                .find(|c| command.contains(c.as_str()))
                .unwrap_or_default();
            Signal::Firewall(parse_firewall(result, chain, port?))
        }
        "ss" | "netstat" => Signal::PortListen(parse_port_listen(result, port?)),
        "telnet" | "nc" => Signal::Connect(classify_connect(result)),
        _ if command.contains("/dev/tcp/") => Signal::Connect(classify_connect(result)),
        _ => return None,
    };
    Some(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str, exit_code: i32) -> CommandResult {
        CommandResult::new("10.0.1.10", "probe")
            .with_stdout(stdout)
            .with_stderr(stderr)
            .with_exit_code(exit_code)
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let cases = [
            (
                Probe::connect_test("10.0.2.20", 80),
                result("FAILED", "bash: connect: Connection refused", 0),
            ),
            (
                Probe::ping("10.0.2.20"),
                result(
                    "4 packets transmitted, 3 received, 25% packet loss, time 3004ms\nrtt min/avg/max/mdev = 0.1/0.2/0.3/0.05 ms",
                    "",
                    0,
                ),
            ),
            (
                Probe::FirewallRules { chain: Chain::Input, port: 80 },
                result("Chain INPUT (policy DROP)\n", "", 0),
            ),
            (Probe::PortListen { port: 22 }, result("", "", 1)),
            (
                Probe::traceroute("10.0.2.20"),
                result("traceroute to 10.0.2.20 (10.0.2.20), 30 hops max\n 1  10.0.1.1 (10.0.1.1)  0.5 ms\n 2  * * *\n", "", 0),
            ),
        ];
        for (probe, raw) in cases {
            assert_eq!(parse_probe(&probe, &raw), parse_probe(&probe, &raw));
        }
    }

    #[test]
    fn test_signal_tagging() {
        let signal = parse_probe(&Probe::ping("10.0.2.20"), &result("garbage", "", 2));
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["signal"], "ping");
        assert_eq!(value["is_reachable"], false);
        let back: Signal = serde_json::from_value(value).unwrap();
        assert_eq!(back, signal);
        assert_eq!(back.kind(), "ping");
    }

    #[test]
    fn test_parse_free_form_command() {
        let ping = result("4 packets transmitted, 0 received, 100% packet loss", "", 1);
        assert!(matches!(
            parse_command("ping -c 4 10.0.2.20", &ping, None),
            Some(Signal::Ping(PingStats { is_reachable: false, .. }))
        ));

        let fw = result("Chain OUTPUT (policy DROP)\n", "", 0);
        match parse_command("iptables -L OUTPUT -n", &fw, Some(443)) {
            Some(Signal::Firewall(v)) => {
                assert_eq!(v.chain, Chain::Output);
                assert!(v.has_blocking_rule);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(parse_command("ss -tlnp", &result("", "", 1), None).is_none());
        assert!(parse_command("uptime", &result("up 3 days", "", 0), Some(80)).is_none());
        assert_eq!(
            parse_command("timeout 5 bash -c 'cat < /dev/tcp/10.0.2.20/80'", &result("", "Connection refused", 1), Some(80))
                .map(|s| s.kind()),
            Some("connect")
        );
    }
}
