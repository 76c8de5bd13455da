//! Traceroute hop list

use netdiag_tools::CommandResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"traceroute to \S*?\(?([\d.]+)\)?").expect("TARGET is a compile-time constant")
});

static HOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s+(\S+)\s+\(([\d.]+)\)\s+([\d.]+)\s+ms")
        .expect("HOP is a compile-time constant")
});

static SILENT_HOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s+\*\s+\*\s+\*").expect("SILENT_HOP is a compile-time constant")
});

/// One hop of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHop {
    /// Hop number
    pub hop_number: u32,
    /// Address that answered
    pub ip_address: Option<String>,
    /// Name printed for the address
    pub hostname: Option<String>,
    /// First round trip, ms
    pub rtt_ms: Option<f64>,
    /// Whether every probe of this hop went unanswered
    pub is_timeout: bool,
}

/// Parsed traceroute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRoute {
    /// Destination address from the header
    pub target_ip: String,
    /// Hops in order
    pub hops: Vec<TraceHop>,
    /// Last hop that answered
    pub last_reachable_hop: Option<TraceHop>,
    /// First hop that went silent
    pub first_timeout_hop: Option<u32>,
    /// Whether the last answering hop is the destination
    pub is_complete: bool,
}

impl TraceRoute {
    /// Address of the last answering hop
    #[must_use]
    pub fn last_reachable_ip(&self) -> Option<&str> {
        self.last_reachable_hop
            .as_ref()
            .and_then(|h| h.ip_address.as_deref())
    }
}

/// Parse traceroute output
#[must_use]
pub fn parse_traceroute(result: &CommandResult) -> TraceRoute {
    let stdout = &result.stdout;
    let target_ip = TARGET
        .captures(stdout)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    let mut hops = Vec::new();
    let mut last_reachable_hop: Option<TraceHop> = None;
    let mut first_timeout_hop = None;

    for line in stdout.lines() {
        if let Some(c) = HOP.captures(line) {
            let hop = TraceHop {
                hop_number: c[1].parse().unwrap_or(0),
                ip_address: Some(c[3].to_string()),
                hostname: Some(c[2].to_string()),
                rtt_ms: c[4].parse().ok(),
                is_timeout: false,
            };
            last_reachable_hop = Some(hop.clone());
            hops.push(hop);
        } else if let Some(c) = SILENT_HOP.captures(line) {
            let hop_number = c[1].parse().unwrap_or(0);
            first_timeout_hop.get_or_insert(hop_number);
            hops.push(TraceHop {
                hop_number,
                ip_address: None,
                hostname: None,
                rtt_ms: None,
                is_timeout: true,
            });
        }
    }

    let is_complete = last_reachable_hop
        .as_ref()
        .and_then(|h| h.ip_address.as_deref())
        .is_some_and(|ip| !target_ip.is_empty() && ip == target_ip);

    TraceRoute {
        target_ip,
        hops,
        last_reachable_hop,
        first_timeout_hop,
        is_complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(stdout: &str) -> TraceRoute {
        parse_traceroute(&CommandResult::new("10.0.1.10", "traceroute").with_stdout(stdout))
    }

    #[test]
    fn test_broken_path() {
        let trace = parse(
            "traceroute to 10.0.2.20 (10.0.2.20), 30 hops max, 60 byte packets\n \
             1  10.0.1.1 (10.0.1.1)  0.512 ms  0.389 ms  0.301 ms\n \
             2  10.10.1.1 (10.10.1.1)  1.234 ms  1.123 ms  1.089 ms\n \
             3  * * *\n \
             4  * * *",
        );
        assert_eq!(trace.target_ip, "10.0.2.20");
        assert_eq!(trace.hops.len(), 4);
        assert_eq!(trace.first_timeout_hop, Some(3));
        assert_eq!(trace.last_reachable_ip(), Some("10.10.1.1"));
        assert_eq!(trace.hops[0].rtt_ms, Some(0.512));
        assert!(!trace.is_complete);
    }

    #[test]
    fn test_complete_after_midpath_timeout() {
        let trace = parse(
            "traceroute to 10.0.2.20 (10.0.2.20), 30 hops max\n \
             1  10.0.1.1 (10.0.1.1)  0.5 ms\n \
             2  * * *\n \
             3  10.0.2.20 (10.0.2.20)  1.9 ms",
        );
        assert_eq!(trace.first_timeout_hop, Some(2));
        assert!(trace.is_complete);
    }

    #[test]
    fn test_named_hops() {
        let trace = parse(
            "traceroute to db-01 (10.0.2.20), 30 hops max\n \
             1  leaf-01.dc1 (10.0.1.1)  0.5 ms  0.4 ms  0.4 ms",
        );
        assert_eq!(trace.target_ip, "10.0.2.20");
        assert_eq!(trace.hops[0].hostname.as_deref(), Some("leaf-01.dc1"));
        assert_eq!(trace.hops[0].ip_address.as_deref(), Some("10.0.1.1"));
    }

    #[test]
    fn test_garbage() {
        let trace = parse("traceroute: unknown host");
        assert!(trace.hops.is_empty());
        assert!(trace.last_reachable_hop.is_none());
        assert!(!trace.is_complete);
    }
}
