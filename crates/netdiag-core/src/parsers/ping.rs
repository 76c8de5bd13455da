//! Ping statistics

use netdiag_tools::CommandResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d+) packets transmitted, (\d+) (?:packets )?received,(?: \+\d+ errors,)? ([\d.]+)% packet loss",
    )
    .expect("SUMMARY is a compile-time constant")
});

static RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max/\w+ = ([\d.]+)/([\d.]+)/([\d.]+)")
        .expect("RTT is a compile-time constant")
});

/// Parsed ping summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    /// Echo requests sent
    pub packets_transmitted: u32,
    /// Echo replies received
    pub packets_received: u32,
    /// Loss percentage
    pub packet_loss: f64,
    /// Minimum round trip, ms
    pub rtt_min: Option<f64>,
    /// Average round trip, ms
    pub rtt_avg: Option<f64>,
    /// Maximum round trip, ms
    pub rtt_max: Option<f64>,
    /// Whether any reply came back
    pub is_reachable: bool,
}

impl PingStats {
    fn unreachable() -> Self {
        Self {
            packets_transmitted: 0,
            packets_received: 0,
            packet_loss: 100.0,
            rtt_min: None,
            rtt_avg: None,
            rtt_max: None,
            is_reachable: false,
        }
    }
}

/// Parse ping output; unparseable output counts as total loss
#[must_use]
pub fn parse_ping(result: &CommandResult) -> PingStats {
    let Some(summary) = SUMMARY.captures(&result.stdout) else {
        return PingStats::unreachable();
    };

    let packets_transmitted = summary[1].parse().unwrap_or(0);
    let packets_received = summary[2].parse().unwrap_or(0);
    let packet_loss: f64 = summary[3].parse().unwrap_or(100.0);
    let is_reachable = packet_loss < 100.0;

    let (rtt_min, rtt_avg, rtt_max) = match RTT.captures(&result.stdout) {
        Some(rtt) if is_reachable => (
            rtt[1].parse().ok(),
            rtt[2].parse().ok(),
            rtt[3].parse().ok(),
        ),
        _ => (None, None, None),
    };

    PingStats {
        packets_transmitted,
        packets_received,
        packet_loss,
        rtt_min,
        rtt_avg,
        rtt_max,
        is_reachable,
    }
}
