//! Failed-hop inference from a traceroute and the inventory path

use super::traceroute::TraceRoute;
use netdiag_tools::PathDevice;
use serde::{Deserialize, Serialize};

/// Kind of device suspected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// No failure on the path
    None,
    /// Top-of-rack switch
    LeafSwitch,
    /// Aggregation switch
    SpineSwitch,
    /// End host
    Server,
    /// Could not classify
    Unknown,
}

impl DeviceType {
    fn from_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("leaf") {
            Self::LeafSwitch
        } else if name.contains("spine") {
            Self::SpineSwitch
        } else if name.contains("server") {
            Self::Server
        } else {
            Self::Unknown
        }
    }

    /// snake_case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LeafSwitch => "leaf_switch",
            Self::SpineSwitch => "spine_switch",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

/// Suspected failure point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedHop {
    /// Hop number of the first silent hop, 0 when none
    pub failed_hop_number: u32,
    /// Device name from the inventory path
    pub failed_device_name: Option<String>,
    /// Device classification
    pub failed_device_type: DeviceType,
    /// Last address that answered
    pub last_reachable_ip: Option<String>,
    /// Confidence in the inference
    pub confidence: f64,
    /// How the inference was made
    pub reasoning: String,
}

/// Locate the device after the last answering hop on `path`
#[must_use]
pub fn identify_failed_hop(trace: &TraceRoute, path: &[PathDevice]) -> FailedHop {
    let last_reachable_ip = trace.last_reachable_ip().map(str::to_string);

    let Some(failed_hop_number) = trace.first_timeout_hop else {
        return FailedHop {
            failed_hop_number: 0,
            failed_device_name: None,
            failed_device_type: DeviceType::None,
            last_reachable_ip,
            confidence: 1.0,
            reasoning: "traceroute finished without silent hops".to_string(),
        };
    };

    let anchor = last_reachable_ip.as_deref().and_then(|ip| {
        path.iter()
            .position(|d| !d.ip.is_empty() && d.ip == ip)
    });

    if let Some((reached, failed)) = anchor.and_then(|i| Some((&path[i], path.get(i + 1)?))) {
        let failed_device_type = if failed.ip.is_empty() {
            DeviceType::Unknown
        } else {
            DeviceType::from_name(&failed.name)
        };
        return FailedHop {
            failed_hop_number,
            failed_device_name: Some(failed.name.clone()),
            failed_device_type,
            last_reachable_ip,
            confidence: 0.85,
            reasoning: format!(
                "last reachable device is {}, next hop on the inventory path is {}",
                reached.name, failed.name
            ),
        };
    }

    FailedHop {
        failed_hop_number,
        failed_device_name: None,
        failed_device_type: DeviceType::Unknown,
        last_reachable_ip,
        confidence: 0.5,
        reasoning: "no inventory device matches the last reachable hop; check the path manually"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::traceroute::TraceHop;

    fn trace(last_ip: Option<&str>, first_timeout: Option<u32>) -> TraceRoute {
        let last = last_ip.map(|ip| TraceHop {
            hop_number: 2,
            ip_address: Some(ip.to_string()),
            hostname: Some(ip.to_string()),
            rtt_ms: Some(1.0),
            is_timeout: false,
        });
        TraceRoute {
            target_ip: "10.0.2.20".to_string(),
            hops: last.clone().into_iter().collect(),
            last_reachable_hop: last,
            first_timeout_hop: first_timeout,
            is_complete: false,
        }
    }

    fn path() -> Vec<PathDevice> {
        vec![
            PathDevice::new("leaf-01", "10.0.1.1"),
            PathDevice::new("spine-01", "10.10.1.1"),
            PathDevice::new("leaf-02", "10.0.2.1"),
            PathDevice::new("server-db-01", ""),
        ]
    }

    #[test]
    fn test_next_device_is_blamed() {
        let hop = identify_failed_hop(&trace(Some("10.10.1.1"), Some(3)), &path());
        assert_eq!(hop.failed_hop_number, 3);
        assert_eq!(hop.failed_device_name.as_deref(), Some("leaf-02"));
        assert_eq!(hop.failed_device_type, DeviceType::LeafSwitch);
        assert_eq!(hop.confidence, 0.85);
    }

    #[test]
    fn test_device_without_details_is_unknown_type() {
        let hop = identify_failed_hop(&trace(Some("10.0.2.1"), Some(4)), &path());
        assert_eq!(hop.failed_device_name.as_deref(), Some("server-db-01"));
        assert_eq!(hop.failed_device_type, DeviceType::Unknown);
    }

    #[test]
    fn test_no_timeout() {
        let hop = identify_failed_hop(&trace(Some("10.0.2.20"), None), &path());
        assert_eq!(hop.failed_hop_number, 0);
        assert_eq!(hop.failed_device_type, DeviceType::None);
        assert_eq!(hop.confidence, 1.0);
    }

    #[test]
    fn test_no_topology_match() {
        let hop = identify_failed_hop(&trace(Some("192.168.9.9"), Some(3)), &path());
        assert_eq!(hop.failed_device_type, DeviceType::Unknown);
        assert_eq!(hop.confidence, 0.5);
        assert!(identify_failed_hop(&trace(None, Some(1)), &[]).failed_device_name.is_none());
    }

    #[test]
    fn test_classification() {
        assert_eq!(DeviceType::from_name("SPINE-02"), DeviceType::SpineSwitch);
        assert_eq!(DeviceType::from_name("fw-01"), DeviceType::Unknown);
    }
}
