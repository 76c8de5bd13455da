//! Inventory check interpretation

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inventory record of one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Host as asked
    pub host: String,
    /// Whether the inventory knows it
    pub exists: bool,
    /// Service status, if known
    pub status: Option<String>,
}

/// Result of an inventory lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCheck {
    /// One record per host, sorted by host
    pub hosts: Vec<HostRecord>,
    /// Whether every host exists
    pub all_exist: bool,
}

/// Interpret the `query_cmdb` tool output
#[must_use]
pub fn parse_host_check(output: &Value) -> HostCheck {
    let mut hosts: Vec<HostRecord> = output
        .get("hosts")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(host, record)| HostRecord {
                    host: host.clone(),
                    exists: record.get("exists").and_then(Value::as_bool).unwrap_or(false),
                    status: record
                        .get("status")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();
    hosts.sort_by(|a, b| a.host.cmp(&b.host));
    let all_exist = !hosts.is_empty() && hosts.iter().all(|h| h.exists);
    HostCheck { hosts, all_exist }
}
