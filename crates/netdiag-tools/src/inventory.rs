//! Inventory - host records and network topology
//!
//! The inventory answers two questions: does a host exist (and is it in
//! service), and which devices sit on the path between two hosts. The
//! static implementation reads both from a JSON document:
//!
//! ```json
//! {
//!   "servers": [{"ip": "10.0.1.10", "hostname": "web-01", "status": "active"}],
//!   "topology": {
//!     "web-01_to_db-01": {
//!       "path": ["leaf-01", "spine-01", "leaf-02"],
//!       "device_details": {"leaf-01": {"ip": "10.0.1.1"}}
//!     }
//!   }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Inventory record of a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Primary address
    pub ip: String,
    /// Host name
    #[serde(default)]
    pub hostname: String,
    /// Leaf switch the host hangs off
    #[serde(default)]
    pub leaf_switch: Option<String>,
    /// Rack location
    #[serde(default)]
    pub rack: Option<String>,
    /// Service status, e.g. `active` or `maintenance`
    #[serde(default = "default_status")]
    pub status: String,
    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_status() -> String {
    "active".to_string()
}

impl HostInfo {
    /// Whether the host is in service
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

/// A device on the path between two hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDevice {
    /// Device name, e.g. `leaf-01`
    pub name: String,
    /// Management address; empty when unknown
    pub ip: String,
}

impl PathDevice {
    /// Create a path device
    #[must_use]
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
        }
    }
}

/// Host and topology lookups
#[async_trait::async_trait]
pub trait Inventory: Send + Sync {
    /// Look up a host by address or name
    async fn host_info(&self, host: &str) -> Result<Option<HostInfo>>;

    /// Ordered devices between `source` and `target`, if known
    async fn topology_path(&self, source: &str, target: &str) -> Result<Option<Vec<PathDevice>>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DeviceDetail {
    #[serde(default)]
    ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TopologyEntry {
    #[serde(default)]
    path: Vec<String>,
    #[serde(default)]
    device_details: HashMap<String, DeviceDetail>,
}

/// Inventory backed by an in-memory document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticInventory {
    #[serde(default)]
    servers: Vec<HostInfo>,
    #[serde(default)]
    topology: HashMap<String, TopologyEntry>,
}

impl StaticInventory {
    /// Empty inventory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an inventory document
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Inventory(e.to_string()))
    }

    /// Load an inventory document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Add a server record
    #[must_use]
    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.servers.push(host);
        self
    }

    /// Add a path between two host names
    #[must_use]
    pub fn with_path(
        mut self,
        source: impl AsRef<str>,
        target: impl AsRef<str>,
        devices: Vec<PathDevice>,
    ) -> Self {
        let key = path_key(source.as_ref(), target.as_ref());
        let entry = TopologyEntry {
            path: devices.iter().map(|d| d.name.clone()).collect(),
            device_details: devices
                .into_iter()
                .map(|d| (d.name, DeviceDetail { ip: d.ip }))
                .collect(),
        };
        self.topology.insert(key, entry);
        self
    }

    /// Number of server records
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.servers.len()
    }

    fn find(&self, host: &str) -> Option<&HostInfo> {
        self.servers
            .iter()
            .find(|s| s.ip == host || (!s.hostname.is_empty() && s.hostname == host))
    }

    fn hostname_of<'a>(&'a self, host: &'a str) -> &'a str {
        match self.find(host) {
            Some(info) if !info.hostname.is_empty() => info.hostname.as_str(),
            _ => host,
        }
    }
}

fn path_key(source: &str, target: &str) -> String {
    format!("{source}_to_{target}")
}

#[async_trait::async_trait]
impl Inventory for StaticInventory {
    async fn host_info(&self, host: &str) -> Result<Option<HostInfo>> {
        Ok(self.find(host).cloned())
    }

    async fn topology_path(&self, source: &str, target: &str) -> Result<Option<Vec<PathDevice>>> {
        let key = path_key(self.hostname_of(source), self.hostname_of(target));
        Ok(self.topology.get(&key).map(|entry| {
            entry
                .path
                .iter()
                .map(|name| {
                    let ip = entry
                        .device_details
                        .get(name)
                        .map(|d| d.ip.clone())
                        .unwrap_or_default();
                    PathDevice::new(name.clone(), ip)
                })
                .collect()
        }))
    }
}
