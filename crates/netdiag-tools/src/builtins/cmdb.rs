//! query_cmdb - inventory lookup

use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::registry::{Tool, ToolDefinition, ToolOutcome, ToolResult};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Looks hosts up in the inventory; succeeds only when every host exists
pub struct QueryCmdbTool {
    definition: ToolDefinition,
    inventory: Arc<dyn Inventory>,
}

impl QueryCmdbTool {
    /// Create the tool
    #[must_use]
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        let definition = ToolDefinition::new(
            "query_cmdb",
            "Check that hosts exist in the inventory and report their status",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "hosts": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Host addresses or names"
                }
            },
            "required": ["hosts"]
        }));
        Self {
            definition,
            inventory,
        }
    }
}

#[async_trait::async_trait]
impl Tool for QueryCmdbTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value) -> Result<ToolOutcome> {
        let start = Instant::now();
        let hosts: Vec<String> = input
            .get("hosts")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .ok_or_else(|| Error::InvalidInput("'hosts' must be an array".to_string()))?;
        if hosts.is_empty() {
            return Err(Error::InvalidInput("'hosts' is empty".to_string()));
        }

        let mut records = Map::new();
        let mut all_exist = true;
        for host in &hosts {
            let record = match self.inventory.host_info(host).await? {
                Some(info) => json!({
                    "exists": true,
                    "ip": info.ip,
                    "hostname": info.hostname,
                    "status": info.status,
                    "online": info.is_online(),
                    "leaf_switch": info.leaf_switch,
                }),
                None => {
                    all_exist = false;
                    json!({"exists": false})
                }
            };
            records.insert(host.clone(), record);
        }

        let duration = start.elapsed().as_millis() as u64;
        let output = json!({"hosts": records, "all_exist": all_exist});
        Ok(ToolOutcome::Completed(if all_exist {
            ToolResult::success(output, duration)
        } else {
            ToolResult {
                success: false,
                output,
                error: Some("one or more hosts are not in the inventory".to_string()),
                duration_ms: duration,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{HostInfo, StaticInventory};

    fn inventory() -> Arc<dyn Inventory> {
        Arc::new(StaticInventory::new().with_host(HostInfo {
            ip: "10.0.1.10".into(),
            hostname: "web-01".into(),
            leaf_switch: Some("leaf-01".into()),
            rack: None,
            status: "active".into(),
            tags: vec!["web".into()],
        }))
    }

    #[tokio::test]
    async fn test_all_hosts_known() {
        let tool = QueryCmdbTool::new(inventory());
        let outcome = tool.execute(json!({"hosts": ["10.0.1.10"]})).await.unwrap();
        let result = outcome.result().unwrap();
        assert!(result.success);
        assert_eq!(result.output["hosts"]["10.0.1.10"]["status"], "active");
    }

    #[tokio::test]
    async fn test_unknown_host_fails() {
        let tool = QueryCmdbTool::new(inventory());
        let outcome = tool
            .execute(json!({"hosts": ["10.0.1.10", "10.0.2.20"]}))
            .await
            .unwrap();
        let result = outcome.result().unwrap();
        assert!(!result.success);
        assert_eq!(result.output["hosts"]["10.0.2.20"]["exists"], false);
        assert_eq!(result.output["all_exist"], false);
    }
}
