//! Builtins - Diagnostic tools offered to policies
//!
//! - Probe tools: telnet_test, check_port_listen, ping_test,
//!   check_firewall, traceroute
//! - execute_command: free-form command on a host
//! - query_cmdb: inventory lookup for a list of hosts
//! - ask_user: pause the diagnosis for an operator answer

mod ask_user;
mod cmdb;
mod exec;
mod probes;

pub use ask_user::AskUserTool;
pub use cmdb::QueryCmdbTool;
pub use exec::ExecuteCommandTool;
pub use probes::ProbeTool;

use crate::error::Result;
use crate::executor::Executor;
use crate::inventory::Inventory;
use crate::probe::ProbeKind;
use crate::registry::ToolRegistry;
use std::sync::Arc;

/// Register every diagnostic tool
pub fn register_diagnostic_tools(
    registry: &mut ToolRegistry,
    executor: Arc<dyn Executor>,
    inventory: Arc<dyn Inventory>,
) -> Result<()> {
    for kind in ProbeKind::ALL {
        registry.register(Arc::new(ProbeTool::new(kind, executor.clone())))?;
    }
    registry.register(Arc::new(ExecuteCommandTool::new(executor)))?;
    registry.register(Arc::new(QueryCmdbTool::new(inventory)))?;
    registry.register(Arc::new(AskUserTool::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReplayExecutor;
    use crate::inventory::StaticInventory;

    #[test]
    fn test_register_all() {
        let mut registry = ToolRegistry::new();
        register_diagnostic_tools(
            &mut registry,
            Arc::new(ReplayExecutor::default()),
            Arc::new(StaticInventory::new()),
        )
        .unwrap();

        assert_eq!(
            registry.list_names(),
            vec![
                "ask_user",
                "check_firewall",
                "check_port_listen",
                "execute_command",
                "ping_test",
                "query_cmdb",
                "telnet_test",
                "traceroute",
            ]
        );
    }
}
