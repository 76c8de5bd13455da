//! Integration tests for netdiag
//!
//! These tests verify the integration between the crates:
//! - netdiag-tools: registry, replay scenarios and inventory files
//! - netdiag-llm: scripted provider driving the dynamic policy
//! - netdiag-core: orchestrator, SQLite persistence and restart recovery

use std::sync::Arc;

use netdiag_core::{
    DiagnosticTask, FaultType, Orchestrator, OrchestratorConfig, PolicyKind, SessionManager,
    SessionStatus, SessionStore, Signal, SqliteStore,
};
use netdiag_llm::{MockProvider, ToolCall, ToolCompletionResponse};
use netdiag_tools::{register_diagnostic_tools, ReplayExecutor, StaticInventory, ToolRegistry};
use tempfile::TempDir;

const INVENTORY: &str = include_str!("../demos/inventory.json");
const SERVICE_DOWN: &str = include_str!("../demos/scenarios/service-down.toml");
const FIREWALL: &str = include_str!("../demos/scenarios/firewall.toml");
const PATH_BROKEN: &str = include_str!("../demos/scenarios/path-broken.toml");

fn registry(scenario: &str) -> (Arc<ToolRegistry>, Arc<StaticInventory>) {
    let inventory = Arc::new(StaticInventory::from_json_str(INVENTORY).unwrap());
    let mut registry = ToolRegistry::new();
    register_diagnostic_tools(
        &mut registry,
        Arc::new(ReplayExecutor::from_toml_str(scenario).unwrap()),
        inventory.clone(),
    )
    .unwrap();
    (Arc::new(registry), inventory)
}

fn orchestrator(scenario: &str, store: Arc<dyn SessionStore>) -> Orchestrator {
    let (registry, inventory) = registry(scenario);
    Orchestrator::new(registry, store, OrchestratorConfig::default()).with_inventory(inventory)
}

async fn sqlite_store(dir: &TempDir) -> Arc<dyn SessionStore> {
    Arc::new(SqliteStore::new(dir.path().join("sessions.db")).await.unwrap())
}

fn port_task() -> DiagnosticTask {
    DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::PortUnreachable).with_port(80)
}

fn step_numbers(report: &netdiag_core::DiagnosticReport) -> Vec<u32> {
    report.executed_steps.iter().map(|s| s.step_number).collect()
}

// ============================================================================
// Tool Registry Integration Tests
// ============================================================================

#[test]
fn test_registry_exposes_every_diagnostic_tool() {
    let (registry, _) = registry(SERVICE_DOWN);
    let mut names = registry.list_names();
    names.sort_unstable();

    assert_eq!(
        names,
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
    for tool in registry.to_llm_tools() {
        assert!(tool.parameters.is_object(), "{} has no schema", tool.name);
    }
}

// ============================================================================
// Deterministic Diagnosis Integration Tests
// ============================================================================

#[tokio::test]
async fn test_service_down_scenario_persists_to_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;

    let result = orchestrator(SERVICE_DOWN, store.clone())
        .start(port_task(), PolicyKind::Rule)
        .await
        .unwrap();
    let report = result.report().unwrap();
    assert_eq!(step_numbers(report), vec![1, 2, 3]);
    assert_eq!(report.confidence, 0.9);
    assert!(!report.need_human);
    assert!(report.executed_steps[0].success);

    drop(store);
    let reopened = sqlite_store(&dir).await;
    let stored = reopened.load(result.session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.report.as_ref(), Some(report));
    assert!(!reopened.messages(result.session_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_firewall_scenario() {
    let dir = TempDir::new().unwrap();
    let result = orchestrator(FIREWALL, sqlite_store(&dir).await)
        .start(port_task(), PolicyKind::Rule)
        .await
        .unwrap();

    let report = result.report().unwrap();
    assert_eq!(step_numbers(report), vec![1, 2, 4, 5]);
    assert!(report.root_cause.contains("Firewall"));
    assert_eq!(report.confidence, 0.85);
}

#[tokio::test]
async fn test_connectivity_fault_traces_the_path() {
    let dir = TempDir::new().unwrap();
    let task = DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::Connectivity);
    let result = orchestrator(PATH_BROKEN, sqlite_store(&dir).await)
        .start(task, PolicyKind::Rule)
        .await
        .unwrap();

    let report = result.report().unwrap();
    assert_eq!(step_numbers(report), vec![1, 2, 6]);
    assert!(report.need_human);
    assert!(report.root_cause.contains("leaf-02"));
    assert!(report.executed_steps[2]
        .signals
        .iter()
        .any(|s| matches!(s, Signal::FailedHop(_))));
}

#[tokio::test]
async fn test_slow_fault_concludes_without_steps() {
    let result = orchestrator(SERVICE_DOWN, Arc::new(netdiag_core::MemoryStore::new()))
        .start(
            DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::Slow),
            PolicyKind::Rule,
        )
        .await
        .unwrap();

    let report = result.report().unwrap();
    assert!(report.executed_steps.is_empty());
    assert!(report.need_human);
}

// ============================================================================
// Dynamic Policy and Restart Integration Tests
// ============================================================================

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

#[tokio::test]
async fn test_paused_session_resumes_after_restart() {
    let dir = TempDir::new().unwrap();

    let first = Arc::new(MockProvider::new());
    first.add_tool_response(ToolCompletionResponse::calls(vec![call(
        "c1",
        "telnet_test",
        serde_json::json!({"host": "10.0.1.10", "target": "10.0.2.20", "port": 80}),
    )]));
    first.add_tool_response(ToolCompletionResponse::calls(vec![call(
        "c2",
        "ask_user",
        serde_json::json!({"question": "Should nginx be listening on db-01?"}),
    )]));

    let paused = orchestrator(SERVICE_DOWN, sqlite_store(&dir).await)
        .with_llm_policy(first, Default::default())
        .start(port_task(), PolicyKind::Llm)
        .await
        .unwrap();
    assert_eq!(paused.status, SessionStatus::WaitingUser);

    // A new process: fresh store handle, fresh orchestrator, fresh provider.
    let second = Arc::new(MockProvider::new());
    second.add_tool_response(ToolCompletionResponse::calls(vec![call(
        "c3",
        "check_port_listen",
        serde_json::json!({"host": "10.0.2.20", "port": 80}),
    )]));
    second.add_text_response("Nothing listens on 10.0.2.20:80; nginx is not running.");

    let store = sqlite_store(&dir).await;
    let restored = store.load(paused.session_id).await.unwrap().unwrap();
    assert_eq!(restored.status, SessionStatus::WaitingUser);
    assert_eq!(restored.policy, PolicyKind::Llm);
    assert_eq!(
        restored.pending_question.as_deref(),
        Some("Should nginx be listening on db-01?")
    );

    let result = orchestrator(SERVICE_DOWN, store.clone())
        .with_llm_policy(second, Default::default())
        .resume(paused.session_id, "yes")
        .await
        .unwrap();

    let report = result.report().unwrap();
    assert_eq!(step_numbers(report), vec![1, 2]);
    assert_eq!(report.confidence, 0.8);
    assert!(!report.need_human);
    assert!(report.metadata.contains_key("tool_call_history"));
}

#[tokio::test]
async fn test_cancel_through_a_second_store_handle() {
    let dir = TempDir::new().unwrap();
    let slow = SERVICE_DOWN.replacen("execution_time = 0.12", "execution_time = 0.12\ndelay_ms = 400", 1);

    let running = Arc::new(orchestrator(&slow, sqlite_store(&dir).await));
    let session = running.open(port_task(), PolicyKind::Rule).await.unwrap();
    let id = session.id;
    let driver = {
        let running = running.clone();
        tokio::spawn(async move { running.run(id).await })
    };
    while !running.is_running(id) {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Another process: its own store handle and orchestrator.
    let other_store = sqlite_store(&dir).await;
    let other = orchestrator(SERVICE_DOWN, other_store.clone());
    assert!(other.cancel(id).await.unwrap().is_none());

    let result = driver.await.unwrap().unwrap();
    let report = result.report().unwrap();
    assert_eq!(report.metadata["interrupted"], "cancelled");
    assert_eq!(step_numbers(report), vec![1, 2]);

    let stored = other_store.load(id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert!(stored.cancel_requested);
    assert_eq!(stored.report.as_ref(), Some(report));
}

// ============================================================================
// Session Management Integration Tests
// ============================================================================

#[tokio::test]
async fn test_session_listing_and_cleanup() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let orch = orchestrator(SERVICE_DOWN, store.clone());

    let completed = orch.start(port_task(), PolicyKind::Rule).await.unwrap();
    let open = orch.open(port_task(), PolicyKind::Rule).await.unwrap();

    let sessions = SessionManager::new(store.clone());
    let all = sessions.list(None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, open.id);

    let active = sessions.list(Some(SessionStatus::Active)).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, open.id);

    assert!(sessions.cleanup_expired().await.unwrap().is_empty());
    let expired = SessionManager::new(store)
        .with_ttl(chrono::Duration::zero())
        .cleanup_expired()
        .await
        .unwrap();
    assert_eq!(expired.len(), 2);
    assert!(expired.contains(&completed.session_id));
}
