//! Orchestrator core structure
//!
//! Contains the main `Orchestrator` struct and its builder methods.

use crate::analyzer::{AnalysisHook, Analyzer};
use crate::memory::SessionStore;
use crate::planner::Planner;
use crate::policy::{LlmPolicy, LlmPolicyConfig, RulePolicy};
use crate::session_manager::SessionManager;
use dashmap::DashMap;
use netdiag_llm::LlmProvider;
use netdiag_tools::{Inventory, ToolRegistry, ToolRunner};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::config::OrchestratorConfig;

/// Drives diagnostic sessions
pub struct Orchestrator {
    pub(crate) planner: Planner,
    pub(crate) runner: ToolRunner,
    pub(crate) analyzer: Arc<Analyzer>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) inventory: Option<Arc<dyn Inventory>>,
    pub(crate) rule_policy: Arc<RulePolicy>,
    pub(crate) llm_policy: Option<Arc<LlmPolicy>>,
    pub(crate) config: OrchestratorConfig,
    /// Running sessions with their cancellation tokens
    pub(crate) active_executions: Arc<DashMap<Uuid, CancellationToken>>,
    /// Serializes writers of the same session
    pub(crate) session_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    /// Create an orchestrator over `registry` persisting to `store`
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let planner = Planner::new();
        let runner = ToolRunner::new(registry, config.runner_config.clone());
        let analyzer = Arc::new(Analyzer::new(config.analyzer_config()));
        let rule_policy = Arc::new(RulePolicy::new(planner, analyzer.clone()));

        Self {
            planner,
            runner,
            analyzer,
            sessions: Arc::new(SessionManager::new(store)),
            inventory: None,
            rule_policy,
            llm_policy: None,
            config,
            active_executions: Arc::new(DashMap::new()),
            session_locks: Arc::new(DashMap::new()),
        }
    }

    /// Set the inventory used for failed-hop enrichment
    #[must_use]
    pub fn with_inventory(mut self, inventory: Arc<dyn Inventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Enable the dynamic policy. The step budget and confidence thresholds
    /// come from the orchestrator configuration.
    #[must_use]
    pub fn with_llm_policy(mut self, provider: Arc<dyn LlmProvider>, config: LlmPolicyConfig) -> Self {
        let config = config
            .with_max_steps(self.config.max_steps)
            .with_concluded_confidence(self.config.concluded_confidence)
            .with_human_review_threshold(self.config.human_review_threshold);
        info!(provider = provider.name(), "Dynamic policy enabled");
        let tools = self.runner.registry().to_llm_tools();
        self.llm_policy = Some(Arc::new(LlmPolicy::new(provider, tools, config)));
        self
    }

    /// Consult `hook` when rule-based confidence is low
    #[must_use]
    pub fn with_analysis_hook(mut self, hook: Arc<dyn AnalysisHook>) -> Self {
        let analyzer = Arc::new(Analyzer::new(self.config.analyzer_config()).with_hook(hook));
        self.rule_policy = Arc::new(RulePolicy::new(self.planner, analyzer.clone()));
        self.analyzer = analyzer;
        self
    }

    /// Use an existing session manager
    #[must_use]
    pub fn with_session_manager(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Session manager
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether a dynamic policy is configured
    #[must_use]
    pub fn has_llm_policy(&self) -> bool {
        self.llm_policy.is_some()
    }

    /// Whether `session_id` is being driven by this process
    #[must_use]
    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.active_executions.contains_key(&session_id)
    }

    /// Number of sessions being driven right now
    #[must_use]
    pub fn active_execution_count(&self) -> usize {
        self.active_executions.len()
    }

    /// List all registered tool names
    #[must_use]
    pub fn list_tool_names(&self) -> Vec<String> {
        self.runner
            .registry()
            .list_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}
