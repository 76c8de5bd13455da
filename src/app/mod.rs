//! Application wiring
//!
//! Builds the session store, executor, inventory and orchestrator from
//! [`AppConfig`] and the command-line overrides.

pub mod config;
pub mod loader;

pub use config::AppConfig;
pub use loader::load_config;

use anyhow::{Context, Result};
use netdiag_core::{LlmAnalyst, LlmPolicyConfig, Orchestrator, SessionManager, SessionStore, SqliteStore};
use netdiag_llm::{LlmProvider, OpenAiCompatConfig, OpenAiCompatProvider};
use netdiag_tools::{
    register_diagnostic_tools, Executor, Inventory, LocalExecutor, ReplayExecutor,
    StaticInventory, ToolRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Where commands run and where host facts come from
#[derive(Debug, Clone, Default)]
pub struct Collaborators {
    /// Replay scenario answering probes instead of the local machine
    pub scenario: Option<PathBuf>,
    /// Inventory JSON document
    pub inventory: Option<PathBuf>,
}

/// Open the session store named by the configuration
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    let store = match config.database.explicit_path() {
        Some(path) => SqliteStore::new(&path)
            .await
            .with_context(|| format!("Failed to open session database {}", path.display()))?,
        None => SqliteStore::new_default()
            .await
            .context("Failed to open the default session database")?,
    };
    Ok(Arc::new(store))
}

/// Session manager over `store` with the configured TTL
pub fn session_manager(config: &AppConfig, store: Arc<dyn SessionStore>) -> Arc<SessionManager> {
    Arc::new(
        SessionManager::new(store)
            .with_ttl(chrono::Duration::days(config.database.session_ttl_days)),
    )
}

/// LLM provider, when credentials are available
pub fn llm_provider(config: &AppConfig) -> Result<Option<Arc<dyn LlmProvider>>> {
    let Some(api_key) = config.llm.resolved_api_key() else {
        return Ok(None);
    };
    let provider_config = OpenAiCompatConfig::new(api_key)
        .with_base_url(&config.llm.base_url)
        .with_model(&config.llm.model)
        .with_timeout(Duration::from_secs(config.llm.timeout_secs));
    let provider =
        OpenAiCompatProvider::new(provider_config).context("Failed to create LLM provider")?;
    Ok(Some(Arc::new(provider)))
}

/// Build an orchestrator persisting through `store`
pub async fn build_orchestrator(
    config: &AppConfig,
    store: Arc<dyn SessionStore>,
    collaborators: &Collaborators,
) -> Result<Orchestrator> {
    let executor: Arc<dyn Executor> = match &collaborators.scenario {
        Some(path) => {
            info!(scenario = %path.display(), "Replaying scripted command output");
            Arc::new(
                ReplayExecutor::from_file(path)
                    .with_context(|| format!("Failed to load scenario {}", path.display()))?,
            )
        }
        None => Arc::new(
            config
                .executor
                .local_hosts
                .iter()
                .fold(LocalExecutor::new(), |executor, host| executor.with_local_host(host)),
        ),
    };

    let inventory: Arc<dyn Inventory> = match &collaborators.inventory {
        Some(path) => Arc::new(
            StaticInventory::from_file(path)
                .with_context(|| format!("Failed to load inventory {}", path.display()))?,
        ),
        None => Arc::new(StaticInventory::new()),
    };

    let mut registry = ToolRegistry::new();
    register_diagnostic_tools(&mut registry, executor, inventory.clone())
        .context("Failed to register diagnostic tools")?;

    let mut orchestrator = Orchestrator::new(
        Arc::new(registry),
        store.clone(),
        config.orchestrator_config(),
    )
    .with_session_manager(session_manager(config, store))
    .with_inventory(inventory);

    match llm_provider(config)? {
        Some(provider) => {
            if config.llm.analysis_hook {
                let analyst = LlmAnalyst::new(provider.clone()).with_model(&config.llm.model);
                orchestrator = orchestrator.with_analysis_hook(Arc::new(analyst));
            }
            orchestrator = orchestrator.with_llm_policy(
                provider,
                LlmPolicyConfig::default().with_model(&config.llm.model),
            );
        }
        None if config.llm.analysis_hook => {
            warn!("analysis_hook is enabled but no LLM API key is configured");
        }
        None => {}
    }

    Ok(orchestrator)
}
