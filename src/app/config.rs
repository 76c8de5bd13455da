//! Application configuration types

use netdiag_core::OrchestratorConfig;
use netdiag_tools::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub diagnosis: DiagnosisConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Orchestrator settings derived from the `[diagnosis]` and `[executor]`
    /// tables
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let d = &self.diagnosis;
        OrchestratorConfig::new()
            .with_max_steps(d.max_steps)
            .with_stop_confidence(d.stop_confidence)
            .with_human_review_threshold(d.human_review_threshold)
            .with_concluded_confidence(d.concluded_confidence)
            .with_interrupted_confidence(d.interrupted_confidence)
            .with_stale_execution_after(Duration::from_secs(d.stale_execution_secs))
            .with_runner_config(
                RunnerConfig::default()
                    .with_timeout(Duration::from_secs(self.executor.default_timeout_secs))
                    .with_max_timeout(Duration::from_secs(self.executor.max_timeout_secs)),
            )
    }
}

/// Session database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; empty selects the per-user default
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_ttl_days")]
    pub session_ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    netdiag_core::session_manager::DEFAULT_SESSION_TTL_DAYS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            session_ttl_days: default_ttl_days(),
        }
    }
}

impl DatabaseConfig {
    /// Explicit database path, if configured
    pub fn explicit_path(&self) -> Option<PathBuf> {
        let path = self.path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Step budget and confidence thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisConfig {
    pub max_steps: usize,
    pub stop_confidence: f64,
    pub human_review_threshold: f64,
    pub concluded_confidence: f64,
    pub interrupted_confidence: f64,
    /// Age after which `cancel` ignores another process's running marker
    #[serde(default = "default_stale_execution_secs")]
    pub stale_execution_secs: u64,
}

fn default_stale_execution_secs() -> u64 {
    netdiag_core::DEFAULT_STALE_EXECUTION_SECS
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            max_steps: defaults.max_steps,
            stop_confidence: defaults.stop_confidence,
            human_review_threshold: defaults.human_review_threshold,
            concluded_confidence: defaults.concluded_confidence,
            interrupted_confidence: defaults.interrupted_confidence,
            stale_execution_secs: defaults.stale_execution_after.as_secs(),
        }
    }
}

/// Command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    #[serde(default)]
    pub local_hosts: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            local_hosts: Vec::new(),
        }
    }
}

/// LLM provider for the dynamic policy and analysis hook
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub analysis_hook: bool,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "****" })
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("analysis_hook", &self.analysis_hook)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: netdiag_llm::openai_compat::DEFAULT_BASE_URL.to_string(),
            model: netdiag_llm::openai_compat::DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            analysis_hook: false,
        }
    }
}

impl LlmConfig {
    /// Configured API key, falling back to `OPENAI_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.trim().to_string());
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_config_from_tables() {
        let mut config = AppConfig::default();
        config.diagnosis.max_steps = 4;
        config.diagnosis.interrupted_confidence = 0.3;
        config.executor.default_timeout_secs = 12;
        config.diagnosis.stale_execution_secs = 90;

        let orch = config.orchestrator_config();
        assert_eq!(orch.max_steps, 4);
        assert_eq!(orch.interrupted_confidence, 0.3);
        assert_eq!(orch.runner_config.default_timeout, Duration::from_secs(12));
        assert_eq!(orch.stop_confidence, 0.8);
        assert_eq!(orch.stale_execution_after, Duration::from_secs(90));
    }

    #[test]
    fn test_explicit_path() {
        let mut db = DatabaseConfig::default();
        assert!(db.explicit_path().is_none());
        db.path = " /tmp/netdiag.db ".to_string();
        assert_eq!(db.explicit_path(), Some(PathBuf::from("/tmp/netdiag.db")));
    }

    #[test]
    fn test_api_key_is_masked() {
        let llm = LlmConfig {
            api_key: "sk-secret-value".to_string(),
            ..LlmConfig::default()
        };
        let debug = format!("{llm:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert_eq!(llm.resolved_api_key().as_deref(), Some("sk-secret-value"));
    }
}
