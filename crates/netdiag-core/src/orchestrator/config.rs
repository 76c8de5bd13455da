//! Orchestrator configuration

use crate::analyzer::AnalyzerConfig;
use netdiag_tools::RunnerConfig;
use std::time::Duration;

/// Default age after which another process's `executing` marker is ignored
pub const DEFAULT_STALE_EXECUTION_SECS: u64 = 600;

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Steps a session may record before it is force-concluded
    pub max_steps: usize,
    /// Rule-based confidence at which the analysis hook is skipped
    pub stop_confidence: f64,
    /// Below this confidence a report asks for human review
    pub human_review_threshold: f64,
    /// Confidence given to dynamic-policy conclusions
    pub concluded_confidence: f64,
    /// Upper bound on the confidence of cancelled and step-limited reports
    pub interrupted_confidence: f64,
    /// How long a session marked `executing` by another process may go
    /// without an update before `cancel` treats it as idle
    pub stale_execution_after: Duration,
    /// Tool runner configuration
    pub runner_config: RunnerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            stop_confidence: 0.8,
            human_review_threshold: 0.7,
            concluded_confidence: 0.8,
            interrupted_confidence: 0.5,
            stale_execution_after: Duration::from_secs(DEFAULT_STALE_EXECUTION_SECS),
            runner_config: RunnerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step limit
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the stop confidence
    #[must_use]
    pub fn with_stop_confidence(mut self, confidence: f64) -> Self {
        self.stop_confidence = confidence;
        self
    }

    /// Set the human-review threshold
    #[must_use]
    pub fn with_human_review_threshold(mut self, threshold: f64) -> Self {
        self.human_review_threshold = threshold;
        self
    }

    /// Set the dynamic-policy conclusion confidence
    #[must_use]
    pub fn with_concluded_confidence(mut self, confidence: f64) -> Self {
        self.concluded_confidence = confidence;
        self
    }

    /// Set the interrupted-report confidence cap
    #[must_use]
    pub fn with_interrupted_confidence(mut self, confidence: f64) -> Self {
        self.interrupted_confidence = confidence;
        self
    }

    /// Set the age at which a foreign `executing` marker is ignored
    #[must_use]
    pub fn with_stale_execution_after(mut self, after: Duration) -> Self {
        self.stale_execution_after = after;
        self
    }

    /// Set the runner configuration
    #[must_use]
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner_config = config;
        self
    }

    /// Analyzer settings derived from these thresholds
    #[must_use]
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig::default()
            .with_stop_confidence(self.stop_confidence)
            .with_human_review_threshold(self.human_review_threshold)
    }
}
