//! Diagnostic report

use super::step::StepResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write;
use uuid::Uuid;

/// Coarse confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Confidence >= 0.9
    High,
    /// Confidence >= 0.7
    Medium,
    /// Below 0.7
    Low,
}

impl ConfidenceLevel {
    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Conclusion of a diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Task this report answers
    pub task_id: Uuid,
    /// Root-cause statement
    pub root_cause: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Supporting observations
    pub evidence: Vec<String>,
    /// Remediation suggestions
    pub fix_suggestions: Vec<String>,
    /// Whether an operator should review the result
    pub need_human: bool,
    /// Steps the diagnosis ran
    pub executed_steps: Vec<StepResult>,
    /// Sum of command execution times, in seconds
    pub total_time: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Free-form annotations
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DiagnosticReport {
    /// Create a report; `total_time` is derived from the steps
    #[must_use]
    pub fn new(
        task_id: Uuid,
        root_cause: impl Into<String>,
        confidence: f64,
        need_human: bool,
        executed_steps: Vec<StepResult>,
    ) -> Self {
        let total_time = executed_steps.iter().map(StepResult::execution_time).sum();
        Self {
            task_id,
            root_cause: root_cause.into(),
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            fix_suggestions: Vec::new(),
            need_human,
            executed_steps,
            total_time,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Set the evidence list
    #[must_use]
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Set the suggestions
    #[must_use]
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.fix_suggestions = suggestions;
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Confidence bucket
    #[must_use]
    pub fn confidence_level(&self) -> ConfidenceLevel {
        if self.confidence >= 0.9 {
            ConfidenceLevel::High
        } else if self.confidence >= 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// Plain-text summary for terminals
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let status = if self.need_human {
            "needs human review"
        } else {
            "root cause located"
        };
        let _ = writeln!(out, "Report {} ({status})", self.task_id);
        let _ = writeln!(out, "Root cause: {}", self.root_cause);
        let _ = writeln!(
            out,
            "Confidence: {:.1}% ({})",
            self.confidence * 100.0,
            self.confidence_level().as_str()
        );
        let _ = writeln!(
            out,
            "Steps: {}  Total time: {:.1}s",
            self.executed_steps.len(),
            self.total_time
        );
        if !self.evidence.is_empty() {
            let _ = writeln!(out, "Evidence:");
            for (i, line) in self.evidence.iter().enumerate() {
                let _ = writeln!(out, "  {}. {line}", i + 1);
            }
        }
        if !self.fix_suggestions.is_empty() {
            let _ = writeln!(out, "Suggestions:");
            for (i, line) in self.fix_suggestions.iter().enumerate() {
                let _ = writeln!(out, "  {}. {line}", i + 1);
            }
        }
        out
    }
}
