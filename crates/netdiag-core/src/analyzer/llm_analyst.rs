//! LLM-backed analysis hook

use super::AnalysisHook;
use crate::error::{Error, Result};
use crate::models::{DiagnosticReport, DiagnosticTask, StepResult};
use netdiag_llm::{CompletionRequest, LlmProvider, Message};
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a senior network engineer reviewing an automated fault diagnosis. \
Given the task, the executed probes and a rule-based conclusion, state the most likely root cause. \
Answer with a single JSON object: {\"root_cause\": string, \"confidence\": number between 0 and 1, \
\"evidence\": [string], \"fix_suggestions\": [string], \"need_human\": bool}.";

const OUTPUT_PREVIEW_CHARS: usize = 300;

/// Asks an LLM for a second opinion on low-confidence results
pub struct LlmAnalyst {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl LlmAnalyst {
    /// Create an analyst using the provider's default model
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: String::new(),
            max_tokens: 1024,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn prompt(task: &DiagnosticTask, steps: &[StepResult], baseline: &DiagnosticReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Task: {}", task.description);
        let _ = writeln!(
            out,
            "Source {} -> target {} ({}, port {}), fault {}",
            task.source,
            task.target,
            task.protocol,
            task.port.map_or_else(|| "-".to_string(), |p| p.to_string()),
            task.fault_type
        );
        let _ = writeln!(out, "\nSteps:");
        for step in steps {
            let status = if step.success { "ok" } else { "failed" };
            let _ = writeln!(out, "{}. {} [{}] {status}", step.step_number, step.step_name, step.action);
            if let Some(cmd) = &step.command_result {
                let preview: String = cmd.combined_output().chars().take(OUTPUT_PREVIEW_CHARS).collect();
                let _ = writeln!(out, "   $ {}\n   {}", cmd.command, preview.replace('\n', "\n   "));
            }
            for signal in &step.signals {
                if let Ok(value) = serde_json::to_string(signal) {
                    let _ = writeln!(out, "   signal: {value}");
                }
            }
        }
        let _ = writeln!(
            out,
            "\nRule-based conclusion ({:.2}): {}",
            baseline.confidence, baseline.root_cause
        );
        out
    }
}

fn extract_json(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&content[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items: Vec<String> = value?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

#[async_trait::async_trait]
impl AnalysisHook for LlmAnalyst {
    async fn analyze(
        &self,
        task: &DiagnosticTask,
        steps: &[StepResult],
        baseline: &DiagnosticReport,
    ) -> Result<DiagnosticReport> {
        let request = CompletionRequest::new(self.model.clone())
            .with_message(Message::system(SYSTEM_PROMPT))
            .with_message(Message::user(Self::prompt(task, steps, baseline)))
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.2);

        let response = self.provider.complete(request).await?;
        let parsed = extract_json(&response.content)
            .ok_or_else(|| Error::Policy("analysis response carried no JSON object".to_string()))?;

        debug!(task_id = %task.task_id, provider = self.provider.name(), "Dynamic analysis received");

        let root_cause = parsed
            .get("root_cause")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| baseline.root_cause.clone(), str::to_string);
        let confidence = parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(baseline.confidence);
        let need_human = parsed
            .get("need_human")
            .and_then(Value::as_bool)
            .unwrap_or(baseline.need_human);

        Ok(
            DiagnosticReport::new(task.task_id, root_cause, confidence, need_human, steps.to_vec())
                .with_evidence(
                    string_list(parsed.get("evidence")).unwrap_or_else(|| baseline.evidence.clone()),
                )
                .with_suggestions(
                    string_list(parsed.get("fix_suggestions"))
                        .unwrap_or_else(|| baseline.fix_suggestions.clone()),
                )
                .with_metadata("analysis_method", json!("llm_assisted"))
                .with_metadata("baseline_confidence", json!(baseline.confidence)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FaultType;
    use netdiag_llm::MockProvider;

    fn baseline(task: &DiagnosticTask) -> DiagnosticReport {
        DiagnosticReport::new(task.task_id, "Inconclusive, manual review needed", 0.5, true, vec![])
            .with_evidence(vec!["No known fault pattern matched".into()])
            .with_suggestions(vec!["Review the executed steps".into()])
    }

    #[tokio::test]
    async fn test_parses_fenced_json() {
        let task = DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::Connectivity);
        let mock = MockProvider::new();
        mock.add_text_response(
            "```json\n{\"root_cause\": \"MTU mismatch on leaf-02\", \"confidence\": 0.78, \"evidence\": [\"large pings drop\"]}\n```",
        );
        let analyst = LlmAnalyst::new(Arc::new(mock));

        let report = analyst.analyze(&task, &[], &baseline(&task)).await.unwrap();
        assert_eq!(report.root_cause, "MTU mismatch on leaf-02");
        assert_eq!(report.confidence, 0.78);
        assert_eq!(report.evidence, vec!["large pings drop".to_string()]);
        assert_eq!(report.fix_suggestions, vec!["Review the executed steps".to_string()]);
        assert!(report.need_human);
        assert_eq!(report.metadata["analysis_method"], "llm_assisted");
    }

    #[tokio::test]
    async fn test_non_json_is_an_error() {
        let task = DiagnosticTask::new("a", "b", FaultType::Connectivity);
        let mock = MockProvider::new();
        mock.add_text_response("I think it is the firewall.");
        let analyst = LlmAnalyst::new(Arc::new(mock));
        assert!(analyst.analyze(&task, &[], &baseline(&task)).await.is_err());
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let task = DiagnosticTask::new("a", "b", FaultType::Connectivity);
        let mock = MockProvider::new();
        mock.add_error(netdiag_llm::Error::Timeout(30_000));
        let analyst = LlmAnalyst::new(Arc::new(mock)).with_model("gpt-4o-mini");
        assert!(matches!(
            analyst.analyze(&task, &[], &baseline(&task)).await,
            Err(Error::Llm(_))
        ));
    }
}
