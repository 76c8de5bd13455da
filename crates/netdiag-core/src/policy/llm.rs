//! LLM-driven policy
//!
//! Each decision is one function-calling round trip: the model sees the task
//! and the step history and either requests tool calls or answers in text,
//! which is taken as its conclusion.

use super::{Decision, Policy, PolicyKind, ToolInvocation};
use crate::error::{Error, Result};
use crate::models::{DiagnosticReport, DiagnosticTask, StepResult};
use crate::planner::step_label;
use crate::session::{ContextEntry, DiagnosticSession};
use crate::utils::{retry_with_scaled_backoff, RetryConfig};
use netdiag_llm::{
    CompletionRequest, LlmProvider, Message, ToolCall, ToolCompletionRequest, ToolDefinition,
};
use netdiag_tools::{Probe, ProbeKind};
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STDOUT_LIMIT: usize = 1000;
const STDOUT_KEEP: usize = 800;
const STDERR_KEEP: usize = 500;
const EVIDENCE_CHARS: usize = 200;
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Dynamic policy settings
#[derive(Debug, Clone)]
pub struct LlmPolicyConfig {
    /// Model name; empty uses the provider default
    pub model: String,
    /// Step budget announced to the model
    pub max_steps: usize,
    /// Output token cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Confidence given to the model's own conclusions
    pub concluded_confidence: f64,
    /// Below this confidence a conclusion asks for human review
    pub human_review_threshold: f64,
    /// Backoff for provider calls
    pub retry: RetryConfig,
}

impl Default for LlmPolicyConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_steps: 10,
            max_tokens: 2048,
            temperature: 0.3,
            concluded_confidence: 0.8,
            human_review_threshold: 0.7,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmPolicyConfig {
    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the step budget
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the conclusion confidence
    #[must_use]
    pub fn with_concluded_confidence(mut self, confidence: f64) -> Self {
        self.concluded_confidence = confidence;
        self
    }

    /// Set the human-review threshold
    #[must_use]
    pub fn with_human_review_threshold(mut self, threshold: f64) -> Self {
        self.human_review_threshold = threshold;
        self
    }

    /// Set the provider backoff
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Lets a model choose tools
pub struct LlmPolicy {
    provider: Arc<dyn LlmProvider>,
    tools: Vec<ToolDefinition>,
    config: LlmPolicyConfig,
}

impl LlmPolicy {
    /// Create a policy offering `tools` to `provider`
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Vec<ToolDefinition>,
        config: LlmPolicyConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Provider name
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn system_prompt(&self, used: usize) -> String {
        let remaining = self.config.max_steps.saturating_sub(used);
        format!(
            "You are a network fault diagnosis agent. You locate the root cause of a \
connectivity problem by running probes through the provided tools.\n\n\
Strategy:\n\
1. Test from the source host towards the target (connect test, ping).\n\
2. Tell a timeout (path or filtering problem) from a refusal (nothing listening).\n\
3. On a refusal, check the listening sockets on the target.\n\
4. Inspect the firewall rules on the source or target.\n\
5. Use traceroute to find where the path breaks.\n\
6. Use ask_user when you need information no probe can give.\n\n\
Rules:\n\
- Narrow the problem down step by step and let each result choose the next probe.\n\
- Stop calling tools as soon as the root cause is clear, and answer with the root cause and the evidence.\n\
- At most {} steps in total; {remaining} remain.",
            self.config.max_steps
        )
    }

    fn user_prompt(&self, session: &DiagnosticSession) -> String {
        let task = &session.task;
        let mut out = String::new();
        let _ = writeln!(out, "Diagnose: {}", task.description);
        let _ = writeln!(out, "Source: {}", task.source);
        let _ = writeln!(out, "Target: {}", task.target);
        let _ = writeln!(out, "Protocol: {}", task.protocol);
        if let Some(port) = task.port {
            let _ = writeln!(out, "Port: {port}");
        }
        let _ = writeln!(out, "Fault type: {}", task.fault_type);

        if session.context.is_empty() {
            let _ = writeln!(out, "\nNo steps executed yet. Decide the first step.");
            return out;
        }

        let _ = writeln!(out, "\nHistory:");
        for entry in &session.context {
            match entry {
                ContextEntry::Step(step) => write_step(&mut out, step),
                ContextEntry::UserAnswer {
                    question, answer, ..
                } => {
                    let _ = writeln!(
                        out,
                        "Operator answered \"{}\": {answer}",
                        question.as_deref().unwrap_or("")
                    );
                }
            }
        }
        let _ = writeln!(
            out,
            "\nDecide the next step, or give your conclusion if the root cause is clear."
        );
        out
    }

    fn invocation(call: &ToolCall) -> ToolInvocation {
        let arguments = call.arguments_value().unwrap_or_else(|e| {
            warn!(tool = %call.name, error = %e, "Discarding malformed tool arguments");
            json!({})
        });
        ToolInvocation {
            call_id: call.id.clone(),
            step_name: step_label(&call.name).to_string(),
            timeout: invocation_timeout(&call.name, &arguments),
            tool: call.name.clone(),
            arguments,
            planned_step: None,
        }
    }

    fn conclude(&self, session: &DiagnosticSession, text: Option<&str>) -> DiagnosticReport {
        let task = &session.task;
        let steps = session.step_results();
        let root_cause = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("No conclusion provided")
            .to_string();
        let confidence = self.config.concluded_confidence;
        let history: Vec<Value> = steps
            .iter()
            .map(|s| {
                json!({
                    "step": s.step_number,
                    "tool": s.action,
                    "arguments": s.metadata.get("arguments").cloned().unwrap_or(Value::Null),
                    "success": s.success,
                })
            })
            .collect();

        DiagnosticReport::new(
            task.task_id,
            root_cause.clone(),
            confidence,
            confidence < self.config.human_review_threshold,
            steps.clone(),
        )
        .with_evidence(evidence(&steps))
        .with_suggestions(suggestions(task, &root_cause))
        .with_metadata("analysis_method", json!("llm_agent"))
        .with_metadata("tool_call_history", Value::Array(history))
    }
}

fn truncate(text: &str, keep: usize) -> String {
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("... (truncated)");
    out
}

fn write_step(out: &mut String, step: &StepResult) {
    let _ = writeln!(out, "Step {}: {} [{}]", step.step_number, step.step_name, step.action);
    if let Some(args) = step.metadata.get("arguments") {
        let _ = writeln!(out, "  arguments: {args}");
    }
    match &step.command_result {
        Some(cmd) => {
            let _ = writeln!(
                out,
                "  exit code {}, {:.2}s",
                cmd.exit_code, cmd.execution_time
            );
            if !cmd.stdout.is_empty() {
                let stdout = if cmd.stdout.chars().count() > STDOUT_LIMIT {
                    truncate(&cmd.stdout, STDOUT_KEEP)
                } else {
                    cmd.stdout.clone()
                };
                let _ = writeln!(out, "  stdout:\n{stdout}");
            }
            if !cmd.stderr.is_empty() {
                let stderr = if cmd.stderr.chars().count() > STDERR_KEEP {
                    truncate(&cmd.stderr, STDERR_KEEP)
                } else {
                    cmd.stderr.clone()
                };
                let _ = writeln!(out, "  stderr:\n{stderr}");
            }
        }
        None => {
            let status = if step.success { "succeeded" } else { "failed" };
            let _ = writeln!(out, "  {status}");
            if let Some(output) = step.metadata.get("output") {
                let _ = writeln!(out, "  output: {output}");
            }
            if let Some(error) = step.metadata.get("error").and_then(Value::as_str) {
                let _ = writeln!(out, "  error: {error}");
            }
        }
    }
}

fn invocation_timeout(tool: &str, arguments: &Value) -> Duration {
    if let Some(kind) = ProbeKind::from_tool_name(tool) {
        if let Ok(probe) = Probe::from_arguments(kind, arguments) {
            return probe.expected_duration();
        }
    }
    if tool == "execute_command" {
        if let Some(secs) = arguments.get("timeout").and_then(Value::as_u64) {
            return Duration::from_secs(secs.saturating_add(5));
        }
    }
    DEFAULT_TOOL_TIMEOUT
}

fn evidence(steps: &[StepResult]) -> Vec<String> {
    steps
        .iter()
        .map(|step| match &step.command_result {
            Some(cmd) if cmd.success => {
                let head: String = cmd.stdout.chars().take(EVIDENCE_CHARS).collect();
                format!("Step {} {}: {}", step.step_number, step.action, head.trim())
            }
            Some(cmd) if !cmd.stderr.is_empty() => {
                format!("Step {} {} failed: {}", step.step_number, step.action, cmd.stderr.trim())
            }
            Some(cmd) => format!(
                "Step {} {} failed with exit code {}",
                step.step_number, step.action, cmd.exit_code
            ),
            None => format!(
                "Step {} {}: {}",
                step.step_number,
                step.action,
                if step.success { "ok" } else { "failed" }
            ),
        })
        .collect()
}

fn suggestions(task: &DiagnosticTask, conclusion: &str) -> Vec<String> {
    let text = conclusion.to_lowercase();
    let mut out = Vec::new();
    if text.contains("refused") || text.contains("not listening") {
        out.push(format!("Check that the service on {} is running", task.target));
        if let Some(port) = task.port {
            out.push(format!("Confirm the service is configured to listen on port {port}"));
        }
    }
    if text.contains("timeout") || text.contains("timed out") || text.contains("unreachable") {
        out.push(format!(
            "Check network connectivity from {} to {}",
            task.source, task.target
        ));
        out.push("Check whether firewall rules block the connection".to_string());
    }
    if text.contains("firewall") || text.contains("iptables") {
        out.push("Adjust the firewall rules to allow traffic on the port".to_string());
    }
    if out.is_empty() {
        out.push("Investigate further based on the diagnostic results".to_string());
    }
    out
}

#[async_trait::async_trait]
impl Policy for LlmPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Llm
    }

    #[tracing::instrument(skip_all, fields(session_id = %session.id, provider = self.provider.name()))]
    async fn decide(
        &self,
        session: &DiagnosticSession,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        let request = ToolCompletionRequest::new(
            CompletionRequest::new(self.config.model.clone())
                .with_message(Message::system(self.system_prompt(session.step_count())))
                .with_message(Message::user(self.user_prompt(session)))
                .with_max_tokens(self.config.max_tokens)
                .with_temperature(self.config.temperature),
            self.tools.clone(),
        );

        let call = retry_with_scaled_backoff(
            &self.config.retry,
            || {
                let provider = Arc::clone(&self.provider);
                let request = request.clone();
                async move { provider.complete_with_tools(request).await }
            },
            |e: &netdiag_llm::Error| {
                if e.is_rate_limit() {
                    Some(2.0)
                } else if e.is_retryable() {
                    Some(1.0)
                } else {
                    None
                }
            },
        );

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(Error::Policy("decision interrupted by cancellation".to_string()));
            }
            result = call => result.map_err(|e| {
                warn!(attempts = e.attempts, error = %e.last_error, "Provider call failed");
                Error::Llm(e.last_error)
            })?,
        };

        if response.has_tool_calls() {
            let invocations: Vec<ToolInvocation> =
                response.tool_calls.iter().map(Self::invocation).collect();
            debug!(
                tools = ?invocations.iter().map(|i| i.tool.as_str()).collect::<Vec<_>>(),
                "Model requested tools"
            );
            return Ok(Decision::Invoke(invocations));
        }

        info!("Model concluded");
        Ok(Decision::Conclude(
            self.conclude(session, response.content.as_deref()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FaultType;
    use netdiag_llm::{MockProvider, ToolCompletionResponse};
    use netdiag_tools::CommandResult;

    fn session() -> DiagnosticSession {
        DiagnosticSession::new(
            DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::PortUnreachable).with_port(80),
            PolicyKind::Llm,
        )
    }

    fn policy(mock: Arc<MockProvider>) -> LlmPolicy {
        LlmPolicy::new(mock, Vec::new(), LlmPolicyConfig::default())
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_invocation_timeout_tolerates_huge_arguments() {
        let ping = serde_json::json!({"host": "10.0.1.10", "target": "10.0.2.20", "count": 4, "timeout": u64::MAX});
        assert_eq!(
            invocation_timeout("ping_test", &ping),
            Duration::from_secs(4 * netdiag_tools::MAX_PROBE_TIMEOUT_SECS + 5)
        );

        let command = serde_json::json!({"host": "10.0.1.10", "command": "uptime", "timeout": u64::MAX});
        assert_eq!(
            invocation_timeout("execute_command", &command),
            Duration::from_secs(u64::MAX)
        );
    }

    #[tokio::test]
    async fn test_tool_calls_become_invocations() {
        let mock = Arc::new(MockProvider::new());
        mock.add_tool_response(ToolCompletionResponse::calls(vec![
            call("ping_test", r#"{"host":"10.0.1.10","target":"10.0.2.20"}"#),
            call("execute_command", r#"{"host":"10.0.2.20","command":"ss -tlnp","timeout":10}"#),
            call("ask_user", "{not json"),
        ]));

        let decision = policy(mock)
            .decide(&session(), &CancellationToken::new())
            .await
            .unwrap();
        let Decision::Invoke(calls) = decision else {
            panic!("expected invocations");
        };
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].step_name, "Ping test");
        assert_eq!(calls[0].timeout, Duration::from_secs(25));
        assert_eq!(calls[1].timeout, Duration::from_secs(15));
        assert_eq!(calls[2].arguments, json!({}));
        assert!(calls.iter().all(|c| c.planned_step.is_none()));
    }

    #[tokio::test]
    async fn test_text_answer_concludes() {
        let mock = Arc::new(MockProvider::new());
        mock.add_text_response("Connection refused: nothing is listening on port 80.");
        let mut s = session();
        s.push_step(
            StepResult::new(1, "Connect test", "telnet_test", false)
                .with_command(
                    CommandResult::new("10.0.1.10", "telnet")
                        .with_stderr("Connection refused")
                        .with_exit_code(1),
                )
                .with_metadata("arguments", json!({"host": "10.0.1.10"})),
        )
        .unwrap();

        let Decision::Conclude(report) = policy(mock)
            .decide(&s, &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a conclusion");
        };
        assert_eq!(report.confidence, 0.8);
        assert!(!report.need_human);
        assert_eq!(report.evidence, vec!["Step 1 telnet_test failed: Connection refused"]);
        assert!(report.fix_suggestions[0].contains("service on 10.0.2.20"));
        assert_eq!(report.metadata["tool_call_history"][0]["tool"], "telnet_test");
        assert_eq!(report.metadata["analysis_method"], "llm_agent");
    }

    #[tokio::test]
    async fn test_low_concluded_confidence_needs_human() {
        let mock = Arc::new(MockProvider::new());
        mock.add_text_response("unclear");
        let policy = LlmPolicy::new(
            mock,
            Vec::new(),
            LlmPolicyConfig::default().with_concluded_confidence(0.6),
        );
        let Decision::Conclude(report) = policy
            .decide(&session(), &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a conclusion");
        };
        assert!(report.need_human);
        assert_eq!(
            report.fix_suggestions,
            vec!["Investigate further based on the diagnostic results"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let mock = Arc::new(MockProvider::new());
        mock.add_error(netdiag_llm::Error::Timeout(30_000));
        mock.add_error(netdiag_llm::Error::RateLimit { retry_after: None });
        mock.add_text_response("Firewall drops port 80");

        let decision = policy(mock.clone())
            .decide(&session(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Conclude(_)));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let mock = Arc::new(MockProvider::new());
        mock.add_error(netdiag_llm::Error::Auth("invalid key".into()));

        let err = policy(mock.clone())
            .decide(&session(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let mock = Arc::new(MockProvider::new());
        for _ in 0..4 {
            mock.add_error(netdiag_llm::Error::Timeout(30_000));
        }
        let token = CancellationToken::new();
        token.cancel();

        let err = policy(mock)
            .decide(&session(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Policy(_)));
    }

    #[test]
    fn test_prompt_truncates_long_output() {
        let mut s = session();
        s.push_step(
            StepResult::new(1, "Traceroute", "traceroute", true)
                .with_command(CommandResult::new("10.0.1.10", "traceroute").with_stdout("x".repeat(1500))),
        )
        .unwrap();
        s.pending_question = Some("Any recent change?".into());
        s.push_answer("a new ACL on spine-01");

        let prompt = policy(Arc::new(MockProvider::new())).user_prompt(&s);
        assert!(prompt.contains(&format!("{}... (truncated)", "x".repeat(800))));
        assert!(!prompt.contains(&"x".repeat(801)));
        assert!(prompt.contains("Operator answered \"Any recent change?\": a new ACL on spine-01"));
    }

    #[test]
    fn test_system_prompt_budget() {
        let prompt = policy(Arc::new(MockProvider::new())).system_prompt(4);
        assert!(prompt.contains("At most 10 steps in total; 6 remain."));
    }
}
