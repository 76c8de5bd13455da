//! Root-cause analyzer
//!
//! Fault signatures are evaluated in a fixed priority order over the latest
//! signal of each kind:
//!
//! 1. connect refused + port not listening: service down (0.90)
//! 2. connect timeout + ping reachable + blocking firewall rule (0.85)
//! 3. ping unreachable + traceroute with a silent hop: path fault (0.75)
//! 4. anything else: inconclusive (0.50)
//!
//! A rule-based result below `stop_confidence` is offered to the optional
//! [`AnalysisHook`], whose answer wins only when it is more confident.

mod llm_analyst;

pub use llm_analyst::LlmAnalyst;

use crate::error::Result;
use crate::models::{DiagnosticReport, DiagnosticTask, StepResult};
use crate::parsers::{
    ConnectOutcome, ConnectSignal, FailedHop, FirewallVerdict, PingStats, PortStatus, TraceRoute,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Analyzer thresholds
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Confidence at which the rule-based result is final
    pub stop_confidence: f64,
    /// Confidence below which a report asks for human review
    pub human_review_threshold: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            stop_confidence: 0.8,
            human_review_threshold: 0.7,
        }
    }
}

impl AnalyzerConfig {
    /// Set the stop threshold
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
}

/// Dynamic second opinion for low-confidence results
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AnalysisHook: Send + Sync {
    /// Analyze `steps` given the rule-based `baseline`
    async fn analyze(
        &self,
        task: &DiagnosticTask,
        steps: &[StepResult],
        baseline: &DiagnosticReport,
    ) -> Result<DiagnosticReport>;
}

/// Latest signal of each kind over a step history
struct Signals<'a> {
    connect: Option<&'a ConnectSignal>,
    port: Option<&'a PortStatus>,
    ping: Option<&'a PingStats>,
    firewall: Option<&'a FirewallVerdict>,
    trace: Option<&'a TraceRoute>,
    failed_hop: Option<&'a FailedHop>,
}

impl<'a> Signals<'a> {
    fn collect(steps: &'a [StepResult]) -> Self {
        Self {
            connect: steps.iter().rev().find_map(StepResult::connect),
            port: steps.iter().rev().find_map(StepResult::port_listen),
            ping: steps.iter().rev().find_map(StepResult::ping),
            firewall: steps.iter().rev().find_map(StepResult::firewall),
            trace: steps.iter().rev().find_map(StepResult::traceroute),
            failed_hop: steps.iter().rev().find_map(StepResult::failed_hop),
        }
    }
}

struct Finding {
    signature: &'static str,
    root_cause: String,
    confidence: f64,
    need_human: bool,
    evidence: Vec<String>,
    suggestions: Vec<String>,
}

/// Matches fault signatures and consults the hook when unsure
#[derive(Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
    hook: Option<Arc<dyn AnalysisHook>>,
}

impl Analyzer {
    /// Create an analyzer without a hook
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config, hook: None }
    }

    /// Set the dynamic analysis hook
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn AnalysisHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Thresholds in use
    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Signature match only, no hook
    #[must_use]
    pub fn rule_based(&self, task: &DiagnosticTask, steps: &[StepResult]) -> DiagnosticReport {
        let finding = match_signatures(task, &Signals::collect(steps), steps.len());
        let need_human =
            finding.need_human || finding.confidence < self.config.human_review_threshold;

        debug!(
            task_id = %task.task_id,
            signature = finding.signature,
            confidence = finding.confidence,
            "Fault signature matched"
        );

        DiagnosticReport::new(
            task.task_id,
            finding.root_cause,
            finding.confidence,
            need_human,
            steps.to_vec(),
        )
        .with_evidence(finding.evidence)
        .with_suggestions(finding.suggestions)
        .with_metadata("analysis_method", json!("rule_based"))
        .with_metadata("signature", json!(finding.signature))
    }

    /// Full analysis: rule-based, then the hook when confidence is low
    pub async fn analyze(&self, task: &DiagnosticTask, steps: &[StepResult]) -> DiagnosticReport {
        let baseline = self.rule_based(task, steps);
        if baseline.confidence >= self.config.stop_confidence {
            return baseline;
        }
        let Some(hook) = &self.hook else {
            return baseline;
        };

        match hook.analyze(task, steps, &baseline).await {
            Ok(report) if report.confidence > baseline.confidence => {
                info!(
                    task_id = %task.task_id,
                    baseline = baseline.confidence,
                    confidence = report.confidence,
                    "Dynamic analysis preferred over rule-based result"
                );
                report
            }
            Ok(_) => baseline,
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "Dynamic analysis failed, using rule-based result");
                baseline
            }
        }
    }
}

fn port_text(task: &DiagnosticTask) -> String {
    task.port.map_or_else(|| "?".to_string(), |p| p.to_string())
}

fn match_signatures(task: &DiagnosticTask, s: &Signals<'_>, step_count: usize) -> Finding {
    let target = &task.target;
    let port = port_text(task);
    let connect = s.connect.map(|c| c.error_type);

    if let (Some(ConnectOutcome::Refused), Some(listen)) = (connect, s.port) {
        if !listen.is_listening {
            return Finding {
                signature: "service_not_listening",
                root_cause: format!("Service on {target}:{port} is not running or not listening"),
                confidence: 0.9,
                need_human: false,
                evidence: vec![
                    format!("Connect test to {target}:{port} was refused"),
                    format!("No process is listening on port {port} on {target}"),
                ],
                suggestions: vec![
                    "Check the service state: systemctl status <service>".to_string(),
                    format!("Confirm the service is configured to listen on port {port}"),
                    "Read the service logs: journalctl -u <service>".to_string(),
                ],
            };
        }
    }

    if let (Some(ConnectOutcome::Timeout), Some(ping), Some(fw)) = (connect, s.ping, s.firewall) {
        if ping.is_reachable && fw.has_blocking_rule {
            let rule = match &fw.rule_line {
                Some(line) => format!("Blocking rule in {}: {line}", fw.chain),
                None => format!("Chain {} default policy is {}", fw.chain, fw.default_policy),
            };
            return Finding {
                signature: "firewall_block",
                root_cause: format!("Firewall on {target} blocks inbound port {port}"),
                confidence: 0.85,
                need_human: false,
                evidence: vec![
                    format!("Connect test to {target}:{port} timed out"),
                    format!("{target} answers ping ({}% loss)", ping.packet_loss),
                    rule,
                ],
                suggestions: vec![
                    format!("Review the rules: iptables -L {} -n -v", fw.chain),
                    format!("Allow the port: iptables -I {} -p tcp --dport {port} -j ACCEPT", fw.chain),
                    "Check cloud security groups and upstream ACLs".to_string(),
                ],
            };
        }
    }

    if let (Some(ping), Some(trace)) = (s.ping, s.trace) {
        if !ping.is_reachable && trace.first_timeout_hop.is_some() {
            let last = trace.last_reachable_ip().unwrap_or(task.source.as_str());
            let device = s.failed_hop.and_then(|h| h.failed_device_name.as_deref());
            let root_cause = match device {
                Some(name) => format!("Path fault at {name} after {last}"),
                None => format!("Path fault after {last}, likely a routing problem"),
            };
            let mut evidence = vec![
                format!("Ping {} -> {target} failed ({}% loss)", task.source, ping.packet_loss),
                format!("Traceroute stops after {last}"),
            ];
            if let Some(hop) = s.failed_hop {
                evidence.push(hop.reasoning.clone());
            }
            return Finding {
                signature: "path_fault",
                root_cause,
                confidence: 0.75,
                need_human: true,
                evidence,
                suggestions: vec![
                    "Check the routing configuration along the path".to_string(),
                    "Contact the network team".to_string(),
                    format!("Log into {last} and inspect its routing table"),
                ],
            };
        }
    }

    Finding {
        signature: "inconclusive",
        root_cause: "Inconclusive, manual review needed".to_string(),
        confidence: 0.5,
        need_human: true,
        evidence: vec![
            format!("Executed {step_count} steps"),
            "No known fault pattern matched".to_string(),
        ],
        suggestions: vec![
            "Review the executed steps".to_string(),
            "Escalate to a network engineer".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::FaultType;
    use crate::parsers::{DeviceType, Signal, TraceHop};
    use netdiag_tools::Chain;

    fn task() -> DiagnosticTask {
        DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::PortUnreachable).with_port(80)
    }

    fn connect(n: u32, outcome: ConnectOutcome) -> StepResult {
        StepResult::new(n, "Connect test", "telnet_test", false).with_signal(Signal::Connect(
            ConnectSignal {
                error_type: outcome,
                confidence: 0.95,
            },
        ))
    }

    fn listen(n: u32, listening: bool) -> StepResult {
        StepResult::new(n, "Check port listening", "check_port_listen", listening).with_signal(
            Signal::PortListen(PortStatus {
                port: 80,
                is_listening: listening,
                process_name: None,
                pid: None,
                bind_address: String::new(),
            }),
        )
    }

    fn ping(n: u32, reachable: bool) -> StepResult {
        StepResult::new(n, "Ping test", "ping_test", reachable).with_signal(Signal::Ping(
            PingStats {
                packets_transmitted: 4,
                packets_received: if reachable { 4 } else { 0 },
                packet_loss: if reachable { 0.0 } else { 100.0 },
                rtt_min: None,
                rtt_avg: None,
                rtt_max: None,
                is_reachable: reachable,
            },
        ))
    }

    fn firewall(n: u32) -> StepResult {
        StepResult::new(n, "Inspect firewall rules", "check_firewall", true).with_signal(
            Signal::Firewall(FirewallVerdict {
                chain: Chain::Input,
                port: 80,
                has_blocking_rule: true,
                rule_action: Some("DROP".into()),
                rule_line: None,
                default_policy: "DROP".into(),
            }),
        )
    }

    fn trace(n: u32) -> StepResult {
        let hop = TraceHop {
            hop_number: 2,
            ip_address: Some("10.10.1.1".into()),
            hostname: Some("10.10.1.1".into()),
            rtt_ms: Some(1.2),
            is_timeout: false,
        };
        StepResult::new(n, "Traceroute", "traceroute", true)
            .with_signal(Signal::Traceroute(TraceRoute {
                target_ip: "10.0.2.20".into(),
                hops: vec![hop.clone()],
                last_reachable_hop: Some(hop),
                first_timeout_hop: Some(3),
                is_complete: false,
            }))
            .with_signal(Signal::FailedHop(FailedHop {
                failed_hop_number: 3,
                failed_device_name: Some("leaf-02".into()),
                failed_device_type: DeviceType::LeafSwitch,
                last_reachable_ip: Some("10.10.1.1".into()),
                confidence: 0.85,
                reasoning: "next hop is leaf-02".into(),
            }))
    }

    #[test]
    fn test_service_not_listening() {
        let report = Analyzer::default().rule_based(
            &task(),
            &[connect(2, ConnectOutcome::Refused), listen(3, false)],
        );
        assert_eq!(report.confidence, 0.9);
        assert!(!report.need_human);
        assert!(report.root_cause.contains("not listening"));
        assert_eq!(report.metadata["signature"], "service_not_listening");
    }

    #[test]
    fn test_refused_without_port_check_is_inconclusive() {
        let report =
            Analyzer::default().rule_based(&task(), &[connect(2, ConnectOutcome::Refused)]);
        assert_eq!(report.confidence, 0.5);
        assert!(report.need_human);
        assert_eq!(report.evidence[0], "Executed 1 steps");
    }

    #[test]
    fn test_firewall_block() {
        let report = Analyzer::default().rule_based(
            &task(),
            &[connect(2, ConnectOutcome::Timeout), ping(4, true), firewall(5)],
        );
        assert_eq!(report.confidence, 0.85);
        assert!(!report.need_human);
        assert!(report.evidence.iter().any(|e| e.contains("default policy is DROP")));
        assert!(report
            .fix_suggestions
            .iter()
            .any(|s| s.contains("--dport 80")));
    }

    #[test]
    fn test_path_fault_cites_device() {
        let report = Analyzer::default().rule_based(
            &task(),
            &[connect(2, ConnectOutcome::Timeout), ping(4, false), trace(6)],
        );
        assert_eq!(report.confidence, 0.75);
        assert!(report.need_human);
        assert_eq!(report.root_cause, "Path fault at leaf-02 after 10.10.1.1");
        assert!(report.evidence.contains(&"Traceroute stops after 10.10.1.1".to_string()));
    }

    #[test]
    fn test_latest_signal_wins() {
        let report = Analyzer::default().rule_based(
            &task(),
            &[
                connect(2, ConnectOutcome::Refused),
                listen(3, false),
                listen(7, true),
            ],
        );
        assert_eq!(report.metadata["signature"], "inconclusive");
    }

    #[test]
    fn test_human_threshold_is_configurable() {
        let analyzer = Analyzer::new(AnalyzerConfig::default().with_human_review_threshold(0.95));
        let report =
            analyzer.rule_based(&task(), &[connect(2, ConnectOutcome::Refused), listen(3, false)]);
        assert!(report.need_human);
    }

    #[tokio::test]
    async fn test_confident_result_skips_hook() {
        let mut hook = MockAnalysisHook::new();
        hook.expect_analyze().never();
        let analyzer = Analyzer::default().with_hook(Arc::new(hook));
        let report = analyzer
            .analyze(&task(), &[connect(2, ConnectOutcome::Refused), listen(3, false)])
            .await;
        assert_eq!(report.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_hook_preferred_when_more_confident() {
        let mut hook = MockAnalysisHook::new();
        hook.expect_analyze().times(1).returning(|task, steps, _| {
            Ok(DiagnosticReport::new(task.task_id, "ARP table stale on leaf-02", 0.82, false, steps.to_vec()))
        });
        let analyzer = Analyzer::default().with_hook(Arc::new(hook));
        let report = analyzer.analyze(&task(), &[ping(2, false)]).await;
        assert_eq!(report.root_cause, "ARP table stale on leaf-02");
    }

    #[tokio::test]
    async fn test_hook_ignored_when_less_confident() {
        let mut hook = MockAnalysisHook::new();
        hook.expect_analyze().returning(|task, _, _| {
            Ok(DiagnosticReport::new(task.task_id, "guess", 0.4, true, vec![]))
        });
        let analyzer = Analyzer::default().with_hook(Arc::new(hook));
        let report = analyzer.analyze(&task(), &[ping(2, false)]).await;
        assert_eq!(report.metadata["signature"], "inconclusive");
    }

    #[tokio::test]
    async fn test_hook_failure_falls_back() {
        let mut hook = MockAnalysisHook::new();
        hook.expect_analyze()
            .returning(|_, _, _| Err(Error::Policy("provider down".into())));
        let analyzer = Analyzer::default().with_hook(Arc::new(hook));
        let steps = [connect(2, ConnectOutcome::Timeout), ping(4, false), trace(6)];
        let report = analyzer.analyze(&task(), &steps).await;
        assert_eq!(report.confidence, 0.75);
        assert_eq!(report.executed_steps.len(), 3);
    }
}
