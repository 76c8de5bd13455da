//! Deterministic policy over the planner

use super::{Decision, Policy, PolicyKind};
use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::planner::Planner;
use crate::session::DiagnosticSession;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs the seed plan, follows the step graph, then asks the analyzer
pub struct RulePolicy {
    planner: Planner,
    analyzer: Arc<Analyzer>,
}

impl RulePolicy {
    /// Create a rule policy concluding through `analyzer`
    #[must_use]
    pub fn new(planner: Planner, analyzer: Arc<Analyzer>) -> Self {
        Self { planner, analyzer }
    }
}

#[async_trait::async_trait]
impl Policy for RulePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Rule
    }

    async fn decide(
        &self,
        session: &DiagnosticSession,
        _cancel: &CancellationToken,
    ) -> Result<Decision> {
        let task = &session.task;
        let executed: HashSet<u32> = session.steps().map(|s| s.step_number).collect();

        let next = self
            .planner
            .seed_plan(task)
            .into_iter()
            .find(|step| !executed.contains(&step.number))
            .or_else(|| {
                session
                    .last_step()
                    .and_then(|last| self.planner.next_step(task, last))
                    .filter(|step| !executed.contains(&step.number))
            });

        match next {
            Some(step) => {
                debug!(session_id = %session.id, step = step.number, tool = step.tool_name(), "Planned step");
                Ok(Decision::Invoke(vec![step.to_invocation()]))
            }
            None => {
                let steps = session.step_results();
                Ok(Decision::Conclude(self.analyzer.analyze(task, &steps).await))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiagnosticTask, FaultType, StepResult};
    use crate::parsers::{ConnectOutcome, ConnectSignal, Signal};

    fn policy() -> RulePolicy {
        RulePolicy::new(Planner::new(), Arc::new(Analyzer::default()))
    }

    fn session(fault: FaultType) -> DiagnosticSession {
        DiagnosticSession::new(
            DiagnosticTask::new("10.0.1.10", "10.0.2.20", fault).with_port(80),
            PolicyKind::Rule,
        )
    }

    async fn decide(session: &DiagnosticSession) -> Decision {
        policy()
            .decide(session, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_walks_seed_plan_first() {
        let mut s = session(FaultType::PortUnreachable);
        match decide(&s).await {
            Decision::Invoke(calls) => assert_eq!(calls[0].tool, "query_cmdb"),
            Decision::Conclude(_) => panic!("expected a step"),
        }

        s.push_step(StepResult::new(1, "Verify hosts in inventory", "query_cmdb", false))
            .unwrap();
        match decide(&s).await {
            Decision::Invoke(calls) => {
                assert_eq!(calls[0].tool, "telnet_test");
                assert_eq!(calls[0].planned_step, Some(2));
            }
            Decision::Conclude(_) => panic!("expected a step"),
        }
    }

    #[tokio::test]
    async fn test_follows_signal_then_concludes() {
        let mut s = session(FaultType::PortUnreachable);
        s.push_step(StepResult::new(1, "Verify hosts in inventory", "query_cmdb", true))
            .unwrap();
        s.push_step(
            StepResult::new(2, "Connect test", "telnet_test", false).with_signal(Signal::Connect(
                ConnectSignal {
                    error_type: ConnectOutcome::Success,
                    confidence: 1.0,
                },
            )),
        )
        .unwrap();

        match decide(&s).await {
            Decision::Conclude(report) => {
                assert_eq!(report.executed_steps.len(), 2);
                assert!(report.need_human);
            }
            Decision::Invoke(_) => panic!("plan should be exhausted"),
        }
    }

    #[tokio::test]
    async fn test_unplanned_fault_concludes_immediately() {
        match decide(&session(FaultType::Slow)).await {
            Decision::Conclude(report) => {
                assert_eq!(report.confidence, 0.5);
                assert!(report.executed_steps.is_empty());
            }
            Decision::Invoke(_) => panic!("slow faults have no plan"),
        }
    }
}
