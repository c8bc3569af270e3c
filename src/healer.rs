//! Healer: holds the default policy ladder per diagnosis kind, selects
//! the next action to try for an (agent, diagnosis) pair given Immune
//! memory's track record, and dispatches the chosen action through an
//! Executor.

use crate::baseline::BaselineLearner;
use crate::error::{SentinelError, SentinelResult};
use crate::executor::Executor;
use crate::immune::Immune;
use crate::lifecycle::Lifecycle;
use crate::types::{ActionOutcome, DiagnosisKind, HealingAction, LifecycleState};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

fn ladder(kind: DiagnosisKind) -> &'static [HealingAction] {
    use HealingAction::{ReduceAutonomy, ResetAgent, ResetMemory, RevokeTools, RollbackPrompt};
    match kind {
        DiagnosisKind::PromptDrift => &[ResetMemory, RollbackPrompt, ReduceAutonomy, ResetAgent],
        DiagnosisKind::PromptInjection => &[RevokeTools, ResetMemory, RollbackPrompt, ResetAgent],
        DiagnosisKind::InfiniteLoop => &[RevokeTools, ReduceAutonomy, ResetMemory, ResetAgent],
        DiagnosisKind::ToolInstability => &[ReduceAutonomy, RollbackPrompt, ResetAgent],
        DiagnosisKind::MemoryCorruption => &[ResetMemory, ResetAgent],
        DiagnosisKind::CostOverrun => &[ReduceAutonomy, RollbackPrompt, ResetMemory, ResetAgent],
        DiagnosisKind::ExternalCause => &[ReduceAutonomy, ResetAgent],
        DiagnosisKind::Unknown => &[ResetMemory, ReduceAutonomy, ResetAgent],
    }
}

pub struct Healer {
    immune: Arc<Immune>,
    executor: Arc<dyn Executor>,
    lifecycle: Arc<Lifecycle>,
    baseline: Arc<BaselineLearner>,
    action_timeout: Duration,
}

impl Healer {
    #[must_use]
    pub fn new(
        immune: Arc<Immune>,
        executor: Arc<dyn Executor>,
        lifecycle: Arc<Lifecycle>,
        baseline: Arc<BaselineLearner>,
        action_timeout_secs: u64,
    ) -> Self {
        Self {
            immune,
            executor,
            lifecycle,
            baseline,
            action_timeout: Duration::from_secs(action_timeout_secs),
        }
    }

    /// Selects the next action to try for this (agent, diagnosis) pair.
    /// `None` means exhaustion: no untried action remains on the ladder.
    pub async fn next(&self, agent_id: &str, diagnosis: DiagnosisKind) -> SentinelResult<Option<HealingAction>> {
        let failed = self.immune.failed_actions(agent_id, diagnosis).await?;
        let default_ladder = ladder(diagnosis);
        let ranked = self.immune.global_success(diagnosis);

        let mut candidates: Vec<HealingAction> = default_ladder
            .iter()
            .copied()
            .filter(|a| !failed.contains(a))
            .collect();

        candidates.sort_by_key(|action| {
            let success_rank = ranked.iter().position(|(a, _)| a == action);
            let success_count = ranked.iter().find(|(a, _)| a == action).map_or(0, |(_, c)| *c);
            let ladder_pos = default_ladder.iter().position(|a| a == action).unwrap_or(usize::MAX);
            // Descending success count (negate for ascending sort_by_key),
            // ties broken by default ladder position.
            (std::cmp::Reverse(success_count), success_rank.is_none(), ladder_pos)
        });

        Ok(candidates.into_iter().next())
    }

    /// Dispatches `action` for `agent_id` via the Executor, records the
    /// outcome in Immune memory, and — on success — transitions the
    /// agent from HEALING to PROBATION and accelerates its baseline so
    /// the new normal converges quickly.
    ///
    /// Caller is responsible for having already transitioned the agent
    /// into HEALING before calling this.
    pub async fn apply(
        &self,
        agent_id: &str,
        diagnosis: DiagnosisKind,
        action: HealingAction,
    ) -> SentinelResult<ActionOutcome> {
        let outcome = match tokio::time::timeout(self.action_timeout, self.executor.execute(agent_id, action)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(agent_id, ?action, error = %e, "healing action failed");
                self.immune.record_outcome(agent_id, diagnosis, action, false).await;
                return Err(e);
            }
            Err(_) => {
                warn!(agent_id, ?action, "healing action timed out");
                self.immune.record_outcome(agent_id, diagnosis, action, false).await;
                return Err(SentinelError::ExecutorTimeout {
                    agent_id: agent_id.to_string(),
                    action: format!("{action:?}"),
                    timeout_ms: self.action_timeout.as_millis() as u64,
                });
            }
        };

        self.immune.record_outcome(agent_id, diagnosis, action, outcome.success).await;

        if outcome.success {
            self.lifecycle
                .transition(agent_id, LifecycleState::Probation, format!("healed via {action:?}"))
                .await?;
            self.baseline.accelerate(agent_id);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BaselineConfig;
    use crate::enforcement::NoOpEnforcement;
    use crate::executor::SimulatedExecutor;
    use crate::types::HealingAction::{ReduceAutonomy, ResetAgent, ResetMemory, RollbackPrompt};

    fn harness() -> Healer {
        let immune = Arc::new(Immune::new(None, "run".to_string(), None));
        let executor = Arc::new(SimulatedExecutor::new());
        let enforcement = Arc::new(NoOpEnforcement);
        let lifecycle = Arc::new(Lifecycle::new(enforcement, 30));
        let baseline_config = BaselineConfig {
            span: 50.0,
            min_samples: 15,
            accel_multiplier: 3.0,
            accel_ticks: 20,
            stddev_floor_fraction: 0.05,
            ring_capacity: 2000,
        };
        let baseline = Arc::new(BaselineLearner::new(baseline_config, 2.0 / 51.0, None, None, "run".to_string()));
        Healer::new(immune, executor, lifecycle, baseline, 10)
    }

    #[tokio::test]
    async fn next_returns_default_ladder_head_with_no_history() {
        let healer = harness();
        let action = healer.next("a1", DiagnosisKind::PromptDrift).await.unwrap();
        assert_eq!(action, Some(ResetMemory));
    }

    #[tokio::test]
    async fn next_skips_failed_actions() {
        let healer = harness();
        healer.immune.record_outcome("a1", DiagnosisKind::PromptDrift, ResetMemory, false).await;
        let action = healer.next("a1", DiagnosisKind::PromptDrift).await.unwrap();
        assert_eq!(action, Some(RollbackPrompt));
    }

    #[tokio::test]
    async fn next_returns_none_when_ladder_exhausted() {
        let healer = harness();
        for action in ladder(DiagnosisKind::MemoryCorruption) {
            healer.immune.record_outcome("a1", DiagnosisKind::MemoryCorruption, *action, false).await;
        }
        let action = healer.next("a1", DiagnosisKind::MemoryCorruption).await.unwrap();
        assert_eq!(action, None);
    }

    #[tokio::test]
    async fn next_prefers_global_success_over_ladder_order() {
        let healer = harness();
        // ReduceAutonomy is third in PROMPT_DRIFT's default ladder but has
        // a strong track record elsewhere in the fleet.
        healer.immune.record_outcome("a2", DiagnosisKind::PromptDrift, ReduceAutonomy, true).await;
        let action = healer.next("a1", DiagnosisKind::PromptDrift).await.unwrap();
        assert_eq!(action, Some(ReduceAutonomy));
    }

    #[tokio::test]
    async fn apply_transitions_healing_to_probation_on_success() {
        let healer = harness();
        healer.lifecycle.transition("a1", LifecycleState::Healthy, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Suspected, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Draining, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Quarantined, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Healing, "r").await.unwrap();

        let outcome = healer.apply("a1", DiagnosisKind::PromptDrift, ResetMemory).await.unwrap();
        assert!(outcome.success);
        assert_eq!(healer.lifecycle.state("a1"), LifecycleState::Probation);
    }

    #[tokio::test]
    async fn apply_records_outcome_regardless_of_success() {
        let healer = harness();
        healer.lifecycle.transition("a1", LifecycleState::Healthy, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Suspected, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Draining, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Quarantined, "r").await.unwrap();
        healer.lifecycle.transition("a1", LifecycleState::Healing, "r").await.unwrap();
        healer.apply("a1", DiagnosisKind::PromptDrift, ResetAgent).await.unwrap();
        let ranked = healer.immune.global_success(DiagnosisKind::PromptDrift);
        assert!(ranked.iter().any(|(a, c)| *a == ResetAgent && *c == 1));
    }
}
