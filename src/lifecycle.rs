//! The 8-state agent lifecycle. Guards that depend on infection data,
//! approvals, or healing results are evaluated by the Orchestrator;
//! this module is the source of truth for which state pairs are legal
//! and for running the Enforcement hook that accompanies each of them.

use crate::enforcement::Enforcement;
use crate::error::{SentinelError, SentinelResult};
use crate::types::LifecycleEvent;
use crate::types::LifecycleState;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const HISTORY_CAPACITY: usize = 50;

const ALLOWED: &[(LifecycleState, LifecycleState)] = &[
    (LifecycleState::Initializing, LifecycleState::Healthy),
    (LifecycleState::Healthy, LifecycleState::Suspected),
    (LifecycleState::Suspected, LifecycleState::Healthy),
    (LifecycleState::Suspected, LifecycleState::Draining),
    (LifecycleState::Healthy, LifecycleState::Draining),
    (LifecycleState::Draining, LifecycleState::Quarantined),
    (LifecycleState::Quarantined, LifecycleState::Healing),
    (LifecycleState::Healing, LifecycleState::Probation),
    (LifecycleState::Probation, LifecycleState::Healthy),
    (LifecycleState::Probation, LifecycleState::Healing),
    (LifecycleState::Healing, LifecycleState::Exhausted),
    (LifecycleState::Exhausted, LifecycleState::Healing),
];

struct AgentRecord {
    state: LifecycleState,
    history: VecDeque<LifecycleEvent>,
}

impl AgentRecord {
    fn new() -> Self {
        Self {
            state: LifecycleState::Initializing,
            history: VecDeque::new(),
        }
    }

    fn push(&mut self, event: LifecycleEvent) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }
}

/// Owns every agent's lifecycle state and transition history.
pub struct Lifecycle {
    agents: DashMap<String, AgentRecord>,
    enforcement: Arc<dyn Enforcement>,
    drain_timeout: Duration,
}

impl Lifecycle {
    #[must_use]
    pub fn new(enforcement: Arc<dyn Enforcement>, drain_timeout_secs: u64) -> Self {
        Self {
            agents: DashMap::new(),
            enforcement,
            drain_timeout: Duration::from_secs(drain_timeout_secs),
        }
    }

    #[must_use]
    pub fn state(&self, agent_id: &str) -> LifecycleState {
        self.agents
            .get(agent_id)
            .map_or(LifecycleState::Initializing, |r| r.state)
    }

    #[must_use]
    pub fn history(&self, agent_id: &str) -> Vec<LifecycleEvent> {
        self.agents
            .get(agent_id)
            .map(|r| r.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn is_legal(from: LifecycleState, to: LifecycleState) -> bool {
        ALLOWED.contains(&(from, to))
    }

    /// Validates and applies a transition, then runs the accompanying
    /// Enforcement hook. Guard conditions (infection data, approvals,
    /// healing results) must already have been checked by the caller.
    pub async fn transition(
        &self,
        agent_id: &str,
        to: LifecycleState,
        reason: impl Into<String>,
    ) -> SentinelResult<LifecycleState> {
        let from = self.state(agent_id);
        if from == to {
            return Ok(to);
        }
        if !Self::is_legal(from, to) {
            return Err(SentinelError::BadInput {
                reason: format!("illegal lifecycle transition {from:?} -> {to:?}"),
            });
        }

        let reason = reason.into();
        {
            let mut entry = self.agents.entry(agent_id.to_string()).or_insert_with(AgentRecord::new);
            entry.state = to;
            entry.push(LifecycleEvent {
                from,
                to,
                at: Utc::now(),
                reason: reason.clone(),
            });
        }

        info!(agent_id, ?from, ?to, reason = %reason, "lifecycle transition");

        match to {
            LifecycleState::Draining => {
                self.enforcement.drain(agent_id, self.drain_timeout).await;
            }
            LifecycleState::Quarantined | LifecycleState::Healing => {
                self.enforcement.block(agent_id).await;
            }
            LifecycleState::Healthy | LifecycleState::Probation => {
                self.enforcement.unblock(agent_id).await;
            }
            LifecycleState::Initializing | LifecycleState::Suspected | LifecycleState::Exhausted => {}
        }

        Ok(to)
    }

    /// Whether an agent in this state still receives scheduled vitals
    /// (spec §4.11's agent-loop eligibility: HEALTHY, SUSPECTED,
    /// DRAINING-but-in-flight, PROBATION, INITIALIZING).
    #[must_use]
    pub fn accepts_vitals(state: LifecycleState) -> bool {
        matches!(
            state,
            LifecycleState::Initializing
                | LifecycleState::Healthy
                | LifecycleState::Suspected
                | LifecycleState::Draining
                | LifecycleState::Probation
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::enforcement::GatewayEnforcement;

    fn lifecycle() -> (Lifecycle, Arc<GatewayEnforcement>) {
        let enforcement = Arc::new(GatewayEnforcement::new());
        (Lifecycle::new(enforcement.clone(), 30), enforcement)
    }

    #[tokio::test]
    async fn initial_state_is_initializing() {
        let (lifecycle, _) = lifecycle();
        assert_eq!(lifecycle.state("a1"), LifecycleState::Initializing);
    }

    #[tokio::test]
    async fn legal_chain_initializing_to_quarantined() {
        let (lifecycle, enforcement) = lifecycle();
        lifecycle.transition("a1", LifecycleState::Healthy, "baseline ready").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Suspected, "infection").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Draining, "persisted").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Quarantined, "drained").await.unwrap();
        assert_eq!(lifecycle.state("a1"), LifecycleState::Quarantined);
        assert!(enforcement.is_blocked("a1"));
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let (lifecycle, _) = lifecycle();
        let result = lifecycle.transition("a1", LifecycleState::Quarantined, "skip").await;
        assert!(result.is_err());
        assert_eq!(lifecycle.state("a1"), LifecycleState::Initializing);
    }

    #[tokio::test]
    async fn healthy_can_bypass_suspected_straight_to_draining() {
        let (lifecycle, _) = lifecycle();
        lifecycle.transition("a1", LifecycleState::Healthy, "ready").await.unwrap();
        lifecycle
            .transition("a1", LifecycleState::Draining, "severe deviation")
            .await
            .unwrap();
        assert_eq!(lifecycle.state("a1"), LifecycleState::Draining);
    }

    #[tokio::test]
    async fn healthy_transition_unblocks_via_enforcement() {
        let (lifecycle, enforcement) = lifecycle();
        lifecycle.transition("a1", LifecycleState::Healthy, "ready").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Suspected, "infection").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Draining, "persisted").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Quarantined, "drained").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Healing, "approved").await.unwrap();
        lifecycle.transition("a1", LifecycleState::Probation, "action applied").await.unwrap();
        assert!(!enforcement.is_blocked("a1"));
        lifecycle.transition("a1", LifecycleState::Healthy, "probation passed").await.unwrap();
        assert!(!enforcement.is_blocked("a1"));
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let (lifecycle, _) = lifecycle();
        lifecycle.transition("a1", LifecycleState::Healthy, "r").await.unwrap();
        for _ in 0..100 {
            lifecycle.transition("a1", LifecycleState::Suspected, "r").await.unwrap();
            lifecycle.transition("a1", LifecycleState::Healthy, "r").await.unwrap();
        }
        assert!(lifecycle.history("a1").len() <= HISTORY_CAPACITY);
    }
}
