//! Executor: the capability the Healer dispatches a chosen
//! [`HealingAction`] through. The Healer depends only on this trait;
//! concrete bindings (gateway call, process signal, container API) are
//! out-of-core plumbing. [`SimulatedExecutor`] is the reference binding
//! used by the bundled simulator and by tests.

use crate::error::SentinelResult;
use crate::types::{ActionOutcome, HealingAction};
use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, agent_id: &str, action: HealingAction) -> SentinelResult<ActionOutcome>;
}

/// In-memory agent state a simulated healing action mutates. Mirrors the
/// fields a real executor would change out of process.
#[derive(Debug, Clone)]
pub struct SimulatedAgentState {
    pub memory_cleared: bool,
    pub prompt_version: u32,
    pub autonomy_level: u8,
    pub tools_enabled: bool,
    pub reset_count: u32,
}

impl Default for SimulatedAgentState {
    fn default() -> Self {
        Self {
            memory_cleared: false,
            prompt_version: 0,
            autonomy_level: 3,
            tools_enabled: true,
            reset_count: 0,
        }
    }
}

/// Reference Executor binding used by the bundled simulator. Mutates
/// in-memory state fields that stand in for the real side effects a
/// gateway, process, or container executor would have.
#[derive(Default)]
pub struct SimulatedExecutor {
    agents: DashMap<String, SimulatedAgentState>,
}

impl SimulatedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self, agent_id: &str) -> SimulatedAgentState {
        self.agents.get(agent_id).map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, agent_id: &str, action: HealingAction) -> SentinelResult<ActionOutcome> {
        let mut entry = self.agents.entry(agent_id.to_string()).or_default();
        let message = match action {
            HealingAction::ResetMemory => {
                entry.memory_cleared = true;
                "memory cleared"
            }
            HealingAction::RollbackPrompt => {
                entry.prompt_version = entry.prompt_version.saturating_sub(1);
                "prompt rolled back"
            }
            HealingAction::ReduceAutonomy => {
                entry.autonomy_level = entry.autonomy_level.saturating_sub(1);
                "autonomy reduced"
            }
            HealingAction::RevokeTools => {
                entry.tools_enabled = false;
                "tools revoked"
            }
            HealingAction::ResetAgent => {
                *entry = SimulatedAgentState {
                    reset_count: entry.reset_count + 1,
                    ..SimulatedAgentState::default()
                };
                "agent fully reset"
            }
        };
        Ok(ActionOutcome {
            success: true,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_memory_sets_flag() {
        let executor = SimulatedExecutor::new();
        executor.execute("a1", HealingAction::ResetMemory).await.unwrap();
        assert!(executor.state("a1").memory_cleared);
    }

    #[tokio::test]
    async fn revoke_tools_disables_tools() {
        let executor = SimulatedExecutor::new();
        executor.execute("a1", HealingAction::RevokeTools).await.unwrap();
        assert!(!executor.state("a1").tools_enabled);
    }

    #[tokio::test]
    async fn reset_agent_clears_all_fields_and_counts_resets() {
        let executor = SimulatedExecutor::new();
        executor.execute("a1", HealingAction::ResetMemory).await.unwrap();
        executor.execute("a1", HealingAction::RevokeTools).await.unwrap();
        executor.execute("a1", HealingAction::ResetAgent).await.unwrap();
        let state = executor.state("a1");
        assert!(!state.memory_cleared);
        assert!(state.tools_enabled);
        assert_eq!(state.reset_count, 1);
    }

    #[tokio::test]
    async fn reduce_autonomy_does_not_underflow() {
        let executor = SimulatedExecutor::new();
        for _ in 0..10 {
            executor.execute("a1", HealingAction::ReduceAutonomy).await.unwrap();
        }
        assert_eq!(executor.state("a1").autonomy_level, 0);
    }
}
