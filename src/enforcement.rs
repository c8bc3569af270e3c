//! Enforcement: the capability Lifecycle transitions and the Quarantine
//! controller dispatch through to actually stop (or resume) traffic to
//! an agent. Concrete bindings are narrow plumbing; the Composite
//! strategy is what lets several bindings run side by side.

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    TimedOut,
}

#[async_trait]
pub trait Enforcement: Send + Sync {
    async fn block(&self, agent_id: &str);
    async fn unblock(&self, agent_id: &str);
    async fn drain(&self, agent_id: &str, timeout: Duration) -> DrainOutcome;
}

/// Does nothing. Used when no enforcement binding is configured.
#[derive(Default)]
pub struct NoOpEnforcement;

#[async_trait]
impl Enforcement for NoOpEnforcement {
    async fn block(&self, _agent_id: &str) {}
    async fn unblock(&self, _agent_id: &str) {}
    async fn drain(&self, _agent_id: &str, _timeout: Duration) -> DrainOutcome {
        DrainOutcome::Drained
    }
}

/// Tracks blocked agent ids in memory, standing in for a policy pushed to
/// an API gateway.
#[derive(Default)]
pub struct GatewayEnforcement {
    blocked: DashSet<String>,
}

impl GatewayEnforcement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_blocked(&self, agent_id: &str) -> bool {
        self.blocked.contains(agent_id)
    }
}

#[async_trait]
impl Enforcement for GatewayEnforcement {
    async fn block(&self, agent_id: &str) {
        self.blocked.insert(agent_id.to_string());
    }
    async fn unblock(&self, agent_id: &str) {
        self.blocked.remove(agent_id);
    }
    async fn drain(&self, _agent_id: &str, _timeout: Duration) -> DrainOutcome {
        DrainOutcome::Drained
    }
}

/// Stands in for a process-level suspend/resume signal.
#[derive(Default)]
pub struct ProcessEnforcement {
    suspended: DashSet<String>,
}

impl ProcessEnforcement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_suspended(&self, agent_id: &str) -> bool {
        self.suspended.contains(agent_id)
    }
}

#[async_trait]
impl Enforcement for ProcessEnforcement {
    async fn block(&self, agent_id: &str) {
        self.suspended.insert(agent_id.to_string());
    }
    async fn unblock(&self, agent_id: &str) {
        self.suspended.remove(agent_id);
    }
    async fn drain(&self, agent_id: &str, timeout: Duration) -> DrainOutcome {
        // A real process binding would wait for in-flight work to exit;
        // here we simply honor the timeout budget as elapsed.
        tokio::time::sleep(Duration::from_millis(0)).await;
        let _ = (agent_id, timeout);
        DrainOutcome::Drained
    }
}

/// Stands in for a container pause/scale-to-zero call.
#[derive(Default)]
pub struct ContainerEnforcement {
    paused: DashSet<String>,
}

impl ContainerEnforcement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_paused(&self, agent_id: &str) -> bool {
        self.paused.contains(agent_id)
    }
}

#[async_trait]
impl Enforcement for ContainerEnforcement {
    async fn block(&self, agent_id: &str) {
        self.paused.insert(agent_id.to_string());
    }
    async fn unblock(&self, agent_id: &str) {
        self.paused.remove(agent_id);
    }
    async fn drain(&self, _agent_id: &str, _timeout: Duration) -> DrainOutcome {
        DrainOutcome::Drained
    }
}

/// Chains several strategies: `block` stops at the first success,
/// `unblock` and `drain` run against all of them.
pub struct CompositeEnforcement {
    strategies: Vec<Arc<dyn Enforcement>>,
}

impl CompositeEnforcement {
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn Enforcement>>) -> Self {
        Self { strategies }
    }
}

#[async_trait]
impl Enforcement for CompositeEnforcement {
    async fn block(&self, agent_id: &str) {
        for strategy in &self.strategies {
            strategy.block(agent_id).await;
        }
    }

    async fn unblock(&self, agent_id: &str) {
        for strategy in &self.strategies {
            strategy.unblock(agent_id).await;
        }
    }

    async fn drain(&self, agent_id: &str, timeout: Duration) -> DrainOutcome {
        let mut outcome = DrainOutcome::Drained;
        for strategy in &self.strategies {
            if strategy.drain(agent_id, timeout).await == DrainOutcome::TimedOut {
                outcome = DrainOutcome::TimedOut;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gateway_enforcement_tracks_block_state() {
        let enforcement = GatewayEnforcement::new();
        assert!(!enforcement.is_blocked("a1"));
        enforcement.block("a1").await;
        assert!(enforcement.is_blocked("a1"));
        enforcement.unblock("a1").await;
        assert!(!enforcement.is_blocked("a1"));
    }

    #[tokio::test]
    async fn composite_unblocks_all_strategies() {
        let gateway = Arc::new(GatewayEnforcement::new());
        let process = Arc::new(ProcessEnforcement::new());
        let composite = CompositeEnforcement::new(vec![gateway.clone(), process.clone()]);
        composite.block("a1").await;
        assert!(gateway.is_blocked("a1"));
        assert!(process.is_suspended("a1"));
        composite.unblock("a1").await;
        assert!(!gateway.is_blocked("a1"));
        assert!(!process.is_suspended("a1"));
    }
}
