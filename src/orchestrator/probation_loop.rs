//! Probation loop: periodically checks agents in PROBATION, graduating
//! them back to HEALTHY or sending them back to HEALING on relapse.

use super::Orchestrator;
use crate::types::LifecycleState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

pub fn spawn(orchestrator: Arc<Orchestrator>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let agents = orchestrator.telemetry.known_agents();
                    for agent_id in agents {
                        if orchestrator.lifecycle.state(&agent_id) != LifecycleState::Probation {
                            continue;
                        }
                        if let Err(e) = orchestrator.probation_tick_for_agent(&agent_id).await {
                            warn!(agent_id, error = %e, "probation tick failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
