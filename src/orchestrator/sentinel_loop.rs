//! Sentinel loop: every tick, scans each non-quarantined agent with a
//! ready baseline and drives the lifecycle/quarantine/healing
//! consequences of what it finds.

use super::Orchestrator;
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
                        if let Err(e) = orchestrator.sentinel_tick_for_agent(&agent_id).await {
                            warn!(agent_id, error = %e, "sentinel tick failed");
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
