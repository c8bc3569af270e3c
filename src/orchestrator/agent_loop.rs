//! Agent loop: one scheduled source of vitals per known agent. The HTTP
//! ingest and gateway-extraction surfaces push vitals straight into
//! [`Orchestrator::ingest_vitals`] outside of this loop; this loop exists
//! for the bundled simulator, which pulls a synthetic sample for each of
//! its agents every tick.

use super::Orchestrator;
use crate::types::Vitals;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A pluggable per-tick vitals source, implemented by the bundled
/// simulator. A real deployment drives vitals entirely through ingest
/// and never needs this trait.
#[async_trait]
pub trait VitalsSource: Send + Sync {
    fn agent_ids(&self) -> Vec<String>;
    async fn next(&self, agent_id: &str) -> Option<Vitals>;
}

pub fn spawn(
    orchestrator: Arc<Orchestrator>,
    source: Arc<dyn VitalsSource>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for agent_id in source.agent_ids() {
                        if let Some(vitals) = source.next(&agent_id).await {
                            orchestrator.ingest_vitals(vitals).await;
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
