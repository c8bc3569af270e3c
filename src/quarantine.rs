//! Quarantine controller: owns the set of quarantined agent ids and the
//! Enforcement strategy that actually stops traffic to them. Every
//! membership change is persisted to the Cache immediately.

use crate::cache::Cache;
use crate::enforcement::Enforcement;
use crate::store::VitalsStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct Quarantine {
    members: RwLock<BTreeSet<String>>,
    cache: Arc<Cache>,
    enforcement: Arc<dyn Enforcement>,
    store: Option<Arc<dyn VitalsStore>>,
    run_id: String,
}

impl Quarantine {
    pub async fn new(
        cache: Arc<Cache>,
        enforcement: Arc<dyn Enforcement>,
        store: Option<Arc<dyn VitalsStore>>,
        run_id: String,
    ) -> Self {
        let members = cache.quarantine().await;
        for agent_id in &members {
            enforcement.block(agent_id).await;
        }
        Self {
            members: RwLock::new(members),
            cache,
            enforcement,
            store,
            run_id,
        }
    }

    #[must_use]
    pub async fn is_quarantined(&self, agent_id: &str) -> bool {
        self.members.read().await.contains(agent_id)
    }

    #[must_use]
    pub async fn members(&self) -> BTreeSet<String> {
        self.members.read().await.clone()
    }

    pub async fn quarantine(&self, agent_id: &str) {
        {
            let mut guard = self.members.write().await;
            if !guard.insert(agent_id.to_string()) {
                return;
            }
        }
        self.enforcement.block(agent_id).await;
        self.persist().await;
        self.record_event(agent_id, true).await;
        info!(agent_id, "agent quarantined");
    }

    pub async fn release(&self, agent_id: &str) {
        {
            let mut guard = self.members.write().await;
            if !guard.remove(agent_id) {
                return;
            }
        }
        self.enforcement.unblock(agent_id).await;
        self.persist().await;
        self.record_event(agent_id, false).await;
        info!(agent_id, "agent released from quarantine");
    }

    async fn persist(&self) {
        let snapshot = self.members.read().await.clone();
        self.cache.put_quarantine(snapshot).await;
    }

    async fn record_event(&self, agent_id: &str, quarantined: bool) {
        if let Some(store) = &self.store {
            if let Err(e) = store.write_quarantine_event(&self.run_id, agent_id, quarantined).await {
                debug!(agent_id, error = %e, "quarantine event store write failed");
            }
        }
    }
}
