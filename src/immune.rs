//! Immune memory: remembers which healing actions have failed for a given
//! (agent, diagnosis) pair and which actions succeed most often globally
//! for a diagnosis kind, so the Healer can skip what's already failed and
//! prefer what tends to work.

use crate::diagnostician::Diagnostician;
use crate::error::SentinelResult;
use crate::store::VitalsStore;
use crate::types::{DiagnosisKind, HealingAction};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

type GlobalKey = (DiagnosisKind, HealingAction);
type AgentFailureKey = (String, DiagnosisKind, HealingAction);

/// Observes healing outcomes and ranks actions by track record. Durable
/// state lives in the Store when attached; in-memory counters always
/// track global success ranking, and also stand in for per-agent failure
/// exclusion when there is no Store to ask (spec §7's degraded-mode
/// requirement that `Healer::next` still never repeats a failed action).
pub struct Immune {
    store: Option<Arc<dyn VitalsStore>>,
    run_id: String,
    success_counts: DashMap<GlobalKey, u64>,
    failures: DashMap<AgentFailureKey, ()>,
    diagnostician: Option<Arc<Diagnostician>>,
}

impl Immune {
    #[must_use]
    pub fn new(store: Option<Arc<dyn VitalsStore>>, run_id: String, diagnostician: Option<Arc<Diagnostician>>) -> Self {
        Self {
            store,
            run_id,
            success_counts: DashMap::new(),
            failures: DashMap::new(),
            diagnostician,
        }
    }

    /// Records one dispatched action's outcome. Always durable via the
    /// Store (best-effort); global success ranking and per-agent failure
    /// exclusion are both tracked in memory as well.
    pub async fn record_outcome(
        &self,
        agent_id: &str,
        diagnosis: DiagnosisKind,
        action: HealingAction,
        success: bool,
    ) {
        if success {
            *self.success_counts.entry((diagnosis, action)).or_insert(0) += 1;
        } else {
            self.failures.insert((agent_id.to_string(), diagnosis, action), ());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store
                .write_healing_event(&self.run_id, agent_id, diagnosis, action, success)
                .await
            {
                debug!(agent_id, error = %e, "immune memory store write failed");
            }
        }
    }

    /// Actions known to have already failed for this exact (agent,
    /// diagnosis) pair. Prefers the Store when attached; falls back to
    /// the in-memory record when there is none, so the Healer's
    /// exclusion still holds without a Store configured.
    pub async fn failed_actions(&self, agent_id: &str, diagnosis: DiagnosisKind) -> SentinelResult<Vec<HealingAction>> {
        if let Some(store) = &self.store {
            return store.get_failed_actions(&self.run_id, agent_id, diagnosis).await;
        }
        Ok(self
            .failures
            .iter()
            .filter(|e| e.key().0 == agent_id && e.key().1 == diagnosis)
            .map(|e| e.key().2)
            .collect())
    }

    /// All known actions for `diagnosis`, ordered by global success count
    /// descending. Actions never attempted are absent, not zero-ranked;
    /// the Healer falls back to ladder position for those.
    #[must_use]
    pub fn global_success(&self, diagnosis: DiagnosisKind) -> Vec<(HealingAction, u64)> {
        let mut ranked: Vec<(HealingAction, u64)> = self
            .success_counts
            .iter()
            .filter(|e| e.key().0 == diagnosis)
            .map(|e| (e.key().1, *e.value()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// Forwards operator feedback to the Diagnostician, if attached, so
    /// future diagnoses for this agent account for it.
    pub fn record_feedback(&self, agent_id: &str, diagnosis_kind: DiagnosisKind, label: crate::types::FeedbackLabel) {
        if let Some(diagnostician) = &self.diagnostician {
            diagnostician.record_feedback(agent_id, diagnosis_kind, label);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn failed_actions_delegates_to_store() {
        let store = Arc::new(InMemoryStore::new());
        let immune = Immune::new(Some(store.clone()), "run".to_string(), None);
        immune
            .record_outcome("a1", DiagnosisKind::PromptDrift, HealingAction::ResetMemory, false)
            .await;
        let failed = immune.failed_actions("a1", DiagnosisKind::PromptDrift).await.unwrap();
        assert_eq!(failed, vec![HealingAction::ResetMemory]);
    }

    #[tokio::test]
    async fn failed_actions_falls_back_to_memory_without_a_store() {
        let immune = Immune::new(None, "run".to_string(), None);
        immune
            .record_outcome("a1", DiagnosisKind::PromptDrift, HealingAction::ResetMemory, false)
            .await;
        immune
            .record_outcome("a2", DiagnosisKind::PromptDrift, HealingAction::RollbackPrompt, false)
            .await;
        let failed = immune.failed_actions("a1", DiagnosisKind::PromptDrift).await.unwrap();
        assert_eq!(failed, vec![HealingAction::ResetMemory]);
    }

    #[tokio::test]
    async fn global_success_ranks_by_count_descending() {
        let immune = Immune::new(None, "run".to_string(), None);
        for _ in 0..3 {
            immune
                .record_outcome("a1", DiagnosisKind::ToolInstability, HealingAction::ReduceAutonomy, true)
                .await;
        }
        immune
            .record_outcome("a2", DiagnosisKind::ToolInstability, HealingAction::RollbackPrompt, true)
            .await;
        let ranked = immune.global_success(DiagnosisKind::ToolInstability);
        assert_eq!(ranked[0], (HealingAction::ReduceAutonomy, 3));
        assert_eq!(ranked[1], (HealingAction::RollbackPrompt, 1));
    }

    #[tokio::test]
    async fn success_counts_are_scoped_by_diagnosis_kind() {
        let immune = Immune::new(None, "run".to_string(), None);
        immune
            .record_outcome("a1", DiagnosisKind::PromptDrift, HealingAction::ResetMemory, true)
            .await;
        immune
            .record_outcome("a1", DiagnosisKind::MemoryCorruption, HealingAction::ResetMemory, true)
            .await;
        assert_eq!(immune.global_success(DiagnosisKind::PromptDrift).len(), 1);
        assert_eq!(immune.global_success(DiagnosisKind::MemoryCorruption).len(), 1);
    }
}
