//! Reference in-memory [`VitalsStore`] implementation. Used by tests and
//! as the default binding when no remote Store URL is configured.

use super::VitalsStore;
use crate::error::SentinelResult;
use crate::types::{
    ActionLogEntry, ApprovalRecord, ApprovalStatus, BaselineProfile, DiagnosisKind, HealingAction,
    InfectionReport, Vitals,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Mutex;

type RunAgentKey = (String, String);
type RunAgentActionKey = (String, String, DiagnosisKind);

#[derive(Default)]
pub struct InMemoryStore {
    vitals: DashMap<RunAgentKey, Vec<Vitals>>,
    baselines: DashMap<RunAgentKey, BaselineProfile>,
    infections: DashMap<String, Vec<InfectionReport>>,
    approvals: DashMap<RunAgentKey, ApprovalRecord>,
    healing_outcomes: DashMap<RunAgentActionKey, HashSet<HealingAction>>,
    action_log: DashMap<String, Mutex<Vec<ActionLogEntry>>>,
    total_executions: DashMap<String, u64>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VitalsStore for InMemoryStore {
    async fn write_agent_vitals(&self, run_id: &str, vitals: &Vitals) -> SentinelResult<()> {
        let key = (run_id.to_string(), vitals.agent_id.clone());
        self.vitals.entry(key).or_default().push(vitals.clone());
        *self.total_executions.entry(run_id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn get_recent_agent_vitals(
        &self,
        run_id: &str,
        agent_id: &str,
        window_secs: u64,
    ) -> SentinelResult<Vec<Vitals>> {
        let key = (run_id.to_string(), agent_id.to_string());
        let cutoff = Utc::now() - chrono::Duration::seconds(window_secs as i64);
        Ok(self
            .vitals
            .get(&key)
            .map(|v| v.iter().filter(|x| x.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_latest_agent_vitals(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<Vitals>> {
        let key = (run_id.to_string(), agent_id.to_string());
        Ok(self.vitals.get(&key).and_then(|v| v.last().cloned()))
    }

    async fn get_total_executions(&self, run_id: &str) -> SentinelResult<u64> {
        Ok(self.total_executions.get(run_id).map_or(0, |v| *v))
    }

    async fn write_baseline_profile(
        &self,
        run_id: &str,
        profile: &BaselineProfile,
    ) -> SentinelResult<()> {
        let key = (run_id.to_string(), profile.agent_id.clone());
        self.baselines.insert(key, profile.clone());
        Ok(())
    }

    async fn get_baseline_profile(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<BaselineProfile>> {
        let key = (run_id.to_string(), agent_id.to_string());
        Ok(self.baselines.get(&key).map(|v| v.clone()))
    }

    async fn write_infection_event(
        &self,
        run_id: &str,
        report: &InfectionReport,
    ) -> SentinelResult<()> {
        self.infections
            .entry(run_id.to_string())
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn write_quarantine_event(
        &self,
        _run_id: &str,
        _agent_id: &str,
        _quarantined: bool,
    ) -> SentinelResult<()> {
        Ok(())
    }

    async fn write_approval_event(
        &self,
        run_id: &str,
        record: &ApprovalRecord,
    ) -> SentinelResult<()> {
        let key = (run_id.to_string(), record.agent_id.clone());
        self.approvals.insert(key, record.clone());
        Ok(())
    }

    async fn get_latest_approval_state(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<ApprovalRecord>> {
        let key = (run_id.to_string(), agent_id.to_string());
        Ok(self.approvals.get(&key).map(|v| v.clone()))
    }

    async fn get_pending_approvals(&self, run_id: &str) -> SentinelResult<Vec<ApprovalRecord>> {
        Ok(self
            .approvals
            .iter()
            .filter(|e| e.key().0 == run_id && e.value().status == ApprovalStatus::Pending)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_rejected_approvals(&self, run_id: &str) -> SentinelResult<Vec<ApprovalRecord>> {
        Ok(self
            .approvals
            .iter()
            .filter(|e| e.key().0 == run_id && e.value().status == ApprovalStatus::Rejected)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn write_healing_event(
        &self,
        run_id: &str,
        agent_id: &str,
        diagnosis: DiagnosisKind,
        action: HealingAction,
        success: bool,
    ) -> SentinelResult<()> {
        if !success {
            let key = (run_id.to_string(), agent_id.to_string(), diagnosis);
            self.healing_outcomes.entry(key).or_default().insert(action);
        }
        Ok(())
    }

    async fn get_failed_actions(
        &self,
        run_id: &str,
        agent_id: &str,
        diagnosis: DiagnosisKind,
    ) -> SentinelResult<Vec<HealingAction>> {
        let key = (run_id.to_string(), agent_id.to_string(), diagnosis);
        Ok(self
            .healing_outcomes
            .get(&key)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn write_action_log(&self, run_id: &str, entry: &ActionLogEntry) -> SentinelResult<()> {
        self.action_log
            .entry(run_id.to_string())
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    async fn get_recent_action_log(
        &self,
        run_id: &str,
        limit: usize,
    ) -> SentinelResult<Vec<ActionLogEntry>> {
        Ok(self.action_log.get(run_id).map_or_else(Vec::new, |v| {
            let guard = v.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.iter().rev().take(limit).cloned().collect()
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ErrorType;

    fn sample_vitals(agent_id: &str) -> Vitals {
        Vitals {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            latency_ms: 100.0,
            input_tokens: 500,
            output_tokens: 500,
            tool_calls: 1,
            retries: 0,
            success: true,
            cost: 0.01,
            model: "test-model".to_string(),
            error_type: ErrorType::None,
            prompt_hash: "abc123".to_string(),
            agent_type: None,
            mcp_servers: None,
        }
    }

    #[tokio::test]
    async fn run_isolation_holds() {
        let store = InMemoryStore::new();
        store
            .write_agent_vitals("run-a", &sample_vitals("agent-1"))
            .await
            .unwrap();

        let from_b = store
            .get_recent_agent_vitals("run-b", "agent-1", 3600)
            .await
            .unwrap();
        assert!(from_b.is_empty());

        let from_a = store
            .get_recent_agent_vitals("run-a", "agent-1", 3600)
            .await
            .unwrap();
        assert_eq!(from_a.len(), 1);
    }

    #[tokio::test]
    async fn failed_actions_accumulate_per_diagnosis() {
        let store = InMemoryStore::new();
        store
            .write_healing_event(
                "run-a",
                "agent-1",
                DiagnosisKind::PromptInjection,
                HealingAction::RevokeTools,
                false,
            )
            .await
            .unwrap();
        store
            .write_healing_event(
                "run-a",
                "agent-1",
                DiagnosisKind::PromptInjection,
                HealingAction::ResetMemory,
                false,
            )
            .await
            .unwrap();
        store
            .write_healing_event(
                "run-a",
                "agent-1",
                DiagnosisKind::PromptInjection,
                HealingAction::RollbackPrompt,
                true,
            )
            .await
            .unwrap();

        let failed = store
            .get_failed_actions("run-a", "agent-1", DiagnosisKind::PromptInjection)
            .await
            .unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.contains(&HealingAction::RevokeTools));
        assert!(failed.contains(&HealingAction::ResetMemory));
        assert!(!failed.contains(&HealingAction::RollbackPrompt));
    }
}
