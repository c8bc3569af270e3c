//! Narrow remote HTTP binding for [`VitalsStore`]. Each trait method is
//! serialized as a single JSON POST against a configured base URL — the
//! concrete wire format of the time-series persistence layer is
//! out-of-core plumbing (spec §1); only this contract matters to the
//! core.

use super::VitalsStore;
use crate::error::{SentinelError, SentinelResult};
use crate::types::{
    ActionLogEntry, ApprovalRecord, BaselineProfile, DiagnosisKind, HealingAction, InfectionReport,
    Vitals,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

pub struct HttpStore {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        op: &str,
        body: &B,
    ) -> SentinelResult<R> {
        let url = format!("{}/{op}", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| SentinelError::TransientStoreFailure {
            operation: op.to_string(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(SentinelError::TransientStoreFailure {
                operation: op.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|e| SentinelError::TransientStoreFailure {
                operation: op.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl VitalsStore for HttpStore {
    async fn write_agent_vitals(&self, run_id: &str, vitals: &Vitals) -> SentinelResult<()> {
        self.post("write_agent_vitals", &json!({"run_id": run_id, "vitals": vitals}))
            .await
    }

    async fn get_recent_agent_vitals(
        &self,
        run_id: &str,
        agent_id: &str,
        window_secs: u64,
    ) -> SentinelResult<Vec<Vitals>> {
        self.post(
            "get_recent_agent_vitals",
            &json!({"run_id": run_id, "agent_id": agent_id, "window_secs": window_secs}),
        )
        .await
    }

    async fn get_latest_agent_vitals(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<Vitals>> {
        self.post(
            "get_latest_agent_vitals",
            &json!({"run_id": run_id, "agent_id": agent_id}),
        )
        .await
    }

    async fn get_total_executions(&self, run_id: &str) -> SentinelResult<u64> {
        self.post("get_total_executions", &json!({"run_id": run_id})).await
    }

    async fn write_baseline_profile(
        &self,
        run_id: &str,
        profile: &BaselineProfile,
    ) -> SentinelResult<()> {
        self.post(
            "write_baseline_profile",
            &json!({"run_id": run_id, "profile": profile}),
        )
        .await
    }

    async fn get_baseline_profile(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<BaselineProfile>> {
        self.post(
            "get_baseline_profile",
            &json!({"run_id": run_id, "agent_id": agent_id}),
        )
        .await
    }

    async fn write_infection_event(
        &self,
        run_id: &str,
        report: &InfectionReport,
    ) -> SentinelResult<()> {
        self.post(
            "write_infection_event",
            &json!({"run_id": run_id, "report": report}),
        )
        .await
    }

    async fn write_quarantine_event(
        &self,
        run_id: &str,
        agent_id: &str,
        quarantined: bool,
    ) -> SentinelResult<()> {
        self.post(
            "write_quarantine_event",
            &json!({"run_id": run_id, "agent_id": agent_id, "quarantined": quarantined}),
        )
        .await
    }

    async fn write_approval_event(
        &self,
        run_id: &str,
        record: &ApprovalRecord,
    ) -> SentinelResult<()> {
        self.post(
            "write_approval_event",
            &json!({"run_id": run_id, "record": record}),
        )
        .await
    }

    async fn get_latest_approval_state(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<ApprovalRecord>> {
        self.post(
            "get_latest_approval_state",
            &json!({"run_id": run_id, "agent_id": agent_id}),
        )
        .await
    }

    async fn get_pending_approvals(&self, run_id: &str) -> SentinelResult<Vec<ApprovalRecord>> {
        self.post("get_pending_approvals", &json!({"run_id": run_id})).await
    }

    async fn get_rejected_approvals(&self, run_id: &str) -> SentinelResult<Vec<ApprovalRecord>> {
        self.post("get_rejected_approvals", &json!({"run_id": run_id})).await
    }

    async fn write_healing_event(
        &self,
        run_id: &str,
        agent_id: &str,
        diagnosis: DiagnosisKind,
        action: HealingAction,
        success: bool,
    ) -> SentinelResult<()> {
        self.post(
            "write_healing_event",
            &json!({
                "run_id": run_id,
                "agent_id": agent_id,
                "diagnosis": diagnosis,
                "action": action,
                "success": success,
            }),
        )
        .await
    }

    async fn get_failed_actions(
        &self,
        run_id: &str,
        agent_id: &str,
        diagnosis: DiagnosisKind,
    ) -> SentinelResult<Vec<HealingAction>> {
        self.post(
            "get_failed_actions",
            &json!({"run_id": run_id, "agent_id": agent_id, "diagnosis": diagnosis}),
        )
        .await
    }

    async fn write_action_log(&self, run_id: &str, entry: &ActionLogEntry) -> SentinelResult<()> {
        self.post("write_action_log", &json!({"run_id": run_id, "entry": entry}))
            .await
    }

    async fn get_recent_action_log(
        &self,
        run_id: &str,
        limit: usize,
    ) -> SentinelResult<Vec<ActionLogEntry>> {
        self.post(
            "get_recent_action_log",
            &json!({"run_id": run_id, "limit": limit}),
        )
        .await
    }
}
