//! The `VitalsStore` abstraction: the only wire protocol the core
//! requires. Concrete bindings (in-memory reference, remote HTTP) are
//! plumbing; every operation here is scoped by a `run_id` so repeated
//! runs are isolated from one another (spec §6/§8 run-isolation
//! invariant).

pub mod http;
pub mod memory;

use crate::error::SentinelResult;
use crate::types::{
    ActionLogEntry, ApprovalRecord, BaselineProfile, DiagnosisKind, HealingAction, InfectionReport,
    Vitals,
};
use async_trait::async_trait;

pub use http::HttpStore;
pub use memory::InMemoryStore;

/// Abstract persistence contract for vitals, workflow state, and events.
///
/// All Store and Executor calls are try-and-continue (spec §7): a
/// transient failure here must not stop the pipeline, so every method
/// returns a `SentinelResult` that callers are expected to log and
/// swallow rather than propagate to a panic.
#[async_trait]
pub trait VitalsStore: Send + Sync {
    async fn write_agent_vitals(&self, run_id: &str, vitals: &Vitals) -> SentinelResult<()>;

    async fn get_recent_agent_vitals(
        &self,
        run_id: &str,
        agent_id: &str,
        window_secs: u64,
    ) -> SentinelResult<Vec<Vitals>>;

    async fn get_latest_agent_vitals(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<Vitals>>;

    async fn get_total_executions(&self, run_id: &str) -> SentinelResult<u64>;

    async fn write_baseline_profile(
        &self,
        run_id: &str,
        profile: &BaselineProfile,
    ) -> SentinelResult<()>;

    async fn get_baseline_profile(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<BaselineProfile>>;

    async fn write_infection_event(
        &self,
        run_id: &str,
        report: &InfectionReport,
    ) -> SentinelResult<()>;

    async fn write_quarantine_event(
        &self,
        run_id: &str,
        agent_id: &str,
        quarantined: bool,
    ) -> SentinelResult<()>;

    async fn write_approval_event(
        &self,
        run_id: &str,
        record: &ApprovalRecord,
    ) -> SentinelResult<()>;

    async fn get_latest_approval_state(
        &self,
        run_id: &str,
        agent_id: &str,
    ) -> SentinelResult<Option<ApprovalRecord>>;

    async fn get_pending_approvals(&self, run_id: &str) -> SentinelResult<Vec<ApprovalRecord>>;

    async fn get_rejected_approvals(&self, run_id: &str) -> SentinelResult<Vec<ApprovalRecord>>;

    async fn write_healing_event(
        &self,
        run_id: &str,
        agent_id: &str,
        diagnosis: DiagnosisKind,
        action: HealingAction,
        success: bool,
    ) -> SentinelResult<()>;

    async fn get_failed_actions(
        &self,
        run_id: &str,
        agent_id: &str,
        diagnosis: DiagnosisKind,
    ) -> SentinelResult<Vec<HealingAction>>;

    async fn write_action_log(&self, run_id: &str, entry: &ActionLogEntry) -> SentinelResult<()>;

    async fn get_recent_action_log(
        &self,
        run_id: &str,
        limit: usize,
    ) -> SentinelResult<Vec<ActionLogEntry>>;
}
