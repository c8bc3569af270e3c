//! Approval queue surface: list PENDING / REJECTED, and the bulk
//! variants of approve / reject / heal-now the dashboard uses when an
//! operator acts on several agents at once.

use super::Orchestrator;
use crate::error::SentinelResult;
use crate::types::ApprovalRecord;

impl Orchestrator {
    pub async fn pending_approvals(&self) -> SentinelResult<Vec<ApprovalRecord>> {
        match &self.store {
            Some(store) => store.get_pending_approvals(&self.run_id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn rejected_approvals(&self) -> SentinelResult<Vec<ApprovalRecord>> {
        match &self.store {
            Some(store) => store.get_rejected_approvals(&self.run_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Bulk variants apply in the order the dashboard supplied the ids.
    pub async fn approve_many(&self, agent_ids: &[String]) -> Vec<(String, SentinelResult<()>)> {
        let mut results = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            results.push((agent_id.clone(), self.approve(agent_id).await));
        }
        results
    }

    pub async fn reject_many(&self, agent_ids: &[String]) -> Vec<(String, SentinelResult<()>)> {
        let mut results = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            results.push((agent_id.clone(), self.reject(agent_id).await));
        }
        results
    }

    pub async fn heal_now_many(&self, agent_ids: &[String]) -> Vec<(String, SentinelResult<()>)> {
        let mut results = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            results.push((agent_id.clone(), self.heal_now(agent_id).await));
        }
        results
    }
}
