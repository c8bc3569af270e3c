//! HTTP surface: ingest, gateway hook, approval queue, feedback, and a
//! read-only dashboard status endpoint. Thin by design — all decisions
//! live in [`crate::orchestrator`].

pub mod handlers;
pub mod responses;
pub mod validation;

pub use responses::{ApiError, ApiResponse};

use crate::orchestrator::Orchestrator;
use crate::ratelimit::RateLimiter;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Shared state handed to every handler.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// `None` disables the `x-api-key` check entirely. In practice a key
    /// always exists by the time the server starts: [`crate::cache::Cache`]
    /// auto-generates and persists one on first run if the operator didn't
    /// configure one explicitly.
    pub api_key: Option<String>,
    /// Throttles the ingest surface per `x-api-key`.
    pub rate_limiter: Arc<RateLimiter>,
}

#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/vitals", post(handlers::ingest_vitals))
        .route("/v1/gateway/hook", post(handlers::gateway_hook))
        .route("/v1/approvals/pending", get(handlers::list_pending_approvals))
        .route("/v1/approvals/rejected", get(handlers::list_rejected_approvals))
        .route("/v1/approvals/:agent_id/approve", post(handlers::approve))
        .route("/v1/approvals/:agent_id/reject", post(handlers::reject))
        .route("/v1/approvals/:agent_id/heal_now", post(handlers::heal_now))
        .route("/v1/approvals/approve", post(handlers::approve_bulk))
        .route("/v1/approvals/reject", post(handlers::reject_bulk))
        .route("/v1/approvals/heal_now", post(handlers::heal_now_bulk))
        .route("/v1/feedback", post(handlers::submit_feedback))
        .route("/v1/dashboard/status", get(handlers::dashboard_status))
        .with_state(state)
}
