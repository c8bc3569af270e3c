//! HTTP handlers for the external surface: vitals ingest, the gateway
//! extraction hook, the approval queue, and operator feedback.

use super::responses::{ApiError, ApiResponse};
use super::validation::validate_vitals;
use super::AppState;
use crate::types::{DiagnosisKind, FeedbackLabel, Vitals};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn check_api_key(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return Err(ApiError::unauthorized("missing or invalid x-api-key header"));
    }
    Ok(())
}

/// Keys the ingest rate limiter off the caller's `x-api-key`, falling
/// back to a shared anonymous bucket when no key is configured.
async fn enforce_rate_limit(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let client_id = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous");
    if state.rate_limiter.check(client_id).await {
        Ok(())
    } else {
        Err(ApiError::rate_limited("ingest rate limit exceeded"))
    }
}

/// Accepts one vitals record. Unknown `agent_id`s are auto-registered:
/// the first sample simply starts that agent's lifecycle and baseline.
/// Responds 204 once the sample is durably accepted, or 202 when it was
/// only queued in memory because a configured Store was unreachable.
pub async fn ingest_vitals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(vitals): Json<Vitals>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    enforce_rate_limit(&headers, &state).await?;
    check_api_key(&headers, &state)?;
    let errors = validate_vitals(&vitals);
    if !errors.is_empty() {
        return Err(ApiError::bad_request(format!("{} field error(s)", errors.len())));
    }
    let store_healthy = state.orchestrator.ingest_vitals(vitals).await;
    let response = ApiResponse::new(serde_json::json!({"accepted": true}));
    Ok(if store_healthy {
        response.with_status(StatusCode::NO_CONTENT)
    } else {
        response.with_status(StatusCode::ACCEPTED)
    })
}

/// Gateway extraction hook: identical semantics to `ingest_vitals`,
/// separate path for an external proxy that derives vitals from an LLM
/// request/response pair rather than an agent self-reporting.
pub async fn gateway_hook(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    body: Json<Vitals>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    ingest_vitals(state, headers, body).await
}

pub async fn list_pending_approvals(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<crate::types::ApprovalRecord>>, ApiError> {
    Ok(ApiResponse::new(state.orchestrator.pending_approvals().await?))
}

pub async fn list_rejected_approvals(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<crate::types::ApprovalRecord>>, ApiError> {
    Ok(ApiResponse::new(state.orchestrator.rejected_approvals().await?))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    state.orchestrator.approve(&agent_id).await?;
    Ok(ApiResponse::new(serde_json::json!({"agent_id": agent_id, "status": "approved"})))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    state.orchestrator.reject(&agent_id).await?;
    Ok(ApiResponse::new(serde_json::json!({"agent_id": agent_id, "status": "rejected"})))
}

pub async fn heal_now(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    state.orchestrator.heal_now(&agent_id).await?;
    Ok(ApiResponse::new(serde_json::json!({"agent_id": agent_id, "status": "healing"})))
}

#[derive(Debug, Deserialize)]
pub struct BulkAgentIds {
    pub agent_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub agent_id: String,
    pub ok: bool,
    pub error: Option<String>,
}

fn to_bulk_result(results: Vec<(String, crate::error::SentinelResult<()>)>) -> Vec<BulkResult> {
    results
        .into_iter()
        .map(|(agent_id, result)| match result {
            Ok(()) => BulkResult {
                agent_id,
                ok: true,
                error: None,
            },
            Err(e) => BulkResult {
                agent_id,
                ok: false,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

pub async fn approve_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkAgentIds>,
) -> ApiResponse<Vec<BulkResult>> {
    ApiResponse::new(to_bulk_result(state.orchestrator.approve_many(&body.agent_ids).await))
}

pub async fn reject_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkAgentIds>,
) -> ApiResponse<Vec<BulkResult>> {
    ApiResponse::new(to_bulk_result(state.orchestrator.reject_many(&body.agent_ids).await))
}

pub async fn heal_now_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkAgentIds>,
) -> ApiResponse<Vec<BulkResult>> {
    ApiResponse::new(to_bulk_result(state.orchestrator.heal_now_many(&body.agent_ids).await))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub agent_id: String,
    pub diagnosis_kind_actual: DiagnosisKind,
    pub label: FeedbackLabel,
}

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FeedbackRequest>,
) -> ApiResponse<serde_json::Value> {
    state
        .orchestrator
        .immune
        .record_feedback(&body.agent_id, body.diagnosis_kind_actual, body.label);
    ApiResponse::new(serde_json::json!({"recorded": true}))
}

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub lifecycle_state: crate::types::LifecycleState,
    pub baseline_ready: bool,
    pub sample_count: u64,
    pub quarantined: bool,
}

pub async fn dashboard_status(State(state): State<Arc<AppState>>) -> ApiResponse<Vec<AgentStatus>> {
    let orchestrator = &state.orchestrator;
    let mut statuses = Vec::new();
    for agent_id in orchestrator.telemetry.known_agents() {
        let profile = orchestrator.baseline.profile(&agent_id);
        statuses.push(AgentStatus {
            lifecycle_state: orchestrator.lifecycle.state(&agent_id),
            baseline_ready: profile.as_ref().is_some_and(|p| p.ready()),
            sample_count: profile.map_or(0, |p| p.sample_count),
            quarantined: orchestrator.quarantine.is_quarantined(&agent_id).await,
            agent_id,
        });
    }
    ApiResponse::new(statuses)
}
