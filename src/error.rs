//! Error taxonomy for the control plane.
//!
//! Every variant corresponds to one of the error kinds named in the
//! control plane specification: client-facing ingest failures, detection
//! being intentionally skipped, and the try-and-continue failure modes of
//! the Store/Executor/Enforcement boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised anywhere in the detection-diagnosis-containment-healing
/// pipeline.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum SentinelError {
    /// Ingest payload was malformed or missing required fields.
    #[error("bad input: {reason}")]
    BadInput { reason: String },

    /// Ingest API key missing or did not match the configured key.
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Baseline is not ready yet; detection was intentionally skipped.
    #[error("baseline not ready for agent {agent_id}: {sample_count}/{min_samples} samples")]
    NotReady {
        agent_id: String,
        sample_count: u64,
        min_samples: u64,
    },

    /// A Store operation failed; callers should log and continue.
    #[error("transient store failure during {operation}: {reason}")]
    TransientStoreFailure { operation: String, reason: String },

    /// The local cache snapshot was invalid or schema-mismatched.
    #[error("cache corrupt at {path}: {reason}")]
    CacheCorrupt { path: String, reason: String },

    /// A healing action failed when dispatched to an Executor.
    #[error("executor failure for agent {agent_id}, action {action}: {reason}")]
    ExecutorFailure {
        agent_id: String,
        action: String,
        reason: String,
    },

    /// A healing action timed out; treated identically to ExecutorFailure.
    #[error("executor timeout for agent {agent_id}, action {action} after {timeout_ms}ms")]
    ExecutorTimeout {
        agent_id: String,
        action: String,
        timeout_ms: u64,
    },

    /// Draining an agent did not complete before the drain timeout.
    #[error("drain timeout for agent {agent_id} after {timeout_ms}ms")]
    DrainTimeout { agent_id: String, timeout_ms: u64 },

    /// Every hypothesis's action ladder has been exhausted for an agent.
    #[error("healing exhausted for agent {agent_id}")]
    Exhaustion { agent_id: String },

    /// Configuration failed to load or validate.
    #[error("configuration error: {reason}")]
    ConfigurationError { reason: String },

    /// Catch-all for unexpected (de)serialization / I/O failures.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

/// Result alias used throughout the crate.
pub type SentinelResult<T> = Result<T, SentinelError>;

impl SentinelError {
    /// Maps an error to the HTTP status code the external surface should
    /// return for it (spec §6/§7).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadInput { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::NotReady { .. } => 202,
            Self::TransientStoreFailure { .. } => 202,
            Self::CacheCorrupt { .. } => 500,
            Self::ExecutorFailure { .. } | Self::ExecutorTimeout { .. } => 500,
            Self::DrainTimeout { .. } => 500,
            Self::Exhaustion { .. } => 409,
            Self::ConfigurationError { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Short machine-readable code for the API error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadInput { .. } => "bad_input",
            Self::Unauthorized { .. } => "unauthorized",
            Self::NotReady { .. } => "not_ready",
            Self::TransientStoreFailure { .. } => "transient_store_failure",
            Self::CacheCorrupt { .. } => "cache_corrupt",
            Self::ExecutorFailure { .. } => "executor_failure",
            Self::ExecutorTimeout { .. } => "executor_timeout",
            Self::DrainTimeout { .. } => "drain_timeout",
            Self::Exhaustion { .. } => "exhaustion",
            Self::ConfigurationError { .. } => "configuration_error",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal {
            reason: format!("serde_json: {e}"),
        }
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal {
            reason: format!("io: {e}"),
        }
    }
}
