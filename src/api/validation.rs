//! Field-level validation for ingest payloads, beyond what serde's
//! required/optional distinction already enforces.

use crate::types::Vitals;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Checks the numeric invariants a malformed or adversarial ingest
/// payload could violate even after it deserializes successfully.
#[must_use]
pub fn validate_vitals(vitals: &Vitals) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if vitals.agent_id.trim().is_empty() {
        errors.push(FieldError {
            field: "agent_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if vitals.latency_ms < 0.0 || !vitals.latency_ms.is_finite() {
        errors.push(FieldError {
            field: "latency_ms".to_string(),
            message: "must be a non-negative finite number".to_string(),
        });
    }
    if vitals.cost < 0.0 || !vitals.cost.is_finite() {
        errors.push(FieldError {
            field: "cost".to_string(),
            message: "must be a non-negative finite number".to_string(),
        });
    }
    if vitals.prompt_hash.trim().is_empty() {
        errors.push(FieldError {
            field: "prompt_hash".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if vitals.model.trim().is_empty() {
        errors.push(FieldError {
            field: "model".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    errors
}
