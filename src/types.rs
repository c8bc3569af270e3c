//! Value types shared across the detection-diagnosis-containment-healing
//! pipeline: vitals, baseline profiles, infection reports, diagnoses,
//! healing actions, lifecycle states, and approval records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The classification of an error observed on one agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    None,
    RateLimit,
    Timeout,
    ContentFilter,
    Other,
}

impl Default for ErrorType {
    fn default() -> Self {
        Self::None
    }
}

/// One behavioral sample emitted by an agent each time it invokes a model.
///
/// Immutable after record: nothing in the pipeline mutates a `Vitals`
/// value once it has been handed to [`crate::telemetry::Telemetry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vitals {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u64,
    pub retries: u64,
    pub success: bool,
    pub cost: f64,
    pub model: String,
    pub error_type: ErrorType,
    pub prompt_hash: String,
    /// Passthrough descriptive metadata accepted by ingest; not used for
    /// detection.
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub mcp_servers: Option<Vec<String>>,
}

impl Vitals {
    #[must_use]
    pub fn token_count(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// The metrics the baseline learner and Sentinel track per agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Latency,
    TotalTokens,
    InputTokens,
    OutputTokens,
    Cost,
    ToolCalls,
    RetryRate,
    ErrorRate,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Latency,
        Metric::TotalTokens,
        Metric::InputTokens,
        Metric::OutputTokens,
        Metric::Cost,
        Metric::ToolCalls,
        Metric::RetryRate,
        Metric::ErrorRate,
    ];
}

/// Kinds of anomaly a Sentinel report may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    TokenSpike,
    LatencySpike,
    ToolExplosion,
    HighRetryRate,
    InputTokenSpike,
    OutputTokenSpike,
    CostSpike,
    PromptChange,
    ErrorRateSpike,
}

/// A per-metric EWMA estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EwmaEstimate {
    pub mean: f64,
    pub variance: f64,
}

impl Default for EwmaEstimate {
    fn default() -> Self {
        Self {
            mean: 0.0,
            variance: 0.0,
        }
    }
}

/// Learned per-agent baseline of "normal".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub agent_id: String,
    pub estimates: BTreeMap<Metric, EwmaEstimate>,
    pub sample_count: u64,
    pub min_samples: u64,
    pub last_prompt_hash: Option<String>,
    /// Remaining updates for which `accelerate()`'s widened alpha applies.
    pub accel_ticks_remaining: u32,
    pub accel_alpha: Option<f64>,
}

impl BaselineProfile {
    #[must_use]
    pub fn new(agent_id: impl Into<String>, min_samples: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            estimates: Metric::ALL.iter().map(|m| (*m, EwmaEstimate::default())).collect(),
            sample_count: 0,
            min_samples,
            last_prompt_hash: None,
            accel_ticks_remaining: 0,
            accel_alpha: None,
        }
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.sample_count >= self.min_samples
    }
}

/// A Sentinel detection report for one agent at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfectionReport {
    pub agent_id: String,
    pub run_id: String,
    pub deviations: BTreeMap<Metric, f64>,
    pub max_deviation: f64,
    pub anomalies: BTreeSet<AnomalyKind>,
    pub prompt_changed: bool,
    pub at: DateTime<Utc>,
}

impl InfectionReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Fleet-scope verdict produced by the Correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationVerdict {
    AgentSpecific,
    PartialFleet,
    FleetWide,
}

/// A probable root cause for an infection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisKind {
    PromptDrift,
    PromptInjection,
    InfiniteLoop,
    ToolInstability,
    MemoryCorruption,
    CostOverrun,
    ExternalCause,
    Unknown,
}

/// One ranked hypothesis within a [`DiagnosisResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiagnosisHypothesis {
    pub kind: DiagnosisKind,
    pub confidence: f64,
}

/// The Diagnostician's output: hypotheses ranked confidence-descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub hypotheses: Vec<DiagnosisHypothesis>,
}

impl DiagnosisResult {
    #[must_use]
    pub fn top(&self) -> Option<DiagnosisHypothesis> {
        self.hypotheses.first().copied()
    }
}

/// Operator feedback labels accepted by the Diagnostician.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLabel {
    FalsePositive,
    Correct,
    WrongDiagnosis,
    ProviderOutage,
}

/// Progressively stronger healing actions. Every policy ladder ends in
/// `ResetAgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealingAction {
    ResetMemory,
    RollbackPrompt,
    ReduceAutonomy,
    RevokeTools,
    ResetAgent,
}

/// Outcome of dispatching one healing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

/// The 8-state agent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Initializing,
    Healthy,
    Suspected,
    Draining,
    Quarantined,
    Healing,
    Probation,
    Exhausted,
}

/// One recorded lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Status of a human approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A pending or resolved approval request for a quarantined agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub agent_id: String,
    pub infection_report: InfectionReport,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// One entry in the durable action log (spec §6 `write_action_log`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub agent_id: String,
    pub run_id: String,
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}
