//! Sentinel: compares a recent vitals window against an agent's learned
//! baseline and emits an [`InfectionReport`] when any metric deviates
//! beyond threshold or the prompt hash has changed.
//!
//! Pure: this module never mutates baseline, telemetry, or lifecycle
//! state. It only reads.

use crate::config::{BaselineConfig, DetectionConfig};
use crate::types::{AnomalyKind, BaselineProfile, ErrorType, InfectionReport, Metric, Vitals};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

fn anomaly_kind_for(metric: Metric) -> AnomalyKind {
    match metric {
        Metric::Latency => AnomalyKind::LatencySpike,
        Metric::TotalTokens => AnomalyKind::TokenSpike,
        Metric::InputTokens => AnomalyKind::InputTokenSpike,
        Metric::OutputTokens => AnomalyKind::OutputTokenSpike,
        Metric::Cost => AnomalyKind::CostSpike,
        Metric::ToolCalls => AnomalyKind::ToolExplosion,
        Metric::RetryRate => AnomalyKind::HighRetryRate,
        Metric::ErrorRate => AnomalyKind::ErrorRateSpike,
    }
}

fn window_mean(window: &[Vitals], metric: Metric) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window
        .iter()
        .map(|v| match metric {
            Metric::Latency => v.latency_ms,
            Metric::TotalTokens => v.token_count() as f64,
            Metric::InputTokens => v.input_tokens as f64,
            Metric::OutputTokens => v.output_tokens as f64,
            Metric::Cost => v.cost,
            Metric::ToolCalls => v.tool_calls as f64,
            Metric::RetryRate => {
                if v.tool_calls > 0 {
                    v.retries as f64 / v.tool_calls as f64
                } else if v.retries > 0 {
                    1.0
                } else {
                    0.0
                }
            }
            Metric::ErrorRate => {
                if matches!(v.error_type, ErrorType::None) {
                    0.0
                } else {
                    1.0
                }
            }
        })
        .sum();
    sum / window.len() as f64
}

/// `max(sqrt(variance), floor)` where `floor = stddev_floor_fraction *
/// max(|mean|, epsilon)`.
fn effective_stddev(mean: f64, variance: f64, floor_fraction: f64) -> f64 {
    let epsilon = 1e-9;
    let floor = floor_fraction * mean.abs().max(epsilon);
    variance.sqrt().max(floor)
}

/// Compares `window` (already the agent's recent samples) against
/// `baseline`. Returns `None` if the baseline is not ready or no anomaly
/// was found.
#[must_use]
pub fn scan(
    agent_id: &str,
    run_id: &str,
    window: &[Vitals],
    baseline: &BaselineProfile,
    baseline_config: &BaselineConfig,
    detection_config: &DetectionConfig,
) -> Option<InfectionReport> {
    if !baseline.ready() || window.is_empty() {
        return None;
    }

    let mut deviations = BTreeMap::new();
    let mut anomalies = BTreeSet::new();

    for metric in Metric::ALL {
        let Some(estimate) = baseline.estimates.get(&metric) else {
            continue;
        };
        let x_bar = window_mean(window, metric);
        let sigma = effective_stddev(estimate.mean, estimate.variance, baseline_config.stddev_floor_fraction);
        let deviation = (x_bar - estimate.mean).abs() / sigma;
        deviations.insert(metric, deviation);
        if deviation >= detection_config.threshold_sigma {
            anomalies.insert(anomaly_kind_for(metric));
        }
    }

    let prompt_changed = window
        .last()
        .map(|v| Some(&v.prompt_hash) != baseline.last_prompt_hash.as_ref())
        .unwrap_or(false);
    if prompt_changed {
        anomalies.insert(AnomalyKind::PromptChange);
    }

    if anomalies.is_empty() {
        return None;
    }

    let max_deviation = deviations.values().copied().fold(0.0_f64, f64::max);

    Some(InfectionReport {
        agent_id: agent_id.to_string(),
        run_id: run_id.to_string(),
        deviations,
        max_deviation,
        anomalies,
        prompt_changed,
        at: Utc::now(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::baseline::BaselineLearner;

    fn baseline_config() -> BaselineConfig {
        BaselineConfig {
            span: 50.0,
            min_samples: 15,
            accel_multiplier: 3.0,
            accel_ticks: 20,
            stddev_floor_fraction: 0.05,
            ring_capacity: 2000,
        }
    }

    fn detection_config() -> DetectionConfig {
        DetectionConfig {
            threshold_sigma: 2.5,
            severe_skip_sigma: 6.0,
            approval_threshold_sigma: 5.0,
            window_secs: 10,
            fleet_high_fraction: 0.3,
            fleet_low_fraction: 0.1,
        }
    }

    fn vitals(agent_id: &str, latency_ms: f64, tokens: u64) -> Vitals {
        Vitals {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            latency_ms,
            input_tokens: tokens / 2,
            output_tokens: tokens / 2,
            tool_calls: 2,
            retries: 0,
            success: true,
            cost: 0.01,
            model: "m".to_string(),
            error_type: ErrorType::None,
            prompt_hash: "hash-1".to_string(),
            agent_type: None,
            mcp_servers: None,
        }
    }

    async fn warm_baseline(learner: &BaselineLearner, agent_id: &str, latency_ms: f64, tokens: u64) {
        for _ in 0..15 {
            learner.update(&vitals(agent_id, latency_ms, tokens)).await;
        }
    }

    #[tokio::test]
    async fn not_ready_returns_none() {
        let learner = BaselineLearner::new(baseline_config(), 2.0 / 51.0, None, None, "run".into());
        learner.update(&vitals("a", 100.0, 1000)).await;
        let profile = learner.profile("a").unwrap();
        let window = vec![vitals("a", 100.0, 1000)];
        assert!(scan("a", "run", &window, &profile, &baseline_config(), &detection_config()).is_none());
    }

    #[tokio::test]
    async fn clean_window_after_warmup_returns_none() {
        let learner = BaselineLearner::new(baseline_config(), 2.0 / 51.0, None, None, "run".into());
        warm_baseline(&learner, "a", 100.0, 1000).await;
        let profile = learner.profile("a").unwrap();
        let window: Vec<Vitals> = (0..5).map(|_| vitals("a", 100.0, 1000)).collect();
        assert!(scan("a", "run", &window, &profile, &baseline_config(), &detection_config()).is_none());
    }

    #[tokio::test]
    async fn mild_latency_spike_is_flagged_with_floor_sigma() {
        let learner = BaselineLearner::new(baseline_config(), 2.0 / 51.0, None, None, "run".into());
        warm_baseline(&learner, "a", 100.0, 1000).await;
        let profile = learner.profile("a").unwrap();
        // Constant baseline -> variance ~0 -> stddev floor = 5% of mean = 5.
        // 200ms is 100ms above mean => 20 sigma against the floor, well over threshold.
        let window: Vec<Vitals> = (0..10).map(|_| vitals("a", 200.0, 1000)).collect();
        let report = scan("a", "run", &window, &profile, &baseline_config(), &detection_config()).unwrap();
        assert!(report.anomalies.contains(&AnomalyKind::LatencySpike));
        assert!(report.max_deviation > detection_config().threshold_sigma);
    }

    #[tokio::test]
    async fn severe_token_spike_exceeds_approval_threshold() {
        let learner = BaselineLearner::new(baseline_config(), 2.0 / 51.0, None, None, "run".into());
        warm_baseline(&learner, "a", 100.0, 1000).await;
        let profile = learner.profile("a").unwrap();
        let window: Vec<Vitals> = (0..10).map(|_| vitals("a", 100.0, 10_000)).collect();
        let report = scan("a", "run", &window, &profile, &baseline_config(), &detection_config()).unwrap();
        assert!(report.anomalies.contains(&AnomalyKind::TokenSpike));
        assert!(report.max_deviation >= detection_config().approval_threshold_sigma);
    }

    #[tokio::test]
    async fn prompt_change_is_flagged_independent_of_metrics() {
        let learner = BaselineLearner::new(baseline_config(), 2.0 / 51.0, None, None, "run".into());
        warm_baseline(&learner, "a", 100.0, 1000).await;
        let profile = learner.profile("a").unwrap();
        let mut v = vitals("a", 100.0, 1000);
        v.prompt_hash = "hash-2".to_string();
        let window = vec![v];
        let report = scan("a", "run", &window, &profile, &baseline_config(), &detection_config()).unwrap();
        assert!(report.prompt_changed);
        assert!(report.anomalies.contains(&AnomalyKind::PromptChange));
    }

    #[test]
    fn infection_report_max_deviation_matches_invariant() {
        let mut deviations = BTreeMap::new();
        deviations.insert(Metric::Latency, 3.0);
        deviations.insert(Metric::Cost, 7.5);
        let max = deviations.values().copied().fold(0.0_f64, f64::max);
        assert!((max - 7.5).abs() < 1e-9);
    }
}
