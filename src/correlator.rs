//! Correlator: classifies a single agent's infection report against the
//! rest of the fleet to decide whether the likely cause is external
//! (shared by many agents at once) or specific to one agent.

use crate::config::DetectionConfig;
use crate::types::{AnomalyKind, CorrelationVerdict, InfectionReport, Metric};

/// The anomaly kind driving the report's `max_deviation`, used as the
/// fleet-matching key. Falls back to `prompt_change` or the first
/// anomaly present when no metric deviation reaches threshold but a
/// report was still produced (prompt-change-only reports).
#[must_use]
pub fn primary_anomaly_kind(report: &InfectionReport) -> Option<AnomalyKind> {
    let metric_driven = report
        .deviations
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(metric, _)| anomaly_kind_for(*metric))
        .filter(|kind| report.anomalies.contains(kind));
    metric_driven.or_else(|| {
        if report.prompt_changed {
            Some(AnomalyKind::PromptChange)
        } else {
            report.anomalies.iter().next().copied()
        }
    })
}

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

/// Classifies `report` given the other fresh reports observed across the
/// fleet in the same window and the total number of known agents.
///
/// `fleet_reports` should not include `report` itself.
#[must_use]
pub fn classify(
    report: &InfectionReport,
    fleet_reports: &[InfectionReport],
    fleet_size: usize,
    config: &DetectionConfig,
) -> CorrelationVerdict {
    if fleet_size == 0 {
        return CorrelationVerdict::AgentSpecific;
    }
    let Some(primary) = primary_anomaly_kind(report) else {
        return CorrelationVerdict::AgentSpecific;
    };

    let matching = fleet_reports
        .iter()
        .filter(|r| primary_anomaly_kind(r) == Some(primary))
        .count()
        + 1; // report's own agent counts toward the fleet fraction.

    let fraction = matching as f64 / fleet_size as f64;

    if fraction >= config.fleet_high_fraction {
        CorrelationVerdict::FleetWide
    } else if fraction >= config.fleet_low_fraction {
        CorrelationVerdict::PartialFleet
    } else {
        CorrelationVerdict::AgentSpecific
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn config() -> DetectionConfig {
        DetectionConfig {
            threshold_sigma: 2.5,
            severe_skip_sigma: 6.0,
            approval_threshold_sigma: 5.0,
            window_secs: 10,
            fleet_high_fraction: 0.3,
            fleet_low_fraction: 0.1,
        }
    }

    fn report(agent_id: &str, kind: AnomalyKind, deviation: f64) -> InfectionReport {
        let mut deviations = BTreeMap::new();
        let metric = match kind {
            AnomalyKind::LatencySpike => Metric::Latency,
            AnomalyKind::TokenSpike => Metric::TotalTokens,
            _ => Metric::Latency,
        };
        deviations.insert(metric, deviation);
        let mut anomalies = BTreeSet::new();
        anomalies.insert(kind);
        InfectionReport {
            agent_id: agent_id.to_string(),
            run_id: "run".to_string(),
            deviations,
            max_deviation: deviation,
            anomalies,
            prompt_changed: false,
            at: Utc::now(),
        }
    }

    #[test]
    fn single_agent_out_of_ten_is_agent_specific() {
        let subject = report("a1", AnomalyKind::LatencySpike, 5.0);
        let others: Vec<InfectionReport> = Vec::new();
        let verdict = classify(&subject, &others, 10, &config());
        assert_eq!(verdict, CorrelationVerdict::AgentSpecific);
    }

    #[test]
    fn three_of_ten_sharing_kind_is_partial_fleet() {
        let subject = report("a1", AnomalyKind::LatencySpike, 5.0);
        let others = vec![
            report("a2", AnomalyKind::LatencySpike, 4.0),
            report("a3", AnomalyKind::LatencySpike, 4.0),
        ];
        // 3 of 10 = 0.3, at the fleet_high boundary -> FLEET_WIDE by >= rule.
        let verdict = classify(&subject, &others, 10, &config());
        assert_eq!(verdict, CorrelationVerdict::FleetWide);
    }

    #[test]
    fn two_of_ten_sharing_kind_is_partial_fleet() {
        let subject = report("a1", AnomalyKind::LatencySpike, 5.0);
        let others = vec![report("a2", AnomalyKind::LatencySpike, 4.0)];
        let verdict = classify(&subject, &others, 10, &config());
        assert_eq!(verdict, CorrelationVerdict::PartialFleet);
    }

    #[test]
    fn all_agents_sharing_kind_is_fleet_wide() {
        let subject = report("a1", AnomalyKind::LatencySpike, 5.0);
        let others: Vec<InfectionReport> = (2..=10)
            .map(|i| report(&format!("a{i}"), AnomalyKind::LatencySpike, 4.0))
            .collect();
        let verdict = classify(&subject, &others, 10, &config());
        assert_eq!(verdict, CorrelationVerdict::FleetWide);
    }

    #[test]
    fn mismatched_kind_does_not_count_toward_fraction() {
        let subject = report("a1", AnomalyKind::LatencySpike, 5.0);
        let others: Vec<InfectionReport> = (2..=10)
            .map(|i| report(&format!("a{i}"), AnomalyKind::TokenSpike, 4.0))
            .collect();
        let verdict = classify(&subject, &others, 10, &config());
        assert_eq!(verdict, CorrelationVerdict::AgentSpecific);
    }
}
