//! Diagnostician: turns one infection report (plus accumulated operator
//! feedback for the agent) into a confidence-ranked list of root-cause
//! hypotheses.

use crate::types::{AnomalyKind, CorrelationVerdict, DiagnosisHypothesis, DiagnosisKind, DiagnosisResult, FeedbackLabel, InfectionReport};
use dashmap::DashMap;
use std::collections::HashMap;

fn has(report: &InfectionReport, kind: AnomalyKind) -> bool {
    report.anomalies.contains(&kind)
}

/// Pattern table. Every matching rule contributes its hypotheses; the
/// caller deduplicates by kind, keeping the maximum confidence.
fn base_hypotheses(report: &InfectionReport, correlation: CorrelationVerdict) -> Vec<(DiagnosisKind, f64)> {
    let mut hits = Vec::new();

    if report.prompt_changed && report.anomalies.len() == 1 && has(report, AnomalyKind::PromptChange) {
        hits.push((DiagnosisKind::PromptInjection, 0.9));
        hits.push((DiagnosisKind::PromptDrift, 0.6));
    }
    if has(report, AnomalyKind::TokenSpike) && has(report, AnomalyKind::ToolExplosion) {
        hits.push((DiagnosisKind::InfiniteLoop, 0.85));
        hits.push((DiagnosisKind::ToolInstability, 0.6));
    }
    if has(report, AnomalyKind::ToolExplosion) && has(report, AnomalyKind::HighRetryRate) {
        hits.push((DiagnosisKind::ToolInstability, 0.85));
    }
    if has(report, AnomalyKind::CostSpike) && has(report, AnomalyKind::TokenSpike) {
        hits.push((DiagnosisKind::CostOverrun, 0.8));
        hits.push((DiagnosisKind::PromptDrift, 0.6));
    }
    if has(report, AnomalyKind::LatencySpike)
        && has(report, AnomalyKind::ErrorRateSpike)
        && correlation == CorrelationVerdict::FleetWide
    {
        hits.push((DiagnosisKind::ExternalCause, 0.9));
    }
    let retry_or_error_only = !report.anomalies.is_empty()
        && report
            .anomalies
            .iter()
            .all(|k| matches!(k, AnomalyKind::HighRetryRate | AnomalyKind::ErrorRateSpike));
    if retry_or_error_only {
        hits.push((DiagnosisKind::ToolInstability, 0.6));
        hits.push((DiagnosisKind::ExternalCause, 0.5));
    }
    if has(report, AnomalyKind::InputTokenSpike) && has(report, AnomalyKind::OutputTokenSpike) {
        hits.push((DiagnosisKind::MemoryCorruption, 0.7));
    }

    if hits.is_empty() {
        hits.push((DiagnosisKind::Unknown, 0.4));
    }
    hits
}

fn dedupe_keep_max(hits: Vec<(DiagnosisKind, f64)>) -> HashMap<DiagnosisKind, f64> {
    let mut map: HashMap<DiagnosisKind, f64> = HashMap::new();
    for (kind, confidence) in hits {
        map.entry(kind)
            .and_modify(|existing| *existing = existing.max(confidence))
            .or_insert(confidence);
    }
    map
}

fn to_sorted_result(map: HashMap<DiagnosisKind, f64>) -> DiagnosisResult {
    let mut hypotheses: Vec<DiagnosisHypothesis> = map
        .into_iter()
        .map(|(kind, confidence)| DiagnosisHypothesis { kind, confidence })
        .collect();
    hypotheses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(a.kind.cmp(&b.kind)));
    DiagnosisResult { hypotheses }
}

/// Tracks per-agent operator feedback and applies it to future diagnoses.
#[derive(Default)]
pub struct Diagnostician {
    feedback: DashMap<String, Vec<(DiagnosisKind, FeedbackLabel)>>,
}

impl Diagnostician {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_feedback(&self, agent_id: &str, kind: DiagnosisKind, label: FeedbackLabel) {
        self.feedback
            .entry(agent_id.to_string())
            .or_default()
            .push((kind, label));
    }

    #[must_use]
    pub fn diagnose(
        &self,
        agent_id: &str,
        report: &InfectionReport,
        correlation: CorrelationVerdict,
    ) -> DiagnosisResult {
        let mut map = dedupe_keep_max(base_hypotheses(report, correlation));

        if let Some(history) = self.feedback.get(agent_id) {
            for (kind, label) in history.iter() {
                match label {
                    FeedbackLabel::FalsePositive => {
                        if let Some(conf) = map.get_mut(kind) {
                            *conf = (*conf - 0.1).max(0.05);
                        }
                    }
                    FeedbackLabel::Correct => {
                        if let Some(conf) = map.get_mut(kind) {
                            *conf = (*conf + 0.05).min(0.99);
                        }
                    }
                    FeedbackLabel::WrongDiagnosis => {
                        if let Some(conf) = map.get_mut(kind) {
                            *conf /= 2.0;
                        }
                    }
                    FeedbackLabel::ProviderOutage => {
                        map.entry(DiagnosisKind::ExternalCause)
                            .and_modify(|conf| *conf = conf.max(0.95))
                            .or_insert(0.95);
                    }
                }
            }
        }

        to_sorted_result(map)
    }
}
