//! Orchestrator: the single cooperative scheduler that ties Telemetry,
//! Baseline, Sentinel, Correlator, Diagnostician, Immune memory, Healer,
//! Lifecycle, Quarantine, and the approval queue together.
//!
//! The three concurrent loops described in the specification (agent,
//! sentinel, probation) are thin wrappers in [`agent_loop`],
//! [`sentinel_loop`], and [`probation_loop`] around the per-tick methods
//! defined here — keeping the actual decision logic callable without a
//! real timer so it can be driven tick-by-tick in tests.

pub mod agent_loop;
pub mod approvals;
pub mod probation_loop;
pub mod sentinel_loop;

use crate::baseline::BaselineLearner;
use crate::cache::Cache;
use crate::config::SentinelConfig;
use crate::correlator;
use crate::diagnostician::Diagnostician;
use crate::error::SentinelResult;
use crate::healer::Healer;
use crate::immune::Immune;
use crate::lifecycle::Lifecycle;
use crate::quarantine::Quarantine;
use crate::sentinel;
use crate::store::VitalsStore;
use crate::telemetry::Telemetry;
use crate::types::{
    ActionLogEntry, ApprovalRecord, ApprovalStatus, CorrelationVerdict, DiagnosisHypothesis, HealingAction,
    InfectionReport, LifecycleState, Vitals,
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Tracks where a multi-hypothesis healing attempt is for one agent, so a
/// probation relapse can resume at the right ladder position instead of
/// restarting from the top hypothesis.
struct HealingContext {
    hypotheses: Vec<DiagnosisHypothesis>,
    hypothesis_idx: usize,
    current_action: Option<HealingAction>,
}

pub struct Orchestrator {
    pub config: SentinelConfig,
    pub telemetry: Arc<Telemetry>,
    pub baseline: Arc<BaselineLearner>,
    pub lifecycle: Arc<Lifecycle>,
    pub quarantine: Arc<Quarantine>,
    pub diagnostician: Arc<Diagnostician>,
    pub immune: Arc<Immune>,
    pub healer: Arc<Healer>,
    pub store: Option<Arc<dyn VitalsStore>>,
    pub cache: Arc<Cache>,
    run_id: String,
    suspected_ticks: DashMap<String, u32>,
    clean_ticks: DashMap<String, u32>,
    probation_ticks: DashMap<String, u32>,
    healing_contexts: DashMap<String, HealingContext>,
    last_reports: DashMap<String, InfectionReport>,
}

#[allow(clippy::too_many_arguments)]
impl Orchestrator {
    #[must_use]
    pub fn new(
        config: SentinelConfig,
        telemetry: Arc<Telemetry>,
        baseline: Arc<BaselineLearner>,
        lifecycle: Arc<Lifecycle>,
        quarantine: Arc<Quarantine>,
        diagnostician: Arc<Diagnostician>,
        immune: Arc<Immune>,
        healer: Arc<Healer>,
        store: Option<Arc<dyn VitalsStore>>,
        cache: Arc<Cache>,
        run_id: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            telemetry,
            baseline,
            lifecycle,
            quarantine,
            diagnostician,
            immune,
            healer,
            store,
            cache,
            run_id,
            suspected_ticks: DashMap::new(),
            clean_ticks: DashMap::new(),
            probation_ticks: DashMap::new(),
            healing_contexts: DashMap::new(),
            last_reports: DashMap::new(),
        })
    }

    async fn log_action(&self, agent_id: &str, kind: &str, detail: impl Into<String>) {
        if let Some(store) = &self.store {
            let entry = ActionLogEntry {
                agent_id: agent_id.to_string(),
                run_id: self.run_id.clone(),
                at: Utc::now(),
                kind: kind.to_string(),
                detail: detail.into(),
            };
            if let Err(e) = store.write_action_log(&self.run_id, &entry).await {
                warn!(agent_id, error = %e, "action log write failed");
            }
        }
    }

    /// Agent-loop step: feeds one vitals sample into Telemetry and
    /// Baseline if the agent's lifecycle state currently permits
    /// execution. Used by both the HTTP ingest surface and the bundled
    /// simulator's agent loop. Returns `true` when the sample was
    /// durably written through to the Store (or no Store is attached),
    /// `false` when a configured Store was unreachable and the sample
    /// only made it into the in-memory ring — the signal the ingest
    /// surface uses to pick 204 vs 202.
    pub async fn ingest_vitals(&self, vitals: Vitals) -> bool {
        let state = self.lifecycle.state(&vitals.agent_id);
        if !Lifecycle::accepts_vitals(state) {
            return true;
        }
        let store_healthy = self.telemetry.record(vitals.clone()).await;
        self.baseline.update(&vitals).await;
        store_healthy
    }

    /// Sentinel-loop step for one agent: scans the recent window against
    /// the baseline, correlates against the rest of the fleet, and
    /// drives the lifecycle / quarantine / healing consequences.
    pub async fn sentinel_tick_for_agent(&self, agent_id: &str) -> SentinelResult<()> {
        if self.quarantine.is_quarantined(agent_id).await {
            return Ok(());
        }
        let Some(profile) = self.baseline.profile(agent_id) else {
            return Ok(());
        };
        if !profile.ready() {
            return Ok(());
        }
        if self.lifecycle.state(agent_id) == LifecycleState::Initializing {
            self.lifecycle.transition(agent_id, LifecycleState::Healthy, "baseline ready").await?;
        }

        let window = self.telemetry.recent(agent_id, self.config.detection.window_secs).await;
        let report = sentinel::scan(
            agent_id,
            &self.run_id,
            &window,
            &profile,
            &self.config.baseline,
            &self.config.detection,
        );

        match report {
            None => {
                self.on_clean_scan(agent_id).await?;
            }
            Some(report) => {
                self.last_reports.insert(agent_id.to_string(), report.clone());
                if let Some(store) = &self.store {
                    let _ = store.write_infection_event(&self.run_id, &report).await;
                }
                self.on_infection(agent_id, report).await?;
            }
        }
        Ok(())
    }

    async fn on_clean_scan(&self, agent_id: &str) -> SentinelResult<()> {
        if self.lifecycle.state(agent_id) != LifecycleState::Suspected {
            return Ok(());
        }
        let ticks = {
            let mut entry = self.clean_ticks.entry(agent_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if ticks >= self.config.lifecycle.suspect_ticks {
            self.lifecycle
                .transition(agent_id, LifecycleState::Healthy, "no infection for suspect_ticks")
                .await?;
            self.clean_ticks.remove(agent_id);
            self.suspected_ticks.remove(agent_id);
        }
        Ok(())
    }

    async fn on_infection(&self, agent_id: &str, report: InfectionReport) -> SentinelResult<()> {
        self.clean_ticks.remove(agent_id);

        let fleet_reports: Vec<InfectionReport> = self
            .last_reports
            .iter()
            .filter(|e| e.key() != agent_id)
            .map(|e| e.value().clone())
            .collect();
        let fleet_size = self.telemetry.known_agents().len().max(1);
        let verdict = correlator::classify(&report, &fleet_reports, fleet_size, &self.config.detection);

        if verdict == CorrelationVerdict::FleetWide {
            info!(agent_id, "fleet-wide anomaly, suppressing quarantine");
            self.log_action(agent_id, "fleet_wide_suppressed", "correlator verdict fleet_wide").await;
            return Ok(());
        }

        let current = self.lifecycle.state(agent_id);
        let severe = report.max_deviation > self.config.detection.severe_skip_sigma;

        match current {
            LifecycleState::Healthy => {
                if severe {
                    self.quarantine_via_draining(agent_id, &report).await?;
                } else {
                    self.lifecycle.transition(agent_id, LifecycleState::Suspected, "infection detected").await?;
                    self.suspected_ticks.insert(agent_id.to_string(), 1);
                }
            }
            LifecycleState::Suspected => {
                if severe {
                    self.quarantine_via_draining(agent_id, &report).await?;
                } else {
                    let ticks = {
                        let mut entry = self.suspected_ticks.entry(agent_id.to_string()).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    if ticks >= self.config.lifecycle.suspect_ticks {
                        self.quarantine_via_draining(agent_id, &report).await?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn quarantine_via_draining(&self, agent_id: &str, report: &InfectionReport) -> SentinelResult<()> {
        self.lifecycle.transition(agent_id, LifecycleState::Draining, "infection escalated").await?;
        self.suspected_ticks.remove(agent_id);
        // In-flight work tracking is out of scope; drain is treated as
        // immediately complete once the Enforcement hook has run.
        self.lifecycle.transition(agent_id, LifecycleState::Quarantined, "drain complete").await?;
        self.quarantine.quarantine(agent_id).await;

        if report.max_deviation >= self.config.detection.approval_threshold_sigma {
            self.enqueue_approval(agent_id, report.clone()).await;
        } else {
            self.heal_agent(agent_id, report.clone()).await?;
        }
        Ok(())
    }

    async fn enqueue_approval(&self, agent_id: &str, report: InfectionReport) {
        let record = ApprovalRecord {
            agent_id: agent_id.to_string(),
            infection_report: report,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        };
        if let Some(store) = &self.store {
            let _ = store.write_approval_event(&self.run_id, &record).await;
        }
        info!(agent_id, "quarantine pending operator approval");
    }

    /// Starts a fresh multi-hypothesis healing attempt for `agent_id`.
    pub async fn heal_agent(&self, agent_id: &str, report: InfectionReport) -> SentinelResult<()> {
        let verdict = CorrelationVerdict::AgentSpecific;
        let diagnosis = self.diagnostician.diagnose(agent_id, &report, verdict);
        self.healing_contexts.insert(
            agent_id.to_string(),
            HealingContext {
                hypotheses: diagnosis.hypotheses,
                hypothesis_idx: 0,
                current_action: None,
            },
        );
        self.try_next_action(agent_id).await
    }

    /// Advances the healing attempt: picks (and applies) the next action
    /// for the current hypothesis, moving to the next hypothesis when the
    /// current one's ladder is exhausted, and to EXHAUSTED when every
    /// hypothesis has been tried.
    async fn try_next_action(&self, agent_id: &str) -> SentinelResult<()> {
        loop {
            let (kind, idx, hypotheses_len) = {
                let Some(ctx) = self.healing_contexts.get(agent_id) else {
                    return Ok(());
                };
                if ctx.hypothesis_idx >= ctx.hypotheses.len() {
                    (None, ctx.hypothesis_idx, ctx.hypotheses.len())
                } else {
                    (Some(ctx.hypotheses[ctx.hypothesis_idx].kind), ctx.hypothesis_idx, ctx.hypotheses.len())
                }
            };

            let Some(kind) = kind else {
                self.lifecycle.transition(agent_id, LifecycleState::Exhausted, "all hypotheses exhausted").await?;
                self.healing_contexts.remove(agent_id);
                self.log_action(agent_id, "exhausted", "no remaining healing action").await;
                return Ok(());
            };

            match self.healer.next(agent_id, kind).await? {
                None => {
                    // This hypothesis's ladder is exhausted; move on.
                    if let Some(mut ctx) = self.healing_contexts.get_mut(agent_id) {
                        ctx.hypothesis_idx = idx + 1;
                    }
                    if idx + 1 >= hypotheses_len {
                        self.lifecycle.transition(agent_id, LifecycleState::Exhausted, "all hypotheses exhausted").await?;
                        self.healing_contexts.remove(agent_id);
                        return Ok(());
                    }
                    continue;
                }
                Some(action) => {
                    if self.lifecycle.state(agent_id) != LifecycleState::Healing {
                        self.lifecycle.transition(agent_id, LifecycleState::Healing, format!("trying {action:?} for {kind:?}")).await?;
                    }
                    self.log_action(agent_id, "healing_attempt", format!("{kind:?} via {action:?}")).await;
                    let outcome = self.healer.apply(agent_id, kind, action).await;
                    match outcome {
                        Ok(outcome) if outcome.success => {
                            if let Some(mut ctx) = self.healing_contexts.get_mut(agent_id) {
                                ctx.current_action = Some(action);
                            }
                            self.probation_ticks.insert(agent_id.to_string(), 0);
                            return Ok(());
                        }
                        _ => continue,
                    }
                }
            }
        }
    }

    /// Probation-loop step for one agent: scans for relapse, otherwise
    /// counts toward graduation back to HEALTHY.
    pub async fn probation_tick_for_agent(&self, agent_id: &str) -> SentinelResult<()> {
        if self.lifecycle.state(agent_id) != LifecycleState::Probation {
            return Ok(());
        }
        let Some(profile) = self.baseline.profile(agent_id) else {
            return Ok(());
        };
        let window = self.telemetry.recent(agent_id, self.config.detection.window_secs).await;
        let report = sentinel::scan(agent_id, &self.run_id, &window, &profile, &self.config.baseline, &self.config.detection);

        match report {
            None => {
                let ticks = {
                    let mut entry = self.probation_ticks.entry(agent_id.to_string()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                if ticks >= self.config.lifecycle.probation_ticks {
                    self.lifecycle.transition(agent_id, LifecycleState::Healthy, "probation passed").await?;
                    self.quarantine.release(agent_id).await;
                    self.probation_ticks.remove(agent_id);
                    self.healing_contexts.remove(agent_id);
                    self.log_action(agent_id, "healed", "probation passed, returned to healthy").await;
                }
            }
            Some(_) => {
                info!(agent_id, "relapse during probation, trying next action");
                self.probation_ticks.insert(agent_id.to_string(), 0);
                let current_diagnosis_and_action = self.healing_contexts.get(agent_id).and_then(|ctx| {
                    ctx.hypotheses
                        .get(ctx.hypothesis_idx)
                        .map(|h| h.kind)
                        .zip(ctx.current_action)
                });
                if let Some((kind, action)) = current_diagnosis_and_action {
                    self.immune.record_outcome(agent_id, kind, action, false).await;
                }
                self.lifecycle.transition(agent_id, LifecycleState::Healing, "relapse during probation").await?;
                self.try_next_action(agent_id).await?;
            }
        }
        Ok(())
    }

    /// Approval queue: `approve` removes PENDING, schedules healing.
    pub async fn approve(&self, agent_id: &str) -> SentinelResult<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let Some(mut record) = store.get_latest_approval_state(&self.run_id, agent_id).await? else {
            return Ok(());
        };
        if record.status != ApprovalStatus::Pending {
            return Ok(());
        }
        record.status = ApprovalStatus::Approved;
        record.decided_at = Some(Utc::now());
        let report = record.infection_report.clone();
        store.write_approval_event(&self.run_id, &record).await?;
        self.heal_agent(agent_id, report).await
    }

    /// `reject` marks REJECTED; agent stays QUARANTINED.
    pub async fn reject(&self, agent_id: &str) -> SentinelResult<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let Some(mut record) = store.get_latest_approval_state(&self.run_id, agent_id).await? else {
            return Ok(());
        };
        if record.status != ApprovalStatus::Pending {
            return Ok(());
        }
        record.status = ApprovalStatus::Rejected;
        record.decided_at = Some(Utc::now());
        store.write_approval_event(&self.run_id, &record).await
    }

    /// `heal_now` removes an agent from REJECTED and schedules healing.
    pub async fn heal_now(&self, agent_id: &str) -> SentinelResult<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let Some(mut record) = store.get_latest_approval_state(&self.run_id, agent_id).await? else {
            return Ok(());
        };
        if record.status != ApprovalStatus::Rejected && self.lifecycle.state(agent_id) != LifecycleState::Exhausted {
            return Ok(());
        }
        record.status = ApprovalStatus::Approved;
        record.decided_at = Some(Utc::now());
        let report = record.infection_report.clone();
        store.write_approval_event(&self.run_id, &record).await?;
        if self.lifecycle.state(agent_id) == LifecycleState::Exhausted {
            self.lifecycle.transition(agent_id, LifecycleState::Healing, "operator heal now").await?;
        }
        self.heal_agent(agent_id, report).await
    }
}
