//! Per-agent EWMA baseline learner.
//!
//! Update rule, for each tracked metric `x`:
//! ```text
//! mean'     = alpha * x + (1 - alpha) * mean
//! variance' = (1 - alpha) * (variance + alpha * (x - mean')^2)
//! ```
//! `ready` becomes true once `sample_count >= min_samples`. The
//! `accelerate()` hook (invoked by the Healer post-healing) temporarily
//! widens alpha so the new normal converges faster after a reset.

use crate::cache::Cache;
use crate::config::BaselineConfig;
use crate::store::VitalsStore;
use crate::types::{BaselineProfile, EwmaEstimate, ErrorType, Metric, Vitals};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns and updates every agent's [`BaselineProfile`].
pub struct BaselineLearner {
    profiles: DashMap<String, BaselineProfile>,
    config: BaselineConfig,
    alpha: f64,
    cache: Option<Arc<Cache>>,
    store: Option<Arc<dyn VitalsStore>>,
    run_id: String,
    persist_every: u64,
}

impl BaselineLearner {
    #[must_use]
    pub fn new(
        config: BaselineConfig,
        alpha: f64,
        cache: Option<Arc<Cache>>,
        store: Option<Arc<dyn VitalsStore>>,
        run_id: String,
    ) -> Self {
        Self {
            profiles: DashMap::new(),
            config,
            alpha,
            cache,
            store,
            run_id,
            persist_every: 25,
        }
    }

    /// Seeds a profile from the cache, if one exists, so a restarted
    /// orchestrator does not re-learn from zero.
    pub async fn hydrate_from_cache(&self, agent_id: &str) {
        if self.profiles.contains_key(agent_id) {
            return;
        }
        if let Some(cache) = &self.cache {
            if let Some(profile) = cache.get_baseline(agent_id).await {
                self.profiles.insert(agent_id.to_string(), profile);
            }
        }
    }

    fn metric_values(v: &Vitals) -> [(Metric, f64); 8] {
        let retry_rate = if v.tool_calls > 0 {
            v.retries as f64 / (v.tool_calls.max(1)) as f64
        } else if v.retries > 0 {
            1.0
        } else {
            0.0
        };
        let error_rate = if matches!(v.error_type, ErrorType::None) { 0.0 } else { 1.0 };
        [
            (Metric::Latency, v.latency_ms),
            (Metric::TotalTokens, v.token_count() as f64),
            (Metric::InputTokens, v.input_tokens as f64),
            (Metric::OutputTokens, v.output_tokens as f64),
            (Metric::Cost, v.cost),
            (Metric::ToolCalls, v.tool_calls as f64),
            (Metric::RetryRate, retry_rate),
            (Metric::ErrorRate, error_rate),
        ]
    }

    fn effective_alpha(profile: &BaselineProfile, default_alpha: f64) -> f64 {
        if profile.accel_ticks_remaining > 0 {
            profile.accel_alpha.unwrap_or(default_alpha)
        } else {
            default_alpha
        }
    }

    /// Folds one sample into the agent's baseline.
    pub async fn update(&self, vitals: &Vitals) {
        let agent_id = vitals.agent_id.clone();
        self.hydrate_from_cache(&agent_id).await;

        let mut entry = self
            .profiles
            .entry(agent_id.clone())
            .or_insert_with(|| BaselineProfile::new(agent_id.clone(), self.config.min_samples));

        let alpha = Self::effective_alpha(&entry, self.alpha);
        for (metric, value) in Self::metric_values(vitals) {
            let estimate = entry.estimates.entry(metric).or_insert(EwmaEstimate {
                mean: 0.0,
                variance: 0.0,
            });
            let new_mean = alpha * value + (1.0 - alpha) * estimate.mean;
            let new_variance = (1.0 - alpha) * (estimate.variance + alpha * (value - new_mean).powi(2));
            estimate.mean = new_mean;
            estimate.variance = new_variance.max(0.0);
        }

        let was_ready = entry.ready();
        entry.sample_count += 1;
        entry.last_prompt_hash = Some(vitals.prompt_hash.clone());
        if entry.accel_ticks_remaining > 0 {
            entry.accel_ticks_remaining -= 1;
            if entry.accel_ticks_remaining == 0 {
                entry.accel_alpha = None;
            }
        }
        let just_became_ready = !was_ready && entry.ready();
        let sample_count = entry.sample_count;
        let profile = entry.clone();
        drop(entry);

        if just_became_ready {
            info!(agent_id = %agent_id, "baseline became ready");
        }

        if let Some(cache) = &self.cache {
            if just_became_ready || sample_count % self.persist_every == 0 {
                cache.put_baseline(&agent_id, profile.clone()).await;
            }
        }
        if let Some(store) = &self.store {
            if sample_count % self.persist_every == 0 {
                if let Err(e) = store.write_baseline_profile(&self.run_id, &profile).await {
                    debug!(agent_id = %agent_id, error = %e, "baseline store push failed");
                }
            }
        }
    }

    #[must_use]
    pub fn profile(&self, agent_id: &str) -> Option<BaselineProfile> {
        self.profiles.get(agent_id).map(|p| p.clone())
    }

    #[must_use]
    pub fn is_ready(&self, agent_id: &str) -> bool {
        self.profiles.get(agent_id).is_some_and(|p| p.ready())
    }

    /// Widens alpha for the next `accel_ticks` updates so the baseline
    /// converges on a new normal quickly after a healing action.
    pub fn accelerate(&self, agent_id: &str) {
        if let Some(mut profile) = self.profiles.get_mut(agent_id) {
            profile.accel_alpha = Some((self.alpha * self.config.accel_multiplier).min(0.5));
            profile.accel_ticks_remaining = self.config.accel_ticks;
        }
    }

    /// Clears all learned state for an agent; it starts learning fresh.
    pub fn hard_reset(&self, agent_id: &str) {
        self.profiles
            .insert(agent_id.to_string(), BaselineProfile::new(agent_id, self.config.min_samples));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn vitals(agent_id: &str, latency_ms: f64) -> Vitals {
        Vitals {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            latency_ms,
            input_tokens: 500,
            output_tokens: 500,
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

    fn learner() -> BaselineLearner {
        let config = BaselineConfig {
            span: 50.0,
            min_samples: 15,
            accel_multiplier: 3.0,
            accel_ticks: 5,
            stddev_floor_fraction: 0.05,
            ring_capacity: 2000,
        };
        BaselineLearner::new(config, 2.0 / 51.0, None, None, "run".to_string())
    }

    #[tokio::test]
    async fn ready_flips_exactly_at_min_samples() {
        let learner = learner();
        for i in 0..14 {
            learner.update(&vitals("a", 100.0)).await;
            assert!(!learner.is_ready("a"), "should not be ready at sample {i}");
        }
        learner.update(&vitals("a", 100.0)).await;
        assert!(learner.is_ready("a"));
    }

    #[tokio::test]
    async fn constant_metric_converges_mean_with_zero_variance() {
        let learner = learner();
        for _ in 0..30 {
            learner.update(&vitals("a", 100.0)).await;
        }
        let profile = learner.profile("a").unwrap();
        let latency = profile.estimates[&Metric::Latency];
        assert!((latency.mean - 100.0).abs() < 1e-6);
        assert!(latency.variance.abs() < 1e-9);
    }

    #[tokio::test]
    async fn variance_never_negative() {
        let learner = learner();
        for i in 0..50 {
            let latency = if i % 2 == 0 { 50.0 } else { 500.0 };
            learner.update(&vitals("a", latency)).await;
        }
        let profile = learner.profile("a").unwrap();
        for estimate in profile.estimates.values() {
            assert!(estimate.variance >= 0.0);
        }
    }

    #[tokio::test]
    async fn accelerate_widens_alpha_temporarily() {
        let learner = learner();
        for _ in 0..20 {
            learner.update(&vitals("a", 100.0)).await;
        }
        learner.accelerate("a");
        assert_eq!(learner.profiles.get("a").unwrap().accel_ticks_remaining, 5);
        learner.update(&vitals("a", 500.0)).await;
        // With widened alpha the mean should move noticeably toward 500.
        let profile = learner.profile("a").unwrap();
        assert!(profile.estimates[&Metric::Latency].mean > 105.0);
    }

    #[tokio::test]
    async fn hard_reset_clears_profile() {
        let learner = learner();
        for _ in 0..20 {
            learner.update(&vitals("a", 100.0)).await;
        }
        assert!(learner.is_ready("a"));
        learner.hard_reset("a");
        assert!(!learner.is_ready("a"));
        assert_eq!(learner.profile("a").unwrap().sample_count, 0);
    }
}
