//! Per-agent bounded vitals buffer with write-through to the Store.
//!
//! Vitals for a single agent are processed in the order recorded here;
//! that ordering is preserved end-to-end into baseline updates and
//! Sentinel windows (spec §5 ordering guarantee). Each agent's ring is
//! owned behind its own entry in a `DashMap`, so agents never contend
//! with one another.

use crate::store::VitalsStore;
use crate::types::Vitals;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

struct Ring {
    samples: VecDeque<Vitals>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    fn push(&mut self, v: Vitals) {
        if self.samples.len() >= self.capacity {
            // Backpressure: drop oldest when full (spec §5).
            self.samples.pop_front();
        }
        self.samples.push_back(v);
    }
}

/// Keeps recent vitals per agent in memory and forwards every sample to
/// the attached Store on a best-effort basis.
pub struct Telemetry {
    rings: DashMap<String, Ring>,
    capacity: usize,
    store: Option<Arc<dyn VitalsStore>>,
    run_id: String,
}

impl Telemetry {
    #[must_use]
    pub fn new(capacity: usize, store: Option<Arc<dyn VitalsStore>>, run_id: String) -> Self {
        Self {
            rings: DashMap::new(),
            capacity,
            store,
            run_id,
        }
    }

    /// Records one vitals sample: updates the in-memory ring and attempts
    /// a write-through to the Store. A Store failure is logged and
    /// otherwise swallowed here — it must never stop the pipeline — but
    /// is reported back to the caller so the ingest surface can
    /// distinguish a durably-accepted sample from one only held in
    /// memory.
    pub async fn record(&self, vitals: Vitals) -> bool {
        let mut store_healthy = true;
        if let Some(store) = &self.store {
            if let Err(e) = store.write_agent_vitals(&self.run_id, &vitals).await {
                warn!(agent_id = %vitals.agent_id, error = %e, "telemetry write-through failed");
                store_healthy = false;
            }
        }
        self.rings
            .entry(vitals.agent_id.clone())
            .or_insert_with(|| Ring::new(self.capacity))
            .push(vitals);
        store_healthy
    }

    /// Returns samples from the last `window_secs` seconds for `agent_id`,
    /// preferring the Store when attached and falling back to the
    /// in-memory ring when the Store is unavailable or absent.
    pub async fn recent(&self, agent_id: &str, window_secs: u64) -> Vec<Vitals> {
        if let Some(store) = &self.store {
            match store.get_recent_agent_vitals(&self.run_id, agent_id, window_secs).await {
                Ok(v) if !v.is_empty() => return v,
                Ok(_) => {}
                Err(e) => warn!(agent_id, error = %e, "store window read failed, falling back to ring"),
            }
        }
        self.recent_from_ring(agent_id, window_secs)
    }

    fn recent_from_ring(&self, agent_id: &str, window_secs: u64) -> Vec<Vitals> {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(window_secs as i64);
        self.rings
            .get(agent_id)
            .map(|ring| {
                ring.samples
                    .iter()
                    .filter(|v| v.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn latest(&self, agent_id: &str) -> Option<Vitals> {
        self.rings.get(agent_id).and_then(|r| r.samples.back().cloned())
    }

    #[must_use]
    pub fn count(&self, agent_id: &str) -> usize {
        self.rings.get(agent_id).map_or(0, |r| r.samples.len())
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.rings.iter().map(|r| r.samples.len()).sum()
    }

    #[must_use]
    pub fn known_agents(&self) -> Vec<String> {
        self.rings.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ErrorType;

    fn sample(agent_id: &str, latency_ms: f64) -> Vitals {
        Vitals {
            agent_id: agent_id.to_string(),
            timestamp: chrono::Utc::now(),
            latency_ms,
            input_tokens: 100,
            output_tokens: 100,
            tool_calls: 1,
            retries: 0,
            success: true,
            cost: 0.001,
            model: "m".to_string(),
            error_type: ErrorType::None,
            prompt_hash: "h".to_string(),
            agent_type: None,
            mcp_servers: None,
        }
    }

    #[tokio::test]
    async fn ring_drops_oldest_when_full() {
        let telemetry = Telemetry::new(3, None, "run".to_string());
        for i in 0..5 {
            telemetry.record(sample("a", i as f64)).await;
        }
        assert_eq!(telemetry.count("a"), 3);
        let recent = telemetry.recent_from_ring("a", 3600);
        let latencies: Vec<f64> = recent.iter().map(|v| v.latency_ms).collect();
        assert_eq!(latencies, vec![2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn per_agent_isolation() {
        let telemetry = Telemetry::new(10, None, "run".to_string());
        telemetry.record(sample("a", 1.0)).await;
        telemetry.record(sample("b", 2.0)).await;
        assert_eq!(telemetry.count("a"), 1);
        assert_eq!(telemetry.count("b"), 1);
        assert_eq!(telemetry.total(), 2);
    }

    #[tokio::test]
    async fn latest_returns_most_recent() {
        let telemetry = Telemetry::new(10, None, "run".to_string());
        telemetry.record(sample("a", 1.0)).await;
        telemetry.record(sample("a", 2.0)).await;
        assert_eq!(telemetry.latest("a").unwrap().latency_ms, 2.0);
    }
}
