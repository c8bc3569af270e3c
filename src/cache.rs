//! Restart-resilient local cache: a JSON snapshot of run identity,
//! learned baselines, the quarantine set, and the ingest API key.
//!
//! The Store is the source of truth; this cache is the fast path that
//! lets the orchestrator skip re-learning baselines and re-detecting
//! quarantine after a restart. Writes are atomic (temp file + rename) and
//! the file is created with owner-only permissions.

use crate::error::{SentinelError, SentinelResult};
use crate::types::BaselineProfile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const SCHEMA_VERSION: u32 = 1;

/// The persisted shape of the cache file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSnapshot {
    #[serde(rename = "_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub api_key: Option<String>,
    pub baselines: BTreeMap<String, BaselineProfile>,
    pub quarantine: BTreeSet<String>,
}

impl CacheSnapshot {
    #[must_use]
    pub fn fresh(run_id: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.into(),
            api_key: None,
            baselines: BTreeMap::new(),
            quarantine: BTreeSet::new(),
        }
    }
}

/// Owns the on-disk snapshot and coalesces writes.
pub struct Cache {
    path: PathBuf,
    snapshot: Arc<RwLock<CacheSnapshot>>,
    dirty: Arc<std::sync::atomic::AtomicBool>,
}

impl Cache {
    /// Loads the snapshot at `path`, or initializes a fresh one (with a
    /// newly generated `run_id`) if the file is absent, unreadable, or
    /// schema-mismatched.
    pub async fn load_or_init(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let snapshot = match Self::read(&path).await {
            Ok(snap) if snap.schema_version == SCHEMA_VERSION => {
                info!(run_id = %snap.run_id, "loaded cache snapshot");
                snap
            }
            Ok(snap) => {
                warn!(
                    found = snap.schema_version,
                    expected = SCHEMA_VERSION,
                    "cache schema mismatch, starting fresh"
                );
                CacheSnapshot::fresh(uuid::Uuid::new_v4().to_string())
            }
            Err(e) => {
                debug!(error = %e, "no usable cache snapshot, starting fresh");
                CacheSnapshot::fresh(uuid::Uuid::new_v4().to_string())
            }
        };

        let cache = Self {
            path,
            snapshot: Arc::new(RwLock::new(snapshot)),
            dirty: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        };
        // A freshly-generated run_id is a critical change: persist immediately.
        if let Err(e) = cache.flush().await {
            error!(error = %e, "initial cache flush failed");
        }
        cache
    }

    async fn read(path: &Path) -> SentinelResult<CacheSnapshot> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| SentinelError::CacheCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub async fn run_id(&self) -> String {
        self.snapshot.read().await.run_id.clone()
    }

    #[must_use]
    pub async fn api_key(&self) -> Option<String> {
        self.snapshot.read().await.api_key.clone()
    }

    /// Sets the ingest API key, auto-generating one if `key` is `None`.
    /// Caller decides whether this counts as "explicit config" (do not
    /// call this for that case) vs. "auto-generated on first start".
    pub async fn ensure_api_key(&self, explicit: Option<String>) -> String {
        if let Some(key) = explicit {
            self.put_api_key(key.clone()).await;
            return key;
        }
        if let Some(existing) = self.api_key().await {
            return existing;
        }
        let generated = uuid::Uuid::new_v4().simple().to_string();
        self.put_api_key(generated.clone()).await;
        generated
    }

    pub async fn put_api_key(&self, key: String) {
        self.snapshot.write().await.api_key = Some(key);
        self.force_flush().await;
    }

    pub async fn put_baseline(&self, agent_id: &str, profile: BaselineProfile) {
        let first_ready = profile.ready();
        let was_ready = {
            let guard = self.snapshot.read().await;
            guard.baselines.get(agent_id).is_some_and(BaselineProfile::ready)
        };
        self.snapshot
            .write()
            .await
            .baselines
            .insert(agent_id.to_string(), profile);
        if first_ready && !was_ready {
            // First-baseline-ready is a critical change (spec §4.12).
            self.force_flush().await;
        } else {
            self.mark_dirty();
        }
    }

    pub async fn get_baseline(&self, agent_id: &str) -> Option<BaselineProfile> {
        self.snapshot.read().await.baselines.get(agent_id).cloned()
    }

    pub async fn put_quarantine(&self, quarantine: BTreeSet<String>) {
        self.snapshot.write().await.quarantine = quarantine;
        self.force_flush().await;
    }

    pub async fn quarantine(&self) -> BTreeSet<String> {
        self.snapshot.read().await.quarantine.clone()
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Flushes unconditionally, used for critical changes and shutdown.
    pub async fn force_flush(&self) {
        if let Err(e) = self.flush().await {
            error!(error = %e, "cache flush failed");
        }
        self.dirty.store(false, std::sync::atomic::Ordering::Relaxed);
    }

    /// Flushes only if dirty; used by the periodic background flusher.
    pub async fn flush_if_dirty(&self) {
        if self.dirty.load(std::sync::atomic::Ordering::Relaxed) {
            self.force_flush().await;
        }
    }

    async fn flush(&self) -> SentinelResult<()> {
        let snapshot = self.snapshot.read().await.clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms).await?;
        }

        tokio::fs::rename(&tmp_path, &self.path).await?;
        debug!(path = %self.path.display(), "cache snapshot flushed");
        Ok(())
    }

    /// Spawns the background flusher task. Returns a shutdown sender; drop
    /// or send on it to stop the loop (the caller should also call
    /// `force_flush` once more on shutdown, per spec §5's flush_deadline).
    pub fn spawn_flusher(self: &Arc<Self>, interval_secs: u64) -> tokio::sync::watch::Sender<bool> {
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.flush_if_dirty().await;
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            cache.force_flush().await;
                            break;
                        }
                    }
                }
            }
        });
        tx
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_preserves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = Cache::load_or_init(&path).await;
        let run_id = cache.run_id().await;
        cache.put_api_key("secret".to_string()).await;
        let mut profile = BaselineProfile::new("agent-1", 15);
        profile.sample_count = 15;
        cache.put_baseline("agent-1", profile).await;
        cache
            .put_quarantine(BTreeSet::from(["agent-2".to_string()]))
            .await;

        let reloaded = Cache::load_or_init(&path).await;
        assert_eq!(reloaded.run_id().await, run_id);
        assert_eq!(reloaded.api_key().await, Some("secret".to_string()));
        assert!(reloaded.get_baseline("agent-1").await.is_some());
        assert_eq!(
            reloaded.quarantine().await,
            BTreeSet::from(["agent-2".to_string()])
        );
    }

    #[tokio::test]
    async fn schema_mismatch_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let stale = serde_json::json!({
            "_schema_version": 999,
            "run_id": "stale",
            "api_key": null,
            "baselines": {},
            "quarantine": []
        });
        tokio::fs::write(&path, serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        let cache = Cache::load_or_init(&path).await;
        assert_ne!(cache.run_id().await, "stale");
    }

    #[tokio::test]
    async fn corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let cache = Cache::load_or_init(&path).await;
        assert!(!cache.run_id().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_mode_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = Cache::load_or_init(&path).await;
        cache.put_api_key("k".to_string()).await;
        let meta = tokio::fs::metadata(&path).await.unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
