//! Fixed-window rate limiting for the ingest surface, keyed by
//! `x-api-key` (or a shared anonymous bucket when no key is configured).
//! Narrowed from the teacher's general-purpose `RateLimiter` /
//! `RateLimiters` down to the one client the control plane needs: ingest
//! abuse protection, carried as ambient stack regardless of which
//! detection/healing features are in or out of scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct ClientState {
    request_count: u32,
    window_start: Instant,
    last_request: Instant,
}

/// Allows up to `max_requests` per `window` per client key, resetting the
/// count once the window has elapsed since it started.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: RwLock<HashMap<String, ClientState>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if `client_id` is still within budget for the
    /// current window, consuming one unit of it in that case.
    pub async fn check(&self, client_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        let now = Instant::now();
        let state = clients.entry(client_id.to_string()).or_insert(ClientState {
            request_count: 0,
            window_start: now,
            last_request: now,
        });

        if now.duration_since(state.window_start) >= self.window {
            state.request_count = 0;
            state.window_start = now;
        }
        state.last_request = now;

        if state.request_count >= self.max_requests {
            return false;
        }
        state.request_count += 1;
        true
    }

    /// Drops entries idle for over an hour so a long-lived process
    /// doesn't accumulate one map entry per distinct key forever.
    async fn cleanup_idle(&self) {
        let mut clients = self.clients.write().await;
        let now = Instant::now();
        let idle_threshold = Duration::from_secs(3600);
        clients.retain(|_, state| now.duration_since(state.last_request) < idle_threshold);
    }

    /// Spawns the background cleanup loop. The returned handle is not
    /// tracked for shutdown: it holds no resources worth draining.
    pub fn spawn_cleanup(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                self.cleanup_idle().await;
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("k1").await);
        assert!(limiter.check("k1").await);
        assert!(!limiter.check("k1").await);
    }

    #[tokio::test]
    async fn clients_are_isolated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("k1").await);
        assert!(limiter.check("k2").await);
    }

    #[tokio::test]
    async fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("k1").await);
        assert!(!limiter.check("k1").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("k1").await);
    }

    #[tokio::test]
    async fn cleanup_idle_drops_stale_clients_only() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.check("stale").await;
        {
            let mut clients = limiter.clients.write().await;
            clients.get_mut("stale").unwrap().last_request = Instant::now() - Duration::from_secs(7200);
        }
        limiter.check("fresh").await;
        limiter.cleanup_idle().await;
        let clients = limiter.clients.read().await;
        assert!(!clients.contains_key("stale"));
        assert!(clients.contains_key("fresh"));
    }
}
