//! Entry point for the sentinel control plane binary: loads
//! configuration, wires every subsystem together, spawns the agent /
//! sentinel / probation loops, and serves the HTTP surface until a
//! shutdown signal arrives.

use sentinel_control_plane::api::AppState;
use sentinel_control_plane::baseline::BaselineLearner;
use sentinel_control_plane::cache::Cache;
use sentinel_control_plane::config::SentinelConfig;
use sentinel_control_plane::diagnostician::Diagnostician;
use sentinel_control_plane::enforcement::{Enforcement, GatewayEnforcement};
use sentinel_control_plane::executor::SimulatedExecutor;
use sentinel_control_plane::healer::Healer;
use sentinel_control_plane::immune::Immune;
use sentinel_control_plane::lifecycle::Lifecycle;
use sentinel_control_plane::orchestrator::{probation_loop, sentinel_loop, Orchestrator};
use sentinel_control_plane::quarantine::Quarantine;
use sentinel_control_plane::ratelimit::RateLimiter;
use sentinel_control_plane::store::{HttpStore, InMemoryStore, VitalsStore};
use sentinel_control_plane::telemetry::Telemetry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SentinelConfig::load().unwrap_or_else(|e| {
        eprintln!("configuration error: {e}");
        std::process::exit(1);
    });

    let log_level = match config.logging.level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_max_level(log_level).json().init();
    } else {
        tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();
    }

    info!("starting sentinel control plane");

    let cache = Arc::new(Cache::load_or_init(&config.cache.path).await);
    let run_id = cache.run_id().await;
    let api_key = cache.ensure_api_key(config.server.ingest_api_key.clone()).await;

    let store: Option<Arc<dyn VitalsStore>> = match &config.store.url {
        None => {
            info!("no store url configured, using in-memory store");
            Some(Arc::new(InMemoryStore::new()))
        }
        Some(url) => {
            info!(%url, "using http store");
            Some(Arc::new(HttpStore::new(url.clone(), config.store.token.clone())))
        }
    };

    let telemetry = Arc::new(Telemetry::new(config.baseline.ring_capacity, store.clone(), run_id.clone()));
    let baseline = Arc::new(BaselineLearner::new(
        config.baseline.clone(),
        config.alpha(),
        Some(cache.clone()),
        store.clone(),
        run_id.clone(),
    ));

    let enforcement: Arc<dyn Enforcement> = Arc::new(GatewayEnforcement::new());
    let lifecycle = Arc::new(Lifecycle::new(enforcement.clone(), config.lifecycle.drain_timeout_secs));
    let quarantine = Arc::new(Quarantine::new(cache.clone(), enforcement.clone(), store.clone(), run_id.clone()).await);

    let diagnostician = Arc::new(Diagnostician::new());
    let immune = Arc::new(Immune::new(store.clone(), run_id.clone(), Some(diagnostician.clone())));
    let executor = Arc::new(SimulatedExecutor::new());
    let healer = Arc::new(Healer::new(
        immune.clone(),
        executor,
        lifecycle.clone(),
        baseline.clone(),
        config.lifecycle.executor_timeout_secs,
    ));

    let orchestrator = Orchestrator::new(
        config.clone(),
        telemetry,
        baseline,
        lifecycle,
        quarantine,
        diagnostician,
        immune,
        healer,
        store,
        cache.clone(),
        run_id,
    );

    let cache_shutdown = cache.spawn_flusher(config.cache.flush_interval_secs);
    let (loop_shutdown_tx, loop_shutdown_rx) = tokio::sync::watch::channel(false);

    // The simulator's agent_loop is opt-in and not started here; real
    // deployments feed vitals through the HTTP ingest and gateway-hook
    // routes instead.
    let sentinel_handle = sentinel_loop::spawn(orchestrator.clone(), loop_shutdown_rx.clone());
    let probation_handle = probation_loop::spawn(orchestrator.clone(), loop_shutdown_rx.clone());

    let rate_limiter = Arc::new(RateLimiter::new(
        config.server.ingest_rate_limit_per_minute,
        Duration::from_secs(60),
    ));
    rate_limiter.clone().spawn_cleanup();

    let app_state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
        api_key: Some(api_key),
        rate_limiter,
    });

    let host = config.server.host.clone();
    let port = config.server.port;
    let serve_handle = tokio::spawn(async move {
        if let Err(e) = sentinel_control_plane::server::serve(app_state, &host, port).await {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    info!("shutdown signal received");

    let _ = loop_shutdown_tx.send(true);
    let _ = cache_shutdown.send(true);
    cache.force_flush().await;
    serve_handle.abort();
    sentinel_handle.abort();
    probation_handle.abort();

    info!("sentinel control plane stopped");
    Ok(())
}
