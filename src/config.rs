//! Layered configuration: built-in defaults, an optional TOML file, then
//! environment variable overrides — the same precedence order as the
//! teacher's `HiveConfig::load`.

use crate::error::{SentinelError, SentinelResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
    pub baseline: BaselineConfig,
    pub lifecycle: LifecycleConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ingest_api_key: Option<String>,
    /// Maximum ingest requests per minute per `x-api-key` (or per
    /// anonymous client when no key is configured).
    pub ingest_rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Sigma distance at which a deviation becomes an anomaly.
    pub threshold_sigma: f64,
    /// Sigma distance above which DRAINING is entered directly, bypassing SUSPECTED.
    pub severe_skip_sigma: f64,
    /// Sigma distance at or above which a QUARANTINED agent requires human approval.
    pub approval_threshold_sigma: f64,
    /// Sentinel window length in seconds.
    pub window_secs: u64,
    /// Fraction of the fleet sharing a primary anomaly kind to call FLEET_WIDE.
    pub fleet_high_fraction: f64,
    /// Fraction of the fleet sharing a primary anomaly kind to call PARTIAL_FLEET.
    pub fleet_low_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub span: f64,
    pub min_samples: u64,
    /// Multiplier applied to alpha by `accelerate()`, capped at 0.5.
    pub accel_multiplier: f64,
    pub accel_ticks: u32,
    /// Floor fraction used when computing the stddev floor (5% default).
    pub stddev_floor_fraction: f64,
    pub ring_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub suspect_ticks: u32,
    pub probation_ticks: u32,
    pub drain_timeout_secs: u64,
    pub executor_timeout_secs: u64,
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub path: String,
    pub flush_interval_secs: u64,
    pub flush_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8088,
                ingest_api_key: None,
                ingest_rate_limit_per_minute: 120,
            },
            detection: DetectionConfig {
                threshold_sigma: 2.5,
                severe_skip_sigma: 6.0,
                approval_threshold_sigma: 5.0,
                window_secs: 10,
                fleet_high_fraction: 0.3,
                fleet_low_fraction: 0.1,
            },
            baseline: BaselineConfig {
                span: 50.0,
                min_samples: 15,
                accel_multiplier: 3.0,
                accel_ticks: 20,
                stddev_floor_fraction: 0.05,
                ring_capacity: 2000,
            },
            lifecycle: LifecycleConfig {
                suspect_ticks: 3,
                probation_ticks: 10,
                drain_timeout_secs: 30,
                executor_timeout_secs: 10,
                history_capacity: 200,
            },
            cache: CacheConfig {
                path: "sentinel_cache.json".to_string(),
                flush_interval_secs: 30,
                flush_deadline_secs: 2,
            },
            store: StoreConfig {
                url: None,
                token: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl SentinelConfig {
    /// Loads configuration with precedence: defaults -> file -> env.
    pub fn load() -> SentinelResult<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("SENTINEL_CONFIG_FILE") {
            if Path::new(&path).exists() {
                config = Self::from_file(&path)?;
            }
        } else if Path::new("config/default.toml").exists() {
            config = Self::from_file("config/default.toml")?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> SentinelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SentinelError::ConfigurationError {
            reason: format!("failed to read config file {path}: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| SentinelError::ConfigurationError {
            reason: format!("failed to parse config file {path}: {e}"),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SENTINEL_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SENTINEL_PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = env::var("SENTINEL_INGEST_API_KEY") {
            self.server.ingest_api_key = Some(v);
        }
        if let Ok(v) = env::var("SENTINEL_INGEST_RATE_LIMIT") {
            if let Ok(limit) = v.parse() {
                self.server.ingest_rate_limit_per_minute = limit;
            }
        }
        if let Ok(v) = env::var("SENTINEL_CACHE_DIR") {
            self.cache.path = format!("{v}/sentinel_cache.json");
        }
        if let Ok(v) = env::var("SENTINEL_STORE_URL") {
            self.store.url = Some(v);
        }
        if let Ok(v) = env::var("SENTINEL_STORE_TOKEN") {
            self.store.token = Some(v);
        }
        if let Ok(v) = env::var("SENTINEL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            // Recognized per spec §6 CLI surface; metric export itself is
            // out-of-core plumbing, so only the presence is recorded.
            tracing::debug!(endpoint = %v, "OTEL endpoint recognized (export not implemented in core)");
        }
    }

    fn validate(&self) -> SentinelResult<()> {
        if self.baseline.span <= 0.0 {
            return Err(SentinelError::ConfigurationError {
                reason: "baseline.span must be positive".to_string(),
            });
        }
        if self.baseline.min_samples == 0 {
            return Err(SentinelError::ConfigurationError {
                reason: "baseline.min_samples must be positive".to_string(),
            });
        }
        if self.detection.threshold_sigma <= 0.0 || self.detection.approval_threshold_sigma <= 0.0
        {
            return Err(SentinelError::ConfigurationError {
                reason: "detection thresholds must be positive".to_string(),
            });
        }
        if self.detection.fleet_low_fraction > self.detection.fleet_high_fraction {
            return Err(SentinelError::ConfigurationError {
                reason: "detection.fleet_low_fraction must be <= fleet_high_fraction".to_string(),
            });
        }
        if self.server.ingest_rate_limit_per_minute == 0 {
            return Err(SentinelError::ConfigurationError {
                reason: "server.ingest_rate_limit_per_minute must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// `alpha = 2 / (span + 1)`.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        2.0 / (self.baseline.span + 1.0)
    }
}
