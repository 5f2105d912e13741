//! Configuration module for the sync engine.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the local SQLite database file
    pub db_path: PathBuf,
    /// Base URL of the remote draft API (e.g. `http://host/api`)
    pub api_base: String,
    /// Pre-shared key sent as `x-api-key` on every remote call
    pub api_key: Option<String>,
    /// Interval between automatic sync passes
    pub sync_interval: Duration,
    /// Default TTL for cached read responses
    pub cache_ttl: Duration,
    /// Age after which abandoned local drafts are swept
    pub draft_retention: Duration,
    /// Interval between connectivity probes
    pub probe_interval: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/offline.sqlite"),
            api_base: "http://127.0.0.1:3000/api".to_string(),
            api_key: None,
            sync_interval: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
            draft_retention: Duration::from_secs(30 * 24 * 60 * 60),
            probe_interval: Duration::from_secs(15),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let db_path = env::var("DRAFT_SYNC_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let api_base = env::var("DRAFT_SYNC_API_BASE")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);

        let api_key = env::var("DRAFT_SYNC_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let sync_interval = secs_var("DRAFT_SYNC_INTERVAL_SECS", defaults.sync_interval);
        let cache_ttl = secs_var("DRAFT_SYNC_CACHE_TTL_SECS", defaults.cache_ttl);
        let draft_retention = env_u64("DRAFT_SYNC_RETENTION_DAYS")
            .and_then(|days| match days.checked_mul(24 * 60 * 60) {
                Some(secs) => Some(Duration::from_secs(secs)),
                None => {
                    tracing::warn!("DRAFT_SYNC_RETENTION_DAYS={} is too large, using default", days);
                    None
                }
            })
            .unwrap_or(defaults.draft_retention);
        let probe_interval = secs_var("DRAFT_SYNC_PROBE_SECS", defaults.probe_interval);

        let log_level = env::var("DRAFT_SYNC_LOG_LEVEL").unwrap_or(defaults.log_level);

        Self {
            db_path,
            api_base,
            api_key,
            sync_interval,
            cache_ttl,
            draft_retention,
            probe_interval,
            log_level,
        }
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    env_u64(name).map(Duration::from_secs).unwrap_or(default)
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            None
        }
    }
}
