//! Configuration for the session service.

use std::time::Duration;

use anyhow::Result;

const DEFAULT_CACHE_CAPACITY: usize = 30;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 300;
const DEFAULT_REAP_INTERVAL_SECS: u64 = 3600;
/// Three days, matching how long an untouched roster stays restorable.
const DEFAULT_SESSION_TTL_SECS: i64 = 3 * 24 * 3600;
const DEFAULT_DB_PATH: &str = "roster.db";

/// Session service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum sessions resident in the cache.
    pub cache_capacity: usize,

    /// Seconds between dirty-session flush passes.
    pub flush_interval_secs: u64,

    /// Seconds between expired-session reap passes.
    pub reap_interval_secs: u64,

    /// Lifetime of a stored session, refreshed on every flush.
    pub session_ttl_secs: i64,

    /// When false, nothing is ever written to the store.
    pub persist: bool,

    /// SQLite file backing the session store.
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            persist: true,
            db_path: DEFAULT_DB_PATH.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Malformed values fall
    /// back to defaults rather than failing startup.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let cache_capacity = std::env::var("ROSTER_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cache_capacity);

        let flush_interval_secs = std::env::var("ROSTER_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.flush_interval_secs);

        let reap_interval_secs = std::env::var("ROSTER_REAP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.reap_interval_secs);

        let session_ttl_secs = std::env::var("ROSTER_SESSION_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.session_ttl_secs);

        let persist = std::env::var("ROSTER_PERSIST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let db_path = std::env::var("ROSTER_DB_PATH").unwrap_or(defaults.db_path);

        let log_level = std::env::var("ROSTER_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            cache_capacity,
            flush_interval_secs,
            reap_interval_secs,
            session_ttl_secs,
            persist,
            db_path,
            log_level,
        })
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }
}
