//! Configuration from environment variables

use std::env;

/// Runtime configuration
///
/// Loaded from environment variables with sensible defaults; a `.env` file
/// is honored when present.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the killmail feed
    pub base_url: String,

    /// Path to SQLite database file
    pub db_path: String,

    /// Listen address for the read API
    pub api_addr: String,

    /// Master enable flag for the poller task
    pub poller_enabled: bool,

    /// Path of the durable cursor file
    pub state_file: String,

    /// Explicit starting sequence override (skips cursor and remote lookup)
    pub start_from: Option<u64>,

    /// Drop NPC-only kills at level 1
    pub exclude_npc: bool,

    /// Allowed security zones (empty disables the filter)
    pub security_zones: Vec<String>,

    /// Minimum total value in ISK (0 disables the filter)
    pub min_value: f64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `KILLFEED_BASE_URL` (default: https://r2z2.zkillboard.com/ephemeral)
    /// - `KILLFEED_DB_PATH` (default: killfeed.db)
    /// - `KILLFEED_API_ADDR` (default: 127.0.0.1:8080)
    /// - `POLLER_ENABLED` (default: true)
    /// - `POLLER_STATE_FILE` (default: zkill_sequence.txt)
    /// - `POLLER_START_FROM` (default: unset)
    /// - `POLLER_EXCLUDE_NPC` (default: true)
    /// - `POLLER_SECURITY_ZONES` (comma-separated, default: nullsec,lowsec)
    /// - `POLLER_MIN_VALUE` (default: 10000000)
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("KILLFEED_BASE_URL")
                .unwrap_or_else(|_| "https://r2z2.zkillboard.com/ephemeral".to_string()),

            db_path: env::var("KILLFEED_DB_PATH").unwrap_or_else(|_| "killfeed.db".to_string()),

            api_addr: env::var("KILLFEED_API_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),

            poller_enabled: env::var("POLLER_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),

            state_file: env::var("POLLER_STATE_FILE")
                .unwrap_or_else(|_| "zkill_sequence.txt".to_string()),

            start_from: env::var("POLLER_START_FROM")
                .ok()
                .and_then(|s| s.parse().ok()),

            exclude_npc: env::var("POLLER_EXCLUDE_NPC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),

            security_zones: env::var("POLLER_SECURITY_ZONES")
                .map(|s| {
                    s.split(',')
                        .map(|z| z.trim().to_string())
                        .filter(|z| !z.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["nullsec".to_string(), "lowsec".to_string()]),

            min_value: env::var("POLLER_MIN_VALUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000_000.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test: env vars are process-global, so defaults and overrides
    // are checked sequentially
    #[test]
    fn test_config_from_env() {
        env::remove_var("KILLFEED_BASE_URL");
        env::remove_var("KILLFEED_DB_PATH");
        env::remove_var("POLLER_ENABLED");
        env::remove_var("POLLER_SECURITY_ZONES");
        env::remove_var("POLLER_MIN_VALUE");
        env::remove_var("POLLER_START_FROM");

        let config = Config::from_env();

        assert_eq!(config.base_url, "https://r2z2.zkillboard.com/ephemeral");
        assert_eq!(config.db_path, "killfeed.db");
        assert_eq!(config.poller_enabled, true);
        assert_eq!(config.state_file, "zkill_sequence.txt");
        assert_eq!(config.start_from, None);
        assert_eq!(config.exclude_npc, true);
        assert_eq!(config.security_zones, vec!["nullsec", "lowsec"]);
        assert_eq!(config.min_value, 10_000_000.0);

        env::set_var("KILLFEED_BASE_URL", "http://127.0.0.1:9000/feed");
        env::set_var("POLLER_SECURITY_ZONES", "highsec, lowsec,");
        env::set_var("POLLER_MIN_VALUE", "0");
        env::set_var("POLLER_START_FROM", "1234");

        let config = Config::from_env();

        assert_eq!(config.base_url, "http://127.0.0.1:9000/feed");
        assert_eq!(config.security_zones, vec!["highsec", "lowsec"]);
        assert_eq!(config.min_value, 0.0);
        assert_eq!(config.start_from, Some(1234));

        env::remove_var("KILLFEED_BASE_URL");
        env::remove_var("POLLER_SECURITY_ZONES");
        env::remove_var("POLLER_MIN_VALUE");
        env::remove_var("POLLER_START_FROM");
    }
}
