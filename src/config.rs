//! Configuration file parser for the aggregation daemon.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Every field carries a serde default, so any subset of keys may be
//! specified. Unknown keys are ignored but logged as potential typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Configuration
// ============================================================================

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path.
    pub database_path: String,

    /// How often the sweep job scans for overdue feeds.
    pub sweep_interval_minutes: u64,

    /// Upper bound on concurrent feed fetches across all trigger sources.
    pub max_concurrent_refreshes: usize,

    /// Per-request timeout for feed fetches, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted feed response body, in bytes.
    pub max_feed_bytes: usize,

    /// Refresh frequency assigned to feeds created without one, in hours.
    pub default_frequency_hours: u32,

    /// Permit feed URLs on localhost/private ranges. Off by default; feed
    /// URLs come from untrusted readers. Enable for deployments that
    /// aggregate feeds on an internal network.
    pub allow_private_networks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedpool.db".to_string(),
            sweep_interval_minutes: 60,
            max_concurrent_refreshes: 10,
            request_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            default_frequency_hours: 24,
            allow_private_networks: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to flag unknown keys (likely typos)
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "database_path",
                "sweep_interval_minutes",
                "max_concurrent_refreshes",
                "request_timeout_secs",
                "max_feed_bytes",
                "default_frequency_hours",
                "allow_private_networks",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, "feedpool.db");
        assert_eq!(config.sweep_interval_minutes, 60);
        assert_eq!(config.max_concurrent_refreshes, 10);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_feed_bytes, 10 * 1024 * 1024);
        assert_eq!(config.default_frequency_hours, 24);
        assert!(!config.allow_private_networks);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedpool_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.sweep_interval_minutes, 60);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("feedpool_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "sweep_interval_minutes = 15\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sweep_interval_minutes, 15);
        assert_eq!(config.default_frequency_hours, 24); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("feedpool_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
database_path = "/var/lib/feedpool/feeds.db"
sweep_interval_minutes = 30
max_concurrent_refreshes = 4
request_timeout_secs = 10
max_feed_bytes = 1048576
default_frequency_hours = 12
allow_private_networks = true
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database_path, "/var/lib/feedpool/feeds.db");
        assert_eq!(config.sweep_interval_minutes, 30);
        assert_eq!(config.max_concurrent_refreshes, 4);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_feed_bytes, 1_048_576);
        assert_eq!(config.default_frequency_hours, 12);
        assert!(config.allow_private_networks);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("feedpool_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("feedpool_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "totally_fake_key = \"ignored\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sweep_interval_minutes, 60);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("feedpool_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "sweep_interval_minutes = \"soon\"\n").unwrap();

        assert!(Config::load(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
