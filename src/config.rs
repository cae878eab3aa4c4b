//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ratelimit::{FailMode, Policy, Strategy};

/// Main configuration for the Floodgate engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Default policy applied when a caller does not supply one
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Counter cache tuning
    #[serde(default)]
    pub cache: CacheConfig,

    /// Event store behavior
    #[serde(default)]
    pub store: StoreConfig,
}

/// Default rate limit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum requests allowed in the time window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Time window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Windowing strategy
    #[serde(default)]
    pub strategy: Strategy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            strategy: Strategy::default(),
        }
    }
}

impl PolicyConfig {
    /// Materialize the configured policy.
    pub fn to_policy(&self) -> Policy {
        Policy::new(self.limit, Duration::from_secs(self.window_secs)).with_strategy(self.strategy)
    }
}

fn default_limit() -> u64 {
    5
}

fn default_window_secs() -> u64 {
    60
}

/// Counter cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether checks consult the cache at all
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entries held before expired ones are purged
    #[serde(default = "default_cache_capacity")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_cache_capacity(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    10000
}

/// Event store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the JSON-lines event log; in-memory when unset
    pub path: Option<String>,

    /// Behavior when the store cannot record an admissible request
    #[serde(default)]
    pub fail_mode: FailMode,
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FloodgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();

        assert_eq!(config.policy.limit, 5);
        assert_eq!(config.policy.window_secs, 60);
        assert_eq!(config.policy.strategy, Strategy::Sliding);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, 10000);
        assert_eq!(config.store.fail_mode, FailMode::Closed);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_to_policy() {
        let config = PolicyConfig {
            limit: 10,
            window_secs: 30,
            strategy: Strategy::Fixed,
        };
        let policy = config.to_policy();

        assert_eq!(policy.limit, 10);
        assert_eq!(policy.window, Duration::from_secs(30));
        assert_eq!(policy.strategy, Strategy::Fixed);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
policy:
  limit: 100
  window_secs: 3600
  strategy: fixed
cache:
  enabled: false
store:
  path: /var/lib/floodgate/events.jsonl
  fail_mode: open
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.policy.limit, 100);
        assert_eq!(config.policy.window_secs, 3600);
        assert_eq!(config.policy.strategy, Strategy::Fixed);
        assert!(!config.cache.enabled);
        // Unset fields keep their defaults.
        assert_eq!(config.cache.max_entries, 10000);
        assert_eq!(config.store.fail_mode, FailMode::Open);
        assert_eq!(
            config.store.path.as_deref(),
            Some("/var/lib/floodgate/events.jsonl")
        );
    }

    #[test]
    fn test_from_file_missing_path_is_io_error() {
        let err = FloodgateConfig::from_file("/nonexistent/floodgate.yaml").unwrap_err();
        assert!(matches!(err, crate::error::FloodgateError::Io(_)));
    }
}
