//! Hierarchical configuration: programmatic defaults, merged with
//! `.abathur/config.yaml`, merged with `ABATHUR_`-prefixed environment
//! variables.

mod loader;

use crate::infrastructure::logging::LogConfig;
use serde::{Deserialize, Serialize};

pub use loader::{ConfigError, ConfigLoader};

/// The recognized options named in the external-interfaces section: the
/// database path, swarm concurrency/polling defaults, the resolver's
/// cache TTL, the queue's default retry budget, and nested log config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: f64,

    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries_default: u32,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_concurrent_agents: default_max_concurrent_agents(),
            poll_interval_seconds: default_poll_interval_seconds(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_retries_default: default_max_retries(),
            log: LogConfig::default(),
        }
    }
}

fn default_database_path() -> String {
    ".abathur/abathur.db".to_string()
}

fn default_max_concurrent_agents() -> usize {
    10
}

fn default_poll_interval_seconds() -> f64 {
    0.1
}

fn default_cache_ttl_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}
