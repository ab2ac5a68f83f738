use super::Config;
use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

/// Rejections produced by [`ConfigLoader::validate`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid max_concurrent_agents: {0}. Must be between 1 and 100")]
    InvalidMaxConcurrentAgents(usize),

    #[error("invalid poll_interval_seconds: {0}. Must be positive")]
    InvalidPollInterval(f64),

    #[error("invalid cache_ttl_seconds: {0}. Must be positive")]
    InvalidCacheTtl(u64),

    #[error("invalid max_retries_default: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("database_path cannot be empty")]
    EmptyDatabasePath,
}

/// Loads and validates [`Config`] from the project-local `.abathur/`
/// directory, layered with environment overrides. Configuration is
/// always project-local (`pwd/.abathur/`) so multiple swarms on one
/// machine can run against different projects without clobbering
/// each other's settings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.abathur/config.yaml` (project config)
    /// 3. `.abathur/local.yaml` (optional local overrides)
    /// 4. `ABATHUR_*` environment variables (`__` nested-key separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".abathur/config.yaml"))
            .merge(Yaml::file(".abathur/local.yaml"))
            .merge(Env::prefixed("ABATHUR_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrent_agents == 0 || config.max_concurrent_agents > 100 {
            return Err(ConfigError::InvalidMaxConcurrentAgents(
                config.max_concurrent_agents,
            ));
        }

        if config.poll_interval_seconds <= 0.0 {
            return Err(ConfigError::InvalidPollInterval(
                config.poll_interval_seconds,
            ));
        }

        if config.cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl(config.cache_ttl_seconds));
        }

        if config.max_retries_default == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.max_retries_default));
        }

        if config.database_path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.log.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log.level.clone()));
        }

        Ok(())
    }
}
