//! Layered configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{Config, MIN_REQUESTS_PER_SECOND};

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".chatcheck";

const ENV_PREFIX: &str = "CHATCHECK_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `database.path` is blank
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// `database.max_connections` is zero
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// `logging.level` is not a known level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// `logging.format` is not a known format
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// `judging.workers` is zero
    #[error("Invalid judging workers: {0}. Must be at least 1")]
    InvalidWorkers(usize),

    /// `judging.queue_capacity` is zero
    #[error("Invalid judging queue_capacity: {0}. Must be at least 1")]
    InvalidQueueCapacity(usize),

    /// `judging.max_attempts` is zero
    #[error("Invalid judging max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    /// `openai.requests_per_second` is not finite or below the minimum
    #[error("Invalid rate limit: {0}. Must be a finite number of at least 0.001")]
    InvalidRateLimit(f64),

    /// `openai.burst_size` is zero
    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    /// `openai.initial_backoff_ms` is not below `openai.max_backoff_ms`
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .chatcheck/config.yaml
    /// 3. .chatcheck/local.yaml
    /// 4. CHATCHECK_* environment variables, `__` separating sections
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Load configuration rooted at `project_dir`.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Config> {
        let config_dir = project_dir.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_dir.join("config.yaml")))
            .merge(Yaml::file(config_dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Reject settings the services cannot run with.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let judging = &config.judging;
        if judging.workers == 0 {
            return Err(ConfigError::InvalidWorkers(judging.workers));
        }
        if judging.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(judging.queue_capacity));
        }
        if judging.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(judging.max_attempts));
        }

        let openai = &config.openai;
        if !(openai.requests_per_second >= MIN_REQUESTS_PER_SECOND && openai.requests_per_second.is_finite()) {
            return Err(ConfigError::InvalidRateLimit(openai.requests_per_second));
        }
        if openai.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(openai.burst_size));
        }
        if openai.initial_backoff_ms >= openai.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                openai.initial_backoff_ms,
                openai.max_backoff_ms,
            ));
        }

        Ok(())
    }
}
