use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::CoordinatorConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_in_flight_per_agent: {0}. Must be between 1 and 100")]
    InvalidMaxInFlight(usize),

    #[error("Invalid quorum_threshold: {0}. Must be within (0, 1]")]
    InvalidQuorum(f64),

    #[error("Invalid max_decomposition_attempts: {0}. Cannot be 0")]
    InvalidDecompositionAttempts(u32),

    #[error(
        "Invalid backoff configuration: retry_backoff_base_secs ({0}) must not exceed retry_backoff_cap_secs ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid default_cooldown_secs: {0}. Must be positive")]
    InvalidCooldown(u64),

    #[error("Invalid blocker_escalation_secs: {0}. Must be positive")]
    InvalidEscalation(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .adjutant/config.yaml (project config)
    /// 3. .adjutant/local.yaml (project local overrides, optional)
    /// 4. Environment variables (ADJUTANT_* prefix, highest priority)
    pub fn load() -> Result<CoordinatorConfig> {
        let config: CoordinatorConfig = Figment::new()
            .merge(Serialized::defaults(CoordinatorConfig::default()))
            .merge(Yaml::file(".adjutant/config.yaml"))
            .merge(Yaml::file(".adjutant/local.yaml"))
            .merge(Env::prefixed("ADJUTANT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CoordinatorConfig> {
        let config: CoordinatorConfig = Figment::new()
            .merge(Serialized::defaults(CoordinatorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &CoordinatorConfig) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;
        if scheduler.max_in_flight_per_agent == 0 || scheduler.max_in_flight_per_agent > 100 {
            return Err(ConfigError::InvalidMaxInFlight(
                scheduler.max_in_flight_per_agent,
            ));
        }
        if scheduler.retry_backoff_base_secs > scheduler.retry_backoff_cap_secs {
            return Err(ConfigError::InvalidBackoff(
                scheduler.retry_backoff_base_secs,
                scheduler.retry_backoff_cap_secs,
            ));
        }

        let consensus = &config.consensus;
        if consensus.quorum_threshold <= 0.0 || consensus.quorum_threshold > 1.0 {
            return Err(ConfigError::InvalidQuorum(consensus.quorum_threshold));
        }
        if consensus.max_decomposition_attempts == 0 {
            return Err(ConfigError::InvalidDecompositionAttempts(
                consensus.max_decomposition_attempts,
            ));
        }

        if config.triggers.default_cooldown_secs == 0 {
            return Err(ConfigError::InvalidCooldown(
                config.triggers.default_cooldown_secs,
            ));
        }
        if config.monitor.blocker_escalation_secs == 0 {
            return Err(ConfigError::InvalidEscalation(
                config.monitor.blocker_escalation_secs,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
