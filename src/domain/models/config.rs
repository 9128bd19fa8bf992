//! Configuration tree for the coordination core.
//!
//! Numeric thresholds here (quorum, cooldowns, backoff) are configuration
//! defaults, not fixed contracts.

use serde::{Deserialize, Serialize};

/// Main configuration structure for Adjutant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Trigger engine configuration
    #[serde(default)]
    pub triggers: TriggerConfig,

    /// Consensus configuration
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Execution monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            triggers: TriggerConfig::default(),
            consensus: ConsensusConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Maximum in-flight invocations per agent type (1-100)
    #[serde(default = "default_max_in_flight_per_agent")]
    pub max_in_flight_per_agent: usize,

    /// Default retry cap for submitted tasks
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// First retry backoff delay in seconds; doubles per attempt
    #[serde(default = "default_retry_backoff_base_secs")]
    pub retry_backoff_base_secs: u64,

    /// Upper bound on a single backoff delay in seconds
    #[serde(default = "default_retry_backoff_cap_secs")]
    pub retry_backoff_cap_secs: u64,
}

const fn default_max_in_flight_per_agent() -> usize {
    2
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_backoff_base_secs() -> u64 {
    30
}

const fn default_retry_backoff_cap_secs() -> u64 {
    1800
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_agent: default_max_in_flight_per_agent(),
            default_max_retries: default_max_retries(),
            retry_backoff_base_secs: default_retry_backoff_base_secs(),
            retry_backoff_cap_secs: default_retry_backoff_cap_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Exponential backoff delay for the given (pre-increment) retry count.
    pub fn backoff_delay(&self, retry_count: u32) -> std::time::Duration {
        let exp = retry_count.min(16);
        let secs = self
            .retry_backoff_base_secs
            .saturating_mul(1u64 << exp)
            .min(self.retry_backoff_cap_secs);
        std::time::Duration::from_secs(secs)
    }
}

/// Trigger engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerConfig {
    /// Cooldown applied to triggers registered without one, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,

    /// Evaluation-log entries retained per campaign
    #[serde(default = "default_evaluation_log_size")]
    pub evaluation_log_size: usize,
}

const fn default_cooldown_secs() -> u64 {
    900
}

const fn default_evaluation_log_size() -> usize {
    256
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            default_cooldown_secs: default_cooldown_secs(),
            evaluation_log_size: default_evaluation_log_size(),
        }
    }
}

/// Consensus configuration for the planning mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsensusConfig {
    /// Minimum consensus score required to accept a plan
    #[serde(default = "default_quorum_threshold")]
    pub quorum_threshold: f64,

    /// Decomposition attempts before a plan fails (second is relaxed)
    #[serde(default = "default_max_decomposition_attempts")]
    pub max_decomposition_attempts: u32,

    /// Per-request processing estimate used for queue receipts, in seconds
    #[serde(default = "default_processing_estimate_secs")]
    pub processing_estimate_secs: u64,
}

fn default_quorum_threshold() -> f64 {
    0.6
}

const fn default_max_decomposition_attempts() -> u32 {
    2
}

const fn default_processing_estimate_secs() -> u64 {
    5
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            quorum_threshold: default_quorum_threshold(),
            max_decomposition_attempts: default_max_decomposition_attempts(),
            processing_estimate_secs: default_processing_estimate_secs(),
        }
    }
}

/// Execution monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// How long a blocker may persist before it escalates into a
    /// replanning request, in seconds
    #[serde(default = "default_blocker_escalation_secs")]
    pub blocker_escalation_secs: u64,
}

const fn default_blocker_escalation_secs() -> u64 {
    300
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            blocker_escalation_secs: default_blocker_escalation_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.scheduler.max_in_flight_per_agent, 2);
        assert_eq!(config.scheduler.default_max_retries, 3);
        assert!((config.consensus.quorum_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.triggers.default_cooldown_secs, 900);
        assert_eq!(config.monitor.blocker_escalation_secs, 300);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = SchedulerConfig::default();
        assert_eq!(config.backoff_delay(0).as_secs(), 30);
        assert_eq!(config.backoff_delay(1).as_secs(), 60);
        assert_eq!(config.backoff_delay(2).as_secs(), 120);
        // Large retry counts hit the cap instead of overflowing.
        assert_eq!(config.backoff_delay(30).as_secs(), 1800);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"scheduler": {"max_in_flight_per_agent": 5}}"#).unwrap();
        assert_eq!(config.scheduler.max_in_flight_per_agent, 5);
        assert_eq!(config.scheduler.default_max_retries, 3);
        assert!((config.consensus.quorum_threshold - 0.6).abs() < f64::EPSILON);
    }
}
