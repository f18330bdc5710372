//! Configuration schema.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct DispatchConfig {
    /// Persistence settings
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageSettings,

    /// Circuit breaker defaults
    #[serde(default)]
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Health monitor settings
    #[serde(default)]
    #[validate(nested)]
    pub health: HealthSettings,

    /// Routing settings
    #[serde(default)]
    #[validate(nested)]
    pub routing: RoutingSettings,

    /// Logging settings
    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingSettings,
}

/// Where collections are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Keep everything in memory
    Memory,
    /// One JSON file per collection
    #[default]
    File,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StorageSettings {
    /// Backend kind
    #[serde(default)]
    pub backend: StorageBackend,

    /// Data directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Default circuit breaker parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CircuitBreakerSettings {
    /// Failures before a breaker opens
    #[serde(default = "default_failure_threshold")]
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Consecutive half-open successes before a breaker closes
    #[serde(default = "default_success_threshold")]
    #[validate(range(min = 1))]
    pub success_threshold: u32,

    /// Time a breaker stays open after the last failure
    #[serde(default = "default_breaker_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout: default_breaker_timeout(),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct HealthSettings {
    /// Run the periodic health monitor
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between health passes
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Scores below this put an endpoint into maintenance
    #[serde(default = "default_degraded_below")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub degraded_below: f64,

    /// Scores above this bring a maintenance endpoint back
    #[serde(default = "default_restored_above")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub restored_above: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_health_interval(),
            degraded_below: default_degraded_below(),
            restored_above: default_restored_above(),
        }
    }
}

/// Routing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RoutingSettings {
    /// Language that does not require the multilingual capability
    #[serde(default = "default_language")]
    #[validate(length(min = 1))]
    pub default_language: String,

    /// Routing decisions kept for reports
    #[serde(default = "default_history_limit")]
    #[validate(range(min = 1))]
    pub history_limit: usize,

    /// Per-subscriber event buffer
    #[serde(default = "default_event_capacity")]
    #[validate(range(min = 1))]
    pub event_capacity: usize,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            history_limit: default_history_limit(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LoggingSettings {
    /// Filter directive (e.g. "info", "dispatch_routing=debug")
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    3
}

fn default_breaker_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_degraded_below() -> f64 {
    70.0
}

fn default_restored_above() -> f64 {
    85.0
}

fn default_language() -> String {
    "en".to_string()
}

fn default_history_limit() -> usize {
    10_000
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
