//! # Dispatch Config
//!
//! Configuration management for the model dispatch engine.
//!
//! Configuration is read from a YAML or TOML file (chosen by extension),
//! then overridden from `DISPATCH_*` environment variables, then validated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    CircuitBreakerSettings, DispatchConfig, HealthSettings, LogFormat, LoggingSettings,
    RoutingSettings, StorageBackend, StorageSettings,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env_overrides, load_config, parse_config, ConfigFormat, ENV_PREFIX};
