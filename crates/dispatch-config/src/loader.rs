//! Loading configuration from files and the environment.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use validator::Validate;

use crate::config::{DispatchConfig, LogFormat, StorageBackend};
use crate::error::{ConfigError, ConfigResult};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "DISPATCH_";

/// Load configuration.
///
/// Reads `path` when given (YAML, TOML or JSON by extension), otherwise
/// starts from defaults. Environment overrides are applied afterwards and
/// the result is validated.
pub fn load_config(path: Option<&Path>) -> ConfigResult<DispatchConfig> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let config = parse_config(&content, format_of(path)?)?;
            info!(path = %path.display(), "Configuration file loaded");
            config
        }
        None => {
            debug!("No configuration file given, using defaults");
            DispatchConfig::default()
        }
    };

    apply_env_overrides(&mut config, std::env::vars())?;
    validate(&config)?;
    Ok(config)
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

fn format_of(path: &Path) -> ConfigResult<ConfigFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "yaml" | "yml" => Ok(ConfigFormat::Yaml),
        "toml" => Ok(ConfigFormat::Toml),
        "json" => Ok(ConfigFormat::Json),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Parse configuration text in the given format
pub fn parse_config(content: &str, format: ConfigFormat) -> ConfigResult<DispatchConfig> {
    match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }
}

/// Apply `DISPATCH_*` overrides from a list of environment variables
pub fn apply_env_overrides<I>(config: &mut DispatchConfig, vars: I) -> ConfigResult<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        match name {
            "LOG_LEVEL" => config.logging.level = value,
            "LOG_FORMAT" => {
                config.logging.format = match value.to_ascii_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" | "text" => LogFormat::Pretty,
                    _ => return Err(env_error(&key, "expected 'json' or 'pretty'")),
                };
            }
            "DATA_DIR" => {
                config.storage.backend = StorageBackend::File;
                config.storage.data_dir = PathBuf::from(value);
            }
            "STORAGE" => {
                config.storage.backend = match value.to_ascii_lowercase().as_str() {
                    "memory" => StorageBackend::Memory,
                    "file" => StorageBackend::File,
                    _ => return Err(env_error(&key, "expected 'memory' or 'file'")),
                };
            }
            "HEALTH_INTERVAL" => {
                config.health.interval = humantime::parse_duration(&value)
                    .map_err(|e| env_error(&key, &e.to_string()))?;
            }
            "BREAKER_TIMEOUT" => {
                config.circuit_breaker.timeout = humantime::parse_duration(&value)
                    .map_err(|e| env_error(&key, &e.to_string()))?;
            }
            "FAILURE_THRESHOLD" => {
                config.circuit_breaker.failure_threshold = value
                    .parse()
                    .map_err(|_| env_error(&key, "expected a positive integer"))?;
            }
            _ => debug!(var = %key, "Ignoring unknown environment override"),
        }
    }
    Ok(())
}

fn env_error(var: &str, message: &str) -> ConfigError {
    ConfigError::Environment {
        var: var.to_string(),
        message: message.to_string(),
    }
}

fn validate(config: &DispatchConfig) -> ConfigResult<()> {
    config.validate()?;
    if config.health.restored_above < config.health.degraded_below {
        return Err(ConfigError::Parse(format!(
            "health.restored_above ({}) must not be below health.degraded_below ({})",
            config.health.restored_above, config.health.degraded_below
        )));
    }
    Ok(())
}
