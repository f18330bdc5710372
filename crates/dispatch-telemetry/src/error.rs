//! Telemetry errors.

/// Result alias for telemetry setup
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Telemetry initialization error
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to install the global subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),

    /// A metric could not be created or registered
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Encoded metrics were not valid UTF-8
    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}
