//! # Dispatch Telemetry
//!
//! Observability for the model dispatch engine:
//! - Structured logging setup (`tracing` + `tracing-subscriber`)
//! - Prometheus metrics fed from the routing event bus

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LoggingConfig};
pub use metrics::RoutingMetricsExporter;
