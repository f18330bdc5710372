//! # Dispatch Resilience
//!
//! Failure detection for model endpoints:
//! - One circuit breaker per endpoint
//! - Closed / open / half-open state machine driven by recorded outcomes
//!   and a periodic timeout check
//! - A registry keyed by endpoint id

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod registry;

// Re-export main types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState, CircuitTransition,
};
pub use registry::CircuitBreakerRegistry;
