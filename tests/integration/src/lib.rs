//! Integration tests for model dispatch
//!
//! This crate exercises the routing engine end to end:
//! - Rule matching, filtering and strategy selection
//! - Circuit breaker lifecycle driven by a manual clock
//! - Health passes and the maintenance scheduler
//! - Persistence across restarts and routing reports
//! - Configuration files driving the router

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod resilience_tests;
#[cfg(test)]
mod routing_tests;
