//! # Dispatch Routing
//!
//! Conversation routing and load balancing across registered model endpoints.
//!
//! This crate provides:
//! - Endpoint and rule registries
//! - Rule matching over the request context
//! - Candidate filtering against hard requirements and circuit breakers
//! - Five load balancing strategies
//! - Periodic health scoring with automatic maintenance transitions
//! - Aggregate metrics, routing history and reports
//! - The [`ConversationRouter`] facade and its maintenance scheduler

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod filter;
pub mod health;
pub mod load_balancer;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod router;
pub mod rules;
pub mod scheduler;
pub mod scoring;

// Re-export main types
pub use config::RouterConfig;
pub use filter::{CandidateFilter, Rejection};
pub use health::{compute_health_score, HealthMonitor, HealthOutcome, HealthProbe, StaticProbe};
pub use load_balancer::{LoadBalancer, LoadBalancerGroup, Selection};
pub use metrics::{MetricsRecorder, RoutingRecord};
pub use registry::ModelRegistry;
pub use report::{ModelHealthSummary, RoutingReport};
pub use router::{ConversationRouter, ConversationRouterBuilder};
pub use rules::{evaluate_condition, RuleRegistry};
pub use scheduler::{MaintenanceScheduler, SchedulerConfig};
