//! # Dispatch Core
//!
//! Core types, events and error handling for the model dispatch engine.
//!
//! This crate provides the foundational types used throughout the workspace:
//! - Endpoint (`AIModel`) and routing rule definitions
//! - Conversation requests and routing results
//! - Aggregate routing metrics
//! - Typed events and the event bus
//! - The key-value storage contract and the clock abstraction

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod events;
pub mod metrics;
pub mod model;
pub mod request;
pub mod result;
pub mod rule;
pub mod storage;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DispatchError, DispatchResult};
pub use events::{EventBus, RoutingEvent};
pub use metrics::RoutingMetrics;
pub use model::{AIModel, Capability, ModelStats, ModelStatus, ModelUpdate};
pub use request::{
    Complexity, ContentType, ConversationRequest, RequestContext, RequestPriority,
    RequestRequirements,
};
pub use result::{LoadBalancingInfo, RoutingResult};
pub use rule::{
    ConditionOperator, FailoverStrategy, LoadBalancingStrategy, RoutingCondition, RoutingRule,
    RuleUpdate, RuleUsage,
};
pub use storage::{FileStore, MemoryStore, Storage};
