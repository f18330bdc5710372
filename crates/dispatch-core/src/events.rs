//! Typed notifications published by the routing engine.
//!
//! The engine never calls into its observers directly; it publishes
//! [`RoutingEvent`]s on an [`EventBus`] and anything interested holds a
//! receiver obtained from [`EventBus::subscribe`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::AIModel;
use crate::result::RoutingResult;
use crate::rule::RoutingRule;

/// Engine notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingEvent {
    /// Endpoint registered
    ModelAdded {
        /// The new endpoint
        model: AIModel,
    },
    /// Endpoint changed administratively
    ModelUpdated {
        /// The endpoint after the update
        model: AIModel,
    },
    /// Endpoint removed
    ModelRemoved {
        /// The removed endpoint
        model: AIModel,
    },
    /// Rule registered
    RuleAdded {
        /// The new rule
        rule: RoutingRule,
    },
    /// Rule changed
    RuleUpdated {
        /// The rule after the update
        rule: RoutingRule,
    },
    /// Rule removed
    RuleRemoved {
        /// The removed rule
        rule: RoutingRule,
    },
    /// A breaker tripped
    CircuitBreakerOpened {
        /// Endpoint guarded by the breaker
        model_id: String,
        /// Failure count that tripped it
        failure_count: u32,
    },
    /// A breaker recovered
    CircuitBreakerClosed {
        /// Endpoint guarded by the breaker
        model_id: String,
        /// Consecutive successes that closed it
        success_count: u32,
    },
    /// A breaker started probing
    CircuitBreakerHalfOpened {
        /// Endpoint guarded by the breaker
        model_id: String,
        /// Milliseconds the breaker spent open
        open_for_ms: u64,
    },
    /// Health score fell below the degraded threshold
    ModelHealthDegraded {
        /// Affected endpoint
        model_id: String,
        /// Score that triggered the transition
        health_score: f64,
    },
    /// Health score recovered above the restore threshold
    ModelHealthRestored {
        /// Affected endpoint
        model_id: String,
        /// Score that triggered the transition
        health_score: f64,
    },
    /// The health probe could not reach the endpoint
    ModelHealthCheckFailed {
        /// Affected endpoint
        model_id: String,
        /// Probe error
        error: String,
    },
    /// A request was routed
    ConversationRouted {
        /// The decision
        result: Box<RoutingResult>,
        /// Region of the request
        region: String,
        /// Tier of the requester
        tier: String,
    },
    /// A request could not be routed
    RoutingError {
        /// Request that failed
        request_id: String,
        /// Stable error code
        code: String,
        /// Error message
        message: String,
    },
}

impl RoutingEvent {
    /// Get the event type as a string
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ModelAdded { .. } => "model_added",
            Self::ModelUpdated { .. } => "model_updated",
            Self::ModelRemoved { .. } => "model_removed",
            Self::RuleAdded { .. } => "rule_added",
            Self::RuleUpdated { .. } => "rule_updated",
            Self::RuleRemoved { .. } => "rule_removed",
            Self::CircuitBreakerOpened { .. } => "circuit_breaker_opened",
            Self::CircuitBreakerClosed { .. } => "circuit_breaker_closed",
            Self::CircuitBreakerHalfOpened { .. } => "circuit_breaker_half_opened",
            Self::ModelHealthDegraded { .. } => "model_health_degraded",
            Self::ModelHealthRestored { .. } => "model_health_restored",
            Self::ModelHealthCheckFailed { .. } => "model_health_check_failed",
            Self::ConversationRouted { .. } => "conversation_routed",
            Self::RoutingError { .. } => "routing_error",
        }
    }
}

/// Broadcast channel for [`RoutingEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RoutingEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RoutingEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: RoutingEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
