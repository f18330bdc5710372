//! Router configuration.

use dispatch_resilience::CircuitBreakerConfig;

/// Runtime configuration of a [`ConversationRouter`](crate::ConversationRouter)
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Language that needs no multilingual capability
    pub default_language: String,
    /// Active endpoints scoring below this go to maintenance
    pub degraded_below: f64,
    /// Endpoints in maintenance scoring above this become active again
    pub restored_above: f64,
    /// Routing records kept for reports
    pub history_limit: usize,
    /// Event bus buffer size
    pub event_capacity: usize,
    /// Default breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,
    /// Run the breaker timeout check before every routing decision
    pub check_breakers_on_route: bool,
    /// Maximum number of alternatives in a result
    pub max_alternatives: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            degraded_below: 70.0,
            restored_above: 85.0,
            history_limit: 10_000,
            event_capacity: 1024,
            circuit_breaker: CircuitBreakerConfig::default(),
            check_breakers_on_route: true,
            max_alternatives: 3,
        }
    }
}

impl RouterConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default language
    #[must_use]
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Set the health thresholds
    #[must_use]
    pub fn with_health_thresholds(mut self, degraded_below: f64, restored_above: f64) -> Self {
        self.degraded_below = degraded_below;
        self.restored_above = restored_above.max(degraded_below);
        self
    }

    /// Set the routing history bound
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the event bus buffer size
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the default breaker configuration
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Enable or disable the breaker timeout check on each routing call
    #[must_use]
    pub fn with_breaker_check_on_route(mut self, enabled: bool) -> Self {
        self.check_breakers_on_route = enabled;
        self
    }

    /// Set the number of alternatives returned with each decision
    #[must_use]
    pub fn with_max_alternatives(mut self, max: usize) -> Self {
        self.max_alternatives = max;
        self
    }
}
