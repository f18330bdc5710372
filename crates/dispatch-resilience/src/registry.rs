//! Registry holding one circuit breaker per endpoint.

use dashmap::DashMap;
use std::sync::Arc;

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState, CircuitTransition,
};

/// Circuit breakers keyed by endpoint id.
///
/// Breakers are created lazily with the registry's default configuration
/// unless one was set for the endpoint through [`configure`](Self::configure).
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: DashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: DashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Use a specific configuration for one endpoint.
    ///
    /// Replaces any existing breaker for the endpoint with a fresh closed one.
    pub fn configure(&self, model_id: &str, config: CircuitBreakerConfig) {
        self.overrides.insert(model_id.to_string(), config.clone());
        self.breakers
            .insert(model_id.to_string(), Arc::new(CircuitBreaker::new(model_id, config)));
    }

    /// Get the breaker for an endpoint, creating it if needed
    pub fn breaker(&self, model_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(model_id) {
            return Arc::clone(existing.value());
        }
        let config = self
            .overrides
            .get(model_id)
            .map_or_else(|| self.default_config.clone(), |c| c.value().clone());
        Arc::clone(
            self.breakers
                .entry(model_id.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(model_id, config)))
                .value(),
        )
    }

    /// State of an endpoint's breaker; endpoints never seen are closed
    #[must_use]
    pub fn state(&self, model_id: &str) -> CircuitState {
        self.breakers
            .get(model_id)
            .map_or(CircuitState::Closed, |b| b.state())
    }

    /// Whether an endpoint is currently excluded by its breaker
    #[must_use]
    pub fn is_open(&self, model_id: &str) -> bool {
        self.state(model_id) == CircuitState::Open
    }

    /// Record a failure against an endpoint
    pub fn record_failure(&self, model_id: &str, now_ms: u64) -> Option<CircuitTransition> {
        self.breaker(model_id).record_failure(now_ms)
    }

    /// Record a success against an endpoint
    pub fn record_success(&self, model_id: &str) -> Option<CircuitTransition> {
        self.breaker(model_id).record_success()
    }

    /// Run the timeout check over every breaker
    pub fn check_timeouts(&self, now_ms: u64) -> Vec<(String, CircuitTransition)> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| Arc::clone(e.value())).collect();

        breakers
            .into_iter()
            .filter_map(|b| {
                b.check_timeout(now_ms)
                    .map(|t| (b.model_id().to_string(), t))
            })
            .collect()
    }

    /// Drop the breaker and configuration of a removed endpoint
    pub fn remove(&self, model_id: &str) {
        self.breakers.remove(model_id);
        self.overrides.remove(model_id);
    }

    /// Snapshots of all breakers, sorted by endpoint id
    #[must_use]
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots: Vec<CircuitBreakerSnapshot> =
            self.breakers.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        snapshots
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
