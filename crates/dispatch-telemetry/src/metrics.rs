//! Prometheus export of routing activity.
//!
//! [`RoutingMetricsExporter`] turns [`RoutingEvent`]s into counters and
//! gauges. Feed it from the router's event bus with
//! [`spawn`](RoutingMetricsExporter::spawn) and serve
//! [`render`](RoutingMetricsExporter::render) from any scrape endpoint.

use dispatch_core::RoutingEvent;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus metrics of the routing engine
pub struct RoutingMetricsExporter {
    registry: Registry,
    routes: IntCounterVec,
    routing_errors: IntCounterVec,
    breaker_transitions: IntCounterVec,
    health_score: GaugeVec,
}

impl fmt::Debug for RoutingMetricsExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingMetricsExporter")
            .field("families", &self.registry.gather().len())
            .finish_non_exhaustive()
    }
}

impl RoutingMetricsExporter {
    /// Create an exporter with its own registry
    pub fn new() -> TelemetryResult<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create an exporter registering into an existing registry
    pub fn with_registry(registry: Registry) -> TelemetryResult<Self> {
        let routes = IntCounterVec::new(
            Opts::new("dispatch_routes_total", "Conversations routed"),
            &["model", "region", "tier"],
        )?;
        let routing_errors = IntCounterVec::new(
            Opts::new("dispatch_routing_errors_total", "Routing attempts that failed"),
            &["code"],
        )?;
        let breaker_transitions = IntCounterVec::new(
            Opts::new(
                "dispatch_circuit_breaker_transitions_total",
                "Circuit breaker state transitions",
            ),
            &["model", "state"],
        )?;
        let health_score = GaugeVec::new(
            Opts::new("dispatch_model_health_score", "Last known model health score"),
            &["model"],
        )?;

        registry.register(Box::new(routes.clone()))?;
        registry.register(Box::new(routing_errors.clone()))?;
        registry.register(Box::new(breaker_transitions.clone()))?;
        registry.register(Box::new(health_score.clone()))?;

        Ok(Self {
            registry,
            routes,
            routing_errors,
            breaker_transitions,
            health_score,
        })
    }

    /// The underlying registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Update metrics from one event
    pub fn observe(&self, event: &RoutingEvent) {
        match event {
            RoutingEvent::ConversationRouted {
                result,
                region,
                tier,
            } => {
                self.routes
                    .with_label_values(&[result.model_id(), region.as_str(), tier.as_str()])
                    .inc();
                self.health_score
                    .with_label_values(&[result.model_id()])
                    .set(result.selected_model.stats.health_score);
            }
            RoutingEvent::RoutingError { code, .. } => {
                self.routing_errors.with_label_values(&[code.as_str()]).inc();
            }
            RoutingEvent::CircuitBreakerOpened { model_id, .. } => {
                self.count_transition(model_id, "open");
            }
            RoutingEvent::CircuitBreakerHalfOpened { model_id, .. } => {
                self.count_transition(model_id, "half_open");
            }
            RoutingEvent::CircuitBreakerClosed { model_id, .. } => {
                self.count_transition(model_id, "closed");
            }
            RoutingEvent::ModelHealthDegraded {
                model_id,
                health_score,
            }
            | RoutingEvent::ModelHealthRestored {
                model_id,
                health_score,
            } => {
                self.health_score
                    .with_label_values(&[model_id.as_str()])
                    .set(*health_score);
            }
            RoutingEvent::ModelHealthCheckFailed { model_id, .. } => {
                self.health_score
                    .with_label_values(&[model_id.as_str()])
                    .set(0.0);
            }
            RoutingEvent::ModelAdded { model } | RoutingEvent::ModelUpdated { model } => {
                self.health_score
                    .with_label_values(&[model.id.as_str()])
                    .set(model.stats.health_score);
            }
            RoutingEvent::ModelRemoved { model } => {
                let _ = self.health_score.remove_label_values(&[model.id.as_str()]);
            }
            RoutingEvent::RuleAdded { .. }
            | RoutingEvent::RuleUpdated { .. }
            | RoutingEvent::RuleRemoved { .. } => {}
        }
    }

    fn count_transition(&self, model_id: &str, state: &str) {
        self.breaker_transitions
            .with_label_values(&[model_id, state])
            .inc();
    }

    /// Consume events from a subscription until the bus closes
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<RoutingEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.observe(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Metrics exporter lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed, metrics exporter stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encode(e.to_string()))
    }
}
