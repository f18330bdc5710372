//! The routing facade.
//!
//! [`ConversationRouter`] composes the registries, the filter, the load
//! balancer, the breakers, the health monitor and the metrics recorder.
//! Every mutation is written through to [`Storage`]; a failed write is
//! logged and the in-memory state stays authoritative.

use chrono::{DateTime, Utc};
use dispatch_core::{
    AIModel, Clock, ConversationRequest, DispatchError, DispatchResult, EventBus,
    FailoverStrategy, LoadBalancingInfo, LoadBalancingStrategy, MemoryStore, ModelUpdate,
    RoutingEvent, RoutingMetrics, RoutingResult, RoutingRule, RuleUpdate, Storage, SystemClock,
};
use dispatch_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState,
    CircuitTransition,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::RouterConfig;
use crate::filter::CandidateFilter;
use crate::health::{HealthMonitor, HealthOutcome, HealthProbe, StaticProbe};
use crate::load_balancer::{LoadBalancer, LoadBalancerGroup};
use crate::metrics::{MetricsRecorder, RoutingRecord};
use crate::registry::ModelRegistry;
use crate::report::RoutingReport;
use crate::rules::RuleRegistry;
use crate::scoring;

/// Storage key of the endpoint collection
pub const MODELS_KEY: &str = "models";
/// Storage key of the rule collection
pub const RULES_KEY: &str = "rules";
/// Storage key of the metrics aggregate
pub const METRICS_KEY: &str = "metrics";
/// Storage key of the bounded routing history
pub const HISTORY_KEY: &str = "history";

/// Builder for [`ConversationRouter`]
#[derive(Debug, Default)]
pub struct ConversationRouterBuilder {
    config: RouterConfig,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
    probe: Option<Arc<dyn HealthProbe>>,
    events: Option<EventBus>,
}

impl ConversationRouterBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the storage backend (default: in memory)
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the clock (default: system clock)
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the health probe (default: [`StaticProbe`])
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Share an existing event bus
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the router, loading any persisted state
    #[must_use]
    pub fn build(self) -> ConversationRouter {
        let config = self.config;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let probe = self.probe.unwrap_or_else(|| Arc::new(StaticProbe));
        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.event_capacity));

        let router = ConversationRouter {
            models: ModelRegistry::new(),
            rules: RuleRegistry::new(),
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            balancer: LoadBalancer::new(),
            metrics: MetricsRecorder::new(config.history_limit),
            health: HealthMonitor::new(probe, config.degraded_below, config.restored_above),
            events,
            storage,
            clock,
            config,
        };
        router.load_state();
        router
    }
}

/// Entry point of the routing engine
#[derive(Debug)]
pub struct ConversationRouter {
    config: RouterConfig,
    models: ModelRegistry,
    rules: RuleRegistry,
    breakers: CircuitBreakerRegistry,
    balancer: LoadBalancer,
    metrics: MetricsRecorder,
    health: HealthMonitor,
    events: EventBus,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl ConversationRouter {
    /// Start building a router
    #[must_use]
    pub fn builder() -> ConversationRouterBuilder {
        ConversationRouterBuilder::default()
    }

    /// Router configuration
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Subscribe to engine events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RoutingEvent> {
        self.events.subscribe()
    }

    /// The event bus the router publishes on
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ---------------------------------------------------------------------
    // Routing
    // ---------------------------------------------------------------------

    /// Choose an endpoint for a request.
    ///
    /// The highest-priority matching rule supplies the candidates and the
    /// strategy; without a match every active endpoint is a candidate and
    /// round robin is used. Fails with
    /// [`DispatchError::NoEligibleCandidate`] when filtering leaves nothing.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub fn route_conversation(&self, request: &ConversationRequest) -> DispatchResult<RoutingResult> {
        if self.config.check_breakers_on_route {
            self.check_circuit_breaker_timeout();
        }
        let now = self.clock.now();

        let rule = self.rules.find_matching_rules(request).into_iter().next();
        let (pool, strategy, failover) = match &rule {
            Some(rule) => {
                debug!(rule_id = %rule.id, priority = rule.priority, "Routing rule matched");
                (
                    self.models.resolve(&rule.target_models),
                    rule.load_balancing,
                    rule.failover,
                )
            }
            None => (
                self.models.active(),
                LoadBalancingStrategy::RoundRobin,
                FailoverStrategy::default(),
            ),
        };

        let filter = CandidateFilter::new(&self.breakers);
        let candidates = filter.filter(pool.clone(), request);

        let Some(selection) = self.balancer.select(strategy, &candidates, request, now) else {
            let error =
                DispatchError::no_eligible_candidate(&request.id, filter.explain(&pool, request));
            return Err(self.routing_failed(request, rule.as_ref(), error, now));
        };

        let chosen = &candidates[selection.index];
        let selected = self
            .models
            .with_model(&chosen.id, |model| {
                model.stats.total_requests += 1;
                let n = model.stats.total_requests as f64;
                model.stats.success_rate = model.stats.success_rate.mul_add(n - 1.0, 1.0) / n;
                model.clone()
            })
            .unwrap_or_else(|| chosen.clone());

        let alternatives: Vec<AIModel> = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != selection.index)
            .map(|(_, m)| m.clone())
            .take(self.config.max_alternatives)
            .collect();

        let result = RoutingResult {
            request_id: request.id.clone(),
            rule_id: rule.as_ref().map(|r| r.id.clone()),
            reason: describe(rule.as_ref(), strategy, &selected, candidates.len()),
            confidence: scoring::confidence(&selected, request, &self.config.default_language),
            estimated_cost: scoring::estimated_cost(&selected, request),
            estimated_latency: scoring::estimated_latency(&selected, request),
            load_balancing: LoadBalancingInfo {
                strategy,
                weight: selection.weight,
                current_load: selected.stats.current_load,
                failover,
                group: selection.group,
            },
            alternatives,
            selected_model: selected,
            timestamp: now,
        };

        self.metrics.record_route(&result, request);
        if let Some(rule) = &rule {
            self.rules.record_usage(&rule.id, true, now);
            self.persist_rules();
        }
        self.persist_models();
        self.persist_metrics();
        self.persist_history();

        info!(
            model_id = %result.model_id(),
            strategy = %strategy,
            confidence = result.confidence,
            estimated_latency = result.estimated_latency,
            "Conversation routed"
        );
        self.events.publish(RoutingEvent::ConversationRouted {
            result: Box::new(result.clone()),
            region: request.context.region.clone(),
            tier: request.context.user_tier.clone(),
        });
        Ok(result)
    }

    fn routing_failed(
        &self,
        request: &ConversationRequest,
        rule: Option<&RoutingRule>,
        error: DispatchError,
        at: DateTime<Utc>,
    ) -> DispatchError {
        warn!(error = %error, "Routing failed");
        self.metrics
            .record_error(request, rule.map(|r| r.id.as_str()), &error, at);
        if let Some(rule) = rule {
            self.rules.record_usage(&rule.id, false, at);
            self.persist_rules();
        }
        self.persist_metrics();
        self.persist_history();
        self.events.publish(RoutingEvent::RoutingError {
            request_id: request.id.clone(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        });
        error
    }

    // ---------------------------------------------------------------------
    // Endpoints
    // ---------------------------------------------------------------------

    /// Register an endpoint
    pub fn add_model(&self, model: AIModel) -> DispatchResult<AIModel> {
        let model = self.models.insert(model)?;
        info!(model_id = %model.id, provider = %model.provider, "Model added");
        self.persist_models();
        self.events.publish(RoutingEvent::ModelAdded {
            model: model.clone(),
        });
        Ok(model)
    }

    /// Update an endpoint's description
    pub fn update_model(&self, model_id: &str, update: ModelUpdate) -> DispatchResult<AIModel> {
        let model = self.models.update(model_id, update, self.clock.now())?;
        info!(model_id = %model.id, status = %model.status, "Model updated");
        self.persist_models();
        self.events.publish(RoutingEvent::ModelUpdated {
            model: model.clone(),
        });
        Ok(model)
    }

    /// Remove an endpoint together with its breaker and balancing state
    pub fn remove_model(&self, model_id: &str) -> DispatchResult<AIModel> {
        let model = self.models.remove(model_id)?;
        self.breakers.remove(model_id);
        self.balancer.forget_model(model_id);
        info!(model_id = %model.id, "Model removed");
        self.persist_models();
        self.events.publish(RoutingEvent::ModelRemoved {
            model: model.clone(),
        });
        Ok(model)
    }

    /// Copies of every endpoint, in registration order
    #[must_use]
    pub fn get_models(&self) -> Vec<AIModel> {
        self.models.snapshot()
    }

    /// Copy of one endpoint
    #[must_use]
    pub fn get_model(&self, model_id: &str) -> Option<AIModel> {
        self.models.get(model_id)
    }

    /// Record an observed response time, folded into the running average
    pub fn record_response(&self, model_id: &str, latency: Duration) -> DispatchResult<()> {
        let sample = latency.as_secs_f64() * 1000.0;
        self.models
            .with_model(model_id, |model| {
                let n = model.stats.total_requests.max(1) as f64;
                let average = model.stats.average_response_time;
                model.stats.average_response_time = average.mul_add(n - 1.0, sample) / n;
            })
            .ok_or_else(|| DispatchError::ModelNotFound(model_id.to_string()))?;
        self.persist_models();
        Ok(())
    }

    /// Set an endpoint's current load, clamped to 0-100
    pub fn report_load(&self, model_id: &str, load: f64) -> DispatchResult<()> {
        if !load.is_finite() {
            return Err(DispatchError::validation_field(
                "load must be a finite number",
                "currentLoad",
            ));
        }
        self.models
            .with_model(model_id, |model| {
                model.stats.current_load = load.clamp(0.0, 100.0);
            })
            .ok_or_else(|| DispatchError::ModelNotFound(model_id.to_string()))?;
        self.persist_models();
        Ok(())
    }

    /// Override the weight used by weighted selection
    pub fn set_model_weight(&self, model_id: &str, weight: f64) -> DispatchResult<()> {
        if !self.models.contains(model_id) {
            return Err(DispatchError::ModelNotFound(model_id.to_string()));
        }
        if !weight.is_finite() {
            return Err(DispatchError::validation_field(
                "weight must be a finite number",
                "weight",
            ));
        }
        self.balancer.set_weight(model_id, weight);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Rules
    // ---------------------------------------------------------------------

    /// Register a rule
    pub fn add_rule(&self, rule: RoutingRule) -> DispatchResult<RoutingRule> {
        let rule = self.rules.insert(rule)?;
        self.warn_unknown_targets(&rule);
        info!(rule_id = %rule.id, priority = rule.priority, "Routing rule added");
        self.persist_rules();
        self.events.publish(RoutingEvent::RuleAdded { rule: rule.clone() });
        Ok(rule)
    }

    /// Update a rule
    pub fn update_rule(&self, rule_id: &str, update: RuleUpdate) -> DispatchResult<RoutingRule> {
        let rule = self.rules.update(rule_id, update, self.clock.now())?;
        self.warn_unknown_targets(&rule);
        info!(rule_id = %rule.id, "Routing rule updated");
        self.persist_rules();
        self.events.publish(RoutingEvent::RuleUpdated { rule: rule.clone() });
        Ok(rule)
    }

    /// Remove a rule
    pub fn remove_rule(&self, rule_id: &str) -> DispatchResult<RoutingRule> {
        let rule = self.rules.remove(rule_id)?;
        info!(rule_id = %rule.id, "Routing rule removed");
        self.persist_rules();
        self.events.publish(RoutingEvent::RuleRemoved { rule: rule.clone() });
        Ok(rule)
    }

    /// Copies of every rule, in priority order
    #[must_use]
    pub fn get_rules(&self) -> Vec<RoutingRule> {
        self.rules.snapshot()
    }

    /// Every active rule matching a request, in priority order
    #[must_use]
    pub fn find_matching_rules(&self, request: &ConversationRequest) -> Vec<RoutingRule> {
        self.rules.find_matching_rules(request)
    }

    fn warn_unknown_targets(&self, rule: &RoutingRule) {
        for target in &rule.target_models {
            if !self.models.contains(target) {
                warn!(rule_id = %rule.id, model_id = %target, "Rule targets an unknown model");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Circuit breakers
    // ---------------------------------------------------------------------

    /// Report a failed call to an endpoint
    pub fn record_model_failure(&self, model_id: &str) -> DispatchResult<CircuitState> {
        if !self.models.contains(model_id) {
            return Err(DispatchError::ModelNotFound(model_id.to_string()));
        }
        if let Some(transition) = self
            .breakers
            .record_failure(model_id, self.clock.now_millis())
        {
            self.on_transition(model_id, transition);
        }
        Ok(self.breakers.state(model_id))
    }

    /// Report a successful call to an endpoint
    pub fn record_model_success(&self, model_id: &str) -> DispatchResult<CircuitState> {
        if !self.models.contains(model_id) {
            return Err(DispatchError::ModelNotFound(model_id.to_string()));
        }
        if let Some(transition) = self.breakers.record_success(model_id) {
            self.on_transition(model_id, transition);
        }
        Ok(self.breakers.state(model_id))
    }

    /// Move open breakers whose timeout elapsed to half-open.
    ///
    /// Returns the ids of the endpoints that changed state.
    pub fn check_circuit_breaker_timeout(&self) -> Vec<String> {
        self.breakers
            .check_timeouts(self.clock.now_millis())
            .into_iter()
            .map(|(model_id, transition)| {
                self.on_transition(&model_id, transition);
                model_id
            })
            .collect()
    }

    /// Use a specific breaker configuration for one endpoint
    pub fn configure_circuit_breaker(
        &self,
        model_id: &str,
        config: CircuitBreakerConfig,
    ) -> DispatchResult<()> {
        if !self.models.contains(model_id) {
            return Err(DispatchError::ModelNotFound(model_id.to_string()));
        }
        self.breakers.configure(model_id, config);
        Ok(())
    }

    /// State of an endpoint's breaker
    #[must_use]
    pub fn circuit_state(&self, model_id: &str) -> CircuitState {
        self.breakers.state(model_id)
    }

    /// Snapshots of every breaker
    #[must_use]
    pub fn circuit_breakers(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.snapshots()
    }

    fn on_transition(&self, model_id: &str, transition: CircuitTransition) {
        let model_id = model_id.to_string();
        let event = match transition {
            CircuitTransition::Opened { failure_count } => {
                self.metrics.record_breaker_activation(self.clock.now());
                self.persist_metrics();
                RoutingEvent::CircuitBreakerOpened {
                    model_id,
                    failure_count,
                }
            }
            CircuitTransition::HalfOpened { open_for_ms } => RoutingEvent::CircuitBreakerHalfOpened {
                model_id,
                open_for_ms,
            },
            CircuitTransition::Closed { success_count } => RoutingEvent::CircuitBreakerClosed {
                model_id,
                success_count,
            },
        };
        self.events.publish(event);
    }

    // ---------------------------------------------------------------------
    // Health
    // ---------------------------------------------------------------------

    /// Run one health pass over every endpoint
    pub async fn run_health_checks(&self) -> Vec<(String, HealthOutcome)> {
        let outcomes = self.health.check_all(&self.models, self.clock.now()).await;

        for (model_id, outcome) in &outcomes {
            let event = match outcome {
                HealthOutcome::Scored { .. } => continue,
                HealthOutcome::Degraded { health_score } => RoutingEvent::ModelHealthDegraded {
                    model_id: model_id.clone(),
                    health_score: *health_score,
                },
                HealthOutcome::Restored { health_score } => RoutingEvent::ModelHealthRestored {
                    model_id: model_id.clone(),
                    health_score: *health_score,
                },
                HealthOutcome::CheckFailed { error } => RoutingEvent::ModelHealthCheckFailed {
                    model_id: model_id.clone(),
                    error: error.clone(),
                },
            };
            self.events.publish(event);
        }

        if !outcomes.is_empty() {
            self.persist_models();
        }
        outcomes
    }

    // ---------------------------------------------------------------------
    // Metrics and reports
    // ---------------------------------------------------------------------

    /// Copy of the aggregate metrics
    #[must_use]
    pub fn get_metrics(&self) -> RoutingMetrics {
        self.metrics.snapshot()
    }

    /// Diagnostic view of the load balancer groups
    #[must_use]
    pub fn get_load_balancers(&self) -> Vec<LoadBalancerGroup> {
        self.balancer.groups()
    }

    /// Summarize routing activity between `start` and `end`, inclusive
    pub fn generate_routing_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DispatchResult<RoutingReport> {
        let records = self.metrics.history_between(start, end);
        RoutingReport::build(
            start,
            end,
            &records,
            &self.models.snapshot(),
            &self.breakers,
            self.metrics.snapshot().circuit_breaker_activations,
            self.clock.now(),
        )
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    fn load_state(&self) {
        let storage = self.storage.as_ref();
        if let Some(models) = load_records::<AIModel>(storage, MODELS_KEY) {
            info!(count = models.len(), "Loaded persisted models");
            self.models.replace_all(models);
        }
        if let Some(rules) = load_records::<RoutingRule>(storage, RULES_KEY) {
            info!(count = rules.len(), "Loaded persisted routing rules");
            self.rules.replace_all(rules);
        }
        if let Some(metrics) = load_collection::<RoutingMetrics>(storage, METRICS_KEY) {
            debug!(total_requests = metrics.total_requests, "Loaded persisted metrics");
            self.metrics.restore(metrics);
        }
        if let Some(history) = load_records::<RoutingRecord>(storage, HISTORY_KEY) {
            debug!(count = history.len(), "Loaded persisted routing history");
            self.metrics.restore_history(history);
        }
    }

    fn persist_models(&self) {
        self.persist(MODELS_KEY, &self.models.snapshot());
    }

    fn persist_rules(&self) {
        self.persist(RULES_KEY, &self.rules.snapshot());
    }

    fn persist_metrics(&self) {
        self.persist(METRICS_KEY, &self.metrics.snapshot());
    }

    fn persist_history(&self) {
        self.persist(HISTORY_KEY, &self.metrics.history());
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        let written = serde_json::to_vec(value)
            .map_err(DispatchError::from)
            .and_then(|bytes| self.storage.save(key, &bytes));
        if let Err(e) = written {
            warn!(key, error = %e, "Failed to persist state, continuing in memory");
        }
    }
}

fn load_collection<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    match storage.load(key) {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable persisted collection");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted collection");
            None
        }
    }
}

/// Load a persisted array, decoding each element on its own so one bad
/// record is skipped instead of discarding the collection
fn load_records<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<Vec<T>> {
    let values = load_collection::<Vec<serde_json::Value>>(storage, key)?;
    let records = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, index, error = %e, "Skipping unreadable persisted record");
                None
            }
        })
        .collect();
    Some(records)
}

fn describe(
    rule: Option<&RoutingRule>,
    strategy: LoadBalancingStrategy,
    selected: &AIModel,
    candidates: usize,
) -> String {
    match rule {
        Some(rule) => format!(
            "Selected {} via rule '{}' using {strategy} among {candidates} candidate(s)",
            selected.id, rule.name
        ),
        None => format!(
            "Selected {} from the default pool using {strategy} among {candidates} candidate(s)",
            selected.id
        ),
    }
}
