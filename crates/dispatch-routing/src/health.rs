//! Endpoint health scoring.
//!
//! A health pass probes every registered endpoint, recomputes its composite
//! score and moves it in or out of maintenance. A probe failure only affects
//! the endpoint that failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{AIModel, DispatchResult, ModelStatus};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::registry::ModelRegistry;

/// Reachability check against an endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync + fmt::Debug {
    /// Probe one endpoint
    async fn probe(&self, model: &AIModel) -> DispatchResult<()>;
}

/// Probe that always succeeds; scores then rely on recorded statistics only
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe;

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(&self, _model: &AIModel) -> DispatchResult<()> {
        Ok(())
    }
}

/// Composite health score (0-100) of an endpoint
#[must_use]
pub fn compute_health_score(model: &AIModel) -> f64 {
    let stats = &model.stats;
    let latency_score = (100.0 - stats.average_response_time / 30.0).max(0.0);
    let load_score = (100.0 - stats.current_load).max(0.0);
    let reliability_score = model.reliability * 100.0;
    let success_score = stats.success_rate * 100.0;
    ((latency_score + load_score + reliability_score + success_score) / 4.0).round()
}

/// Result of checking one endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum HealthOutcome {
    /// Score recomputed, status unchanged
    Scored {
        /// New score
        health_score: f64,
    },
    /// Endpoint moved to maintenance
    Degraded {
        /// New score
        health_score: f64,
    },
    /// Endpoint returned from maintenance
    Restored {
        /// New score
        health_score: f64,
    },
    /// The probe failed; endpoint marked inactive
    CheckFailed {
        /// Probe error
        error: String,
    },
}

/// Periodic health evaluator
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    degraded_below: f64,
    restored_above: f64,
}

impl HealthMonitor {
    /// Create a monitor with the given probe and thresholds
    #[must_use]
    pub fn new(probe: Arc<dyn HealthProbe>, degraded_below: f64, restored_above: f64) -> Self {
        Self {
            probe,
            degraded_below,
            restored_above,
        }
    }

    /// Apply a probe result to an endpoint and return what happened
    pub fn evaluate(
        &self,
        model: &mut AIModel,
        probe_result: DispatchResult<()>,
        at: DateTime<Utc>,
    ) -> HealthOutcome {
        if let Err(e) = probe_result {
            model.stats.health_score = 0.0;
            model.status = ModelStatus::Inactive;
            model.updated_at = at;
            return HealthOutcome::CheckFailed {
                error: e.to_string(),
            };
        }

        let health_score = compute_health_score(model);
        model.stats.health_score = health_score;

        match model.status {
            ModelStatus::Active | ModelStatus::Overloaded if health_score < self.degraded_below => {
                model.status = ModelStatus::Maintenance;
                model.updated_at = at;
                HealthOutcome::Degraded { health_score }
            }
            ModelStatus::Maintenance if health_score > self.restored_above => {
                model.status = ModelStatus::Active;
                model.updated_at = at;
                HealthOutcome::Restored { health_score }
            }
            _ => HealthOutcome::Scored { health_score },
        }
    }

    /// Probe and rescore every endpoint in the registry.
    ///
    /// Probes run without holding any endpoint lock; the result is applied
    /// under the endpoint's lock afterwards.
    pub async fn check_all(
        &self,
        registry: &ModelRegistry,
        at: DateTime<Utc>,
    ) -> Vec<(String, HealthOutcome)> {
        let mut outcomes = Vec::new();

        for handle in registry.handles() {
            let snapshot = handle.lock().clone();
            let probe_result = self.probe.probe(&snapshot).await;
            let outcome = {
                let mut model = handle.lock();
                self.evaluate(&mut model, probe_result, at)
            };

            match &outcome {
                HealthOutcome::Scored { health_score } => {
                    debug!(model_id = %snapshot.id, health_score, "Health score updated");
                }
                HealthOutcome::Degraded { health_score } => {
                    warn!(model_id = %snapshot.id, health_score, "Model moved to maintenance");
                }
                HealthOutcome::Restored { health_score } => {
                    info!(model_id = %snapshot.id, health_score, "Model restored to active");
                }
                HealthOutcome::CheckFailed { error } => {
                    warn!(model_id = %snapshot.id, error = %error, "Health check failed");
                }
            }
            outcomes.push((snapshot.id, outcome));
        }

        outcomes
    }
}
