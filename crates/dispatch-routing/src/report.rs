//! Routing reports over a time window.

use chrono::{DateTime, Utc};
use dispatch_core::{AIModel, DispatchError, DispatchResult, ModelStatus};
use dispatch_resilience::{CircuitBreakerRegistry, CircuitState};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::metrics::RoutingRecord;

/// Health snapshot of one endpoint at report time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealthSummary {
    /// Endpoint id
    pub model_id: String,
    /// Status
    pub status: ModelStatus,
    /// Health score
    pub health_score: f64,
    /// Observed success rate
    pub success_rate: f64,
    /// Requests routed to the endpoint (lifetime)
    pub total_requests: u64,
    /// Breaker state
    pub circuit_state: CircuitState,
}

/// Summary of routing activity between two instants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingReport {
    /// Window start
    pub period_start: DateTime<Utc>,
    /// Window end
    pub period_end: DateTime<Utc>,
    /// Attempts in the window
    pub total_requests: u64,
    /// Successful attempts
    pub successful_routes: u64,
    /// Failed attempts
    pub failed_routes: u64,
    /// Fraction of attempts that selected an endpoint
    pub success_rate: f64,
    /// Mean estimated latency of successful attempts
    pub average_estimated_latency: f64,
    /// Sum of estimated costs
    pub total_estimated_cost: f64,
    /// Decisions per endpoint
    pub model_usage: BTreeMap<String, u64>,
    /// Attempts per region
    pub region_distribution: BTreeMap<String, u64>,
    /// Attempts per tier
    pub tier_distribution: BTreeMap<String, u64>,
    /// Attempts per applied rule
    pub rule_usage: BTreeMap<String, u64>,
    /// Failures per error code
    pub errors: BTreeMap<String, u64>,
    /// Lifetime breaker activations
    pub circuit_breaker_activations: u64,
    /// Endpoint health at report time
    pub model_health: Vec<ModelHealthSummary>,
    /// Generation time
    pub generated_at: DateTime<Utc>,
}

impl RoutingReport {
    /// Build a report from the records of a window.
    ///
    /// Fails when `start` is after `end`.
    pub fn build(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        records: &[RoutingRecord],
        models: &[AIModel],
        breakers: &CircuitBreakerRegistry,
        circuit_breaker_activations: u64,
        generated_at: DateTime<Utc>,
    ) -> DispatchResult<Self> {
        if start > end {
            return Err(DispatchError::validation(format!(
                "report start {start} is after end {end}"
            )));
        }

        let mut report = Self {
            period_start: start,
            period_end: end,
            total_requests: 0,
            successful_routes: 0,
            failed_routes: 0,
            success_rate: 0.0,
            average_estimated_latency: 0.0,
            total_estimated_cost: 0.0,
            model_usage: BTreeMap::new(),
            region_distribution: BTreeMap::new(),
            tier_distribution: BTreeMap::new(),
            rule_usage: BTreeMap::new(),
            errors: BTreeMap::new(),
            circuit_breaker_activations,
            model_health: models
                .iter()
                .map(|m| ModelHealthSummary {
                    model_id: m.id.clone(),
                    status: m.status,
                    health_score: m.stats.health_score,
                    success_rate: m.stats.success_rate,
                    total_requests: m.stats.total_requests,
                    circuit_state: breakers.state(&m.id),
                })
                .collect(),
            generated_at,
        };

        let mut latency_sum = 0.0;
        for record in records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
        {
            report.total_requests += 1;
            bump(&mut report.region_distribution, &record.region);
            bump(&mut report.tier_distribution, &record.tier);
            if let Some(rule_id) = &record.rule_id {
                bump(&mut report.rule_usage, rule_id);
            }
            match (&record.model_id, &record.error_code) {
                (Some(model_id), _) => {
                    report.successful_routes += 1;
                    bump(&mut report.model_usage, model_id);
                    latency_sum += record.estimated_latency;
                    report.total_estimated_cost += record.estimated_cost;
                }
                (None, code) => {
                    report.failed_routes += 1;
                    bump(&mut report.errors, code.as_deref().unwrap_or("unknown"));
                }
            }
        }

        if report.total_requests > 0 {
            report.success_rate = report.successful_routes as f64 / report.total_requests as f64;
        }
        if report.successful_routes > 0 {
            report.average_estimated_latency = latency_sum / report.successful_routes as f64;
        }
        Ok(report)
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}
