//! Aggregate routing counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate routing metrics, persisted under the `metrics` key.
///
/// Counters only grow; there is no reset path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMetrics {
    /// Routing attempts
    pub total_requests: u64,
    /// Attempts that selected an endpoint
    pub successful_routes: u64,
    /// Attempts that failed
    pub failed_routes: u64,
    /// Running mean of estimated latency over successful routes (ms)
    pub average_latency: f64,
    /// Selections per endpoint
    #[serde(default)]
    pub model_usage: BTreeMap<String, u64>,
    /// Attempts per requester region
    #[serde(default)]
    pub region_distribution: BTreeMap<String, u64>,
    /// Attempts per requester tier
    #[serde(default)]
    pub tier_distribution: BTreeMap<String, u64>,
    /// Times any circuit breaker opened
    pub circuit_breaker_activations: u64,
    /// Last mutation
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_routes: 0,
            failed_routes: 0,
            average_latency: 0.0,
            model_usage: BTreeMap::new(),
            region_distribution: BTreeMap::new(),
            tier_distribution: BTreeMap::new(),
            circuit_breaker_activations: 0,
            last_updated: Utc::now(),
        }
    }
}

impl RoutingMetrics {
    /// Record a successful routing decision
    pub fn record_success(
        &mut self,
        model_id: &str,
        region: &str,
        tier: &str,
        estimated_latency: f64,
        at: DateTime<Utc>,
    ) {
        self.count_attempt(region, tier, at);
        self.successful_routes += 1;
        *self.model_usage.entry(model_id.to_string()).or_insert(0) += 1;

        let n = self.successful_routes as f64;
        self.average_latency = self.average_latency.mul_add(n - 1.0, estimated_latency) / n;
    }

    /// Record a failed routing attempt
    pub fn record_failure(&mut self, region: &str, tier: &str, at: DateTime<Utc>) {
        self.count_attempt(region, tier, at);
        self.failed_routes += 1;
    }

    /// Record a circuit breaker opening
    pub fn record_breaker_activation(&mut self, at: DateTime<Utc>) {
        self.circuit_breaker_activations += 1;
        self.last_updated = at;
    }

    /// Fraction of attempts that selected an endpoint
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_routes as f64 / self.total_requests as f64
        }
    }

    fn count_attempt(&mut self, region: &str, tier: &str, at: DateTime<Utc>) {
        self.total_requests += 1;
        *self.region_distribution.entry(region.to_string()).or_insert(0) += 1;
        *self.tier_distribution.entry(tier.to_string()).or_insert(0) += 1;
        self.last_updated = at;
    }
}
