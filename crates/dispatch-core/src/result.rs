//! Routing decision output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AIModel;
use crate::rule::{FailoverStrategy, LoadBalancingStrategy};

/// Load-balancing diagnostics attached to a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingInfo {
    /// Strategy that made the pick
    pub strategy: LoadBalancingStrategy,
    /// Weight of the selected endpoint
    pub weight: f64,
    /// Load of the selected endpoint at decision time
    pub current_load: f64,
    /// Failover policy of the applied rule
    pub failover: FailoverStrategy,
    /// Load balancer group that served the decision
    pub group: String,
}

/// Outcome of a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingResult {
    /// Request that was routed
    pub request_id: String,
    /// Chosen endpoint, as it was at decision time
    pub selected_model: AIModel,
    /// Rule that supplied the candidates, if any matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Human-readable explanation
    pub reason: String,
    /// Confidence in the pick (0-0.99)
    pub confidence: f64,
    /// Up to three fallback endpoints, in preference order
    pub alternatives: Vec<AIModel>,
    /// Linear cost estimate
    pub estimated_cost: f64,
    /// Latency estimate in milliseconds
    pub estimated_latency: f64,
    /// Load balancing diagnostics
    pub load_balancing: LoadBalancingInfo,
    /// Decision time
    pub timestamp: DateTime<Utc>,
}

impl RoutingResult {
    /// Id of the selected endpoint
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.selected_model.id
    }

    /// Ids of the alternatives, in order
    #[must_use]
    pub fn alternative_ids(&self) -> Vec<&str> {
        self.alternatives.iter().map(|m| m.id.as_str()).collect()
    }
}
