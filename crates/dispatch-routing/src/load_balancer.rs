//! Load balancing across a filtered candidate set.
//!
//! Every decision is made within a *group*: the strategy together with the
//! ordered ids of the candidates it chose from. Round-robin cursors are
//! scoped to a group, so a change in the candidate set starts a fresh
//! rotation. Groups also collect selection counters for diagnostics.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dispatch_core::{AIModel, ConversationRequest, LoadBalancingStrategy};
use rand::Rng;
use serde::Serialize;

use crate::scoring::estimated_cost;

/// Outcome of a selection
#[derive(Debug, Clone)]
pub struct Selection {
    /// Index of the chosen endpoint in the candidate slice
    pub index: usize,
    /// Weight of the chosen endpoint
    pub weight: f64,
    /// Key of the group that served the decision
    pub group: String,
}

/// Diagnostic view of one load balancer group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerGroup {
    /// Group key
    pub key: String,
    /// Strategy of the group
    pub strategy: LoadBalancingStrategy,
    /// Candidate ids, in order
    pub members: Vec<String>,
    /// Next round-robin position
    pub cursor: usize,
    /// Decisions made in this group
    pub selections: u64,
    /// Endpoint chosen last
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_selected: Option<String>,
    /// Time of the last decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_selected_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct GroupState {
    strategy: LoadBalancingStrategy,
    members: Vec<String>,
    cursor: usize,
    selections: u64,
    last_selected: Option<String>,
    last_selected_at: Option<DateTime<Utc>>,
}

impl GroupState {
    fn new(strategy: LoadBalancingStrategy, candidates: &[AIModel]) -> Self {
        Self {
            strategy,
            members: candidates.iter().map(|m| m.id.clone()).collect(),
            cursor: 0,
            selections: 0,
            last_selected: None,
            last_selected_at: None,
        }
    }

    fn advance(&mut self, len: usize) -> usize {
        let index = self.cursor % len;
        self.cursor = (index + 1) % len;
        index
    }
}

/// Selector implementing the five strategies
#[derive(Debug, Default)]
pub struct LoadBalancer {
    groups: DashMap<String, GroupState>,
    weights: DashMap<String, f64>,
}

impl LoadBalancer {
    /// Create a load balancer with no groups and no weight overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick one candidate using `strategy`.
    ///
    /// Returns `None` only when `candidates` is empty.
    pub fn select(
        &self,
        strategy: LoadBalancingStrategy,
        candidates: &[AIModel],
        request: &ConversationRequest,
        at: DateTime<Utc>,
    ) -> Option<Selection> {
        if candidates.is_empty() {
            return None;
        }

        let key = group_key(strategy, candidates);
        let mut group = self
            .groups
            .entry(key.clone())
            .or_insert_with(|| GroupState::new(strategy, candidates));

        let index = match strategy {
            LoadBalancingStrategy::RoundRobin => group.advance(candidates.len()),
            LoadBalancingStrategy::LeastConnections => least_connections(candidates),
            LoadBalancingStrategy::Weighted => {
                let weights: Vec<f64> = candidates.iter().map(|m| self.weight_of(m)).collect();
                let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
                let roll = if total > 0.0 {
                    rand::thread_rng().gen_range(0.0..total)
                } else {
                    0.0
                };
                weighted_index(&weights, roll)
            }
            LoadBalancingStrategy::LatencyBased => latency_based(candidates),
            LoadBalancingStrategy::CostOptimized => cost_optimized(candidates, request),
        };

        group.selections += 1;
        group.last_selected = Some(candidates[index].id.clone());
        group.last_selected_at = Some(at);

        Some(Selection {
            index,
            weight: self.weight_of(&candidates[index]),
            group: key,
        })
    }

    /// Weight of an endpoint: the override when set, otherwise reliability x 100
    #[must_use]
    pub fn weight_of(&self, model: &AIModel) -> f64 {
        self.weights
            .get(&model.id)
            .map_or(model.reliability * 100.0, |w| *w)
    }

    /// Override an endpoint's weight. Negative weights count as zero.
    pub fn set_weight(&self, model_id: &str, weight: f64) {
        self.weights.insert(model_id.to_string(), weight.max(0.0));
    }

    /// Drop an endpoint's weight override
    pub fn clear_weight(&self, model_id: &str) {
        self.weights.remove(model_id);
    }

    /// Forget everything about a removed endpoint
    pub fn forget_model(&self, model_id: &str) {
        self.weights.remove(model_id);
        self.groups
            .retain(|_, g| !g.members.iter().any(|m| m == model_id));
    }

    /// Diagnostic view of every group, sorted by key
    #[must_use]
    pub fn groups(&self) -> Vec<LoadBalancerGroup> {
        let mut groups: Vec<LoadBalancerGroup> = self
            .groups
            .iter()
            .map(|entry| {
                let g = entry.value();
                LoadBalancerGroup {
                    key: entry.key().clone(),
                    strategy: g.strategy,
                    members: g.members.clone(),
                    cursor: g.cursor,
                    selections: g.selections,
                    last_selected: g.last_selected.clone(),
                    last_selected_at: g.last_selected_at,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        groups
    }
}

/// Key of the group formed by a strategy and an ordered candidate set
#[must_use]
pub fn group_key(strategy: LoadBalancingStrategy, candidates: &[AIModel]) -> String {
    let ids: Vec<&str> = candidates.iter().map(|m| m.id.as_str()).collect();
    format!("{strategy}:{}", ids.join(","))
}

/// Index of the least loaded candidate; ties go to the first one
#[must_use]
pub fn least_connections(candidates: &[AIModel]) -> usize {
    argmin(candidates.iter().map(|m| m.stats.current_load))
}

/// Index of the candidate with the lowest average response time
#[must_use]
pub fn latency_based(candidates: &[AIModel]) -> usize {
    argmin(candidates.iter().map(|m| m.stats.average_response_time))
}

/// Index of the cheapest candidate for the request
#[must_use]
pub fn cost_optimized(candidates: &[AIModel], request: &ConversationRequest) -> usize {
    argmin(candidates.iter().map(|m| estimated_cost(m, request)))
}

/// Walk `weights` with a roll drawn from `[0, total)`.
///
/// Zero-weight entries are never picked while any weight is positive. With
/// no positive weight the first index is returned.
#[must_use]
pub fn weighted_index(weights: &[f64], roll: f64) -> usize {
    let mut remaining = roll;
    let mut last_positive = None;
    for (i, weight) in weights.iter().copied().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        if remaining < weight {
            return i;
        }
        remaining -= weight;
        last_positive = Some(i);
    }
    last_positive.unwrap_or(0)
}

fn argmin(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::INFINITY;
    for (i, value) in values.enumerate() {
        if value < best_value {
            best = i;
            best_value = value;
        }
    }
    best
}
