//! Routing metrics and decision history.

use chrono::{DateTime, Utc};
use dispatch_core::{ConversationRequest, DispatchError, RoutingMetrics, RoutingResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One routing attempt, as kept in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRecord {
    /// Attempt time
    pub timestamp: DateTime<Utc>,
    /// Request id
    pub request_id: String,
    /// Selected endpoint, on success
    pub model_id: Option<String>,
    /// Rule that supplied the candidates
    pub rule_id: Option<String>,
    /// Request region
    pub region: String,
    /// Request tier
    pub tier: String,
    /// Estimated cost, on success
    pub estimated_cost: f64,
    /// Estimated latency, on success
    pub estimated_latency: f64,
    /// Error code, on failure
    pub error_code: Option<String>,
}

impl RoutingRecord {
    /// Whether the attempt selected an endpoint
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.model_id.is_some()
    }
}

/// Accumulates aggregate counters and a bounded history of attempts
#[derive(Debug)]
pub struct MetricsRecorder {
    metrics: RwLock<RoutingMetrics>,
    history: Mutex<VecDeque<RoutingRecord>>,
    history_limit: usize,
}

impl MetricsRecorder {
    /// Create a recorder keeping at most `history_limit` records
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            metrics: RwLock::new(RoutingMetrics::default()),
            history: Mutex::new(VecDeque::new()),
            history_limit,
        }
    }

    /// Replace the aggregate, e.g. with a persisted one
    pub fn restore(&self, metrics: RoutingMetrics) {
        *self.metrics.write() = metrics;
    }

    /// Replace the history, e.g. with a persisted one. Only the newest
    /// `history_limit` records are kept.
    pub fn restore_history(&self, records: Vec<RoutingRecord>) {
        let skip = records.len().saturating_sub(self.history_limit);
        *self.history.lock() = records.into_iter().skip(skip).collect();
    }

    /// Record a successful decision
    pub fn record_route(&self, result: &RoutingResult, request: &ConversationRequest) {
        let ctx = &request.context;
        self.metrics.write().record_success(
            result.model_id(),
            &ctx.region,
            &ctx.user_tier,
            result.estimated_latency,
            result.timestamp,
        );
        self.push(RoutingRecord {
            timestamp: result.timestamp,
            request_id: result.request_id.clone(),
            model_id: Some(result.model_id().to_string()),
            rule_id: result.rule_id.clone(),
            region: ctx.region.clone(),
            tier: ctx.user_tier.clone(),
            estimated_cost: result.estimated_cost,
            estimated_latency: result.estimated_latency,
            error_code: None,
        });
    }

    /// Record a failed attempt
    pub fn record_error(
        &self,
        request: &ConversationRequest,
        rule_id: Option<&str>,
        error: &DispatchError,
        at: DateTime<Utc>,
    ) {
        let ctx = &request.context;
        self.metrics
            .write()
            .record_failure(&ctx.region, &ctx.user_tier, at);
        self.push(RoutingRecord {
            timestamp: at,
            request_id: request.id.clone(),
            model_id: None,
            rule_id: rule_id.map(str::to_string),
            region: ctx.region.clone(),
            tier: ctx.user_tier.clone(),
            estimated_cost: 0.0,
            estimated_latency: 0.0,
            error_code: Some(error.error_code().to_string()),
        });
    }

    /// Record a breaker opening
    pub fn record_breaker_activation(&self, at: DateTime<Utc>) {
        self.metrics.write().record_breaker_activation(at);
    }

    /// Copy of the aggregate
    #[must_use]
    pub fn snapshot(&self) -> RoutingMetrics {
        self.metrics.read().clone()
    }

    /// Records with `start <= timestamp <= end`, oldest first
    #[must_use]
    pub fn history_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<RoutingRecord> {
        self.history
            .lock()
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .cloned()
            .collect()
    }

    /// Copy of the whole history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<RoutingRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Number of records held
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    fn push(&self, record: RoutingRecord) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(record);
    }
}
