//! Endpoint (AI model) definitions.
//!
//! An [`AIModel`] is a backend model service the router can send a
//! conversation to. Its static description is set at registration; the
//! [`ModelStats`] block is mutated by the metrics recorder and the health
//! monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DispatchError, DispatchResult};

/// Operational status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Serving traffic
    Active,
    /// Disabled, either administratively or after a failed health check
    Inactive,
    /// Temporarily excluded because its health score degraded
    Maintenance,
    /// Saturated, excluded until load drops
    Overloaded,
}

impl ModelStatus {
    /// Whether the endpoint may receive new requests
    #[must_use]
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Overloaded => write!(f, "overloaded"),
        }
    }
}

/// Declared endpoint capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Plain text generation
    Text,
    /// Multi-step reasoning
    Reasoning,
    /// Image understanding
    Vision,
    /// Code generation and review
    Coding,
    /// Languages other than the default one
    Multilingual,
    /// Tool / function calling
    FunctionCalling,
    /// Very large context windows
    LongContext,
    /// Capability this build does not know about
    #[serde(other)]
    Other,
}

/// Live statistics of an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    /// Composite health score (0-100)
    pub health_score: f64,
    /// Requests routed to this endpoint
    pub total_requests: u64,
    /// Observed success rate (0-1)
    pub success_rate: f64,
    /// Running average response time in milliseconds
    pub average_response_time: f64,
    /// Current load (0-100)
    pub current_load: f64,
    /// Maximum concurrent conversations
    pub max_concurrency: u32,
}

impl Default for ModelStats {
    fn default() -> Self {
        Self {
            health_score: 100.0,
            total_requests: 0,
            success_rate: 1.0,
            average_response_time: 0.0,
            current_load: 0.0,
            max_concurrency: 100,
        }
    }
}

/// A backend model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIModel {
    /// Unique endpoint identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider name (e.g. "openai", "anthropic")
    pub provider: String,
    /// Declared capabilities
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Maximum context size in tokens
    pub max_tokens: u32,
    /// Cost per token
    pub cost_per_token: f64,
    /// Nominal latency in milliseconds
    pub latency: u64,
    /// Reliability score (0-1)
    pub reliability: f64,
    /// Operational status
    pub status: ModelStatus,
    /// Region tag
    pub region: String,
    /// Live statistics
    #[serde(default)]
    pub stats: ModelStats,
    /// Registration time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last administrative or health update
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AIModel {
    /// Create an active endpoint with neutral defaults
    #[must_use]
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            capabilities: vec![Capability::Text],
            max_tokens: 8192,
            cost_per_token: 0.000_01,
            latency: 1000,
            reliability: 0.95,
            status: ModelStatus::Active,
            region: "global".to_string(),
            stats: ModelStats {
                average_response_time: 1000.0,
                ..ModelStats::default()
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the capability set
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// Set the nominal latency, which also seeds the running average
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency = latency_ms;
        self.stats.average_response_time = latency_ms as f64;
        self
    }

    /// Set the reliability score
    #[must_use]
    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }

    /// Set the cost per token
    #[must_use]
    pub fn with_cost_per_token(mut self, cost: f64) -> Self {
        self.cost_per_token = cost;
        self
    }

    /// Set the maximum context size
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the status
    #[must_use]
    pub fn with_status(mut self, status: ModelStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the region tag
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the current load
    #[must_use]
    pub fn with_load(mut self, load: f64) -> Self {
        self.stats.current_load = load;
        self
    }

    /// Seed the running average from the nominal latency when no sample
    /// has been folded in yet
    pub fn seed_response_time(&mut self) {
        if self.stats.average_response_time <= 0.0 {
            self.stats.average_response_time = self.latency as f64;
        }
    }

    /// Check whether the endpoint declares a capability
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Validate the static description
    pub fn validate(&self) -> DispatchResult<()> {
        if self.id.trim().is_empty() {
            return Err(DispatchError::validation_field("model id must not be empty", "id"));
        }
        if self.provider.trim().is_empty() {
            return Err(DispatchError::validation_field(
                "provider must not be empty",
                "provider",
            ));
        }
        if !(0.0..=1.0).contains(&self.reliability) {
            return Err(DispatchError::validation_field(
                format!("reliability {} must be within [0, 1]", self.reliability),
                "reliability",
            ));
        }
        if self.cost_per_token < 0.0 || !self.cost_per_token.is_finite() {
            return Err(DispatchError::validation_field(
                "cost per token must be a non-negative number",
                "costPerToken",
            ));
        }
        Ok(())
    }
}

/// Partial administrative update of an endpoint.
///
/// Unset fields keep their current value. Live statistics are never
/// touched by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUpdate {
    /// New display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New provider name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// New capability set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,
    /// New context size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// New cost per token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_token: Option<f64>,
    /// New nominal latency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    /// New reliability score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,
    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ModelStatus>,
    /// New region tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// New concurrency limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
}

impl ModelUpdate {
    /// Apply the update to `model`, validating the result.
    ///
    /// On error `model` is left unchanged.
    pub fn apply(self, model: &mut AIModel, at: DateTime<Utc>) -> DispatchResult<()> {
        let mut updated = model.clone();
        if let Some(name) = self.name {
            updated.name = name;
        }
        if let Some(provider) = self.provider {
            updated.provider = provider;
        }
        if let Some(capabilities) = self.capabilities {
            updated.capabilities = capabilities;
        }
        if let Some(max_tokens) = self.max_tokens {
            updated.max_tokens = max_tokens;
        }
        if let Some(cost) = self.cost_per_token {
            updated.cost_per_token = cost;
        }
        if let Some(latency) = self.latency {
            // an average still equal to the old nominal value holds no samples
            let seeded = (updated.stats.average_response_time - updated.latency as f64).abs()
                < f64::EPSILON;
            updated.latency = latency;
            if seeded {
                updated.stats.average_response_time = latency as f64;
            }
        }
        if let Some(reliability) = self.reliability {
            updated.reliability = reliability;
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(region) = self.region {
            updated.region = region;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            updated.stats.max_concurrency = max_concurrency;
        }
        updated.validate()?;
        updated.seed_response_time();
        updated.updated_at = at;
        *model = updated;
        Ok(())
    }
}
