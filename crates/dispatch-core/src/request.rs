//! Conversation request types.
//!
//! A [`ConversationRequest`] lives for a single routing decision. Its
//! [`RequestContext`] is what routing rules match against; its
//! [`RequestRequirements`] are hard filters applied to candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::model::Capability;

/// Kind of content carried by the conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Plain text
    #[default]
    Text,
    /// Contains images
    Image,
    /// Source code or code-like content
    Code,
    /// Mixed media
    Mixed,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Code => write!(f, "code"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Estimated complexity of the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Simple lookups and chit-chat
    #[default]
    Low,
    /// Ordinary tasks
    Medium,
    /// Multi-step reasoning
    High,
}

impl Complexity {
    /// Multiplier applied to latency estimates
    #[must_use]
    pub fn latency_factor(&self) -> f64 {
        match self {
            Self::High => 1.5,
            Self::Medium => 1.2,
            Self::Low => 1.0,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Caller-declared priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// Background work
    Low,
    /// Default
    #[default]
    Normal,
    /// Interactive, latency-sensitive
    High,
    /// Must be served first
    Urgent,
}

/// Fields rules are matched against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Requester tier (e.g. "free", "premium", "enterprise")
    pub user_tier: String,
    /// Message length in characters
    pub message_length: u32,
    /// Estimated complexity
    #[serde(default)]
    pub complexity: Complexity,
    /// Language tag
    pub language: String,
    /// Requester region
    pub region: String,
    /// Priority
    #[serde(default)]
    pub priority: RequestPriority,
    /// Optional cost budget for the turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_budget: Option<f64>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            user_tier: "free".to_string(),
            message_length: 0,
            complexity: Complexity::default(),
            language: "en".to_string(),
            region: "global".to_string(),
            priority: RequestPriority::default(),
            cost_budget: None,
        }
    }
}

/// Hard constraints every candidate must satisfy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRequirements {
    /// Maximum acceptable nominal latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<u64>,
    /// Minimum acceptable reliability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reliability: Option<f64>,
    /// Only these providers are acceptable (empty means any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_providers: Vec<String>,
    /// Endpoints that must not be used
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_models: Vec<String>,
}

/// A conversation turn waiting for an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    /// Request identifier
    #[serde(default = "generate_request_id")]
    pub id: String,
    /// Requesting user
    pub user_id: String,
    /// Conversation session
    pub session_id: String,
    /// Content kind
    #[serde(default)]
    pub content_type: ContentType,
    /// Matching context
    #[serde(default)]
    pub context: RequestContext,
    /// Hard requirements
    #[serde(default)]
    pub requirements: RequestRequirements,
    /// Arrival time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

impl ConversationRequest {
    /// Create a text request with a default context
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: generate_request_id(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            content_type: ContentType::default(),
            context: RequestContext::default(),
            requirements: RequestRequirements::default(),
            timestamp: Utc::now(),
        }
    }

    /// Set the content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Replace the context
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the requirements
    #[must_use]
    pub fn with_requirements(mut self, requirements: RequestRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Look up a context field by name for rule matching.
    ///
    /// Accepts camelCase and snake_case spellings. Returns `None` for unknown
    /// fields and for unset optional fields.
    #[must_use]
    pub fn field_value(&self, field: &str) -> Option<Value> {
        let ctx = &self.context;
        match field {
            "tier" | "userTier" | "user_tier" => Some(Value::from(ctx.user_tier.clone())),
            "messageLength" | "message_length" => Some(Value::from(ctx.message_length)),
            "complexity" => Some(Value::from(ctx.complexity.to_string())),
            "language" => Some(Value::from(ctx.language.clone())),
            "region" => Some(Value::from(ctx.region.clone())),
            "priority" => serde_json::to_value(ctx.priority).ok(),
            "costBudget" | "cost_budget" => ctx.cost_budget.map(Value::from),
            "contentType" | "content_type" => Some(Value::from(self.content_type.to_string())),
            _ => None,
        }
    }

    /// Capabilities implied by the request's content and context
    #[must_use]
    pub fn inferred_capabilities(&self, default_language: &str) -> Vec<Capability> {
        let mut required = Vec::new();
        if self.context.complexity == Complexity::High {
            required.push(Capability::Reasoning);
        }
        if matches!(self.content_type, ContentType::Image | ContentType::Mixed) {
            required.push(Capability::Vision);
        }
        if self.content_type == ContentType::Code {
            required.push(Capability::Coding);
        }
        if !self.context.language.eq_ignore_ascii_case(default_language) {
            required.push(Capability::Multilingual);
        }
        required
    }
}
