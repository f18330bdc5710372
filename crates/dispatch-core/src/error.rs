//! Error types for the dispatch engine.

use thiserror::Error;

/// Result alias used across the workspace
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors produced by the routing engine and its administrative API
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Candidate filtering left no endpoint able to serve the request
    #[error("No eligible candidates for request {request_id}: {reason}")]
    NoEligibleCandidate {
        /// Request that could not be routed
        request_id: String,
        /// Why the candidate set ended up empty
        reason: String,
    },

    /// Unknown endpoint id
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Unknown rule id
    #[error("Routing rule not found: {0}")]
    RuleNotFound(String),

    /// An endpoint with this id is already registered
    #[error("Model already registered: {0}")]
    DuplicateModel(String),

    /// A rule with this id is already registered
    #[error("Routing rule already registered: {0}")]
    DuplicateRule(String),

    /// Administrative input failed validation
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the failure
        message: String,
        /// Offending field, when known
        field: Option<String>,
    },

    /// The health probe could not reach an endpoint
    #[error("Health check failed for {model_id}: {message}")]
    HealthCheck {
        /// Endpoint that failed the probe
        model_id: String,
        /// Probe error
        message: String,
    },

    /// The storage backend failed to read or write
    #[error("Storage error on key '{key}': {message}")]
    Storage {
        /// Storage key involved
        key: String,
        /// Underlying error
        message: String,
    },

    /// Persisted data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    /// Create a no-eligible-candidate error
    pub fn no_eligible_candidate(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoEligibleCandidate {
            request_id: request_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a health check error
    pub fn health_check(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HealthCheck {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the operation later and expect success
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoEligibleCandidate { .. } | Self::HealthCheck { .. } | Self::Storage { .. }
        )
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoEligibleCandidate { .. } => "no_eligible_candidate",
            Self::ModelNotFound(_) => "model_not_found",
            Self::RuleNotFound(_) => "rule_not_found",
            Self::DuplicateModel(_) => "duplicate_model",
            Self::DuplicateRule(_) => "duplicate_rule",
            Self::Validation { .. } => "validation_error",
            Self::HealthCheck { .. } => "health_check_failed",
            Self::Storage { .. } => "storage_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
