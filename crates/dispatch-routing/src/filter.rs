//! Candidate filtering.

use dispatch_core::{AIModel, ConversationRequest, ModelStatus};
use dispatch_resilience::CircuitBreakerRegistry;
use std::fmt;
use tracing::debug;

/// Why an endpoint was excluded from a decision
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Endpoint is not active
    NotActive(ModelStatus),
    /// Nominal latency exceeds the request's maximum
    TooSlow {
        /// Endpoint latency
        latency: u64,
        /// Requested maximum
        max: u64,
    },
    /// Reliability is below the request's minimum
    Unreliable {
        /// Endpoint reliability
        reliability: f64,
        /// Requested minimum
        min: f64,
    },
    /// Provider is not among the preferred ones
    ProviderNotPreferred(String),
    /// Endpoint was explicitly excluded
    Excluded,
    /// Endpoint's circuit breaker is open
    CircuitOpen,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotActive(status) => write!(f, "status is {status}"),
            Self::TooSlow { latency, max } => write!(f, "latency {latency}ms exceeds {max}ms"),
            Self::Unreliable { reliability, min } => {
                write!(f, "reliability {reliability} below {min}")
            }
            Self::ProviderNotPreferred(provider) => {
                write!(f, "provider {provider} not preferred")
            }
            Self::Excluded => write!(f, "excluded by request"),
            Self::CircuitOpen => write!(f, "circuit breaker open"),
        }
    }
}

/// Narrows target endpoints to those eligible for a request
#[derive(Debug, Clone, Copy)]
pub struct CandidateFilter<'a> {
    breakers: &'a CircuitBreakerRegistry,
}

impl<'a> CandidateFilter<'a> {
    /// Create a filter consulting the given breakers
    #[must_use]
    pub fn new(breakers: &'a CircuitBreakerRegistry) -> Self {
        Self { breakers }
    }

    /// Check one endpoint, returning the first reason it is ineligible
    #[must_use]
    pub fn rejection(&self, model: &AIModel, request: &ConversationRequest) -> Option<Rejection> {
        let requirements = &request.requirements;

        if model.status != ModelStatus::Active {
            return Some(Rejection::NotActive(model.status));
        }
        if let Some(max) = requirements.max_latency {
            if model.latency > max {
                return Some(Rejection::TooSlow {
                    latency: model.latency,
                    max,
                });
            }
        }
        if let Some(min) = requirements.min_reliability {
            if model.reliability < min {
                return Some(Rejection::Unreliable {
                    reliability: model.reliability,
                    min,
                });
            }
        }
        if !requirements.preferred_providers.is_empty()
            && !requirements.preferred_providers.contains(&model.provider)
        {
            return Some(Rejection::ProviderNotPreferred(model.provider.clone()));
        }
        if requirements.excluded_models.contains(&model.id) {
            return Some(Rejection::Excluded);
        }
        if self.breakers.is_open(&model.id) {
            return Some(Rejection::CircuitOpen);
        }
        None
    }

    /// Keep the eligible endpoints, preserving order
    #[must_use]
    pub fn filter(&self, endpoints: Vec<AIModel>, request: &ConversationRequest) -> Vec<AIModel> {
        endpoints
            .into_iter()
            .filter(|m| match self.rejection(m, request) {
                Some(reason) => {
                    debug!(
                        request_id = %request.id,
                        model_id = %m.id,
                        reason = %reason,
                        "Candidate rejected"
                    );
                    false
                }
                None => true,
            })
            .collect()
    }

    /// Summarize why every endpoint of a pool was rejected
    #[must_use]
    pub fn explain(&self, endpoints: &[AIModel], request: &ConversationRequest) -> String {
        if endpoints.is_empty() {
            return "no endpoints in the candidate pool".to_string();
        }
        endpoints
            .iter()
            .filter_map(|m| self.rejection(m, request).map(|r| format!("{}: {r}", m.id)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
