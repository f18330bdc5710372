//! Decision estimates: token count, cost, latency and confidence.

use dispatch_core::{AIModel, ConversationRequest};

/// Upper bound on the confidence score
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Tokens per character of message text
const TOKENS_PER_CHAR: f64 = 1.2;

/// Estimated tokens for a request on an endpoint, bounded by its context size
#[must_use]
pub fn estimated_tokens(model: &AIModel, request: &ConversationRequest) -> f64 {
    (f64::from(request.context.message_length) * TOKENS_PER_CHAR).min(f64::from(model.max_tokens))
}

/// Linear cost estimate
#[must_use]
pub fn estimated_cost(model: &AIModel, request: &ConversationRequest) -> f64 {
    estimated_tokens(model, request) * model.cost_per_token
}

/// Latency estimate in milliseconds, scaled by load and request complexity
#[must_use]
pub fn estimated_latency(model: &AIModel, request: &ConversationRequest) -> f64 {
    model.stats.average_response_time
        * (1.0 + model.stats.current_load / 100.0)
        * request.context.complexity.latency_factor()
}

/// Fraction of the request's inferred capabilities the endpoint declares.
///
/// 1.0 when the request implies no capability.
#[must_use]
pub fn capability_match_ratio(
    model: &AIModel,
    request: &ConversationRequest,
    default_language: &str,
) -> f64 {
    let required = request.inferred_capabilities(default_language);
    if required.is_empty() {
        return 1.0;
    }
    let present = required.iter().filter(|c| model.has_capability(**c)).count();
    present as f64 / required.len() as f64
}

/// Confidence in picking `model` for `request`
#[must_use]
pub fn confidence(model: &AIModel, request: &ConversationRequest, default_language: &str) -> f64 {
    let load_headroom = ((100.0 - model.stats.current_load) / 100.0).max(0.0);
    let mean = (model.reliability
        + model.stats.health_score / 100.0
        + load_headroom
        + capability_match_ratio(model, request, default_language))
        / 4.0;
    mean.clamp(0.0, MAX_CONFIDENCE)
}
