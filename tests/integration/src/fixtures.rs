//! Test fixtures and sample data for integration tests

use dispatch_core::{
    AIModel, Capability, Complexity, ConditionOperator, ConversationRequest,
    LoadBalancingStrategy, RequestContext, RequestRequirements, RoutingCondition, RoutingRule,
};

/// Endpoint A of the reference pool: the fastest and most reliable
pub fn endpoint_a() -> AIModel {
    AIModel::new("model-a", "openai")
        .with_reliability(0.99)
        .with_latency(1200)
        .with_capabilities([Capability::Text, Capability::Reasoning])
}

/// Endpoint B of the reference pool
pub fn endpoint_b() -> AIModel {
    AIModel::new("model-b", "anthropic")
        .with_reliability(0.98)
        .with_latency(1500)
        .with_capabilities([Capability::Text, Capability::Coding])
}

/// A cheap endpoint with a small context window
pub fn cheap_endpoint(id: &str) -> AIModel {
    AIModel::new(id, "local")
        .with_cost_per_token(0.000_001)
        .with_max_tokens(2048)
}

/// Plain request from a free-tier user
pub fn simple_request() -> ConversationRequest {
    ConversationRequest::new("user-1", "session-1")
}

/// Request with the given tier and region
pub fn request_from(tier: &str, region: &str) -> ConversationRequest {
    simple_request().with_context(RequestContext {
        user_tier: tier.to_string(),
        region: region.to_string(),
        message_length: 400,
        ..RequestContext::default()
    })
}

/// Request with a high complexity
pub fn complex_request() -> ConversationRequest {
    simple_request().with_context(RequestContext {
        complexity: Complexity::High,
        message_length: 2000,
        ..RequestContext::default()
    })
}

/// Request that must not be served by the given endpoints
pub fn request_excluding(ids: &[&str]) -> ConversationRequest {
    simple_request().with_requirements(RequestRequirements {
        excluded_models: ids.iter().map(|id| (*id).to_string()).collect(),
        ..RequestRequirements::default()
    })
}

/// Rule targeting `targets` with `strategy`, matching every request
pub fn catch_all_rule(id: &str, targets: &[&str], strategy: LoadBalancingStrategy) -> RoutingRule {
    RoutingRule::new(id, 10)
        .with_targets(targets.iter().copied())
        .with_strategy(strategy)
}

/// Rule that matches premium users only
pub fn premium_rule(targets: &[&str]) -> RoutingRule {
    RoutingRule::new("premium", 1)
        .with_name("Premium users")
        .with_condition(RoutingCondition::new(
            "userTier",
            ConditionOperator::Equals,
            "premium",
        ))
        .with_targets(targets.iter().copied())
        .with_strategy(LoadBalancingStrategy::LatencyBased)
}
