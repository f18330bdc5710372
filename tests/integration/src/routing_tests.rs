//! Routing integration tests
//!
//! Rule matching, candidate filtering and the five selection strategies,
//! driven through the routing facade.

use crate::fixtures::*;
use crate::helpers::*;
use dispatch_core::{
    AIModel, DispatchError, LoadBalancingStrategy, ModelStatus, ModelUpdate, RoutingEvent,
    RuleUpdate,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

/// Latency-based rule always picks the faster endpoint
#[tokio::test]
async fn test_latency_based_prefers_fastest() {
    let harness = TestRouter::new().with_models([endpoint_a(), endpoint_b()]);
    harness
        .router
        .add_rule(catch_all_rule(
            "fast",
            &["model-a", "model-b"],
            LoadBalancingStrategy::LatencyBased,
        ))
        .unwrap();

    for _ in 0..10 {
        let result = harness.router.route_conversation(&simple_request()).unwrap();
        assert_eq!(result.model_id(), "model-a");
        assert_eq!(result.rule_id.as_deref(), Some("fast"));
        assert_eq!(result.alternative_ids(), vec!["model-b"]);
    }
}

/// Endpoints registered from JSON without live stats still route by latency
#[tokio::test]
async fn test_latency_based_with_json_endpoints() {
    let models: Vec<AIModel> = serde_json::from_value(serde_json::json!([
        {
            "id": "slow", "name": "Slow", "provider": "anthropic",
            "capabilities": ["text"], "maxTokens": 8192, "costPerToken": 0.00001,
            "latency": 1500, "reliability": 0.98, "status": "active", "region": "global"
        },
        {
            "id": "fast", "name": "Fast", "provider": "openai",
            "capabilities": ["text"], "maxTokens": 8192, "costPerToken": 0.00001,
            "latency": 1200, "reliability": 0.99, "status": "active", "region": "global"
        }
    ]))
    .unwrap();
    let harness = TestRouter::new().with_models(models);
    harness
        .router
        .add_rule(catch_all_rule(
            "fast",
            &["slow", "fast"],
            LoadBalancingStrategy::LatencyBased,
        ))
        .unwrap();

    let result = harness.router.route_conversation(&simple_request()).unwrap();
    assert_eq!(result.model_id(), "fast");
    assert!(result.estimated_latency > 0.0);

    let restarted = harness.restart();
    let fast = restarted.router.get_model("fast").unwrap();
    assert!((fast.stats.average_response_time - 1200.0).abs() < f64::EPSILON);
}

/// Excluded endpoints are never selected, even by round robin
#[tokio::test]
async fn test_excluded_model_is_skipped() {
    let harness = TestRouter::new().with_models([endpoint_a(), endpoint_b()]);

    for _ in 0..6 {
        let result = harness
            .router
            .route_conversation(&request_excluding(&["model-a"]))
            .unwrap();
        assert_eq!(result.model_id(), "model-b");
        assert_eq!(
            result.load_balancing.strategy,
            LoadBalancingStrategy::RoundRobin
        );
    }
}

/// No routable endpoint yields a typed error and a routing error event
#[tokio::test]
async fn test_no_active_endpoint_fails() {
    let harness = TestRouter::new().with_models([
        endpoint_a().with_status(ModelStatus::Inactive),
        endpoint_b().with_status(ModelStatus::Maintenance),
    ]);
    let mut events = harness.router.subscribe();

    let error = harness
        .router
        .route_conversation(&simple_request())
        .unwrap_err();
    assert!(matches!(error, DispatchError::NoEligibleCandidate { .. }));
    assert_eq!(error.error_code(), "no_eligible_candidate");

    match events.try_recv() {
        Ok(RoutingEvent::RoutingError { code, .. }) => assert_eq!(code, "no_eligible_candidate"),
        other => panic!("unexpected event: {other:?}"),
    }

    let metrics = harness.router.get_metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.failed_routes, 1);
}

/// Empty registry also fails cleanly
#[tokio::test]
async fn test_empty_registry_fails() {
    let harness = TestRouter::new();
    let result = harness.router.route_conversation(&simple_request());
    assert!(matches!(
        result,
        Err(DispatchError::NoEligibleCandidate { .. })
    ));
}

/// Round robin visits each endpoint once per cycle
#[tokio::test]
async fn test_round_robin_fairness() {
    let ids = ["rr-1", "rr-2", "rr-3", "rr-4"];
    let harness = TestRouter::new().with_models(ids.iter().map(|id| AIModel::new(*id, "openai")));

    for _cycle in 0..5 {
        let mut seen: Vec<String> = (0..ids.len())
            .map(|_| {
                harness
                    .router
                    .route_conversation(&simple_request())
                    .unwrap()
                    .model_id()
                    .to_string()
            })
            .collect();
        seen.sort();
        assert_eq!(seen, ids.iter().map(|id| (*id).to_string()).collect::<Vec<_>>());
    }

    let groups = harness.router.get_load_balancers();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].selections, 20);
    assert_eq!(groups[0].members.len(), 4);
}

/// Weighted selection never lands on a zero-weight endpoint
#[tokio::test]
async fn test_weighted_skips_zero_weight() {
    let harness = TestRouter::new().with_models([
        AIModel::new("zero", "openai"),
        AIModel::new("heavy", "openai"),
        AIModel::new("light", "anthropic"),
    ]);
    harness
        .router
        .add_rule(catch_all_rule(
            "weighted",
            &["zero", "heavy", "light"],
            LoadBalancingStrategy::Weighted,
        ))
        .unwrap();
    harness.router.set_model_weight("zero", 0.0).unwrap();
    harness.router.set_model_weight("heavy", 90.0).unwrap();
    harness.router.set_model_weight("light", 10.0).unwrap();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..300 {
        let result = harness.router.route_conversation(&simple_request()).unwrap();
        assert!(result.load_balancing.weight > 0.0);
        *counts.entry(result.model_id().to_string()).or_default() += 1;
    }

    assert_eq!(counts.get("zero"), None);
    assert!(counts.get("heavy").copied().unwrap_or(0) > counts.get("light").copied().unwrap_or(0));
}

/// All-zero weights fall back to the first candidate
#[tokio::test]
async fn test_weighted_all_zero_returns_first() {
    let harness = TestRouter::new().with_models([
        AIModel::new("first", "openai"),
        AIModel::new("second", "openai"),
    ]);
    harness
        .router
        .add_rule(catch_all_rule(
            "weighted",
            &["first", "second"],
            LoadBalancingStrategy::Weighted,
        ))
        .unwrap();
    harness.router.set_model_weight("first", 0.0).unwrap();
    harness.router.set_model_weight("second", 0.0).unwrap();

    for _ in 0..5 {
        let result = harness.router.route_conversation(&simple_request()).unwrap();
        assert_eq!(result.model_id(), "first");
    }
}

/// Least connections follows reported load
#[tokio::test]
async fn test_least_connections_follows_load() {
    let harness = TestRouter::new().with_models([
        AIModel::new("busy", "openai"),
        AIModel::new("idle", "openai"),
    ]);
    harness
        .router
        .add_rule(catch_all_rule(
            "lc",
            &["busy", "idle"],
            LoadBalancingStrategy::LeastConnections,
        ))
        .unwrap();

    harness.router.report_load("busy", 75.0).unwrap();
    harness.router.report_load("idle", 5.0).unwrap();
    let result = harness.router.route_conversation(&simple_request()).unwrap();
    assert_eq!(result.model_id(), "idle");
    assert!((result.load_balancing.current_load - 5.0).abs() < f64::EPSILON);

    harness.router.report_load("idle", 95.0).unwrap();
    let result = harness.router.route_conversation(&simple_request()).unwrap();
    assert_eq!(result.model_id(), "busy");
}

/// Cost optimized picks the cheapest estimate
#[tokio::test]
async fn test_cost_optimized_picks_cheapest() {
    let harness = TestRouter::new().with_models([
        endpoint_a().with_cost_per_token(0.000_03),
        cheap_endpoint("budget"),
    ]);
    harness
        .router
        .add_rule(catch_all_rule(
            "cheap",
            &["model-a", "budget"],
            LoadBalancingStrategy::CostOptimized,
        ))
        .unwrap();

    let result = harness
        .router
        .route_conversation(&request_from("free", "eu"))
        .unwrap();
    assert_eq!(result.model_id(), "budget");
    // 400 chars * 1.2 tokens
    assert!((result.estimated_cost - 480.0 * 0.000_001).abs() < 1e-12);
}

/// The highest-priority matching rule wins; others fall through
#[tokio::test]
async fn test_rule_priority_and_fallback() {
    let harness = TestRouter::new().with_models([
        endpoint_a(),
        endpoint_b(),
        AIModel::new("model-c", "openai"),
    ]);
    harness
        .router
        .add_rule(premium_rule(&["model-a", "model-b"]))
        .unwrap();
    harness
        .router
        .add_rule(catch_all_rule(
            "default",
            &["model-c"],
            LoadBalancingStrategy::RoundRobin,
        ))
        .unwrap();

    let premium = harness
        .router
        .route_conversation(&request_from("premium", "us"))
        .unwrap();
    assert_eq!(premium.rule_id.as_deref(), Some("premium"));
    assert_eq!(premium.model_id(), "model-a");

    let free = harness
        .router
        .route_conversation(&request_from("free", "us"))
        .unwrap();
    assert_eq!(free.rule_id.as_deref(), Some("default"));
    assert_eq!(free.model_id(), "model-c");

    let matching = harness
        .router
        .find_matching_rules(&request_from("premium", "us"));
    let ids: Vec<&str> = matching.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["premium", "default"]);
}

/// Deactivating a rule takes it out of matching
#[tokio::test]
async fn test_inactive_rule_is_ignored() {
    let harness = TestRouter::new().with_models([endpoint_a(), endpoint_b()]);
    harness.router.add_rule(premium_rule(&["model-b"])).unwrap();
    harness
        .router
        .update_rule(
            "premium",
            RuleUpdate {
                is_active: Some(false),
                ..RuleUpdate::default()
            },
        )
        .unwrap();

    let result = harness
        .router
        .route_conversation(&request_from("premium", "us"))
        .unwrap();
    assert_eq!(result.rule_id, None);
}

/// A rule whose targets are all filtered out fails and records usage
#[tokio::test]
async fn test_rule_usage_tracks_outcomes() {
    let harness = TestRouter::new().with_models([endpoint_a(), endpoint_b()]);
    harness.router.add_rule(premium_rule(&["model-a"])).unwrap();

    harness
        .router
        .route_conversation(&request_from("premium", "us"))
        .unwrap();
    let mut excluded = request_from("premium", "us");
    excluded.requirements.excluded_models = vec!["model-a".to_string()];
    assert!(harness.router.route_conversation(&excluded).is_err());

    let rule = harness
        .router
        .get_rules()
        .into_iter()
        .find(|r| r.id == "premium")
        .unwrap();
    assert_eq!(rule.usage.times_applied, 2);
    assert!((rule.usage.success_rate - 0.5).abs() < 1e-9);
    assert!(rule.usage.last_applied.is_some());
}

/// Successful routing updates endpoint statistics and aggregates
#[tokio::test]
async fn test_metrics_follow_decisions() {
    let harness = TestRouter::new().with_models([endpoint_a()]);

    harness
        .router
        .route_conversation(&request_from("premium", "eu"))
        .unwrap();
    harness
        .router
        .route_conversation(&request_from("free", "eu"))
        .unwrap();

    let metrics = harness.router.get_metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.successful_routes, 2);
    assert_eq!(metrics.model_usage.get("model-a"), Some(&2));
    assert_eq!(metrics.region_distribution.get("eu"), Some(&2));
    assert_eq!(metrics.tier_distribution.get("premium"), Some(&1));

    let model = harness.router.get_model("model-a").unwrap();
    assert_eq!(model.stats.total_requests, 2);
    assert!((model.stats.success_rate - 1.0).abs() < 1e-9);
}

/// Confidence stays within bounds and drops for missing capabilities
#[tokio::test]
async fn test_confidence_reflects_capabilities() {
    let harness = TestRouter::new().with_models([endpoint_a()]);
    let plain = harness.router.route_conversation(&simple_request()).unwrap();
    assert!(plain.confidence <= 0.99);

    let harness = TestRouter::new().with_models([endpoint_b()]);
    let complex = harness.router.route_conversation(&complex_request()).unwrap();
    assert!(complex.confidence < plain.confidence);
    // 1500 ms average, no load, high complexity factor
    assert!((complex.estimated_latency - 1500.0 * 1.5).abs() < 1e-9);
}

/// Reading the registry twice without mutation yields equal collections
#[tokio::test]
async fn test_get_models_is_idempotent() {
    let harness = TestRouter::new().with_models([endpoint_a(), endpoint_b()]);
    assert_eq!(harness.router.get_models(), harness.router.get_models());
}

/// Administrative updates are validated and published
#[tokio::test]
async fn test_model_update_and_remove() {
    let harness = TestRouter::new().with_models([endpoint_a(), endpoint_b()]);
    let mut events = harness.router.subscribe();

    let updated = harness
        .router
        .update_model(
            "model-a",
            ModelUpdate {
                status: Some(ModelStatus::Maintenance),
                ..ModelUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, ModelStatus::Maintenance);
    assert!(matches!(
        events.try_recv(),
        Ok(RoutingEvent::ModelUpdated { .. })
    ));

    let invalid = harness.router.update_model(
        "model-b",
        ModelUpdate {
            reliability: Some(1.5),
            ..ModelUpdate::default()
        },
    );
    assert!(matches!(invalid, Err(DispatchError::Validation { .. })));
    assert!((harness.router.get_model("model-b").unwrap().reliability - 0.98).abs() < 1e-9);

    let result = harness.router.route_conversation(&simple_request()).unwrap();
    assert_eq!(result.model_id(), "model-b");

    harness.router.remove_model("model-b").unwrap();
    assert!(matches!(
        harness.router.remove_model("model-b"),
        Err(DispatchError::ModelNotFound(_))
    ));
    assert!(harness.router.route_conversation(&simple_request()).is_err());
}
