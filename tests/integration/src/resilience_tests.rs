//! Circuit breaker integration tests
//!
//! Breaker transitions driven through the routing facade with a manual
//! clock, and their effect on candidate eligibility.

use crate::fixtures::*;
use crate::helpers::*;
use dispatch_core::{AIModel, DispatchError, LoadBalancingStrategy, RoutingEvent};
use dispatch_resilience::{CircuitBreakerConfig, CircuitState};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn drain(events: &mut tokio::sync::broadcast::Receiver<RoutingEvent>) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.event_type());
    }
    kinds
}

/// Five failures open the breaker; a success while open changes nothing
#[tokio::test]
async fn test_threshold_opens_and_open_ignores_success() {
    let harness = TestRouter::with_breaker(5, Duration::from_secs(60))
        .with_models([AIModel::new("model-c", "openai")]);

    for attempt in 1..=4 {
        let state = harness.router.record_model_failure("model-c").unwrap();
        assert_eq!(state, CircuitState::Closed, "opened early at failure {attempt}");
    }
    assert_eq!(
        harness.router.record_model_failure("model-c").unwrap(),
        CircuitState::Open
    );

    assert_eq!(
        harness.router.record_model_success("model-c").unwrap(),
        CircuitState::Open
    );
    let snapshot = harness
        .router
        .circuit_breakers()
        .into_iter()
        .find(|s| s.model_id == "model-c")
        .unwrap();
    assert_eq!(snapshot.failure_count, 5);
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(snapshot.total_successes, 0);
    assert_eq!(snapshot.times_opened, 1);
    assert_eq!(harness.router.get_metrics().circuit_breaker_activations, 1);
}

/// The breaker stays open until its timeout has fully elapsed
#[tokio::test]
async fn test_timeout_moves_to_half_open() {
    let harness = TestRouter::with_breaker(5, Duration::from_millis(60_000))
        .with_models([AIModel::new("model-c", "openai")]);
    let mut events = harness.router.subscribe();

    for _ in 0..5 {
        harness.router.record_model_failure("model-c").unwrap();
    }

    harness.advance(Duration::from_millis(59_000));
    assert!(harness.router.check_circuit_breaker_timeout().is_empty());
    assert_eq!(harness.router.circuit_state("model-c"), CircuitState::Open);

    harness.advance(Duration::from_millis(2_000));
    assert_eq!(
        harness.router.check_circuit_breaker_timeout(),
        vec!["model-c".to_string()]
    );
    assert_eq!(harness.router.circuit_state("model-c"), CircuitState::HalfOpen);

    assert_eq!(
        drain(&mut events),
        vec!["circuit_breaker_opened", "circuit_breaker_half_opened"]
    );
}

/// Three half-open successes close the breaker; a half-open failure reopens it
#[tokio::test]
async fn test_half_open_recovery_and_relapse() {
    let harness = TestRouter::with_breaker(2, Duration::from_secs(10))
        .with_models([AIModel::new("model-c", "openai")]);

    harness.router.record_model_failure("model-c").unwrap();
    harness.router.record_model_failure("model-c").unwrap();
    harness.advance(Duration::from_secs(10));
    harness.router.check_circuit_breaker_timeout();

    harness.router.record_model_success("model-c").unwrap();
    assert_eq!(
        harness.router.record_model_failure("model-c").unwrap(),
        CircuitState::Open
    );

    harness.advance(Duration::from_secs(10));
    harness.router.check_circuit_breaker_timeout();
    for _ in 0..2 {
        assert_eq!(
            harness.router.record_model_success("model-c").unwrap(),
            CircuitState::HalfOpen
        );
    }
    assert_eq!(
        harness.router.record_model_success("model-c").unwrap(),
        CircuitState::Closed
    );

    // counters reset on close: one failure is not enough to reopen
    assert_eq!(
        harness.router.record_model_failure("model-c").unwrap(),
        CircuitState::Closed
    );
    assert_eq!(harness.router.get_metrics().circuit_breaker_activations, 2);
}

/// An open breaker removes its endpoint from routing until it half-opens
#[tokio::test]
async fn test_open_breaker_excludes_candidate() {
    let harness = TestRouter::with_breaker(1, Duration::from_secs(30))
        .with_models([endpoint_a(), endpoint_b()]);
    harness
        .router
        .add_rule(catch_all_rule(
            "fast",
            &["model-a", "model-b"],
            LoadBalancingStrategy::LatencyBased,
        ))
        .unwrap();

    harness.router.record_model_failure("model-a").unwrap();
    let result = harness.router.route_conversation(&simple_request()).unwrap();
    assert_eq!(result.model_id(), "model-b");

    harness.router.record_model_failure("model-b").unwrap();
    assert!(matches!(
        harness.router.route_conversation(&simple_request()),
        Err(DispatchError::NoEligibleCandidate { .. })
    ));

    // routing runs the timeout check itself
    harness.advance(Duration::from_secs(30));
    let result = harness.router.route_conversation(&simple_request()).unwrap();
    assert_eq!(result.model_id(), "model-a");
    assert_eq!(harness.router.circuit_state("model-a"), CircuitState::HalfOpen);
}

/// Breakers are per endpoint, shared by every rule targeting it
#[tokio::test]
async fn test_one_breaker_per_endpoint() {
    let harness = TestRouter::with_breaker(1, Duration::from_secs(30))
        .with_models([endpoint_a(), endpoint_b()]);
    harness
        .router
        .add_rule(premium_rule(&["model-a", "model-b"]))
        .unwrap();
    harness
        .router
        .add_rule(catch_all_rule(
            "solo",
            &["model-a"],
            LoadBalancingStrategy::RoundRobin,
        ))
        .unwrap();

    harness.router.record_model_failure("model-a").unwrap();

    assert!(harness
        .router
        .route_conversation(&request_from("free", "us"))
        .is_err());
    let premium = harness
        .router
        .route_conversation(&request_from("premium", "us"))
        .unwrap();
    assert_eq!(premium.model_id(), "model-b");
    assert_eq!(harness.router.circuit_breakers().len(), 1);
}

/// A per-endpoint breaker configuration overrides the default
#[tokio::test]
async fn test_configure_breaker_per_endpoint() {
    let harness = TestRouter::new().with_models([AIModel::new("fragile", "openai")]);
    harness
        .router
        .configure_circuit_breaker(
            "fragile",
            CircuitBreakerConfig::new().with_failure_threshold(1),
        )
        .unwrap();

    assert_eq!(
        harness.router.record_model_failure("fragile").unwrap(),
        CircuitState::Open
    );
    assert!(matches!(
        harness
            .router
            .configure_circuit_breaker("ghost", CircuitBreakerConfig::new()),
        Err(DispatchError::ModelNotFound(_))
    ));
}

/// Failure reports for unknown endpoints are rejected
#[tokio::test]
async fn test_unknown_endpoint_reports() {
    let harness = TestRouter::new();
    assert!(matches!(
        harness.router.record_model_failure("ghost"),
        Err(DispatchError::ModelNotFound(_))
    ));
    assert!(matches!(
        harness.router.record_model_success("ghost"),
        Err(DispatchError::ModelNotFound(_))
    ));
}

/// Concurrent failures cross the threshold exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_once() {
    let harness = TestRouter::with_breaker(5, Duration::from_secs(60))
        .with_models([AIModel::new("model-c", "openai")]);
    let mut events = harness.router.subscribe();

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let router = harness.router.clone();
            tokio::spawn(async move { router.record_model_failure("model-c") })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(harness.router.circuit_state("model-c"), CircuitState::Open);
    assert_eq!(drain(&mut events), vec!["circuit_breaker_opened"]);
    assert_eq!(harness.router.get_metrics().circuit_breaker_activations, 1);
}
