//! Health monitoring integration tests
//!
//! Health passes through the facade, probe failures and the maintenance
//! scheduler running on paused tokio time.

use crate::helpers::*;
use dispatch_core::{AIModel, ModelStatus, RoutingEvent};
use dispatch_routing::{
    compute_health_score, HealthOutcome, MaintenanceScheduler, SchedulerConfig,
};
use dispatch_telemetry::RoutingMetricsExporter;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn endpoint_d() -> AIModel {
    let mut model = AIModel::new("model-d", "openai")
        .with_latency(2000)
        .with_load(80.0)
        .with_reliability(0.95);
    model.stats.success_rate = 0.95;
    model
}

/// The composite score is the rounded mean of the four component scores
#[test]
fn test_health_score_formula() {
    let expected = ((100.0 - 2000.0 / 30.0_f64).max(0.0) + 20.0 + 95.0 + 95.0) / 4.0;
    assert_eq!(compute_health_score(&endpoint_d()), expected.round());
    assert_eq!(compute_health_score(&endpoint_d()), 61.0);
}

/// A low score puts the endpoint into maintenance, a high one restores it
#[tokio::test]
async fn test_degrade_and_restore() {
    let harness = TestRouter::new().with_models([endpoint_d()]);
    let mut events = harness.router.subscribe();

    let outcomes = harness.router.run_health_checks().await;
    assert_eq!(
        outcomes,
        vec![(
            "model-d".to_string(),
            HealthOutcome::Degraded { health_score: 61.0 }
        )]
    );
    let model = harness.router.get_model("model-d").unwrap();
    assert_eq!(model.status, ModelStatus::Maintenance);
    assert!((model.stats.health_score - 61.0).abs() < f64::EPSILON);
    assert!(harness
        .router
        .route_conversation(&crate::fixtures::simple_request())
        .is_err());

    harness.router.report_load("model-d", 0.0).unwrap();
    harness
        .router
        .record_response("model-d", Duration::from_millis(100))
        .unwrap();
    let outcomes = harness.router.run_health_checks().await;
    assert!(matches!(outcomes[0].1, HealthOutcome::Restored { .. }));
    assert_eq!(
        harness.router.get_model("model-d").unwrap().status,
        ModelStatus::Active
    );

    let kinds: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.event_type())
        .filter(|kind| kind.starts_with("model_health"))
        .collect();
    assert_eq!(kinds, vec!["model_health_degraded", "model_health_restored"]);
}

/// A probe failure isolates the endpoint and leaves the others alone
#[tokio::test]
async fn test_probe_failure_is_isolated() {
    let harness = TestRouter::with_probe(Arc::new(UnreachableProbe::new(&["down"])))
        .with_models([AIModel::new("down", "openai"), AIModel::new("up", "openai")]);
    let mut events = harness.router.subscribe();

    let outcomes = harness.router.run_health_checks().await;
    assert_eq!(outcomes.len(), 2);

    let down = harness.router.get_model("down").unwrap();
    assert_eq!(down.status, ModelStatus::Inactive);
    assert!(down.stats.health_score.abs() < f64::EPSILON);
    assert_eq!(
        harness.router.get_model("up").unwrap().status,
        ModelStatus::Active
    );

    match events.try_recv() {
        Ok(RoutingEvent::ModelHealthCheckFailed { model_id, .. }) => assert_eq!(model_id, "down"),
        other => panic!("unexpected event: {other:?}"),
    }

    let result = harness
        .router
        .route_conversation(&crate::fixtures::simple_request())
        .unwrap();
    assert_eq!(result.model_id(), "up");
}

/// The scheduler drives health passes and feeds the metrics exporter
#[tokio::test(start_paused = true)]
async fn test_scheduler_with_exporter() {
    let harness = TestRouter::new().with_models([endpoint_d()]);
    let exporter = Arc::new(RoutingMetricsExporter::new().unwrap());
    let exporter_task = Arc::clone(&exporter).spawn(harness.router.subscribe());

    let scheduler = MaintenanceScheduler::start(
        Arc::clone(&harness.router),
        SchedulerConfig::new().with_interval(Duration::from_secs(30)),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(scheduler.is_running());
    assert_eq!(
        harness.router.get_model("model-d").unwrap().status,
        ModelStatus::Maintenance
    );

    scheduler.stop().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let text = exporter.render().unwrap();
    assert!(text.contains(r#"dispatch_model_health_score{model="model-d"} 61"#));
    exporter_task.abort();
}
