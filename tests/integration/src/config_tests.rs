//! Configuration integration tests
//!
//! A configuration file drives the router's storage, breaker and health
//! settings.

use crate::fixtures::*;
use dispatch_config::{load_config, StorageBackend};
use dispatch_core::FileStore;
use dispatch_resilience::{CircuitBreakerConfig, CircuitState};
use dispatch_routing::{ConversationRouter, RouterConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

/// A YAML file configures a file-backed router end to end
#[tokio::test]
async fn test_yaml_config_drives_router() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("state");
    let path = dir.path().join("dispatch.yaml");
    std::fs::write(
        &path,
        format!(
            "storage:\n  backend: file\n  data_dir: {}\ncircuit_breaker:\n  failure_threshold: 2\n  timeout: 30s\nrouting:\n  default_language: de\n  history_limit: 5\n",
            data_dir.display()
        ),
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.storage.backend, StorageBackend::File);
    assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(30));

    let router_config = RouterConfig::new()
        .with_default_language(&config.routing.default_language)
        .with_history_limit(config.routing.history_limit)
        .with_circuit_breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(config.circuit_breaker.failure_threshold)
                .with_timeout(config.circuit_breaker.timeout),
        );
    let store = FileStore::open(&config.storage.data_dir).unwrap();
    let router = ConversationRouter::builder()
        .config(router_config)
        .storage(Arc::new(store))
        .build();

    router.add_model(endpoint_a()).unwrap();
    router.record_model_failure("model-a").unwrap();
    assert_eq!(
        router.record_model_failure("model-a").unwrap(),
        CircuitState::Open
    );
    assert_eq!(router.config().default_language, "de");
    assert!(data_dir.join("models.json").exists());
}

/// An unsupported file extension is rejected
#[test]
fn test_unknown_config_format_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dispatch.ini");
    std::fs::write(&path, "[storage]\n").unwrap();
    assert!(load_config(Some(&path)).is_err());
}
