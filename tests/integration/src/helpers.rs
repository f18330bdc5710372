//! Test helper utilities for integration tests

use async_trait::async_trait;
use dispatch_core::{AIModel, DispatchError, DispatchResult, ManualClock, MemoryStore, Storage};
use dispatch_resilience::CircuitBreakerConfig;
use dispatch_routing::{ConversationRouter, HealthProbe, RouterConfig};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Clock reading used by every harness at startup (2024-01-01T00:00:00Z)
pub const T0_MILLIS: u64 = 1_704_067_200_000;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Probe that fails for a fixed set of endpoints
#[derive(Debug, Default)]
pub struct UnreachableProbe {
    unreachable: HashSet<String>,
}

impl UnreachableProbe {
    /// Fail probes of the given endpoints
    pub fn new(ids: &[&str]) -> Self {
        Self {
            unreachable: ids.iter().map(|id| (*id).to_string()).collect(),
        }
    }
}

#[async_trait]
impl HealthProbe for UnreachableProbe {
    async fn probe(&self, model: &AIModel) -> DispatchResult<()> {
        if self.unreachable.contains(&model.id) {
            return Err(DispatchError::health_check(&model.id, "connection refused"));
        }
        Ok(())
    }
}

/// Router wired to a manual clock and in-memory storage
pub struct TestRouter {
    /// The router under test
    pub router: Arc<ConversationRouter>,
    /// Clock driving breaker timeouts and record timestamps
    pub clock: Arc<ManualClock>,
    /// Backing store
    pub storage: Arc<MemoryStore>,
}

impl TestRouter {
    /// Harness with default configuration
    pub fn new() -> Self {
        Self::with_config(RouterConfig::new())
    }

    /// Harness with a custom router configuration
    pub fn with_config(config: RouterConfig) -> Self {
        Self::build(config, Arc::new(MemoryStore::new()), None)
    }

    /// Harness whose health probe is `probe`
    pub fn with_probe(probe: Arc<dyn HealthProbe>) -> Self {
        Self::build(RouterConfig::new(), Arc::new(MemoryStore::new()), Some(probe))
    }

    /// Harness with a breaker that opens after `threshold` failures and
    /// stays open for `timeout`
    pub fn with_breaker(threshold: u32, timeout: Duration) -> Self {
        Self::with_config(
            RouterConfig::new().with_circuit_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(threshold)
                    .with_timeout(timeout),
            ),
        )
    }

    /// Build a second router over the same storage, as after a restart
    pub fn restart(&self) -> Self {
        Self::build(self.router.config().clone(), Arc::clone(&self.storage), None)
    }

    fn build(
        config: RouterConfig,
        storage: Arc<MemoryStore>,
        probe: Option<Arc<dyn HealthProbe>>,
    ) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(T0_MILLIS));
        let mut builder = ConversationRouter::builder()
            .config(config)
            .clock(clock.clone())
            .storage(storage.clone() as Arc<dyn Storage>);
        if let Some(probe) = probe {
            builder = builder.probe(probe);
        }
        Self {
            router: Arc::new(builder.build()),
            clock,
            storage,
        }
    }

    /// Register endpoints, panicking on failure
    pub fn with_models(self, models: impl IntoIterator<Item = AIModel>) -> Self {
        for model in models {
            self.router.add_model(model).expect("Failed to add model");
        }
        self
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestRouter {
    fn default() -> Self {
        Self::new()
    }
}
