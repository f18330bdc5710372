//! Background maintenance: health passes and breaker timeout checks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::router::ConversationRouter;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between two maintenance ticks
    pub interval: Duration,
    /// Run health passes on each tick; breaker checks always run
    pub health_checks: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            health_checks: true,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enable or disable health passes
    #[must_use]
    pub fn with_health_checks(mut self, enabled: bool) -> Self {
        self.health_checks = enabled;
        self
    }
}

/// Handle to the running maintenance task.
///
/// Call [`stop`](Self::stop) on shutdown; dropping the handle aborts the task.
#[derive(Debug)]
pub struct MaintenanceScheduler {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop on the current runtime.
    ///
    /// The first tick fires immediately.
    #[must_use]
    pub fn start(router: Arc<ConversationRouter>, config: SchedulerConfig) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval = config.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?interval, health_checks = config.health_checks, "Maintenance scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let half_opened = router.check_circuit_breaker_timeout();
                        if !half_opened.is_empty() {
                            debug!(count = half_opened.len(), "Circuit breakers moved to half-open");
                        }
                        if config.health_checks {
                            router.run_health_checks().await;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Maintenance scheduler stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Whether the loop is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for it to finish
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
