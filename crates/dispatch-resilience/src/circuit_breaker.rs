//! Circuit breaker state machine.
//!
//! A breaker stops routing to an endpoint that keeps failing and lets it
//! back in gradually:
//!
//! - `closed` → `open` once `failure_count` reaches `failure_threshold`
//! - `open` → `half_open` once `timeout` has elapsed since the last failure,
//!   and only through [`CircuitBreaker::check_timeout`]
//! - `half_open` → `closed` after `success_threshold` consecutive successes
//! - `half_open` → `open` on any failure
//!
//! Time is passed in as milliseconds so the caller decides which clock
//! drives the breaker.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Endpoint is excluded from routing
    Open,
    /// Endpoint is routable again while successes are counted
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close the circuit
    pub success_threshold: u32,
    /// Time the circuit stays open after the last failure
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the success threshold
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Set the open timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A state change produced by recording an outcome or checking the timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    /// The breaker tripped
    Opened {
        /// Failure count at the moment it tripped
        failure_count: u32,
    },
    /// The open timeout elapsed
    HalfOpened {
        /// How long the breaker stayed open, in milliseconds
        open_for_ms: u64,
    },
    /// Enough consecutive successes were seen
    Closed {
        /// Successes that closed it
        success_count: u32,
    },
}

impl CircuitTransition {
    /// State entered by this transition
    #[must_use]
    pub fn target_state(&self) -> CircuitState {
        match self {
            Self::Opened { .. } => CircuitState::Open,
            Self::HalfOpened { .. } => CircuitState::HalfOpen,
            Self::Closed { .. } => CircuitState::Closed,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<u64>,
    opened_at: Option<u64>,
    total_failures: u64,
    total_successes: u64,
    times_opened: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            opened_at: None,
            total_failures: 0,
            total_successes: 0,
            times_opened: 0,
        }
    }

    fn open(&mut self, now_ms: u64) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.opened_at = Some(now_ms);
        self.times_opened += 1;
    }
}

/// Circuit breaker for a single endpoint.
///
/// All transitions happen under one lock, so concurrent failures cross the
/// threshold exactly once.
#[derive(Debug)]
pub struct CircuitBreaker {
    model_id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(model_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            model_id: model_id.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(model_id: impl Into<String>) -> Self {
        Self::new(model_id, CircuitBreakerConfig::default())
    }

    /// Endpoint guarded by this breaker
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether the breaker currently excludes its endpoint
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Record a failed call
    pub fn record_failure(&self, now_ms: u64) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.total_failures += 1;
        inner.last_failure_time = Some(now_ms);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.open(now_ms);
                    warn!(
                        model_id = %self.model_id,
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened"
                    );
                    Some(CircuitTransition::Opened {
                        failure_count: inner.failure_count,
                    })
                } else {
                    debug!(
                        model_id = %self.model_id,
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker failure recorded"
                    );
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.open(now_ms);
                warn!(
                    model_id = %self.model_id,
                    "Circuit breaker half-open failure, reopening"
                );
                Some(CircuitTransition::Opened {
                    failure_count: inner.failure_count,
                })
            }
            // Already open; the later failure time pushes the timeout out.
            CircuitState::Open => None,
        }
    }

    /// Record a successful call. Only counts while half-open.
    pub fn record_success(&self) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::HalfOpen {
            return None;
        }

        inner.success_count += 1;
        inner.total_successes += 1;
        debug!(
            model_id = %self.model_id,
            successes = inner.success_count,
            threshold = self.config.success_threshold,
            "Circuit breaker half-open success"
        );

        if inner.success_count < self.config.success_threshold {
            return None;
        }

        let success_count = inner.success_count;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at = None;
        info!(model_id = %self.model_id, "Circuit breaker closed");
        Some(CircuitTransition::Closed { success_count })
    }

    /// Move an open breaker to half-open once its timeout has elapsed
    pub fn check_timeout(&self, now_ms: u64) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }

        let last_failure = inner.last_failure_time?;
        let elapsed = now_ms.saturating_sub(last_failure);
        if elapsed < self.config.timeout.as_millis() as u64 {
            return None;
        }

        let open_for_ms = now_ms.saturating_sub(inner.opened_at.unwrap_or(last_failure));
        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
        info!(
            model_id = %self.model_id,
            open_for_ms = open_for_ms,
            "Circuit breaker half-open, testing"
        );
        Some(CircuitTransition::HalfOpened { open_for_ms })
    }

    /// Point-in-time view of the breaker
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            model_id: self.model_id.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            success_count: inner.success_count,
            timeout_ms: self.config.timeout.as_millis() as u64,
            last_failure_time: inner.last_failure_time,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            times_opened: inner.times_opened,
        }
    }
}

/// Serializable breaker view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSnapshot {
    /// Guarded endpoint
    pub model_id: String,
    /// Current state
    pub state: CircuitState,
    /// Failures since the breaker last closed
    pub failure_count: u32,
    /// Failures that open the breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes
    pub success_count: u32,
    /// Open timeout in milliseconds
    pub timeout_ms: u64,
    /// Last failure, milliseconds since the epoch
    pub last_failure_time: Option<u64>,
    /// Lifetime failures
    pub total_failures: u64,
    /// Lifetime half-open successes
    pub total_successes: u64,
    /// Times the breaker opened
    pub times_opened: u64,
}
