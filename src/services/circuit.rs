//! Per-service circuit breaker.
//!
//! # State machine
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ─────────────────────────▶ OPEN
//!     ▲                                │ recovery_timeout since last failure
//!     │ probe succeeds                 ▼ (evaluated lazily at call time)
//!     └──────────────────────────── HALF_OPEN
//!                                      │ probe fails
//!                                      └──────▶ OPEN (new window)
//! ```
//!
//! There is no background timer. Whether an OPEN breaker has become
//! HALF_OPEN is decided when someone asks, either through [`call`] or
//! [`state`].
//!
//! Only retryable failures (network, timeout, rate limit, unavailable)
//! count against the breaker. A rejected API key says nothing about
//! whether the service is up.
//!
//! [`call`]: CircuitBreaker::call
//! [`state`]: CircuitBreaker::state

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::telemetry;
use crate::{OntomapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker tunables. Default: open after 5 consecutive failures, probe
/// again after 60 seconds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A breaker that never opens.
    pub fn disabled() -> Self {
        Self {
            failure_threshold: u32::MAX,
            ..Self::default()
        }
    }

    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n.max(1);
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

/// Point-in-time view of a breaker, for health reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: f64,
    pub last_success: Option<SystemTime>,
    pub last_failure: Option<SystemTime>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    /// Monotonic time of the last counted failure; drives OPEN → HALF_OPEN.
    last_failure_at: Option<Instant>,
    last_success: Option<SystemTime>,
    last_failure: Option<SystemTime>,
    probe_in_flight: bool,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            last_success: None,
            last_failure: None,
            probe_in_flight: false,
        }
    }
}

/// Failure-tracking gate in front of one service.
///
/// One breaker exists per service for the lifetime of its
/// [`ResilienceContext`](super::ResilienceContext).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

enum Admission {
    Normal,
    Probe,
}

/// Releases the half-open probe slot if the probe future is dropped
/// before reporting an outcome.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().probe_in_flight = false;
            debug!(service = %self.breaker.name, "half-open probe abandoned");
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An OPEN breaker whose recovery window has elapsed
    /// reports HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        self.effective_state(&inner, Instant::now())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.effective_state(&inner, Instant::now()),
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs_f64(),
            last_success: inner.last_success,
            last_failure: inner.last_failure,
        }
    }

    /// Force the breaker back to CLOSED with no recorded failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let from = inner.state;
        *inner = BreakerInner::new();
        drop(inner);
        if from != CircuitState::Closed {
            self.transitioned(CircuitState::Closed);
        }
        info!(service = %self.name, "circuit breaker reset");
    }

    /// Run `f` through the breaker.
    ///
    /// While OPEN (and inside the recovery window) this fails with
    /// [`OntomapError::CircuitOpen`] without calling `f`. In HALF_OPEN only
    /// one caller gets through as the probe; concurrent callers are rejected
    /// the same way until the probe reports.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let mut guard = ProbeGuard {
            breaker: self,
            armed: matches!(admission, Admission::Probe),
        };

        let result = f().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.on_success(),
            Err(e) if e.is_retryable() => self.on_failure(e),
            Err(_) => self.on_neutral(),
        }
        result
    }

    fn admit(&self) -> Result<Admission> {
        let mut inner = self.lock();
        let now = Instant::now();
        match self.effective_state(&inner, now) {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                let was_open = inner.state == CircuitState::Open;
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                drop(inner);
                if was_open {
                    self.transitioned(CircuitState::HalfOpen);
                }
                debug!(service = %self.name, "admitting half-open probe");
                Ok(Admission::Probe)
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL,
                    "service" => self.name.clone(),
                )
                .increment(1);
                debug!(service = %self.name, "call rejected by open circuit");
                Err(OntomapError::CircuitOpen {
                    service: self.name.clone(),
                })
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        let from = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        inner.last_success = Some(SystemTime::now());
        drop(inner);
        if from != CircuitState::Closed {
            self.transitioned(CircuitState::Closed);
        }
    }

    fn on_failure(&self, error: &OntomapError) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure = Some(SystemTime::now());
        inner.probe_in_flight = false;

        let opens = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        let failures = inner.consecutive_failures;
        if opens {
            inner.state = CircuitState::Open;
        }
        drop(inner);

        if opens {
            warn!(
                service = %self.name,
                consecutive_failures = failures,
                recovery_timeout_secs = self.config.recovery_timeout.as_secs_f64(),
                error = %error,
                "circuit opened"
            );
            self.transitioned(CircuitState::Open);
        }
    }

    /// Non-retryable failure: state, counters and the recovery window are
    /// left alone. Only the wall-clock failure time moves, and a probe slot
    /// is handed back.
    fn on_neutral(&self) {
        let mut inner = self.lock();
        inner.probe_in_flight = false;
        inner.last_failure = Some(SystemTime::now());
    }

    fn effective_state(&self, inner: &BreakerInner, now: Instant) -> CircuitState {
        match inner.state {
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            state => state,
        }
    }

    fn transitioned(&self, to: CircuitState) {
        metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
            "service" => self.name.clone(),
            "to" => to.as_str(),
        )
        .increment(1);
        info!(service = %self.name, to = %to, "circuit state changed");
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_opens_on_threshold() {
        let config = CircuitBreakerConfig::disabled();
        assert_eq!(config.failure_threshold, u32::MAX);
    }

    #[test]
    fn threshold_floor_is_one() {
        assert_eq!(CircuitBreakerConfig::new().failure_threshold(0).failure_threshold, 1);
    }

    #[test]
    fn new_breaker_is_closed() {
        let breaker = CircuitBreaker::new("ols", CircuitBreakerConfig::default());
        assert_eq!(breaker.state(), CircuitState::Closed);
        let snap = breaker.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.last_failure.is_none());
    }
}
