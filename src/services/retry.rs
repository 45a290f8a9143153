//! Retry configuration and the shared retry loop.
//!
//! [`RetryConfig`] shapes the backoff curve; [`with_retry`] runs an
//! operation under it. The loop checks a [`CancellationToken`] before every
//! attempt and races every backoff sleep against it, so a cancelled caller
//! is released within one backoff interval.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::telemetry;
use crate::{OntomapError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Exponential backoff with optional jitter:
///
/// ```rust
/// # use ontomap::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(false);
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial request. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Cap on any single delay. Default: 60s.
    pub max_delay: Duration,
    /// Growth factor per attempt. Default: 2.0.
    pub exponential_base: f64,
    /// Multiply each delay by a uniform factor in [0.5, 1.5). Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retry.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Total attempts including the initial request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff for a 0-indexed attempt, without jitter:
    /// `min(initial_delay * exponential_base^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay to sleep before the retry that follows a failed `attempt`.
    ///
    /// A `retry_after` hint from the server wins, capped at `max_delay`.
    /// Rate limits without a hint back off one step further than other
    /// transient errors.
    pub fn effective_delay(&self, attempt: u32, error: &OntomapError) -> Duration {
        if let Some(hint) = error.retry_after() {
            return hint.min(self.max_delay);
        }
        let base = match error {
            OntomapError::RateLimited { .. } => self.delay_for_attempt(attempt.saturating_add(1)),
            _ => self.delay_for_attempt(attempt),
        };
        if self.jitter {
            base.mul_f64(0.5 + fastrand::f64())
        } else {
            base
        }
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an async operation with retry logic.
///
/// Retries errors classified by [`OntomapError::is_retryable()`] up to
/// `config.max_retries` times. Non-retryable errors are returned on first
/// occurrence. Returns [`OntomapError::Cancelled`] as soon as `cancel` fires,
/// whether before an attempt or during a backoff sleep.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    service: &str,
    cancel: &CancellationToken,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(OntomapError::Cancelled);
        }
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => e,
            Err(e) => return Err(e),
        };

        let delay = config.effective_delay(attempt, &err);
        metrics::counter!(telemetry::RETRIES_TOTAL, "service" => service.to_owned()).increment(1);
        warn!(
            service,
            attempt = attempt + 1,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient error"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(OntomapError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_sequence_without_jitter() {
        let config = RetryConfig::new()
            .jitter(false)
            .max_delay(Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|a| config.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn huge_attempt_is_capped() {
        let config = RetryConfig::new();
        assert_eq!(config.delay_for_attempt(u32::MAX), config.max_delay);
    }

    #[test]
    fn jitter_stays_in_range() {
        let config = RetryConfig::new().initial_delay(Duration::from_secs(2));
        let err = OntomapError::Network("reset".into());
        for _ in 0..200 {
            let d = config.effective_delay(0, &err);
            assert!(d >= Duration::from_secs(1), "{d:?}");
            assert!(d < Duration::from_secs(3), "{d:?}");
        }
    }

    #[test]
    fn rate_limit_backs_off_further() {
        let config = RetryConfig::new().jitter(false);
        let limited = OntomapError::RateLimited { retry_after: None };
        let network = OntomapError::Network("x".into());
        assert!(config.effective_delay(0, &limited) > config.effective_delay(0, &network));

        let hinted = OntomapError::RateLimited {
            retry_after: Some(Duration::from_millis(250)),
        };
        assert_eq!(config.effective_delay(3, &hinted), Duration::from_millis(250));
    }
}
