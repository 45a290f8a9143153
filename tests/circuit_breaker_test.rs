//! Circuit breaker state machine, driven on a paused clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ontomap::{CircuitBreaker, CircuitBreakerConfig, CircuitState, OntomapError, Result};
use tokio::sync::oneshot;

const RECOVERY: Duration = Duration::from_secs(60);

fn breaker(threshold: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        "mock",
        CircuitBreakerConfig::new()
            .failure_threshold(threshold)
            .recovery_timeout(RECOVERY),
    )
}

async fn fail(breaker: &CircuitBreaker) -> Result<()> {
    breaker
        .call(|| async { Err::<(), _>(OntomapError::Network("reset".into())) })
        .await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<()> {
    breaker.call(|| async { Ok(()) }).await
}

#[tokio::test(start_paused = true)]
async fn opens_after_exactly_threshold_failures() {
    let breaker = breaker(3);
    for _ in 0..2 {
        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.consecutive_failures(), 3);
}

#[tokio::test(start_paused = true)]
async fn success_resets_failure_count() {
    let breaker = breaker(3);
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    succeed(&breaker).await.unwrap();
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_rejects_without_calling() {
    let breaker = breaker(1);
    fail(&breaker).await.unwrap_err();

    let calls = AtomicU32::new(0);
    let result = breaker
        .call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(OntomapError::CircuitOpen { ref service }) if service == "mock"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::advance(RECOVERY - Duration::from_secs(1)).await;
    assert!(matches!(
        succeed(&breaker).await,
        Err(OntomapError::CircuitOpen { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn transitions_to_half_open_lazily() {
    let breaker = breaker(1);
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(RECOVERY).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn half_open_allows_exactly_one_probe() {
    let breaker = breaker(1);
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(RECOVERY).await;

    let (release, hold) = oneshot::channel::<()>();
    let probe = breaker.call(|| async move {
        let _ = hold.await;
        Ok(())
    });
    tokio::pin!(probe);

    // Drive the probe until it parks on the channel.
    tokio::select! {
        biased;
        _ = &mut probe => panic!("probe finished early"),
        _ = tokio::task::yield_now() => {}
    }

    assert!(matches!(
        succeed(&breaker).await,
        Err(OntomapError::CircuitOpen { .. })
    ));

    release.send(()).unwrap();
    probe.await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    succeed(&breaker).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_probe_reopens_for_another_window() {
    let breaker = breaker(2);
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(RECOVERY).await;

    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(RECOVERY / 2).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    tokio::time::advance(RECOVERY / 2).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn abandoned_probe_releases_slot() {
    let breaker = breaker(1);
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(RECOVERY).await;

    let stalled = breaker.call(|| std::future::pending::<Result<()>>());
    let timed_out = tokio::time::timeout(Duration::from_secs(1), stalled).await;
    assert!(timed_out.is_err());

    // The dropped probe must not wedge the breaker in HALF_OPEN.
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_errors_do_not_trip() {
    let breaker = breaker(2);
    for _ in 0..5 {
        let result = breaker
            .call(|| async {
                Err::<(), _>(OntomapError::AuthenticationFailed {
                    service: "mock".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(OntomapError::AuthenticationFailed { .. })));
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

async fn reject_auth(breaker: &CircuitBreaker) -> Result<()> {
    breaker
        .call(|| async {
            Err::<(), _>(OntomapError::AuthenticationFailed {
                service: "mock".into(),
            })
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn non_retryable_failure_records_failure_time() {
    let breaker = breaker(2);
    assert!(breaker.snapshot().last_failure.is_none());

    reject_auth(&breaker).await.unwrap_err();
    let snap = breaker.snapshot();
    assert!(snap.last_failure.is_some());
    assert_eq!(snap.state, CircuitState::Closed);
    assert_eq!(snap.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_probe_keeps_recovery_window() {
    let breaker = breaker(1);
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(RECOVERY).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    reject_auth(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert!(succeed(&breaker).await.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn reset_and_snapshot() {
    let breaker = breaker(1);
    fail(&breaker).await.unwrap_err();

    let snap = breaker.snapshot();
    assert_eq!(snap.name, "mock");
    assert_eq!(snap.state, CircuitState::Open);
    assert_eq!(snap.failure_threshold, 1);
    assert_eq!(snap.recovery_timeout_secs, 60.0);
    assert!(snap.last_failure.is_some());
    assert!(snap.last_success.is_none());

    breaker.reset();
    assert_eq!(breaker.state(), CircuitState::Closed);
    succeed(&breaker).await.unwrap();
    assert!(breaker.snapshot().last_success.is_some());
}

#[tokio::test(start_paused = true)]
async fn disabled_breaker_never_opens() {
    let breaker = CircuitBreaker::new("mock", CircuitBreakerConfig::disabled());
    for _ in 0..100 {
        fail(&breaker).await.unwrap_err();
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}
