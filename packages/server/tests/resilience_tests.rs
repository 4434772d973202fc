//! Circuit breaker and backoff retry behaviour as seen by callers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use intake_core::common::resilience::{
    backoff_delay, with_retry, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError,
    CircuitState, RetryOptions, RetryPredicate,
};
use std::sync::Arc;

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "document_extractor",
        CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .success_threshold(2)
            .reset_timeout(Duration::from_millis(1000))
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn two_failures_open_the_circuit_and_block_calls() {
    let cb = breaker();
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        let _ = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow!("timeout"))
            })
            .await;
    }
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_millis(999)).await;
    let err = cb
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(err.downcast_ref::<CircuitOpenError>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn half_open_needs_two_successes_to_close() {
    let cb = breaker();
    for _ in 0..2 {
        let _ = cb.execute(|| async { Err::<(), _>(anyhow!("down")) }).await;
    }
    tokio::time::advance(Duration::from_millis(1000)).await;

    cb.execute(|| async { Ok(()) }).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    cb.execute(|| async { Ok(()) }).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn half_open_failure_returns_to_open() {
    let cb = breaker();
    for _ in 0..2 {
        let _ = cb.execute(|| async { Err::<(), _>(anyhow!("down")) }).await;
    }
    tokio::time::advance(Duration::from_millis(1000)).await;

    let err = cb
        .execute(|| async { Err::<(), _>(anyhow!("still down")) })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "still down");
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn retry_invokes_exactly_max_attempts_and_returns_final_error() {
    let calls = AtomicU32::new(0);
    let options = RetryOptions::builder().max_attempts(3).build();

    let err = with_retry(
        || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(anyhow!("attempt {} failed", n))
        },
        &options,
    )
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.to_string(), "attempt 3 failed");
}

#[tokio::test(start_paused = true)]
async fn non_retryable_errors_are_attempted_once() {
    let calls = AtomicU32::new(0);
    let options = RetryOptions::builder()
        .max_attempts(10)
        .is_retryable(Arc::new(|_: &anyhow::Error| false) as RetryPredicate)
        .build();

    let _ = with_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("bad request"))
        },
        &options,
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn backoff_never_exceeds_max_delay() {
    let base = Duration::from_millis(200);
    let max = Duration::from_millis(5000);

    for attempt in 1..=64 {
        assert!(backoff_delay(attempt, base, max) <= max);
    }
    assert!(
        backoff_delay(3, Duration::from_secs(10), Duration::from_secs(1))
            <= Duration::from_secs(1)
    );
}
