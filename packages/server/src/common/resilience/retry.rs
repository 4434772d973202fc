//! Bounded retry with exponential backoff and jitter.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;
use typed_builder::TypedBuilder;

pub type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;
pub type RetryObserver = Arc<dyn Fn(&anyhow::Error, u32) + Send + Sync>;

/// Options for [`with_retry`].
#[derive(Clone, TypedBuilder)]
pub struct RetryOptions {
    /// Total attempts, including the first.
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_millis(200))]
    pub base_delay: Duration,
    #[builder(default = Duration::from_millis(5000))]
    pub max_delay: Duration,
    /// Errors this rejects are returned without further attempts.
    #[builder(default, setter(strip_option))]
    pub is_retryable: Option<RetryPredicate>,
    /// Called with the error and the attempt number before each sleep.
    #[builder(default, setter(strip_option))]
    pub on_retry: Option<RetryObserver>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RetryConfigError {
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),
}

/// Delay before the retry that follows `attempt` (1-based):
/// `min(base * 2^(attempt-1) + jitter, max)` with jitter uniform in `[0, base)`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let exponential = base.saturating_mul(1u32 << exponent);

    let base_ms = base.as_millis() as u64;
    let jitter = if base_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(fastrand::u64(0..base_ms))
    };

    exponential.saturating_add(jitter).min(max)
}

/// Run `op` until it succeeds, the predicate rejects its error, or
/// `max_attempts` runs out. The error returned is always the last attempt's.
pub async fn with_retry<T, F, Fut>(mut op: F, options: &RetryOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if options.max_attempts < 1 {
        return Err(RetryConfigError::InvalidMaxAttempts(options.max_attempts).into());
    }

    let mut attempt = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let retryable = options.is_retryable.as_ref().map_or(true, |p| p(&err));
        if attempt >= options.max_attempts || !retryable {
            return Err(err);
        }

        if let Some(on_retry) = &options.on_retry {
            on_retry(&err, attempt);
        }

        let delay = backoff_delay(attempt, options.base_delay, options.max_delay);
        warn!(
            attempt,
            max_attempts = options.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "operation failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn fast() -> RetryOptions {
        RetryOptions::builder()
            .base_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(50))
            .build()
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);

        let first = backoff_delay(1, base, max);
        assert!(first >= base && first < base * 2);

        let third = backoff_delay(3, base, max);
        assert!(third >= base * 4 && third < base * 5);

        assert_eq!(backoff_delay(10, base, max), max);
        assert_eq!(backoff_delay(u32::MAX, base, max), max);
    }

    #[test]
    fn zero_base_has_no_jitter() {
        let d = backoff_delay(2, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(d, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let value = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(anyhow!("flaky {}", n))
                } else {
                    Ok(n)
                }
            },
            &fast(),
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let err = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(anyhow!("failure {}", n))
            },
            &fast(),
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "failure 3");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let transient: RetryPredicate =
            Arc::new(|e: &anyhow::Error| !e.to_string().contains("permanent"));
        let options = RetryOptions::builder().is_retryable(transient).build();

        let err = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow!("permanent"))
            },
            &options,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "permanent");
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_each_retry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = RetryOptions::builder()
            .max_attempts(4)
            .base_delay(Duration::from_millis(5))
            .on_retry(Arc::new(move |_: &anyhow::Error, attempt: u32| {
                sink.lock().unwrap().push(attempt);
            }) as RetryObserver)
            .build();

        let _ = with_retry(|| async { Err::<(), _>(anyhow!("down")) }, &options).await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_attempts_is_a_config_error() {
        let calls = AtomicU32::new(0);
        let options = RetryOptions::builder().max_attempts(0).build();

        let err = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &options,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            err.downcast_ref::<RetryConfigError>(),
            Some(&RetryConfigError::InvalidMaxAttempts(0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let options = RetryOptions::builder()
            .max_attempts(2)
            .base_delay(Duration::from_millis(100))
            .build();

        let _ = with_retry(|| async { Err::<(), _>(anyhow!("down")) }, &options).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }
}
