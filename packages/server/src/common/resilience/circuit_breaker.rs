//! Circuit breaker around calls to one external dependency.
//!
//! ```text
//! Closed ──failures >= threshold──► Open
//! Open ──reset_timeout elapsed, next call──► HalfOpen
//! HalfOpen ──success_threshold successes──► Closed
//! HalfOpen ──any counted failure──► Open
//! ```
//!
//! Only one trial call runs at a time in HalfOpen; other calls are rejected as if
//! the circuit were open. State is process-local and starts Closed.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

pub type FailureClassifier = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;
pub type StateObserver = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

#[derive(Clone, TypedBuilder)]
pub struct CircuitBreakerConfig {
    /// Counted failures in Closed before the circuit opens.
    #[builder(default = 5)]
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed.
    #[builder(default = Duration::from_secs(30))]
    pub reset_timeout: Duration,
    /// Consecutive HalfOpen successes needed to close again.
    #[builder(default = 2)]
    pub success_threshold: u32,
    /// Decides whether an error counts against the circuit. Default: all do.
    #[builder(default, setter(strip_option))]
    pub is_failure: Option<FailureClassifier>,
    #[builder(default, setter(strip_option))]
    pub on_state_change: Option<StateObserver>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("success_threshold", &self.success_threshold)
            .finish_non_exhaustive()
    }
}

/// Returned instead of running the operation while the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            trial_in_flight: false,
        }
    }
}

type Transition = Option<(CircuitState, CircuitState)>;

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.lock();
        CircuitStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
        }
    }

    /// Force the circuit closed and clear all counters.
    pub fn reset(&self) {
        let from = {
            let mut inner = self.lock();
            let from = inner.state;
            *inner = Inner::closed();
            from
        };
        if from != CircuitState::Closed {
            self.notify(Some((from, CircuitState::Closed)));
        }
    }

    /// Run `op` unless the circuit is open.
    ///
    /// Fails with [`CircuitOpenError`] without calling `op` when the circuit
    /// rejects the call. Otherwise returns whatever `op` returned.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let is_trial = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: is_trial,
        };

        let result = op().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.on_success(is_trial),
            Err(e) if self.counts(e) => self.on_failure(is_trial),
            Err(_) => {
                if is_trial {
                    self.release_trial();
                }
            }
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn counts(&self, error: &anyhow::Error) -> bool {
        self.config.is_failure.as_ref().map_or(true, |f| f(error))
    }

    /// Returns whether the admitted call is the HalfOpen trial call.
    fn admit(&self) -> Result<bool, CircuitOpenError> {
        let mut transition = None;
        let admitted = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => Ok(false),
                CircuitState::Open => {
                    let waited = inner
                        .last_failure
                        .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                    if waited {
                        inner.state = CircuitState::HalfOpen;
                        inner.success_count = 0;
                        inner.trial_in_flight = true;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                        Ok(true)
                    } else {
                        Err(self.open_error())
                    }
                }
                CircuitState::HalfOpen if inner.trial_in_flight => Err(self.open_error()),
                CircuitState::HalfOpen => {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        };
        self.notify(transition);
        admitted
    }

    fn on_success(&self, is_trial: bool) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            if is_trial {
                inner.trial_in_flight = false;
            }
            match inner.state {
                CircuitState::Closed => inner.failure_count = 0,
                // Calls admitted before the circuit opened may land here late;
                // only trial calls count toward closing.
                CircuitState::HalfOpen if is_trial => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        *inner = Inner::closed();
                        transition = Some((CircuitState::HalfOpen, CircuitState::Closed));
                    }
                }
                CircuitState::HalfOpen | CircuitState::Open => {}
            }
        }
        self.notify(transition);
    }

    fn on_failure(&self, is_trial: bool) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            let now = Instant::now();
            if is_trial {
                inner.trial_in_flight = false;
            }
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count += 1;
                    inner.last_failure = Some(now);
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        transition = Some((CircuitState::Closed, CircuitState::Open));
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.success_count = 0;
                    inner.failure_count += 1;
                    inner.last_failure = Some(now);
                    transition = Some((CircuitState::HalfOpen, CircuitState::Open));
                }
                CircuitState::Open => inner.last_failure = Some(now),
            }
        }
        self.notify(transition);
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            name: self.name.clone(),
        }
    }

    // Called with the lock released so observers may inspect the breaker.
    fn notify(&self, transition: Transition) {
        let Some((from, to)) = transition else {
            return;
        };
        match to {
            CircuitState::Open => warn!(breaker = %self.name, from = %from, "circuit opened"),
            _ => info!(breaker = %self.name, from = %from, to = %to, "circuit state changed"),
        }
        if let Some(observer) = &self.config.on_state_change {
            observer(from, to);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Frees the HalfOpen trial slot if the trial future is dropped mid-flight.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}
