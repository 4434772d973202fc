// Resilience primitives for calls to unreliable external services.
pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState, CircuitStats,
    FailureClassifier, StateObserver,
};
pub use retry::{
    backoff_delay, with_retry, RetryConfigError, RetryObserver, RetryOptions, RetryPredicate,
};
