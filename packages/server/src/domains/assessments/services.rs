//! External collaborators of the assessment handlers, each behind its own
//! circuit breaker.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use super::models::is_input_error;
use crate::common::resilience::{
    with_retry, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, FailureClassifier,
    RetryOptions, RetryPredicate,
};
use crate::kernel::{BaseAI, BaseDocumentExtractor, BaseDocumentRepository, BaseReportRenderer};

pub struct AssessmentServices {
    pub extractor: Arc<dyn BaseDocumentExtractor>,
    pub repository: Arc<dyn BaseDocumentRepository>,
    pub ai: Arc<dyn BaseAI>,
    pub renderer: Arc<dyn BaseReportRenderer>,
    pub extractor_breaker: CircuitBreaker,
    pub ai_breaker: CircuitBreaker,
    pub renderer_breaker: CircuitBreaker,
    pub retry: RetryOptions,
}

impl AssessmentServices {
    pub fn new(
        extractor: Arc<dyn BaseDocumentExtractor>,
        repository: Arc<dyn BaseDocumentRepository>,
        ai: Arc<dyn BaseAI>,
        renderer: Arc<dyn BaseReportRenderer>,
    ) -> Self {
        Self {
            extractor,
            repository,
            ai,
            renderer,
            extractor_breaker: CircuitBreaker::new("document_extractor", breaker_config()),
            ai_breaker: CircuitBreaker::new("llm", breaker_config()),
            renderer_breaker: CircuitBreaker::new("report_renderer", breaker_config()),
            retry: default_retry(),
        }
    }

    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Run `op` through `breaker`, retrying with backoff.
    pub async fn guarded<T, F, Fut>(&self, breaker: &CircuitBreaker, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(|| breaker.execute(&op), &self.retry).await
    }
}

/// Bad input is the caller's fault, not the dependency's.
pub fn breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .is_failure(Arc::new(|e: &anyhow::Error| !is_input_error(e)) as FailureClassifier)
        .build()
}

/// Retry transient failures only: bad input and open circuits fail fast.
pub fn default_retry() -> RetryOptions {
    RetryOptions::builder()
        .is_retryable(Arc::new(|e: &anyhow::Error| {
            !is_input_error(e) && e.downcast_ref::<CircuitOpenError>().is_none()
        }) as RetryPredicate)
        .build()
}
