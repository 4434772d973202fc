//! Handler contract for job types.

use std::future::Future;
use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Executes the work behind one job type.
///
/// Any error returned from `execute` is treated the same way by the processor,
/// whatever its cause. Handlers may run more than once for the same job, so
/// they should tolerate re-execution after a partial failure.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Turn the job input into a result.
    async fn execute(&self, input: Value) -> Result<Value>;

    /// Compensating action, run once when the job reaches FAILED.
    ///
    /// Best-effort: implementations log their own failures.
    async fn on_failure(&self, input: &Value, error: &str) {
        let _ = (input, error);
    }
}

/// A handler backed by an async closure. Has no compensating action.
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a [`JobHandler`].
///
/// ```ignore
/// registry.register(JobType::AiPreview, handler_fn(|input| async move {
///     Ok(json!({ "echo": input }))
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnHandler {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, input: Value) -> Result<Value> {
        (self.f)(input).await
    }
}
