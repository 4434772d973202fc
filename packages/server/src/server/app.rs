//! Worker application setup.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::kernel::jobs::{
    HttpJobInvoker, JobDispatcher, JobInvoker, JobProcessor, JobStore, SharedHandlerRegistry,
};
use crate::server::routes::{health_handler, process_job_handler};

/// Path the remote invoker posts job envelopes to.
pub const PROCESS_JOB_PATH: &str = "/internal/jobs/process";

/// Shared worker state
#[derive(Clone)]
pub struct WorkerState {
    pub processor: Arc<JobProcessor>,
}

/// Build the worker router.
pub fn build_worker_app(state: WorkerState) -> Router {
    Router::new()
        .route(PROCESS_JOB_PATH, post(process_job_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// Wire a processor from configuration.
pub fn build_processor(
    config: &Config,
    store: Arc<dyn JobStore>,
    registry: SharedHandlerRegistry,
) -> JobProcessor {
    JobProcessor::new(store, registry).with_lease_timeout(config.job_lease_timeout)
}

/// Wire a dispatcher from configuration.
///
/// Outside local environments the dispatcher hands jobs to `JOB_WORKER_URL`.
pub fn build_dispatcher(
    config: &Config,
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
) -> JobDispatcher {
    let invoker = config.job_worker_url.as_ref().map(|url| {
        info!(url = %url, "remote job worker configured");
        Arc::new(HttpJobInvoker::new(url.clone())) as Arc<dyn JobInvoker>
    });

    JobDispatcher::new(store, processor, invoker, config.environment)
        .with_default_max_attempts(config.job_max_attempts)
        .with_dispatch_grace(config.dispatch_grace)
}
