use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::kernel::jobs::{JobDispatcher, JobEnvelope};
use crate::server::app::WorkerState;

/// How many jobs one redispatch sweep routes again.
pub const REDISPATCH_BATCH_SIZE: i64 = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub success: bool,
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Remote invocation target: runs one job to completion.
///
/// Handler failures are recorded on the job itself, so `success` is only
/// false when the job store could not be reached.
pub async fn process_job_handler(
    Extension(state): Extension<WorkerState>,
    Json(envelope): Json<JobEnvelope>,
) -> (StatusCode, Json<WorkerResponse>) {
    let job_id = envelope.job_id;

    match state.processor.process_job(job_id).await {
        Ok(outcome) => {
            debug!(job_id = %job_id, outcome = ?outcome, "worker processed job");
            (
                StatusCode::OK,
                Json(WorkerResponse {
                    success: true,
                    job_id,
                    error: None,
                }),
            )
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!(job_id = %job_id, error = %message, "worker failed to process job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WorkerResponse {
                    success: false,
                    job_id,
                    error: Some(message),
                }),
            )
        }
    }
}

/// Periodically route abandoned jobs again (see
/// [`JobDispatcher::redispatch_pending`]). `every` must be non-zero.
pub fn spawn_redispatch_loop(dispatcher: Arc<JobDispatcher>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = every.as_secs(), "job redispatch loop started");

        loop {
            ticker.tick().await;
            match dispatcher.redispatch_pending(REDISPATCH_BATCH_SIZE).await {
                Ok(0) => {}
                Ok(count) => info!(count, "re-dispatched pending jobs"),
                Err(e) => error!(error = %format!("{:#}", e), "job redispatch sweep failed"),
            }
        }
    })
}
