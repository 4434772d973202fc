//! Job creation, routing and lookup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::invoker::{JobEnvelope, JobInvoker};
use super::job::{
    Job, JobType, NewJob, StaleCutoffs, DEFAULT_DISPATCH_GRACE, DEFAULT_MAX_ATTEMPTS,
};
use super::processor::JobProcessor;
use super::store::JobStore;
use crate::config::Environment;

/// Where a job's execution was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionRoute {
    /// Spawned on this process.
    Local,
    /// Handed to the remote worker.
    Remote,
}

#[derive(Debug, thiserror::Error)]
pub enum JobLookupError {
    #[error("job not found")]
    NotFound,
    #[error("not authorized to view this job")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct JobDispatcher {
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
    invoker: Option<Arc<dyn JobInvoker>>,
    environment: Environment,
    default_max_attempts: i32,
    dispatch_grace: Duration,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: Arc<JobProcessor>,
        invoker: Option<Arc<dyn JobInvoker>>,
        environment: Environment,
    ) -> Self {
        Self {
            store,
            processor,
            invoker,
            environment,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            dispatch_grace: DEFAULT_DISPATCH_GRACE,
        }
    }

    /// Attempt ceiling applied by [`JobDispatcher::create`].
    pub fn with_default_max_attempts(mut self, max_attempts: i32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    /// How long a routed job may stay unclaimed before
    /// [`JobDispatcher::redispatch_pending`] routes it again.
    pub fn with_dispatch_grace(mut self, grace: Duration) -> Self {
        self.dispatch_grace = grace;
        self
    }

    pub fn processor(&self) -> &Arc<JobProcessor> {
        &self.processor
    }

    /// Persist a PENDING job and start it. Returns without waiting for it to run.
    pub async fn create(&self, job_type: JobType, input: Value, owner_id: Uuid) -> Result<Uuid> {
        let new_job = NewJob::builder()
            .job_type(job_type)
            .input(input)
            .created_by_id(owner_id)
            .max_attempts(self.default_max_attempts)
            .build();
        self.create_job(new_job).await
    }

    /// Like [`JobDispatcher::create`], for a fully specified request.
    pub async fn create_job(&self, new_job: NewJob) -> Result<Uuid> {
        let job = self.store.insert(new_job).await?;
        let route = self.route(job.id).await;
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            route = ?route,
            "job created"
        );
        Ok(job.id)
    }

    /// Current snapshot of a job, visible only to its creator.
    pub async fn find_one(&self, id: Uuid, requester_id: Uuid) -> Result<Job, JobLookupError> {
        let job = self.store.find_by_id(id).await?.ok_or(JobLookupError::NotFound)?;
        if !job.is_owned_by(requester_id) {
            return Err(JobLookupError::Forbidden);
        }
        Ok(job)
    }

    /// Route abandoned jobs again.
    ///
    /// Picks up PENDING jobs with attempts left that failed an attempt or were
    /// never claimed within the dispatch grace, and PROCESSING jobs past the
    /// processor's lease. Returns how many jobs were re-routed.
    pub async fn redispatch_pending(&self, limit: i64) -> Result<usize> {
        let cutoffs = StaleCutoffs::from_now(self.dispatch_grace, self.processor.lease_timeout());
        let jobs = self.store.find_redispatchable(limit, cutoffs).await?;
        for job in &jobs {
            let route = self.route(job.id).await;
            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                status = %job.status,
                attempts = job.attempts,
                route = ?route,
                "re-dispatched job"
            );
        }
        Ok(jobs.len())
    }

    async fn route(&self, job_id: Uuid) -> ExecutionRoute {
        if self.environment.is_local() {
            self.spawn_local(job_id);
            return ExecutionRoute::Local;
        }

        let Some(invoker) = &self.invoker else {
            warn!(
                job_id = %job_id,
                environment = %self.environment,
                "no remote worker configured, running job locally"
            );
            self.spawn_local(job_id);
            return ExecutionRoute::Local;
        };

        // A lost hand-off leaves the job PENDING and unclaimed; the redispatch
        // sweep routes it again once the dispatch grace has passed.
        if let Err(e) = invoker.invoke(JobEnvelope { job_id }).await {
            error!(
                job_id = %job_id,
                error = %format!("{:#}", e),
                "failed to hand job to remote worker"
            );
        }
        ExecutionRoute::Remote
    }

    fn spawn_local(&self, job_id: Uuid) {
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            if let Err(e) = processor.process_job(job_id).await {
                error!(
                    job_id = %job_id,
                    error = %format!("{:#}", e),
                    "local job processing failed"
                );
            }
        });
    }
}
