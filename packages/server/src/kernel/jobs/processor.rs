//! Job processor: owns the job state machine.
//!
//! ```text
//! PENDING ──claim──► PROCESSING ──ok──► COMPLETED ──chain──► follow-up job
//!    ▲                   │
//!    └──attempts left────┤
//!                        └──exhausted──► FAILED ──► handler.on_failure
//! ```
//!
//! The processor never schedules the next attempt itself. A job left PENDING
//! is picked up again by whoever invokes `process_job` next (see
//! `JobDispatcher::redispatch_pending`).
//!
//! A claim holds a lease of `lease_timeout`. A job still PROCESSING after that
//! (its worker was killed, or lost the store before recording the outcome)
//! is claimed again as a new attempt, or failed if that was its last one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::chain::ChainRules;
use super::handler::JobHandler;
use super::job::{cutoff, Job, JobStatus, NewJob, DEFAULT_LEASE_TIMEOUT};
use super::registry::SharedHandlerRegistry;
use super::store::JobStore;

/// How many chained follow-ups a single `process_job` call will run.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 4;

/// Error recorded on a job whose final attempt never reported back.
pub const LEASE_EXPIRED_ERROR: &str = "job lease expired on its final attempt";

/// What happened to a job during one `process_job` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No job with that id.
    Missing,
    /// The job was not PENDING, so it was left alone.
    Skipped(JobStatus),
    Completed,
    /// The attempt failed and the job went back to PENDING.
    Retrying { attempts: i32, max_attempts: i32 },
    /// The attempt failed and no attempts remain.
    Failed { error: String },
}

pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    registry: SharedHandlerRegistry,
    chains: ChainRules,
    max_chain_depth: usize,
    lease_timeout: Duration,
}

impl JobProcessor {
    pub fn new(store: Arc<dyn JobStore>, registry: SharedHandlerRegistry) -> Self {
        Self {
            store,
            registry,
            chains: ChainRules::default(),
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }

    pub fn with_chains(mut self, chains: ChainRules) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    pub fn with_lease_timeout(mut self, lease_timeout: Duration) -> Self {
        self.lease_timeout = lease_timeout;
        self
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Run one attempt of a job, then any chained follow-ups it produces.
    ///
    /// Handler failures become state transitions; only store errors are
    /// returned. The outcome describes the job that was asked for, not its
    /// follow-ups.
    pub async fn process_job(&self, job_id: Uuid) -> Result<ProcessOutcome> {
        let mut pending = VecDeque::from([(job_id, 0usize)]);
        let mut root_outcome = None;

        while let Some((id, depth)) = pending.pop_front() {
            let can_chain = depth < self.max_chain_depth;
            let (outcome, follow_up) = self.run_attempt(id, can_chain).await?;

            if let Some(child_id) = follow_up {
                pending.push_back((child_id, depth + 1));
            }
            if root_outcome.is_none() {
                root_outcome = Some(outcome);
            }
        }

        Ok(root_outcome.unwrap_or(ProcessOutcome::Missing))
    }

    async fn run_attempt(
        &self,
        job_id: Uuid,
        can_chain: bool,
    ) -> Result<(ProcessOutcome, Option<Uuid>)> {
        let Some(existing) = self.store.find_by_id(job_id).await? else {
            warn!(job_id = %job_id, "job not found, nothing to process");
            return Ok((ProcessOutcome::Missing, None));
        };

        let lease_cutoff = cutoff(self.lease_timeout);
        let Some(job) = self.store.claim(job_id, lease_cutoff).await? else {
            if existing.lease_expired(lease_cutoff) {
                if let Some(expired) = self
                    .store
                    .expire_lease(job_id, lease_cutoff, LEASE_EXPIRED_ERROR)
                    .await?
                {
                    return Ok((self.fail_expired(expired).await, None));
                }
            }
            info!(
                job_id = %job_id,
                status = %existing.status,
                "job is not claimable, skipping"
            );
            return Ok((ProcessOutcome::Skipped(existing.status), None));
        };

        if existing.status == JobStatus::Processing {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = job.attempts,
                "lease expired, reclaimed job"
            );
        }

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            "processing job"
        );

        let handler = self.registry.get(job.job_type);
        let result = match &handler {
            Some(handler) => run_handler(Arc::clone(handler), job.input.clone()).await,
            None => Err(anyhow!("no handler registered for type: {}", job.job_type)),
        };

        match result {
            Ok(output) => {
                self.store.mark_completed(job.id, output).await?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed");

                let follow_up = self.create_follow_up(&job, can_chain).await?;
                Ok((ProcessOutcome::Completed, follow_up))
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let outcome = self.record_failure(&job, handler, message).await?;
                Ok((outcome, None))
            }
        }
    }

    async fn record_failure(
        &self,
        job: &Job,
        handler: Option<Arc<dyn JobHandler>>,
        message: String,
    ) -> Result<ProcessOutcome> {
        // Re-read: attempts may have moved under a concurrent invocation.
        let current = self
            .store
            .find_by_id(job.id)
            .await?
            .unwrap_or_else(|| job.clone());

        if current.attempts_exhausted() {
            self.store.mark_failed(job.id, &message).await?;
            error!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = current.attempts,
                error = %message,
                "job failed permanently"
            );

            if let Some(handler) = handler {
                run_compensation(job.id, handler, job.input.clone(), message.clone()).await;
            }
            return Ok(ProcessOutcome::Failed { error: message });
        }

        self.store.mark_pending(job.id).await?;
        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = current.attempts,
            max_attempts = current.max_attempts,
            error = %message,
            "job attempt failed, will retry"
        );
        Ok(ProcessOutcome::Retrying {
            attempts: current.attempts,
            max_attempts: current.max_attempts,
        })
    }

    async fn fail_expired(&self, job: Job) -> ProcessOutcome {
        error!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            "job lease expired on final attempt, failing"
        );
        if let Some(handler) = self.registry.get(job.job_type) {
            run_compensation(job.id, handler, job.input, LEASE_EXPIRED_ERROR.to_string()).await;
        }
        ProcessOutcome::Failed {
            error: LEASE_EXPIRED_ERROR.to_string(),
        }
    }

    async fn create_follow_up(&self, parent: &Job, can_chain: bool) -> Result<Option<Uuid>> {
        let Some(rule) = self.chains.rule_for(parent.job_type) else {
            return Ok(None);
        };
        let Some(input) = rule.follow_up_input(&parent.input) else {
            debug!(job_id = %parent.id, key = rule.carry_key, "no correlating id, not chaining");
            return Ok(None);
        };
        if !can_chain {
            warn!(
                job_id = %parent.id,
                next_type = %rule.to,
                max_depth = self.max_chain_depth,
                "chain depth limit reached, follow-up not created"
            );
            return Ok(None);
        }

        let child = self
            .store
            .insert(NewJob::new(rule.to, input, parent.created_by_id))
            .await?;
        info!(
            parent_id = %parent.id,
            job_id = %child.id,
            job_type = %child.job_type,
            "chained follow-up job"
        );
        Ok(Some(child.id))
    }
}

/// Execute on its own task so a panicking handler is just a failed attempt.
async fn run_handler(handler: Arc<dyn JobHandler>, input: Value) -> Result<Value> {
    match tokio::spawn(async move { handler.execute(input).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(anyhow!("handler panicked")),
        Err(_) => Err(anyhow!("handler cancelled")),
    }
}

async fn run_compensation(
    job_id: Uuid,
    handler: Arc<dyn JobHandler>,
    input: Value,
    message: String,
) {
    let task = tokio::spawn(async move { handler.on_failure(&input, &message).await });
    if let Err(e) = task.await {
        error!(job_id = %job_id, error = %e, "compensating action panicked");
    }
}
