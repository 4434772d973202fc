//! Job storage.
//!
//! The store is the only state shared between concurrent processor runs, so
//! every transition here is a single store-level operation. In particular the
//! claim that moves a job into PROCESSING also increments `attempts`, and it
//! only succeeds while the job is still PENDING, or PROCESSING with an
//! expired lease (its worker died or lost the store mid-attempt).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{Job, JobStatus, NewJob, StaleCutoffs};

/// Durable record of job state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new PENDING job.
    async fn insert(&self, new_job: NewJob) -> Result<Job>;

    /// Fetch a job by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// Claim a job for processing.
    ///
    /// Sets `status = PROCESSING`, `started_at` (first time only) and
    /// increments `attempts` in one atomic step. A PENDING job is always
    /// claimable; a PROCESSING job only when it was last updated at or before
    /// `lease_expired_before` and still has attempts left. Returns `None`
    /// otherwise, or when the job is missing.
    async fn claim(&self, id: Uuid, lease_expired_before: DateTime<Utc>) -> Result<Option<Job>>;

    /// Fail a PROCESSING job whose lease expired on its final attempt.
    ///
    /// Returns `None` unless the job is PROCESSING, last updated at or before
    /// `lease_expired_before` and out of attempts.
    async fn expire_lease(
        &self,
        id: Uuid,
        lease_expired_before: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<Job>>;

    /// Record a successful result.
    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job>;

    /// Record a terminal failure.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Job>;

    /// Return a job to PENDING so a later invocation can retry it.
    async fn mark_pending(&self, id: Uuid) -> Result<Job>;

    /// Jobs the redispatch sweep should route again, oldest first.
    ///
    /// See [`Job::redispatchable`].
    async fn find_redispatchable(&self, limit: i64, cutoffs: StaleCutoffs) -> Result<Vec<Job>>;
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn insert(&self, new_job: NewJob) -> Result<Job> {
        (**self).insert(new_job).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        (**self).find_by_id(id).await
    }

    async fn claim(&self, id: Uuid, lease_expired_before: DateTime<Utc>) -> Result<Option<Job>> {
        (**self).claim(id, lease_expired_before).await
    }

    async fn expire_lease(
        &self,
        id: Uuid,
        lease_expired_before: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<Job>> {
        (**self).expire_lease(id, lease_expired_before, error).await
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job> {
        (**self).mark_completed(id, result).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Job> {
        (**self).mark_failed(id, error).await
    }

    async fn mark_pending(&self, id: Uuid) -> Result<Job> {
        (**self).mark_pending(id).await
    }

    async fn find_redispatchable(&self, limit: i64, cutoffs: StaleCutoffs) -> Result<Vec<Job>> {
        (**self).find_redispatchable(limit, cutoffs).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
}

/// In-memory job store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every stored job, oldest first.
    pub fn all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        all
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        apply(job);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, new_job: NewJob) -> Result<Job> {
        new_job.validate()?;
        let job = Job::from_new(new_job);
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(&id).cloned())
    }

    async fn claim(&self, id: Uuid, lease_expired_before: DateTime<Utc>) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        if !job.claimable(lease_expired_before) {
            return Ok(None);
        }

        let now = Utc::now();
        job.status = JobStatus::Processing;
        if job.started_at.is_none() {
            job.started_at = Some(now);
        }
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn expire_lease(
        &self,
        id: Uuid,
        lease_expired_before: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        if !job.lease_expired(lease_expired_before) || !job.attempts_exhausted() {
            return Ok(None);
        }

        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.result = None;
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job> {
        self.update(id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.error = None;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Job> {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.result = None;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn mark_pending(&self, id: Uuid) -> Result<Job> {
        self.update(id, |job| {
            job.status = JobStatus::Pending;
        })
    }

    async fn find_redispatchable(&self, limit: i64, cutoffs: StaleCutoffs) -> Result<Vec<Job>> {
        let mut ready: Vec<Job> = self
            .all()
            .into_iter()
            .filter(|job| job.redispatchable(cutoffs))
            .collect();
        ready.truncate(limit.max(0) as usize);
        Ok(ready)
    }
}
