//! PostgreSQL-backed job store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::job::{Job, NewJob, StaleCutoffs};
use super::store::{JobStore, JobStoreError};

const JOB_COLUMNS: &str = "id, job_type, status, input, result, error, attempts, max_attempts, \
     created_by_id, created_at, started_at, completed_at, updated_at";

/// Job store over the `jobs` table (see `migrations/`).
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run job migrations")?;
        Ok(())
    }

    /// Run an `UPDATE ... RETURNING` that must hit job `id`.
    async fn fetch_updated(
        &self,
        id: Uuid,
        query: QueryAs<'_, Postgres, Job, PgArguments>,
    ) -> Result<Job> {
        query
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(id).into())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, new_job: NewJob) -> Result<Job> {
        new_job.validate()?;
        let job = Job::from_new(new_job);

        let sql = format!(
            r#"
            INSERT INTO jobs (
                id, job_type, status, input, attempts, max_attempts,
                created_by_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {JOB_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Job>(&sql)
            .bind(job.id)
            .bind(job.job_type)
            .bind(job.status)
            .bind(&job.input)
            .bind(job.attempts)
            .bind(job.max_attempts)
            .bind(job.created_by_id)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await
            .context("failed to insert job")
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn claim(&self, id: Uuid, lease_expired_before: DateTime<Utc>) -> Result<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'PROCESSING',
                started_at = COALESCE(started_at, NOW()),
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = $1
              AND (
                status = 'PENDING'
                OR (status = 'PROCESSING' AND updated_at <= $2 AND attempts < max_attempts)
              )
            RETURNING {JOB_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(lease_expired_before)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn expire_lease(
        &self,
        id: Uuid,
        lease_expired_before: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'FAILED',
                error = $3,
                result = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PROCESSING'
              AND updated_at <= $2
              AND attempts >= max_attempts
            RETURNING {JOB_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(lease_expired_before)
            .bind(error)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'COMPLETED',
                result = $2,
                error = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        self.fetch_updated(id, sqlx::query_as(&sql).bind(id).bind(result)).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Job> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'FAILED',
                error = $2,
                result = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        self.fetch_updated(id, sqlx::query_as(&sql).bind(id).bind(error)).await
    }

    async fn mark_pending(&self, id: Uuid) -> Result<Job> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'PENDING',
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        self.fetch_updated(id, sqlx::query_as(&sql).bind(id)).await
    }

    async fn find_redispatchable(&self, limit: i64, cutoffs: StaleCutoffs) -> Result<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE (
                status = 'PENDING'
                AND attempts < max_attempts
                AND (attempts > 0 OR updated_at <= $2)
              )
              OR (status = 'PROCESSING' AND updated_at <= $3)
            ORDER BY created_at ASC
            LIMIT $1
            "#
        );
        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(limit)
            .bind(cutoffs.unclaimed_before)
            .bind(cutoffs.lease_expired_before)
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }
}
