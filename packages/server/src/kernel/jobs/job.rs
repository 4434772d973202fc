//! Job model for asynchronous intake work.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Default attempt ceiling for new jobs.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Recommended cadence for callers polling a job's status.
pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3);

/// How long a PROCESSING job may go untouched before another invocation may
/// claim it.
pub const DEFAULT_LEASE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// How long a never-claimed PENDING job waits before the redispatch sweep
/// routes it again.
pub const DEFAULT_DISPATCH_GRACE: std::time::Duration = std::time::Duration::from_secs(60);

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ParseDocument,
    GapDetection,
    RiskAnalysis,
    ReportGeneration,
    AiPreview,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::ParseDocument,
        JobType::GapDetection,
        JobType::RiskAnalysis,
        JobType::ReportGeneration,
        JobType::AiPreview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ParseDocument => "parse_document",
            JobType::GapDetection => "gap_detection",
            JobType::RiskAnalysis => "risk_analysis",
            JobType::ReportGeneration => "report_generation",
            JobType::AiPreview => "ai_preview",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown job type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// No further automatic transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// A persisted, trackable unit of asynchronous work.
///
/// Serialized in camelCase because this is the record callers poll.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub input: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_by_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build the initial PENDING record for a creation request.
    pub fn from_new(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: new_job.job_type,
            status: JobStatus::Pending,
            input: new_job.input,
            result: None,
            error: None,
            attempts: 0,
            max_attempts: new_job.max_attempts,
            created_by_id: new_job.created_by_id,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, requester_id: Uuid) -> bool {
        self.created_by_id == requester_id
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// PROCESSING and not updated since `before`: its worker is presumed gone.
    pub fn lease_expired(&self, before: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing && self.updated_at <= before
    }

    /// Whether a claim with the given lease cutoff may take this job.
    pub fn claimable(&self, lease_expired_before: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::Processing => {
                self.lease_expired(lease_expired_before) && !self.attempts_exhausted()
            }
            _ => false,
        }
    }

    /// Whether the redispatch sweep should route this job again.
    ///
    /// Covers PENDING jobs with attempts left that either failed an attempt or
    /// were never claimed within the dispatch grace, and PROCESSING jobs whose
    /// lease expired (including exhausted ones, which the processor fails).
    pub fn redispatchable(&self, cutoffs: StaleCutoffs) -> bool {
        match self.status {
            JobStatus::Pending => {
                !self.attempts_exhausted()
                    && (self.attempts > 0 || self.updated_at <= cutoffs.unclaimed_before)
            }
            JobStatus::Processing => self.lease_expired(cutoffs.lease_expired_before),
            _ => false,
        }
    }
}

/// Instants before which an untouched job counts as abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleCutoffs {
    /// A PENDING job not claimed since then lost its hand-off.
    pub unclaimed_before: DateTime<Utc>,
    /// A PROCESSING job not updated since then lost its worker.
    pub lease_expired_before: DateTime<Utc>,
}

impl StaleCutoffs {
    pub fn from_now(
        dispatch_grace: std::time::Duration,
        lease_timeout: std::time::Duration,
    ) -> Self {
        Self {
            unclaimed_before: cutoff(dispatch_grace),
            lease_expired_before: cutoff(lease_timeout),
        }
    }
}

/// `now - age`, saturating at the earliest representable instant.
pub fn cutoff(age: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, thiserror::Error)]
pub enum NewJobError {
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(i32),
}

/// Creation request for a job.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewJob {
    pub job_type: JobType,
    pub input: serde_json::Value,
    pub created_by_id: Uuid,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: i32,
}

impl NewJob {
    pub fn new(job_type: JobType, input: serde_json::Value, created_by_id: Uuid) -> Self {
        Self::builder()
            .job_type(job_type)
            .input(input)
            .created_by_id(created_by_id)
            .build()
    }

    pub fn validate(&self) -> Result<(), NewJobError> {
        if self.max_attempts < 1 {
            return Err(NewJobError::InvalidMaxAttempts(self.max_attempts));
        }
        Ok(())
    }
}
