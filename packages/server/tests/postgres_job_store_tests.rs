//! PostgresJobStore against a real database.
//!
//! Requires Docker. Run with: cargo test --test postgres_job_store_tests -- --ignored

mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crate::common::PostgresHarness;
use intake_core::kernel::jobs::testing::MockJobHandler;
use intake_core::kernel::jobs::{
    cutoff, HandlerRegistry, JobProcessor, JobStatus, JobStore, JobType, NewJob, ProcessOutcome,
    StaleCutoffs, DEFAULT_DISPATCH_GRACE, DEFAULT_LEASE_TIMEOUT,
};
use serde_json::json;
use test_context::test_context;
use uuid::Uuid;

fn held() -> DateTime<Utc> {
    cutoff(DEFAULT_LEASE_TIMEOUT)
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn insert_and_find_round_trip(ctx: &PostgresHarness) {
    let job = ctx
        .store
        .insert(NewJob::new(
            JobType::ParseDocument,
            json!({ "documentId": "doc-1", "assessmentId": "a-1" }),
            ctx.owner_id,
        ))
        .await
        .unwrap();

    let found = ctx.store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(found.job_type, JobType::ParseDocument);
    assert_eq!(found.status, JobStatus::Pending);
    assert_eq!(found.input, json!({ "documentId": "doc-1", "assessmentId": "a-1" }));
    assert_eq!(found.attempts, 0);
    assert_eq!(found.created_by_id, ctx.owner_id);

    assert!(ctx.store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn claim_is_atomic_and_gated_on_pending(ctx: &PostgresHarness) {
    let job = ctx
        .store
        .insert(NewJob::new(JobType::GapDetection, json!({}), ctx.owner_id))
        .await
        .unwrap();

    let (a, b) = tokio::join!(ctx.store.claim(job.id, held()), ctx.store.claim(job.id, held()));
    let claimed: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, JobStatus::Processing);
    assert_eq!(claimed[0].attempts, 1);
    assert!(claimed[0].started_at.is_some());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn terminal_transitions_keep_result_and_error_exclusive(ctx: &PostgresHarness) {
    let job = ctx
        .store
        .insert(NewJob::new(JobType::RiskAnalysis, json!({}), ctx.owner_id))
        .await
        .unwrap();
    ctx.store.claim(job.id, held()).await.unwrap();

    let failed = ctx.store.mark_failed(job.id, "llm unavailable").await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("llm unavailable"));
    assert!(failed.result.is_none());
    assert!(failed.completed_at.is_some());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn processor_drives_a_postgres_job_to_completion(ctx: &PostgresHarness) {
    let handler = Arc::new(MockJobHandler::failing_times(1));
    let mut registry = HandlerRegistry::new();
    registry.register_arc(JobType::ReportGeneration, handler);
    let store = Arc::new(ctx.store.clone());
    let processor = JobProcessor::new(store.clone(), Arc::new(registry));

    let job = store
        .insert(NewJob::new(
            JobType::ReportGeneration,
            json!({ "assessmentId": "a-1" }),
            ctx.owner_id,
        ))
        .await
        .unwrap();

    assert!(matches!(
        processor.process_job(job.id).await.unwrap(),
        ProcessOutcome::Retrying { attempts: 1, .. }
    ));
    let cutoffs = StaleCutoffs::from_now(DEFAULT_DISPATCH_GRACE, DEFAULT_LEASE_TIMEOUT);
    let waiting = store.find_redispatchable(100, cutoffs).await.unwrap();
    assert!(waiting.iter().any(|j| j.id == job.id));

    assert_eq!(processor.process_job(job.id).await.unwrap(), ProcessOutcome::Completed);
    let done = store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(done.attempts, 2);
    assert_eq!(done.result, Some(json!({ "ok": true })));
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn expired_leases_are_reclaimed_or_failed(ctx: &PostgresHarness) {
    let retryable = ctx
        .store
        .insert(NewJob::new(JobType::GapDetection, json!({}), ctx.owner_id))
        .await
        .unwrap();
    let last_try = ctx
        .store
        .insert(
            NewJob::builder()
                .job_type(JobType::GapDetection)
                .input(json!({}))
                .created_by_id(ctx.owner_id)
                .max_attempts(1)
                .build(),
        )
        .await
        .unwrap();
    ctx.store.claim(retryable.id, held()).await.unwrap();
    ctx.store.claim(last_try.id, held()).await.unwrap();

    // Leases still held.
    assert!(ctx.store.claim(retryable.id, held()).await.unwrap().is_none());

    let later = Utc::now() + chrono::Duration::seconds(1);
    let reclaimed = ctx.store.claim(retryable.id, later).await.unwrap().unwrap();
    assert_eq!(reclaimed.attempts, 2);

    assert!(ctx.store.claim(last_try.id, later).await.unwrap().is_none());
    let failed = ctx
        .store
        .expire_lease(last_try.id, later, "lease expired")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 1);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn unclaimed_jobs_are_redispatchable_after_grace(ctx: &PostgresHarness) {
    let job = ctx
        .store
        .insert(NewJob::new(JobType::AiPreview, json!({ "prompt": "hi" }), ctx.owner_id))
        .await
        .unwrap();

    let within_grace = StaleCutoffs::from_now(DEFAULT_DISPATCH_GRACE, DEFAULT_LEASE_TIMEOUT);
    let found = ctx.store.find_redispatchable(1000, within_grace).await.unwrap();
    assert!(!found.iter().any(|j| j.id == job.id));

    let later = Utc::now() + chrono::Duration::seconds(1);
    let past_grace = StaleCutoffs {
        unclaimed_before: later,
        lease_expired_before: held(),
    };
    let found = ctx.store.find_redispatchable(1000, past_grace).await.unwrap();
    assert!(found.iter().any(|j| j.id == job.id));
}
