//! Tests for the worker HTTP endpoint and the redispatch sweep.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use crate::common::{wait_for_terminal, TestHarness};
use intake_core::kernel::jobs::testing::MockJobHandler;
use intake_core::kernel::jobs::{HandlerRegistry, JobStatus, JobStore, JobType, NewJob};
use intake_core::server::{build_worker_app, spawn_redispatch_loop, WorkerState, PROCESS_JOB_PATH};
use serde_json::{json, Value};
use test_context::test_context;
use tower::ServiceExt;
use uuid::Uuid;

async fn post_envelope(state: WorkerState, body: Value) -> (StatusCode, Value) {
    let app = build_worker_app(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(PROCESS_JOB_PATH)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[test_context(TestHarness)]
#[tokio::test]
async fn worker_processes_the_enveloped_job(ctx: &TestHarness) {
    let handler = Arc::new(MockJobHandler::returning(json!({ "score": 12 })));
    let mut registry = HandlerRegistry::new();
    registry.register_arc(JobType::RiskAnalysis, handler.clone());
    let engine = ctx.engine(registry);
    let job = engine
        .store
        .insert(NewJob::new(JobType::RiskAnalysis, json!({ "assessmentId": "a-1" }), ctx.owner_id))
        .await
        .unwrap();

    let (status, body) = post_envelope(
        WorkerState {
            processor: engine.processor.clone(),
        },
        json!({ "jobId": job.id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "jobId": job.id }));

    let stored = engine.store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result, Some(json!({ "score": 12 })));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn worker_reports_success_for_handler_failures(ctx: &TestHarness) {
    let mut registry = HandlerRegistry::new();
    registry.register_arc(JobType::AiPreview, Arc::new(MockJobHandler::always_failing()));
    let engine = ctx.engine(registry);
    let job = engine
        .store
        .insert(NewJob::new(JobType::AiPreview, json!({ "prompt": "hi" }), ctx.owner_id))
        .await
        .unwrap();

    let (status, body) = post_envelope(
        WorkerState {
            processor: engine.processor.clone(),
        },
        json!({ "jobId": job.id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let stored = engine.store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.attempts, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn worker_ignores_unknown_jobs(ctx: &TestHarness) {
    let engine = ctx.engine(HandlerRegistry::new());
    let id = Uuid::new_v4();

    let (status, body) = post_envelope(
        WorkerState {
            processor: engine.processor.clone(),
        },
        json!({ "jobId": id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "jobId": id }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn worker_rejects_malformed_envelopes(ctx: &TestHarness) {
    let engine = ctx.engine(HandlerRegistry::new());

    let (status, _) = post_envelope(
        WorkerState {
            processor: engine.processor.clone(),
        },
        json!({ "job": "nope" }),
    )
    .await;

    assert!(status.is_client_error());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn redispatch_loop_picks_up_jobs_awaiting_retry(ctx: &TestHarness) {
    let handler = Arc::new(MockJobHandler::failing_times(1));
    let mut registry = HandlerRegistry::new();
    registry.register_arc(JobType::GapDetection, handler.clone());
    let engine = ctx.engine(registry);
    let job = engine
        .store
        .insert(NewJob::new(JobType::GapDetection, json!({ "assessmentId": "a-1" }), ctx.owner_id))
        .await
        .unwrap();
    engine.processor.process_job(job.id).await.unwrap();

    let sweep = spawn_redispatch_loop(Arc::new(engine.dispatcher), Duration::from_secs(30));
    let done = wait_for_terminal(&*engine.store, job.id).await;
    sweep.abort();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(handler.invocation_count(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn health_reports_healthy(ctx: &TestHarness) {
    let engine = ctx.engine(HandlerRegistry::new());
    let app = build_worker_app(WorkerState {
        processor: engine.processor.clone(),
    });

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "status": "healthy" }));
}
