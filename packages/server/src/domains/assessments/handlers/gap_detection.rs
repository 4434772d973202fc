use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::domains::assessments::models::{
    parse_input, require_non_empty, AssessmentJobInput, GapReport,
};
use crate::domains::assessments::services::AssessmentServices;
use crate::kernel::jobs::{JobHandler, JobType};

/// Intake fields an assessment needs before it can be scored.
pub const REQUIRED_FIELDS: &[&str] = &[
    "businessName",
    "industry",
    "annualRevenue",
    "employeeCount",
    "yearsInOperation",
];

/// Fields of `REQUIRED_FIELDS` that are absent, null or blank in `data`.
pub fn missing_fields(data: &Value) -> Vec<String> {
    REQUIRED_FIELDS
        .iter()
        .filter(|field| match data.get(**field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| field.to_string())
        .collect()
}

pub struct GapDetectionHandler {
    services: Arc<AssessmentServices>,
}

impl GapDetectionHandler {
    pub fn new(services: Arc<AssessmentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for GapDetectionHandler {
    async fn execute(&self, input: Value) -> Result<Value> {
        let input: AssessmentJobInput = parse_input(JobType::GapDetection, input)?;
        require_non_empty(JobType::GapDetection, "assessmentId", &input.assessment_id)?;

        let repository = &self.services.repository;
        let data = repository
            .load_assessment(&input.assessment_id)
            .await
            .context("failed to load assessment")?;

        let missing = missing_fields(&data);
        repository
            .save_gaps(&input.assessment_id, &missing)
            .await
            .context("failed to save gaps")?;

        info!(
            assessment_id = %input.assessment_id,
            missing = missing.len(),
            "gap detection finished"
        );

        Ok(serde_json::to_value(GapReport {
            assessment_id: input.assessment_id,
            complete: missing.is_empty(),
            missing_fields: missing,
        })?)
    }
}
