use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::domains::assessments::models::{
    parse_input, require_non_empty, AssessmentJobInput, GeneratedReport,
};
use crate::domains::assessments::services::AssessmentServices;
use crate::kernel::jobs::{JobHandler, JobType};

pub struct ReportGenerationHandler {
    services: Arc<AssessmentServices>,
}

impl ReportGenerationHandler {
    pub fn new(services: Arc<AssessmentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for ReportGenerationHandler {
    async fn execute(&self, input: Value) -> Result<Value> {
        let input: AssessmentJobInput = parse_input(JobType::ReportGeneration, input)?;
        require_non_empty(JobType::ReportGeneration, "assessmentId", &input.assessment_id)?;

        let services = &self.services;
        let data = services
            .repository
            .load_assessment(&input.assessment_id)
            .await
            .context("failed to load assessment")?;

        let location = services
            .guarded(&services.renderer_breaker, || {
                services.renderer.render(&input.assessment_id, &data)
            })
            .await
            .context("report rendering failed")?;

        services
            .repository
            .save_report_location(&input.assessment_id, &location)
            .await
            .context("failed to save report location")?;

        info!(assessment_id = %input.assessment_id, location = %location, "report generated");

        Ok(serde_json::to_value(GeneratedReport {
            assessment_id: input.assessment_id,
            location,
        })?)
    }
}
