use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::domains::assessments::models::{
    parse_input, require_non_empty, AssessmentJobInput, RiskAnalysis,
};
use crate::domains::assessments::services::AssessmentServices;
use crate::kernel::jobs::{JobHandler, JobType};

const RISK_PROMPT: &str = "You are a commercial underwriting assistant. Score the risk of the \
business described by the intake data below. Respond with a JSON object containing `score` \
(integer 0-100, higher is riskier) and `factors` (array of short strings).";

pub struct RiskAnalysisHandler {
    services: Arc<AssessmentServices>,
}

impl RiskAnalysisHandler {
    pub fn new(services: Arc<AssessmentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for RiskAnalysisHandler {
    async fn execute(&self, input: Value) -> Result<Value> {
        let input: AssessmentJobInput = parse_input(JobType::RiskAnalysis, input)?;
        require_non_empty(JobType::RiskAnalysis, "assessmentId", &input.assessment_id)?;

        let services = &self.services;
        let data = services
            .repository
            .load_assessment(&input.assessment_id)
            .await
            .context("failed to load assessment")?;

        let prompt = format!("{}\n\nIntake data:\n{}", RISK_PROMPT, data);
        let raw = services
            .guarded(&services.ai_breaker, || services.ai.complete_json(&prompt))
            .await
            .context("risk scoring request failed")?;
        let score: Value =
            serde_json::from_str(&raw).context("risk scoring response was not JSON")?;

        services
            .repository
            .save_risk_score(&input.assessment_id, &score)
            .await
            .context("failed to save risk score")?;

        info!(assessment_id = %input.assessment_id, "risk analysis finished");

        Ok(serde_json::to_value(RiskAnalysis {
            assessment_id: input.assessment_id,
            score,
        })?)
    }
}
