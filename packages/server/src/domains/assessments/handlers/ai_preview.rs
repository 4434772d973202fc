use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::domains::assessments::models::{
    parse_input, require_non_empty, AiPreview, AiPreviewInput,
};
use crate::domains::assessments::services::AssessmentServices;
use crate::kernel::jobs::{JobHandler, JobType};

/// Free-form LLM preview shown while an assessment is being filled in.
pub struct AiPreviewHandler {
    services: Arc<AssessmentServices>,
}

impl AiPreviewHandler {
    pub fn new(services: Arc<AssessmentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for AiPreviewHandler {
    async fn execute(&self, input: Value) -> Result<Value> {
        let input: AiPreviewInput = parse_input(JobType::AiPreview, input)?;
        require_non_empty(JobType::AiPreview, "prompt", &input.prompt)?;

        let services = &self.services;
        let preview = services
            .guarded(&services.ai_breaker, || services.ai.complete(&input.prompt))
            .await
            .context("preview request failed")?;

        Ok(serde_json::to_value(AiPreview { preview })?)
    }
}
