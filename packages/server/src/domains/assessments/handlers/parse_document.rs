use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domains::assessments::models::{
    parse_input, require_non_empty, ParseDocumentInput, ParsedDocument,
};
use crate::domains::assessments::services::AssessmentServices;
use crate::kernel::jobs::{JobHandler, JobType};

/// Extracts a document's text and stores it.
///
/// On permanent failure the document is flagged so the upload UI stops
/// waiting on it.
pub struct ParseDocumentHandler {
    services: Arc<AssessmentServices>,
}

impl ParseDocumentHandler {
    pub fn new(services: Arc<AssessmentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for ParseDocumentHandler {
    async fn execute(&self, input: Value) -> Result<Value> {
        let input: ParseDocumentInput = parse_input(JobType::ParseDocument, input)?;
        require_non_empty(JobType::ParseDocument, "documentId", &input.document_id)?;

        let services = &self.services;
        let extracted = services
            .guarded(&services.extractor_breaker, || {
                services.extractor.extract(&input.document_id)
            })
            .await
            .with_context(|| format!("failed to extract document {}", input.document_id))?;

        services
            .repository
            .save_extraction(&input.document_id, &extracted)
            .await
            .context("failed to save extraction")?;

        info!(
            document_id = %input.document_id,
            pages = extracted.page_count,
            "document parsed"
        );

        Ok(serde_json::to_value(ParsedDocument {
            document_id: input.document_id,
            page_count: extracted.page_count,
            characters: extracted.text.chars().count(),
        })?)
    }

    async fn on_failure(&self, input: &Value, error: &str) {
        let Ok(input) = parse_input::<ParseDocumentInput>(JobType::ParseDocument, input.clone())
        else {
            warn!("parse_document failed with unreadable input, nothing to compensate");
            return;
        };

        if let Err(e) = self
            .services
            .repository
            .mark_document_failed(&input.document_id, error)
            .await
        {
            error!(
                document_id = %input.document_id,
                error = %e,
                "failed to mark document as failed"
            );
        }
    }
}
