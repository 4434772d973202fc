// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Job handlers in domains/ call external services through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BaseReportRenderer)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Document Extraction (OCR / text extraction)
// =============================================================================

/// Text pulled out of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: u32,
}

#[async_trait]
pub trait BaseDocumentExtractor: Send + Sync {
    /// Extract the text of a stored document
    async fn extract(&self, document_id: &str) -> Result<ExtractedDocument>;
}

// =============================================================================
// Document and Assessment persistence
// =============================================================================

#[async_trait]
pub trait BaseDocumentRepository: Send + Sync {
    /// Store extracted text against the document
    async fn save_extraction(&self, document_id: &str, extracted: &ExtractedDocument) -> Result<()>;

    /// Flag the document as unprocessable so the UI stops waiting on it
    async fn mark_document_failed(&self, document_id: &str, reason: &str) -> Result<()>;

    /// Intake data collected so far for an assessment, as a JSON object
    async fn load_assessment(&self, assessment_id: &str) -> Result<serde_json::Value>;

    /// Record the fields still missing from an assessment
    async fn save_gaps(&self, assessment_id: &str, missing_fields: &[String]) -> Result<()>;

    /// Record the computed risk score
    async fn save_risk_score(&self, assessment_id: &str, score: &serde_json::Value) -> Result<()>;

    /// Record where the rendered report was stored
    async fn save_report_location(&self, assessment_id: &str, location: &str) -> Result<()>;
}

// =============================================================================
// AI Trait (Infrastructure - Generic LLM capabilities)
// =============================================================================

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Complete a prompt with an LLM (returns raw text response)
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete a prompt expecting JSON response (returns raw JSON string)
    /// Parse with serde_json::from_str in calling code
    async fn complete_json(&self, prompt: &str) -> Result<String> {
        // Default implementation calls complete
        self.complete(prompt).await
    }
}

// =============================================================================
// Report rendering
// =============================================================================

#[async_trait]
pub trait BaseReportRenderer: Send + Sync {
    /// Render the report and return its storage location
    async fn render(&self, assessment_id: &str, data: &serde_json::Value) -> Result<String>;
}
