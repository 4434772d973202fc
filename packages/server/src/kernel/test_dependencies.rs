// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into job handlers for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{
    BaseAI, BaseDocumentExtractor, BaseDocumentRepository, BaseReportRenderer, ExtractedDocument,
};

// =============================================================================
// Mock Document Extractor
// =============================================================================

/// Returns queued results in order, then succeeds with a default extraction.
pub struct MockDocumentExtractor {
    results: Arc<Mutex<VecDeque<Result<ExtractedDocument>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockDocumentExtractor {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_text(self, text: &str, page_count: u32) -> Self {
        self.results.lock().unwrap().push_back(Ok(ExtractedDocument {
            text: text.to_string(),
            page_count,
        }));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.results.lock().unwrap().push_back(Err(anyhow!(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockDocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDocumentExtractor for MockDocumentExtractor {
    async fn extract(&self, document_id: &str) -> Result<ExtractedDocument> {
        self.calls.lock().unwrap().push(document_id.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ExtractedDocument {
                    text: "mock document text".to_string(),
                    page_count: 1,
                })
            })
    }
}

// =============================================================================
// Mock Document Repository
// =============================================================================

/// In-memory repository that records every write.
pub struct MockDocumentRepository {
    assessments: Arc<Mutex<HashMap<String, Value>>>,
    pub extractions: Arc<Mutex<Vec<(String, ExtractedDocument)>>>,
    pub failed_documents: Arc<Mutex<Vec<(String, String)>>>,
    pub gaps: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    pub risk_scores: Arc<Mutex<Vec<(String, Value)>>>,
    pub report_locations: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockDocumentRepository {
    pub fn new() -> Self {
        Self {
            assessments: Arc::new(Mutex::new(HashMap::new())),
            extractions: Arc::new(Mutex::new(Vec::new())),
            failed_documents: Arc::new(Mutex::new(Vec::new())),
            gaps: Arc::new(Mutex::new(Vec::new())),
            risk_scores: Arc::new(Mutex::new(Vec::new())),
            report_locations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_assessment(self, assessment_id: &str, data: Value) -> Self {
        self.assessments
            .lock()
            .unwrap()
            .insert(assessment_id.to_string(), data);
        self
    }
}

impl Default for MockDocumentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDocumentRepository for MockDocumentRepository {
    async fn save_extraction(
        &self,
        document_id: &str,
        extracted: &ExtractedDocument,
    ) -> Result<()> {
        self.extractions
            .lock()
            .unwrap()
            .push((document_id.to_string(), extracted.clone()));
        Ok(())
    }

    async fn mark_document_failed(&self, document_id: &str, reason: &str) -> Result<()> {
        self.failed_documents
            .lock()
            .unwrap()
            .push((document_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn load_assessment(&self, assessment_id: &str) -> Result<Value> {
        self.assessments
            .lock()
            .unwrap()
            .get(assessment_id)
            .cloned()
            .ok_or_else(|| anyhow!("assessment not found: {}", assessment_id))
    }

    async fn save_gaps(&self, assessment_id: &str, missing_fields: &[String]) -> Result<()> {
        self.gaps
            .lock()
            .unwrap()
            .push((assessment_id.to_string(), missing_fields.to_vec()));
        Ok(())
    }

    async fn save_risk_score(&self, assessment_id: &str, score: &Value) -> Result<()> {
        self.risk_scores
            .lock()
            .unwrap()
            .push((assessment_id.to_string(), score.clone()));
        Ok(())
    }

    async fn save_report_location(&self, assessment_id: &str, location: &str) -> Result<()> {
        self.report_locations
            .lock()
            .unwrap()
            .push((assessment_id.to_string(), location.to_string()));
        Ok(())
    }
}

// =============================================================================
// Mock AI
// =============================================================================

pub struct MockAI {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl MockAI {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
        self
    }
}

impl Default for MockAI {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("{}".to_string()))
    }
}

// =============================================================================
// Mock Report Renderer
// =============================================================================

pub struct MockReportRenderer {
    pub rendered: Arc<Mutex<Vec<String>>>,
}

impl MockReportRenderer {
    pub fn new() -> Self {
        Self {
            rendered: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for MockReportRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseReportRenderer for MockReportRenderer {
    async fn render(&self, assessment_id: &str, _data: &Value) -> Result<String> {
        self.rendered.lock().unwrap().push(assessment_id.to_string());
        Ok(format!("reports/{}.pdf", assessment_id))
    }
}
