// HTTP client for the intake application's internal API
//
// Documents, assessments and report rendering belong to the intake
// application; the job worker reaches them over its internal API. One client
// implements the three collaborator traits that talk to it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BaseDocumentExtractor, BaseDocumentRepository, BaseReportRenderer, ExtractedDocument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentFailure<'a> {
    reason: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Gaps<'a> {
    missing_fields: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RiskScore<'a> {
    score: &'a Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportLocation {
    location: String,
}

/// Client for the intake application's internal API.
#[derive(Clone)]
pub struct IntakeApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl IntakeApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .with_context(|| format!("Failed to reach intake API ({})", what))?
            .error_for_status()
            .with_context(|| format!("Intake API rejected request ({})", what))
    }
}

// =============================================================================
// Document Extraction
// =============================================================================

#[async_trait]
impl BaseDocumentExtractor for IntakeApiClient {
    async fn extract(&self, document_id: &str) -> Result<ExtractedDocument> {
        let path = format!("/documents/{}/extract", document_id);
        self.send(self.request(reqwest::Method::POST, &path), "extract document")
            .await?
            .json()
            .await
            .context("Failed to parse extracted document")
    }
}

// =============================================================================
// Document and Assessment persistence
// =============================================================================

#[async_trait]
impl BaseDocumentRepository for IntakeApiClient {
    async fn save_extraction(
        &self,
        document_id: &str,
        extracted: &ExtractedDocument,
    ) -> Result<()> {
        let path = format!("/documents/{}/extraction", document_id);
        let builder = self.request(reqwest::Method::PUT, &path).json(extracted);
        self.send(builder, "save extraction").await?;
        Ok(())
    }

    async fn mark_document_failed(&self, document_id: &str, reason: &str) -> Result<()> {
        let path = format!("/documents/{}/failure", document_id);
        let builder = self
            .request(reqwest::Method::POST, &path)
            .json(&DocumentFailure { reason });
        self.send(builder, "mark document failed").await?;
        Ok(())
    }

    async fn load_assessment(&self, assessment_id: &str) -> Result<Value> {
        let path = format!("/assessments/{}", assessment_id);
        self.send(self.request(reqwest::Method::GET, &path), "load assessment")
            .await?
            .json()
            .await
            .context("Failed to parse assessment")
    }

    async fn save_gaps(&self, assessment_id: &str, missing_fields: &[String]) -> Result<()> {
        let path = format!("/assessments/{}/gaps", assessment_id);
        let builder = self
            .request(reqwest::Method::PUT, &path)
            .json(&Gaps { missing_fields });
        self.send(builder, "save gaps").await?;
        Ok(())
    }

    async fn save_risk_score(&self, assessment_id: &str, score: &Value) -> Result<()> {
        let path = format!("/assessments/{}/risk-score", assessment_id);
        let builder = self
            .request(reqwest::Method::PUT, &path)
            .json(&RiskScore { score });
        self.send(builder, "save risk score").await?;
        Ok(())
    }

    async fn save_report_location(&self, assessment_id: &str, location: &str) -> Result<()> {
        let path = format!("/assessments/{}/report-location", assessment_id);
        let builder = self
            .request(reqwest::Method::PUT, &path)
            .json(&ReportLocation {
                location: location.to_string(),
            });
        self.send(builder, "save report location").await?;
        Ok(())
    }
}

// =============================================================================
// Report rendering
// =============================================================================

#[async_trait]
impl BaseReportRenderer for IntakeApiClient {
    async fn render(&self, assessment_id: &str, data: &Value) -> Result<String> {
        let path = format!("/assessments/{}/report", assessment_id);
        let builder = self.request(reqwest::Method::POST, &path).json(data);
        let rendered: ReportLocation = self
            .send(builder, "render report")
            .await?
            .json()
            .await
            .context("Failed to parse rendered report location")?;
        Ok(rendered.location)
    }
}
