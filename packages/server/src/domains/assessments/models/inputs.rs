use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::kernel::jobs::JobType;

/// Job input that can never succeed as given.
///
/// Not retried and not counted against circuit breakers.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid {job_type} input: {source}")]
    Malformed {
        job_type: JobType,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {job_type} input: {field} must not be empty")]
    EmptyField {
        job_type: JobType,
        field: &'static str,
    },
}

/// Whether an error chain is rooted in bad input.
pub fn is_input_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<InputError>().is_some()
}

pub fn parse_input<T: DeserializeOwned>(
    job_type: JobType,
    input: serde_json::Value,
) -> Result<T, InputError> {
    serde_json::from_value(input).map_err(|source| InputError::Malformed { job_type, source })
}

pub(crate) fn require_non_empty(
    job_type: JobType,
    field: &'static str,
    value: &str,
) -> Result<(), InputError> {
    if value.trim().is_empty() {
        return Err(InputError::EmptyField { job_type, field });
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseDocumentInput {
    pub document_id: String,
    /// Present when the document belongs to an assessment; drives gap detection.
    #[serde(default)]
    pub assessment_id: Option<String>,
}

/// Input for jobs that act on a whole assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentJobInput {
    pub assessment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPreviewInput {
    pub prompt: String,
}
