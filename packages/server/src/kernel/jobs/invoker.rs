//! Remote invocation of the job processor.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

/// Body sent to the remote worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub job_id: Uuid,
}

/// Hands a job id to a remote worker.
///
/// `invoke` returns once the hand-off is queued; it does not wait for the
/// job to run.
#[async_trait]
pub trait JobInvoker: Send + Sync {
    async fn invoke(&self, envelope: JobEnvelope) -> Result<()>;
}

#[async_trait]
impl<I: JobInvoker + ?Sized> JobInvoker for Arc<I> {
    async fn invoke(&self, envelope: JobEnvelope) -> Result<()> {
        (**self).invoke(envelope).await
    }
}

/// Posts envelopes to the worker endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpJobInvoker {
    client: reqwest::Client,
    url: String,
}

impl HttpJobInvoker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(client: reqwest::Client, url: String, envelope: JobEnvelope) -> Result<()> {
        client
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .with_context(|| format!("failed to reach job worker at {}", url))?
            .error_for_status()
            .context("job worker rejected envelope")?;
        Ok(())
    }
}

#[async_trait]
impl JobInvoker for HttpJobInvoker {
    async fn invoke(&self, envelope: JobEnvelope) -> Result<()> {
        let client = self.client.clone();
        let url = self.url.clone();
        debug!(job_id = %envelope.job_id, url = %url, "invoking remote worker");

        tokio::spawn(async move {
            if let Err(e) = Self::post(client, url, envelope).await {
                error!(
                    job_id = %envelope.job_id,
                    error = %format!("{:#}", e),
                    "remote job invocation failed"
                );
            }
        });
        Ok(())
    }
}
