//! Job testing utilities.
//!
//! Mock handlers and invokers that record what the engine asked of them.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::handler::JobHandler;
use super::invoker::{JobEnvelope, JobInvoker};

/// Mock handler for testing.
///
/// Fails its first `fail_times` invocations (or every one when
/// [`MockJobHandler::always_failing`]), then returns `output`.
pub struct MockJobHandler {
    output: Value,
    fail_times: RwLock<Option<usize>>,
    invocations: RwLock<Vec<Value>>,
    compensations: RwLock<Vec<(Value, String)>>,
}

impl MockJobHandler {
    /// Create a handler that always succeeds with `{"ok": true}`.
    pub fn new() -> Self {
        Self::returning(json!({ "ok": true }))
    }

    pub fn returning(output: Value) -> Self {
        Self {
            output,
            fail_times: RwLock::new(Some(0)),
            invocations: RwLock::new(Vec::new()),
            compensations: RwLock::new(Vec::new()),
        }
    }

    pub fn failing_times(times: usize) -> Self {
        let handler = Self::new();
        *handler.fail_times.write().unwrap_or_else(|e| e.into_inner()) = Some(times);
        handler
    }

    pub fn always_failing() -> Self {
        let handler = Self::new();
        *handler.fail_times.write().unwrap_or_else(|e| e.into_inner()) = None;
        handler
    }

    /// Inputs of every `execute` call, in order.
    pub fn invocations(&self) -> Vec<Value> {
        self.invocations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// `(input, error)` of every `on_failure` call.
    pub fn compensations(&self) -> Vec<(Value, String)> {
        self.compensations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for MockJobHandler {
    async fn execute(&self, input: Value) -> Result<Value> {
        let attempt = {
            let mut invocations = self.invocations.write().unwrap_or_else(|e| e.into_inner());
            invocations.push(input);
            invocations.len()
        };

        let fail_times = *self.fail_times.read().unwrap_or_else(|e| e.into_inner());
        match fail_times {
            Some(n) if attempt > n => Ok(self.output.clone()),
            _ => Err(anyhow!("mock failure {}", attempt)),
        }
    }

    async fn on_failure(&self, input: &Value, error: &str) {
        self.compensations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((input.clone(), error.to_string()));
    }
}

/// Invoker that records envelopes instead of sending them.
#[derive(Default)]
pub struct RecordingInvoker {
    envelopes: RwLock<Vec<JobEnvelope>>,
    error: Option<String>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records envelopes but reports every hand-off as failed.
    pub fn failing(message: &str) -> Self {
        Self {
            envelopes: RwLock::new(Vec::new()),
            error: Some(message.to_string()),
        }
    }

    pub fn envelopes(&self) -> Vec<JobEnvelope> {
        self.envelopes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl JobInvoker for RecordingInvoker {
    async fn invoke(&self, envelope: JobEnvelope) -> Result<()> {
        self.envelopes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(envelope);
        match &self.error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}
