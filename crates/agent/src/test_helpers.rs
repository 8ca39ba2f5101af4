//! Shared test helpers for agent tests.

use async_trait::async_trait;
use parley_core::error::{ProviderError, ToolError};
use parley_core::provider::{LanguageModel, ModelRequest, ModelResponse};
use parley_core::tool::Tool;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A model that returns a sequence of scripted results.
///
/// Each call to `complete` pops the next result and records the request.
/// Panics if more calls are made than results provided.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Script of successful text responses.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Sleep before answering, so tests can cancel mid-call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedModel: no more responses (call #{call})"));

        next.map(|text| ModelResponse {
            text,
            usage: None,
            model: "scripted".into(),
        })
    }
}

/// A tool with a canned outcome that records its inputs.
pub struct StubTool {
    name: &'static str,
    description: &'static str,
    outcome: Result<String, ToolError>,
    delay: Option<Duration>,
    inputs: Mutex<Vec<String>>,
}

impl StubTool {
    pub fn ok(name: &'static str, output: &str) -> Self {
        Self::with_outcome(name, Ok(output.to_string()))
    }

    pub fn failing(name: &'static str, reason: &str) -> Self {
        Self::with_outcome(
            name,
            Err(ToolError::ExecutionFailed {
                tool_name: name.into(),
                reason: reason.into(),
            }),
        )
    }

    fn with_outcome(name: &'static str, outcome: Result<String, ToolError>) -> Self {
        Self {
            name,
            description: name,
            outcome,
            delay: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        self.inputs.lock().unwrap().push(input.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}
