//! LanguageModel trait: the abstraction over text-generation backends.
//!
//! A `LanguageModel` knows how to send a system instruction plus a message
//! history to a model and get text back. Clients are shared by every agent,
//! so the system prompt travels with each request instead of living in the
//! client; [`ModelSession`] pairs a shared client with one fixed prompt.
//!
//! Implementations: Gemini, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::message::{ContentPart, Message, Role};

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Persistent instruction placed ahead of the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// The conversation, oldest first
    pub messages: Vec<Message>,

    /// Sampling temperature override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum output tokens override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system_prompt: None,
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }
}

/// A complete response from a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated text
    pub text: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core LanguageModel trait.
///
/// Every backend implements [`complete`](Self::complete); the
/// single-prompt and history entry points are built on top of it.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name for this backend (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError>;

    /// Generate from a single prompt plus optional images.
    async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        images: Vec<ContentPart>,
    ) -> std::result::Result<String, ProviderError> {
        let mut contents = Vec::with_capacity(images.len() + 1);
        if !prompt.is_empty() {
            contents.push(ContentPart::text(prompt));
        }
        contents.extend(images);
        let message = Message::new(Role::User, None, contents);
        let request = ModelRequest::new(vec![message])
            .with_system_prompt(system_prompt.map(str::to_string));
        Ok(self.complete(request).await?.text)
    }

    /// Generate the next assistant turn for a full history.
    async fn generate_with_history(
        &self,
        system_prompt: Option<&str>,
        messages: Vec<Message>,
    ) -> std::result::Result<String, ProviderError> {
        let request =
            ModelRequest::new(messages).with_system_prompt(system_prompt.map(str::to_string));
        Ok(self.complete(request).await?.text)
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// A shared model client bound to one persistent system instruction.
///
/// Each agent owns a session; the underlying client is shared.
#[derive(Clone)]
pub struct ModelSession {
    model: Arc<dyn LanguageModel>,
    system_prompt: Option<String>,
}

impl ModelSession {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            system_prompt: None,
        }
    }

    /// Set the instruction used on every subsequent call.
    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = Some(system_prompt.into());
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub async fn generate(
        &self,
        prompt: &str,
        images: Vec<ContentPart>,
    ) -> std::result::Result<String, ProviderError> {
        self.model
            .generate(self.system_prompt.as_deref(), prompt, images)
            .await
    }

    pub async fn generate_with_history(
        &self,
        messages: Vec<Message>,
    ) -> std::result::Result<String, ProviderError> {
        self.model
            .generate_with_history(self.system_prompt.as_deref(), messages)
            .await
    }
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("model", &self.model.name())
            .field("system_prompt_len", &self.system_prompt.as_ref().map(String::len))
            .finish()
    }
}
