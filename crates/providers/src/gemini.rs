//! Google Gemini provider (`generateContent` REST endpoint).
//!
//! Maps the conversation onto Gemini `contents`: user turns keep the `user`
//! role, assistant turns (answers and tool observations) become `model`.
//! Images travel as base64 `inline_data` parts.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parley_core::error::ProviderError;
use parley_core::message::{ContentPart, Message, Role};
use parley_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A Gemini model client.
///
/// Holds no conversation state; one instance serves every agent.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider for `model`.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> std::result::Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key is required (set GEMINI_API_KEY)".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let model = model.into();
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key,
            model: if model.is_empty() {
                "gemini-2.0-flash-exp".into()
            } else {
                model
            },
            temperature: 1.0,
            max_tokens: 8192,
            client,
        })
    }

    /// Point the client at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert our messages into Gemini `contents`.
    ///
    /// Empty text parts are skipped and a turn left with no parts is
    /// dropped, since Gemini rejects empty `parts` arrays.
    fn to_api_contents(messages: &[Message]) -> Vec<ApiContent> {
        messages
            .iter()
            .filter_map(|m| {
                let parts: Vec<ApiPart> = m
                    .contents
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } if text.is_empty() => None,
                        ContentPart::Text { text } => Some(ApiPart {
                            text: Some(m.attributed_text(text)),
                            inline_data: None,
                        }),
                        ContentPart::Image { mime_type, data } => Some(ApiPart {
                            text: None,
                            inline_data: Some(ApiInlineData {
                                mime_type: mime_type.clone(),
                                data: BASE64.encode(data),
                            }),
                        }),
                        ContentPart::ImageUrl { url, .. } => {
                            debug!(%url, "Skipping unresolved image URL");
                            None
                        }
                    })
                    .collect();

                if parts.is_empty() {
                    return None;
                }

                Some(ApiContent {
                    role: Some(
                        match m.role {
                            Role::User => "user",
                            Role::Assistant => "model",
                        }
                        .into(),
                    ),
                    parts,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LanguageModel for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let contents = Self::to_api_contents(&request.messages);
        if contents.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "conversation has no content to send".into(),
            ));
        }

        let body = ApiRequest {
            system_instruction: request
                .system_prompt
                .filter(|s| !s.is_empty())
                .map(|text| ApiContent {
                    role: None,
                    parts: vec![ApiPart {
                        text: Some(text),
                        inline_data: None,
                    }],
                }),
            contents,
            generation_config: ApiGenerationConfig {
                temperature: request.temperature.unwrap_or(self.temperature),
                max_output_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            },
        };

        debug!(model = %self.model, turns = body.contents.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Gemini API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: status,
                message: format!("Failed to parse response: {e}"),
            })?;

        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse("no candidates returned".into()))?;

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        if parts.is_empty() {
            return Err(ProviderError::EmptyResponse(
                "no content parts returned".into(),
            ));
        }

        let text: String = parts.into_iter().filter_map(|p| p.text).collect();

        let usage = api_response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ModelResponse {
            text,
            usage,
            model: api_response.model_version.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<ApiInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/models/gemini-2.0-flash-exp:generateContent";

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new("test-key", "gemini-2.0-flash-exp")
            .unwrap()
            .with_base_url(server.uri())
    }

    fn text_response(parts: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "role": "model", "parts": parts } }],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 3,
                "totalTokenCount": 15
            }
        }))
    }

    #[test]
    fn requires_api_key() {
        let err = GeminiProvider::new("", "gemini-2.0-flash-exp").err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn assistant_turns_map_to_model_role() {
        let contents = GeminiProvider::to_api_contents(&[
            Message::user("alice", "hi"),
            Message::assistant("hello"),
        ]);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[0].parts[0].text.as_deref(), Some("alice: hi"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn images_become_inline_data() {
        let msg = Message::user_with_images(
            "bob",
            "what is this?",
            vec![ContentPart::image("image/png", vec![1, 2, 3])],
        );
        let contents = GeminiProvider::to_api_contents(&[msg]);
        let inline = contents[0].parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, BASE64.encode([1u8, 2, 3]));
    }

    #[tokio::test]
    async fn complete_sends_system_instruction_and_concatenates_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "systemInstruction": { "parts": [{ "text": "be nice" }] },
                "contents": [{ "role": "user", "parts": [{ "text": "alice: hello" }] }],
                "generationConfig": { "temperature": 1.0, "maxOutputTokens": 8192 }
            })))
            .respond_with(text_response(json!([{ "text": "Hi " }, { "text": "there" }])))
            .expect(1)
            .mount(&server)
            .await;

        let request = ModelRequest::new(vec![Message::user("alice", "hello")])
            .with_system_prompt(Some("be nice".into()));
        let response = provider(&server).complete(request).await.unwrap();

        assert_eq!(response.text, "Hi there");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn no_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate(None, "hello", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(m) if m.contains("no candidates")));
    }

    #[tokio::test]
    async fn no_parts_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(text_response(json!([])))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate(None, "hello", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(m) if m.contains("no content parts")));
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let p = provider(&server);
        let first = p.generate(None, "x", vec![]).await.unwrap_err();
        let second = p.generate(None, "x", vec![]).await.unwrap_err();
        let third = p.generate(None, "x", vec![]).await.unwrap_err();

        assert!(matches!(first, ProviderError::RateLimited { .. }));
        assert!(matches!(second, ProviderError::AuthenticationFailed(_)));
        assert!(matches!(
            third,
            ProviderError::ApiError { status_code: 500, ref message } if message == "boom"
        ));
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected_locally() {
        let server = MockServer::start().await;
        let err = provider(&server)
            .complete(ModelRequest::new(vec![Message::assistant("")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }
}
