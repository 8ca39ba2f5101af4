//! URL fetch tool: GETs a page and returns the start of its body.

use async_trait::async_trait;
use parley_config::UrlFetchConfig;
use parley_core::error::ToolError;
use parley_core::tool::Tool;
use std::time::Duration;
use tracing::debug;

pub struct UrlFetchTool {
    client: reqwest::Client,
    timeout_secs: u64,
    max_chars: usize,
}

impl UrlFetchTool {
    pub fn new(config: &UrlFetchConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ToolError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: config.timeout_secs,
            max_chars: config.max_chars,
        })
    }

    /// Bytes needed to hold `max_chars` characters plus one, so a cut body
    /// still decodes to more than `max_chars` and gets the `...` marker.
    fn byte_budget(&self) -> usize {
        self.max_chars.saturating_add(1).saturating_mul(4)
    }

    /// Read the body until it ends or the byte budget is reached.
    async fn read_prefix(&self, mut response: reqwest::Response) -> Result<String, ToolError> {
        let budget = self.byte_budget();
        let mut buf = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.failed(format!("failed to read body: {e}")))?
        {
            buf.extend_from_slice(&chunk);
            if buf.len() >= budget {
                debug!(budget, "Body exceeds byte budget, stopping read");
                buf.truncate(budget);
                break;
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: reason.into(),
        }
    }
}

/// Keep the first `max_chars` characters, appending `...` when cut.
fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_string(),
    }
}

#[async_trait]
impl Tool for UrlFetchTool {
    fn name(&self) -> &str {
        "url_fetch"
    }

    fn description(&self) -> &str {
        "Fetches the content of a given URL. Input should be a valid URL string."
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Ok("Error: No URL provided".into());
        }

        let url = url::Url::parse(raw)
            .map_err(|e| ToolError::InvalidInput(format!("'{raw}' is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::InvalidInput(format!(
                "unsupported scheme '{}', only http and https are allowed",
                url.scheme()
            )));
        }

        debug!(%url, "Fetching URL");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                self.failed(format!("request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(self.failed(format!("HTTP {status}")));
        }

        let body = self.read_prefix(response).await?;

        Ok(format!(
            "Content from {raw}:\n{}",
            truncate_chars(&body, self.max_chars)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(max_chars: usize) -> UrlFetchTool {
        UrlFetchTool::new(&UrlFetchConfig {
            max_chars,
            ..UrlFetchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll...");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }

    #[tokio::test]
    async fn empty_input_is_reported() {
        assert_eq!(tool(1000).invoke("").await.unwrap(), "Error: No URL provided");
    }

    #[tokio::test]
    async fn non_http_scheme_is_invalid_input() {
        let err = tool(1000).invoke("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));

        let err = tool(1000).invoke("not a url").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn fetches_and_truncates_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", UrlFetchConfig::default().user_agent.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("abcdefghij"))
            .mount(&server)
            .await;

        let url = format!("{}/page", server.uri());
        let out = tool(4).invoke(&url).await.unwrap();
        assert_eq!(out, format!("Content from {url}:\nabcd..."));
    }

    #[tokio::test]
    async fn large_body_is_cut_to_max_chars() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(5_000_000)))
            .mount(&server)
            .await;

        let url = format!("{}/huge", server.uri());
        let out = tool(1000).invoke(&url).await.unwrap();
        assert_eq!(out, format!("Content from {url}:\n{}...", "a".repeat(1000)));
    }

    #[tokio::test]
    async fn multibyte_body_cut_at_budget_keeps_whole_chars() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ж".repeat(100_000)))
            .mount(&server)
            .await;

        let out = tool(10).invoke(&server.uri()).await.unwrap();
        assert!(out.ends_with(&format!("\n{}...", "ж".repeat(10))));
    }

    #[tokio::test]
    async fn http_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = tool(1000)
            .invoke(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404");
    }
}
