//! HTTP completion provider for OpenAI-compatible APIs.
//!
//! Talks directly to any `/chat/completions` endpoint via `reqwest`. The whole
//! prompt history of a conversation goes out as one user message, prompts
//! joined by `\n`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use gptrelay_core::config::schema::ProviderConfig;
use gptrelay_core::types::{ChatCompletionRequest, ChatCompletionResponse, Message};

use crate::error::CompletionError;
use crate::traits::CompletionProvider;

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// Completion provider backed by an OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication.
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
    /// Host of `api_base`, used in logs.
    display_name: String,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpProvider {
    /// Build a provider from the `provider` config section.
    ///
    /// The client timeout is `request_timeout_secs`; it is the only bound on
    /// a completion call that never answers.
    pub fn new(config: &ProviderConfig) -> Result<Self, CompletionError> {
        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(val)) => {
                        extra_headers.insert(name, val);
                    }
                    _ => warn!("Invalid header: {}={}", key, value),
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CompletionError::Client(e.to_string()))?;

        let display_name = reqwest::Url::parse(&config.api_base)
            .ok()
            .and_then(|url| url.host_str().map(String::from))
            .unwrap_or_else(|| config.api_base.clone());

        Ok(HttpProvider {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            extra_headers,
            display_name,
        })
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn build_request(&self, prompts: &[String]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompts.join("\n"))],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpProvider {
    async fn complete(&self, prompts: &[String]) -> Result<String, CompletionError> {
        debug!(
            provider = %self.display_name,
            model = %self.model,
            prompts = prompts.len(),
            "Requesting completion"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .headers(self.extra_headers.clone())
            .json(&self.build_request(prompts))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_slice(&bytes).map_err(|e| CompletionError::Parse(e.to_string()))?;

        let content = parsed
            .first_content()
            .ok_or(CompletionError::EmptyResponse)?
            .to_string();

        debug!(
            provider = %self.display_name,
            total_tokens = parsed.usage.as_ref().map_or(0, |u| u.total_tokens),
            "Completion received"
        );
        Ok(content)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
