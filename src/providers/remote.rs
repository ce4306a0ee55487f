//! Uniform HTTP client for metered remote providers.
//!
//! One client type speaks all three wire dialects:
//! - OpenAI-compatible `POST /chat/completions` (openai, xai, perplexity)
//! - Anthropic `POST /messages`
//! - Google `POST /models/{model}:generateContent`
//!
//! Any non-success status becomes [`RouteError::RemoteApi`] and is never
//! retried by the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::json;

use super::RemoteClient;
use crate::core::http::{build_client, join_url, map_send_error, remote_api_error};
use crate::core::models::{Completion, estimate_tokens};
use crate::core::provider::{ProviderId, WireFormat};
use crate::error::{Result, RouteError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;
const GOOGLE_KEY_HEADER: &str = "x-goog-api-key";

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    usage_metadata: Option<GoogleUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsage {
    #[serde(default)]
    total_token_count: Option<u64>,
}

// =============================================================================
// Client
// =============================================================================

/// Remote provider client selected by [`ProviderId::wire_format`].
#[derive(Clone)]
pub struct HttpRemoteClient {
    provider: ProviderId,
    wire: WireFormat,
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    /// Create a client for a remote provider.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidProvider`] for the local engine, or a
    /// config error if the HTTP client cannot be built.
    pub fn new(
        provider: ProviderId,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Self::with_client(build_client()?, provider, base_url, api_key)
    }

    /// Create a client sharing an existing HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidProvider`] for the local engine.
    pub fn with_client(
        client: Client,
        provider: ProviderId,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let wire = provider
            .wire_format()
            .ok_or_else(|| RouteError::InvalidProvider(provider.to_string()))?;
        Ok(Self {
            provider,
            wire,
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn build_request(&self, model: &str, prompt: &str) -> Result<RequestBuilder> {
        let request = match self.wire {
            WireFormat::ChatCompletions => self
                .client
                .post(join_url(&self.base_url, "chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": model,
                    "messages": [{"role": "user", "content": prompt}],
                })),
            WireFormat::AnthropicMessages => self
                .client
                .post(join_url(&self.base_url, "messages"))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": model,
                    "max_tokens": MAX_OUTPUT_TOKENS,
                    "messages": [{"role": "user", "content": prompt}],
                })),
            // Key travels in a header so it never shows up in a URL.
            WireFormat::GoogleGenerate => self
                .client
                .post(self.generate_content_url(model)?)
                .header(GOOGLE_KEY_HEADER, &self.api_key)
                .json(&json!({
                    "contents": [{"parts": [{"text": prompt}]}],
                })),
        };
        Ok(request)
    }

    /// `{base}/models/{model}:generateContent`, with the model escaped as
    /// a single path segment.
    fn generate_content_url(&self, model: &str) -> Result<Url> {
        let invalid = || {
            RouteError::Config(format!(
                "invalid base URL for {}: {}",
                self.provider, self.base_url
            ))
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push("models")
            .push(&format!("{model}:generateContent"));
        Ok(url)
    }

    fn parse_error(&self, message: impl std::fmt::Display) -> RouteError {
        RouteError::ParseResponse {
            provider: self.provider.to_string(),
            message: message.to_string(),
        }
    }

    fn parse_body(&self, prompt: &str, body: &str) -> Result<Completion> {
        let (text, tokens, finish_reason) = match self.wire {
            WireFormat::ChatCompletions => {
                let parsed: ChatCompletionResponse =
                    serde_json::from_str(body).map_err(|e| self.parse_error(e))?;
                let choice = parsed
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error("response has no choices"))?;
                let tokens = parsed.usage.and_then(|u| {
                    u.total_tokens.or(match (u.prompt_tokens, u.completion_tokens) {
                        (None, None) => None,
                        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
                    })
                });
                (
                    choice.message.content.unwrap_or_default(),
                    tokens,
                    choice.finish_reason,
                )
            }
            WireFormat::AnthropicMessages => {
                let parsed: AnthropicResponse =
                    serde_json::from_str(body).map_err(|e| self.parse_error(e))?;
                let text = parsed
                    .content
                    .into_iter()
                    .filter_map(|b| b.text)
                    .collect::<Vec<_>>()
                    .join("");
                let tokens = parsed.usage.map(|u| u.input_tokens + u.output_tokens);
                (text, tokens, parsed.stop_reason)
            }
            WireFormat::GoogleGenerate => {
                let parsed: GoogleResponse =
                    serde_json::from_str(body).map_err(|e| self.parse_error(e))?;
                let candidate = parsed
                    .candidates
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error("response has no candidates"))?;
                let text = candidate
                    .content
                    .map(|c| {
                        c.parts
                            .into_iter()
                            .filter_map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                let tokens = parsed.usage_metadata.and_then(|u| u.total_token_count);
                (text, tokens, candidate.finish_reason)
            }
        };

        Ok(Completion {
            tokens_consumed: tokens.unwrap_or_else(|| estimate_tokens(prompt, &text)),
            text,
            finish_reason,
        })
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn send(&self, model: &str, prompt: &str, timeout: Duration) -> Result<Completion> {
        tracing::debug!(provider = %self.provider, model, "sending remote request");

        let response = self
            .build_request(model, prompt)?
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(self.provider, e, timeout))?;

        if !response.status().is_success() {
            return Err(remote_api_error(self.provider, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| map_send_error(self.provider, e, timeout))?;
        self.parse_body(prompt, &body)
    }
}
