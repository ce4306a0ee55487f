//! Ollama local engine client.
//!
//! Talks to the engine's HTTP API:
//! - `GET /api/tags` lists installed models
//! - `POST /api/generate` runs a non-streaming generation
//!
//! Token usage is `prompt_eval_count + eval_count`; when the engine omits
//! both, a word-count estimate is used.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::LocalEngine;
use crate::core::http::{build_client, join_url, map_send_error, truncate_body};
use crate::core::models::{Completion, EngineModel, estimate_tokens};
use crate::core::provider::ProviderId;
use crate::error::{Result, RouteError};

const PROVIDER: ProviderId = ProviderId::Ollama;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct TagDetails {
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    parameter_size: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl From<TagEntry> for EngineModel {
    fn from(entry: TagEntry) -> Self {
        let details = entry.details.unwrap_or_default();
        Self {
            name: entry.name.unwrap_or_default(),
            size_bytes: entry.size.unwrap_or(0),
            family: details.family.filter(|f| !f.trim().is_empty()),
            parameter_size: details.parameter_size,
            modified_at: entry
                .modified_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(build_client()?, base_url))
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LocalEngine for OllamaClient {
    async fn list_models(&self, timeout: Duration) -> Result<Vec<EngineModel>> {
        let url = join_url(&self.base_url, "api/tags");
        tracing::debug!(url = %url, "listing local models");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e, timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RouteError::unavailable(
                PROVIDER,
                format!("model listing returned HTTP {}", status.as_u16()),
            ));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| map_send_error(PROVIDER, e, timeout))?;
        Ok(tags.models.into_iter().map(EngineModel::from).collect())
    }

    async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> Result<Completion> {
        let url = join_url(&self.base_url, "api/generate");
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e, timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RouteError::ModelNotFound {
                model: model.to_string(),
                provider: Some(PROVIDER.to_string()),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RouteError::unavailable(
                PROVIDER,
                format!("HTTP {}: {}", status.as_u16(), truncate_body(&text)),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| map_send_error(PROVIDER, e, timeout))?;

        let tokens = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => estimate_tokens(prompt, &parsed.response),
            (p, e) => p.unwrap_or(0) + e.unwrap_or(0),
        };

        Ok(Completion {
            text: parsed.response,
            tokens_consumed: tokens,
            finish_reason: parsed.done_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_entry_converts_with_details() {
        let json = r#"{
            "models": [
                {"name": "llama3.2:latest", "size": 2019393189,
                 "modified_at": "2024-10-01T12:00:00.123456789-07:00",
                 "details": {"family": "llama", "parameter_size": "3.2B"}},
                {"size": 5}
            ]
        }"#;
        let tags: TagsResponse = serde_json::from_str(json).unwrap();
        let models: Vec<EngineModel> = tags.models.into_iter().map(EngineModel::from).collect();
        assert_eq!(models[0].name, "llama3.2:latest");
        assert_eq!(models[0].family.as_deref(), Some("llama"));
        assert!(models[0].modified_at.is_some());
        assert!(models[1].name.is_empty());
    }
}
