//! Provider identities and static metadata.
//!
//! Defines every backend the router knows how to reach: the local engine
//! and the metered remote APIs. Live availability lives in
//! [`crate::core::registry`]; this module only holds facts that never
//! change while the process runs.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouteError};

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported inference backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Ollama,
    Anthropic,
    OpenAI,
    Google,
    Xai,
    Perplexity,
}

/// Whether a provider runs on this host or behind a metered API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Remote,
}

/// Request/response dialect spoken by a remote provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST /chat/completions` with bearer auth.
    ChatCompletions,
    /// `POST /messages` with `x-api-key`.
    AnthropicMessages,
    /// `POST /models/{model}:generateContent` with a key query parameter.
    GoogleGenerate,
}

impl ProviderId {
    /// All providers in default priority order.
    pub const ALL: &'static [Self] = &[
        Self::Ollama,
        Self::Anthropic,
        Self::OpenAI,
        Self::Google,
        Self::Xai,
        Self::Perplexity,
    ];

    /// Remote providers in default priority order.
    pub const REMOTE: &'static [Self] = &[
        Self::Anthropic,
        Self::OpenAI,
        Self::Google,
        Self::Xai,
        Self::Perplexity,
    ];

    /// Stable lowercase name used in config, env vars and output.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::Google => "google",
            Self::Xai => "xai",
            Self::Perplexity => "perplexity",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::Anthropic => "Anthropic",
            Self::OpenAI => "OpenAI",
            Self::Google => "Google Gemini",
            Self::Xai => "xAI",
            Self::Perplexity => "Perplexity",
        }
    }

    /// Parse from a CLI/config name (case-insensitive).
    ///
    /// `local` is accepted as an alias for the local engine and `gemini`
    /// as an alias for Google.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        match lower.as_str() {
            "local" => return Ok(Self::Ollama),
            "gemini" => return Ok(Self::Google),
            "grok" => return Ok(Self::Xai),
            _ => {}
        }
        Self::ALL
            .iter()
            .find(|p| p.cli_name() == lower)
            .copied()
            .ok_or_else(|| RouteError::InvalidProvider(name.to_string()))
    }

    #[must_use]
    pub const fn kind(self) -> ProviderKind {
        match self {
            Self::Ollama => ProviderKind::Local,
            _ => ProviderKind::Remote,
        }
    }

    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self.kind(), ProviderKind::Local)
    }

    /// Default fallback-chain priority. Lower is tried earlier; the local
    /// engine is always 0.
    #[must_use]
    pub const fn default_priority(self) -> u32 {
        match self {
            Self::Ollama => 0,
            Self::Anthropic => 10,
            Self::OpenAI => 11,
            Self::Google => 12,
            Self::Xai => 13,
            Self::Perplexity => 14,
        }
    }

    /// Default API endpoint.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1",
            Self::Xai => "https://api.x.ai/v1",
            Self::Perplexity => "https://api.perplexity.ai",
        }
    }

    /// Default price in USD per 1000 tokens. Zero for the local engine.
    #[must_use]
    pub const fn default_cost_per_1k_tokens(self) -> f64 {
        match self {
            Self::Ollama => 0.0,
            Self::Anthropic => 0.015,
            Self::OpenAI => 0.03,
            Self::Google => 0.001,
            Self::Xai => 0.02,
            Self::Perplexity => 0.005,
        }
    }

    /// Model used when auto mode lands on this provider.
    #[must_use]
    pub const fn default_model(self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::Anthropic => Some("claude-3.5-haiku-20241022"),
            Self::OpenAI => Some("gpt-4.1-mini"),
            Self::Google => Some("gemini-2.5-flash"),
            Self::Xai => Some("grok-3-mini"),
            Self::Perplexity => Some("sonar"),
        }
    }

    /// Environment variables holding the credential, in lookup order.
    #[must_use]
    pub const fn credential_env_vars(self) -> &'static [&'static str] {
        match self {
            Self::Ollama => &[],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::OpenAI => &["OPENAI_API_KEY"],
            Self::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::Xai => &["XAI_API_KEY"],
            Self::Perplexity => &["PERPLEXITY_API_KEY"],
        }
    }

    /// Environment variable overriding the fallback-chain priority.
    #[must_use]
    pub fn priority_env_var(self) -> String {
        format!("INFROUTE_PRIORITY_{}", self.cli_name().to_uppercase())
    }

    /// Wire dialect for remote providers.
    #[must_use]
    pub const fn wire_format(self) -> Option<WireFormat> {
        match self {
            Self::Ollama => None,
            Self::Anthropic => Some(WireFormat::AnthropicMessages),
            Self::Google => Some(WireFormat::GoogleGenerate),
            Self::OpenAI | Self::Xai | Self::Perplexity => Some(WireFormat::ChatCompletions),
        }
    }

    /// Where to obtain a credential for this provider.
    #[must_use]
    pub const fn credential_setup_url(self) -> &'static str {
        match self {
            Self::Ollama => "https://ollama.com/download",
            Self::Anthropic => "https://console.anthropic.com/settings/keys",
            Self::OpenAI => "https://platform.openai.com/api-keys",
            Self::Google => "https://aistudio.google.com/app/apikey",
            Self::Xai => "https://console.x.ai",
            Self::Perplexity => "https://www.perplexity.ai/settings/api",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cli_name())
    }
}
