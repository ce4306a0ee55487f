//! Data models shared by routing, dispatch and accounting.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;

// =============================================================================
// Model Descriptors
// =============================================================================

/// Inferred attribute of a model, used by default selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Code,
    Vision,
    Chat,
    LargeContext,
}

impl Capability {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Vision => "vision",
            Self::Chat => "chat",
            Self::LargeContext => "large-context",
        }
    }
}

/// A discovered model. Built once per discovery cycle and never edited in
/// place; a new cycle replaces the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub canonical_name: String,
    pub aliases: BTreeSet<String>,
    pub size_bytes: u64,
    pub family: Option<String>,
    pub capabilities: BTreeSet<Capability>,
    pub owning_provider: ProviderId,
    /// When the engine last saw the model change (pull/update).
    pub modified_at: Option<DateTime<Utc>>,
}

impl ModelDescriptor {
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Raw model entry reported by the local engine's listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineModel {
    pub name: String,
    pub size_bytes: u64,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Requests and Decisions
// =============================================================================

/// A free-form inference request as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRequest {
    pub requested_model: Option<String>,
    pub prompt_text: String,
    pub explicit_provider_hint: Option<ProviderId>,
}

impl RoutingRequest {
    /// An auto-mode request: no model, no provider hint.
    #[must_use]
    pub fn auto(prompt: impl Into<String>) -> Self {
        Self {
            requested_model: None,
            prompt_text: prompt.into(),
            explicit_provider_hint: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.requested_model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_provider(mut self, provider: ProviderId) -> Self {
        self.explicit_provider_hint = Some(provider);
        self
    }

    /// The requested model, treating blank and `auto` as absent.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.requested_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("auto"))
    }

    /// Whether the caller left both model and provider to the router.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.model().is_none() && self.explicit_provider_hint.is_none()
    }
}

/// Why a (provider, model) pair was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    ExplicitLocalMatch,
    ExplicitRemoteMatch,
    AutoLocalDefault,
    AutoFallbackRemote,
}

impl DecisionReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExplicitLocalMatch => "explicit-local-match",
            Self::ExplicitRemoteMatch => "explicit-remote-match",
            Self::AutoLocalDefault => "auto-local-default",
            Self::AutoFallbackRemote => "auto-fallback-remote",
        }
    }

    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::ExplicitLocalMatch | Self::ExplicitRemoteMatch)
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The chosen (provider, model, reason) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub provider: ProviderId,
    pub model: String,
    pub reason: DecisionReason,
}

// =============================================================================
// Completions and Usage
// =============================================================================

/// What a backend client returns for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub text: String,
    pub tokens_consumed: u64,
    pub finish_reason: Option<String>,
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub text: String,
    pub tokens_consumed: u64,
    pub duration_ms: u64,
    pub finish_reason: Option<String>,
    /// Whether the same-provider transient retry was used.
    pub retried: bool,
}

/// Immutable log entry for one dispatched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderId,
    pub model: String,
    pub tokens_consumed: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

impl UsageRecord {
    /// Build a record priced at `cost_per_1k_tokens`.
    #[must_use]
    pub fn priced(
        provider: ProviderId,
        model: impl Into<String>,
        tokens_consumed: u64,
        cost_per_1k_tokens: f64,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let cost_usd = tokens_consumed as f64 / 1000.0 * cost_per_1k_tokens;
        Self {
            timestamp: Utc::now(),
            provider,
            model: model.into(),
            tokens_consumed,
            cost_usd,
        }
    }
}

/// Rough token estimate used when a backend omits usage counts.
#[must_use]
pub fn estimate_tokens(prompt: &str, completion: &str) -> u64 {
    (prompt.split_whitespace().count() + completion.split_whitespace().count()) as u64
}
