//! Static catalogue of remote model names.
//!
//! Maps a requested model string to the remote provider that serves it:
//! exact names first, then legacy aliases, then family patterns. Provider
//! prefixes such as `openai/gpt-4o` pin the provider.

use crate::core::provider::ProviderId;

/// Known model names per remote provider.
const KNOWN_MODELS: &[(ProviderId, &[&str])] = &[
    (
        ProviderId::Anthropic,
        &[
            "claude-opus-4-1-20250805",
            "claude-opus-4",
            "claude-sonnet-4",
            "claude-3.7-sonnet",
            "claude-3.5-sonnet-20241022",
            "claude-3.5-haiku-20241022",
            "claude-3-opus-20240229",
            "claude-3-sonnet-20240229",
            "claude-3-haiku-20240307",
        ],
    ),
    (
        ProviderId::OpenAI,
        &[
            "gpt-5",
            "gpt-5-mini",
            "gpt-5-nano",
            "gpt-5-chat",
            "o3-pro",
            "o3",
            "o3-mini",
            "o1",
            "o1-mini",
            "gpt-4.5",
            "gpt-4.1",
            "gpt-4.1-mini",
            "gpt-4o",
            "gpt-4-turbo",
            "gpt-4",
            "gpt-3.5-turbo",
        ],
    ),
    (
        ProviderId::Google,
        &[
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            "gemini-2.5-flash-lite",
            "gemini-2.0-flash",
            "gemini-2.0-flash-lite",
        ],
    ),
    (
        ProviderId::Xai,
        &[
            "grok-4-0709",
            "grok-4-fast",
            "grok-4-fast-reasoning",
            "grok-3",
            "grok-3-mini",
            "grok-2-vision-1212",
            "grok-code-fast-1",
        ],
    ),
    (
        ProviderId::Perplexity,
        &[
            "sonar",
            "sonar-pro",
            "sonar-reasoning",
            "sonar-reasoning-pro",
            "sonar-deep-research",
        ],
    ),
];

/// Retired names still accepted from callers.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("gemini-pro", "gemini-2.5-pro"),
    ("gemini-pro-vision", "gemini-2.5-flash"),
    ("claude-3-opus", "claude-opus-4-1-20250805"),
    ("claude-3-sonnet", "claude-sonnet-4"),
    ("gpt-4-vision-preview", "gpt-4o"),
];

/// A remote model the catalogue recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMatch {
    pub provider: ProviderId,
    pub model: String,
}

/// Look up a requested model string in the remote catalogue.
///
/// Returns `None` for names that look local (e.g. `local/llama3`) or match
/// no remote family.
#[must_use]
pub fn lookup(requested: &str) -> Option<RemoteMatch> {
    let lower = requested.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if let Some((prefix, rest)) = lower.split_once(['/', ':'])
        && let Ok(provider) = ProviderId::from_cli_name(prefix)
    {
        if provider.is_local() || rest.is_empty() {
            return None;
        }
        return Some(RemoteMatch {
            provider,
            model: canonical_alias(rest).unwrap_or(rest).to_string(),
        });
    }

    let name = canonical_alias(&lower).unwrap_or(&lower);

    if let Some(provider) = known_provider(name) {
        return Some(RemoteMatch {
            provider,
            model: name.to_string(),
        });
    }

    family_provider(name).map(|provider| RemoteMatch {
        provider,
        model: name.to_string(),
    })
}

/// All catalogued model names for a provider.
#[must_use]
pub fn known_models(provider: ProviderId) -> &'static [&'static str] {
    KNOWN_MODELS
        .iter()
        .find(|(p, _)| *p == provider)
        .map_or(&[], |(_, models)| models)
}

fn canonical_alias(name: &str) -> Option<&'static str> {
    LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

fn known_provider(name: &str) -> Option<ProviderId> {
    KNOWN_MODELS
        .iter()
        .find(|(_, models)| models.contains(&name))
        .map(|(provider, _)| *provider)
}

fn family_provider(name: &str) -> Option<ProviderId> {
    if ["claude", "opus", "sonnet"].iter().any(|p| name.contains(p)) {
        Some(ProviderId::Anthropic)
    } else if ["gpt", "o1", "o3"].iter().any(|p| name.starts_with(p)) || name.contains("davinci") {
        Some(ProviderId::OpenAI)
    } else if name.contains("gemini") || name.contains("bison") {
        Some(ProviderId::Google)
    } else if name.contains("grok") {
        Some(ProviderId::Xai)
    } else if name.contains("pplx") || name.contains("sonar") {
        Some(ProviderId::Perplexity)
    } else {
        None
    }
}
