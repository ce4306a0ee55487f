//! Fix suggestion database for routing errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

use std::time::Duration;

use super::RemoteErrorKind;
use crate::core::provider::ProviderId;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FixSuggestion {
    /// Fix commands in order of preference, copy-paste ready.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,

    /// Link to documentation for more information.
    pub doc_url: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
            doc_url: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }

    /// Builder: adds documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }
}

// =============================================================================
// Remediation Helpers
// =============================================================================

/// Installing the local engine and pulling a first model.
#[must_use]
pub fn local_engine_setup() -> FixSuggestion {
    FixSuggestion::new(
        vec![
            "curl -fsSL https://ollama.com/install.sh | sh".to_string(),
            "ollama pull llama3.2".to_string(),
            "ollama serve".to_string(),
        ],
        "Install Ollama for free local inference (recommended, zero cost per token).",
    )
    .with_doc_url(ProviderId::Ollama.credential_setup_url())
}

/// Exporting the credential for a remote provider.
#[must_use]
pub fn credential_setup(provider: ProviderId) -> FixSuggestion {
    let var = provider.credential_env_vars().first().copied().unwrap_or("API_KEY");
    FixSuggestion::new(
        vec![format!("export {var}=<your-key>")],
        format!(
            "Configure {} (metered, ~${}/1k tokens) by setting {var}.",
            provider.display_name(),
            provider.default_cost_per_1k_tokens()
        ),
    )
    .with_doc_url(provider.credential_setup_url())
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Ordered remediation list for a router with nothing usable: the local
/// engine first, then every remote provider's credential setup.
#[must_use]
pub fn no_provider_suggestions() -> Vec<FixSuggestion> {
    std::iter::once(local_engine_setup())
        .chain(ProviderId::REMOTE.iter().copied().map(credential_setup))
        .collect()
}

#[must_use]
pub fn provider_unavailable_suggestions(provider: &str, reason: &str) -> Vec<FixSuggestion> {
    match ProviderId::from_cli_name(provider) {
        Ok(ProviderId::Ollama) => vec![
            FixSuggestion::new(
                vec![
                    "ollama serve".to_string(),
                    "ollama list".to_string(),
                    "ollama pull llama3.2".to_string(),
                ],
                format!(
                    "The local engine is not usable: {reason}. Make sure Ollama is \
                     running and has at least one model pulled."
                ),
            )
            .with_prevention("Run Ollama as a service so it starts with the machine."),
        ],
        Ok(remote) => vec![
            credential_setup(remote),
            FixSuggestion::new(
                vec![format!("infroute status --refresh")],
                format!("{} is unavailable: {reason}.", remote.display_name()),
            ),
        ],
        Err(_) => vec![FixSuggestion::new(
            vec!["infroute status --refresh".to_string()],
            format!("Provider {provider} is unavailable: {reason}."),
        )],
    }
}

#[must_use]
pub fn model_not_found_suggestions(model: &str, provider: Option<&str>) -> Vec<FixSuggestion> {
    let mut out = vec![FixSuggestion::new(
        vec!["infroute models".to_string()],
        format!(
            "No provider recognised the model '{model}'. List the locally discovered \
             models, or omit --model to let the router choose."
        ),
    )];
    if provider.is_none_or(|p| p == ProviderId::Ollama.cli_name()) {
        out.push(FixSuggestion::new(
            vec![format!("ollama pull {model}")],
            "If this is a local model, pull it into Ollama first.",
        ));
    }
    out
}

#[must_use]
pub fn fallback_exhausted_suggestions(attempts: &[String]) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["infroute status --refresh".to_string()],
            format!(
                "Every provider in the fallback chain failed ({} attempt(s)). \
                 Check each provider's health.",
                attempts.len()
            ),
        )
        .with_prevention("Keep the local engine running so auto mode always has a free option."),
    ]
}

#[must_use]
pub fn timeout_suggestions(provider: &str, after: Duration) -> Vec<FixSuggestion> {
    let secs = after.as_secs().max(1);
    vec![
        FixSuggestion::new(
            vec![format!("infroute route --provider {provider} --timeout {} \"...\"", secs * 2)],
            format!(
                "{provider} did not answer within {secs}s. Large local models can take a \
                 while to load on first use."
            ),
        )
        .with_prevention("Raise [general].timeout_seconds or INFROUTE_TIMEOUT."),
    ]
}

#[must_use]
pub fn transport_suggestions(provider: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["infroute status --refresh".to_string()],
        format!("The connection to {provider} failed: {message}."),
    )]
}

#[must_use]
pub fn remote_api_suggestions(
    provider: &str,
    kind: RemoteErrorKind,
    status: Option<u16>,
    retry_after: Option<Duration>,
    message: &str,
) -> Vec<FixSuggestion> {
    let status_info = status.map_or(String::new(), |c| format!(" (HTTP {c})"));
    match kind {
        RemoteErrorKind::Auth => {
            let mut out = vec![FixSuggestion::new(
                vec!["# Verify the API key is current and has access to this model".to_string()],
                format!("{provider} rejected the credentials{status_info}: {message}."),
            )];
            if let Ok(id) = ProviderId::from_cli_name(provider) {
                out.push(credential_setup(id));
            }
            out
        }
        RemoteErrorKind::RateLimit => {
            let wait = retry_after.map_or_else(
                || "Wait before retrying.".to_string(),
                |d| format!("Try again in {} seconds.", d.as_secs()),
            );
            vec![
                FixSuggestion::new(
                    vec!["infroute route \"...\"".to_string()],
                    format!("{provider} rate limited the request: {message}. {wait}"),
                )
                .with_prevention(
                    "Auto mode skips a rate-limited provider until its cooldown passes.",
                ),
            ]
        }
        RemoteErrorKind::Other => vec![FixSuggestion::new(
            vec!["infroute status".to_string()],
            format!("{provider} returned an error{status_info}: {message}."),
        )],
    }
}

#[must_use]
pub fn invalid_provider_suggestions(name: &str) -> Vec<FixSuggestion> {
    let valid = ProviderId::ALL
        .iter()
        .map(|p| p.cli_name())
        .collect::<Vec<_>>()
        .join(", ");
    vec![FixSuggestion::new(
        vec!["infroute status".to_string()],
        format!("Unknown provider '{name}'. Valid providers: {valid}."),
    )]
}

#[must_use]
pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["$EDITOR \"$(infroute status --config-path)\"".to_string()],
        format!("Invalid config value for '{key}': '{value}'. {message}"),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_lists_local_then_each_remote() {
        let steps = no_provider_suggestions();
        assert_eq!(steps.len(), 1 + ProviderId::REMOTE.len());
        assert!(steps[0].commands.iter().any(|c| c.contains("ollama pull")));
        for (step, provider) in steps.iter().skip(1).zip(ProviderId::REMOTE) {
            assert!(step.context.contains(provider.display_name()));
        }
    }

    #[test]
    fn auth_errors_point_at_credentials() {
        let steps = remote_api_suggestions(
            "anthropic",
            RemoteErrorKind::Auth,
            Some(401),
            None,
            "invalid x-api-key",
        );
        assert!(steps.iter().any(|s| s.commands.iter().any(|c| c.contains("ANTHROPIC_API_KEY"))));
    }

    #[test]
    fn model_not_found_offers_pull_for_local() {
        let steps = model_not_found_suggestions("mistral", Some("ollama"));
        assert!(steps.iter().any(|s| s.commands.contains(&"ollama pull mistral".to_string())));
        let steps = model_not_found_suggestions("gpt-9", Some("openai"));
        assert_eq!(steps.len(), 1);
    }
}
