//! Model name resolution and auto-mode model selection.
//!
//! Both functions are pure over a discovery snapshot: the same input and
//! snapshot always give the same model.

use std::cmp::{Ordering, Reverse};
use std::sync::LazyLock;

use regex::Regex;

use super::discovery::DiscoverySnapshot;
use super::models::{Capability, ModelDescriptor};
use super::provider::ProviderId;
use crate::error::{Result, RouteError};

/// Prompts shorter than this pick the smallest model.
pub const SHORT_PROMPT_CHARS: usize = 50;
/// Prompts longer than this prefer a long-context model.
pub const LONG_PROMPT_CHARS: usize = 200;

/// Prefixes that pin a name to the local engine.
const LOCAL_PREFIXES: &[&str] = &["ollama/", "ollama:", "local/", "local:"];

static CODE_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ```
        | \bdef\s
        | \b(?:code|coding|function|class|import|programming|script|compile|debug|refactor)\b
        | \b(?:python|javascript|typescript|rust|golang|java|kotlin|swift|ruby|php|haskell|sql|bash)\b
        | \bc\+\+
        ",
    )
    .expect("code prompt regex is valid")
});

/// Case-fold and strip a local-engine prefix.
#[must_use]
pub fn normalize(requested: &str) -> String {
    let lower = requested.trim().to_lowercase();
    LOCAL_PREFIXES
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .map_or_else(|| lower.clone(), str::to_string)
}

/// Whether the name carries a prefix that pins it to the local engine.
#[must_use]
pub fn is_local_pinned(requested: &str) -> bool {
    let lower = requested.trim().to_lowercase();
    LOCAL_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// Whether a prompt looks like a programming request.
#[must_use]
pub fn is_code_prompt(prompt: &str) -> bool {
    CODE_PROMPT.is_match(prompt)
}

/// Resolve a requested model against the snapshot's usable models.
///
/// Exact alias matches win. Otherwise the model with the shortest alias
/// that starts with the request wins, ties going to the most recently
/// modified model and then to the canonical name.
///
/// # Errors
///
/// Returns [`RouteError::ModelNotFound`] if nothing matches.
pub fn resolve<'a>(requested: &str, snapshot: &'a DiscoverySnapshot) -> Result<&'a ModelDescriptor> {
    resolve_in(requested, snapshot.usable_models())
}

/// [`resolve`] over an explicit model list.
///
/// # Errors
///
/// Returns [`RouteError::ModelNotFound`] if nothing matches.
pub fn resolve_in<'a>(requested: &str, models: &'a [ModelDescriptor]) -> Result<&'a ModelDescriptor> {
    let needle = normalize(requested);
    let not_found = || RouteError::ModelNotFound {
        model: requested.trim().to_string(),
        provider: Some(ProviderId::Ollama.to_string()),
    };
    if needle.is_empty() {
        return Err(not_found());
    }

    let exact = models
        .iter()
        .filter(|m| m.aliases.contains(&needle))
        .min_by(|a, b| {
            (a.canonical_name.to_lowercase() != needle)
                .cmp(&(b.canonical_name.to_lowercase() != needle))
                .then_with(|| newest_then_name(a, b))
        });
    if let Some(model) = exact {
        return Ok(model);
    }

    models
        .iter()
        .filter_map(|m| {
            m.aliases
                .iter()
                .filter(|a| a.starts_with(&needle))
                .map(String::len)
                .min()
                .map(|len| (len, m))
        })
        .min_by(|(len_a, a), (len_b, b)| len_a.cmp(len_b).then_with(|| newest_then_name(a, b)))
        .map(|(_, m)| m)
        .ok_or_else(not_found)
}

/// Pick a model for an auto-mode request.
///
/// Rules, first match wins:
/// 1. code prompt: smallest `code` model
/// 2. under [`SHORT_PROMPT_CHARS`]: smallest model
/// 3. over [`LONG_PROMPT_CHARS`]: largest `largeContext` model
/// 4. the configured default, else the smallest general-purpose model,
///    else the first discovered
///
/// Only chat-capable models are considered. A rule with no matching model
/// falls through to the next one.
#[must_use]
pub fn select_default<'a>(
    prompt: &str,
    snapshot: &'a DiscoverySnapshot,
    default_model: Option<&str>,
) -> Option<&'a ModelDescriptor> {
    select_default_in(prompt, snapshot.usable_models(), default_model)
}

/// [`select_default`] over an explicit model list.
#[must_use]
pub fn select_default_in<'a>(
    prompt: &str,
    models: &'a [ModelDescriptor],
    default_model: Option<&str>,
) -> Option<&'a ModelDescriptor> {
    let chat: Vec<&ModelDescriptor> = models.iter().filter(|m| m.has(Capability::Chat)).collect();
    if chat.is_empty() {
        return None;
    }
    let smallest = |pred: &dyn Fn(&ModelDescriptor) -> bool| {
        chat.iter()
            .copied()
            .filter(|m| pred(m))
            .min_by(|a, b| smaller_then_name(a, b))
    };
    let length = prompt.trim().chars().count();

    if is_code_prompt(prompt)
        && let Some(model) = smallest(&|m| m.has(Capability::Code))
    {
        return Some(model);
    }

    if length < SHORT_PROMPT_CHARS {
        return smallest(&|_| true);
    }

    if length > LONG_PROMPT_CHARS
        && let Some(model) = chat
            .iter()
            .copied()
            .filter(|m| m.has(Capability::LargeContext))
            .min_by(|a, b| {
                b.size_bytes
                    .cmp(&a.size_bytes)
                    .then_with(|| a.canonical_name.cmp(&b.canonical_name))
            })
    {
        return Some(model);
    }

    if let Some(name) = default_model
        && let Ok(model) = resolve_in(name, models)
        && model.has(Capability::Chat)
    {
        return Some(model);
    }

    smallest(&|m| {
        !m.has(Capability::Code) && !m.has(Capability::Vision) && !m.has(Capability::LargeContext)
    })
    .or_else(|| chat.first().copied())
}

/// Most recently modified first, then by canonical name.
fn newest_then_name(a: &ModelDescriptor, b: &ModelDescriptor) -> Ordering {
    Reverse(a.modified_at)
        .cmp(&Reverse(b.modified_at))
        .then_with(|| a.canonical_name.cmp(&b.canonical_name))
}

/// Smallest first, then by canonical name.
fn smaller_then_name(a: &ModelDescriptor, b: &ModelDescriptor) -> Ordering {
    a.size_bytes
        .cmp(&b.size_bytes)
        .then_with(|| a.canonical_name.cmp(&b.canonical_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_descriptor;
    use chrono::{TimeZone, Utc};

    fn scenario() -> Vec<ModelDescriptor> {
        vec![
            make_descriptor("llama-small", 2),
            make_descriptor("llama-code", 4),
            make_descriptor("llama-large", 40),
        ]
    }

    #[test]
    fn normalize_strips_local_prefixes() {
        assert_eq!(normalize("  Local/Llama3 "), "llama3");
        assert_eq!(normalize("ollama:codellama"), "codellama");
        assert_eq!(normalize("llama3:8b"), "llama3:8b");
        assert!(is_local_pinned("Ollama/llama3"));
        assert!(!is_local_pinned("llama3"));
    }

    #[test]
    fn exact_alias_beats_prefix() {
        let models = vec![make_descriptor("llama3:70b", 40), make_descriptor("llama3:latest", 5)];
        assert_eq!(resolve_in("llama3", &models).unwrap().canonical_name, "llama3:latest");
        assert_eq!(resolve_in("LLAMA3:70B", &models).unwrap().canonical_name, "llama3:70b");
    }

    #[test]
    fn shortest_prefix_wins_then_most_recent() {
        let mut older = make_descriptor("mistral:7b", 4);
        older.modified_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut newer = make_descriptor("mistral:7x", 4);
        newer.modified_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let longer = make_descriptor("mistral-nemo:12b", 7);
        let models = vec![older, longer, newer];

        assert_eq!(resolve_in("mistral", &models).unwrap().canonical_name, "mistral:7x");
        assert_eq!(resolve_in("mistral-", &models).unwrap().canonical_name, "mistral-nemo:12b");
    }

    #[test]
    fn resolution_is_deterministic() {
        let models = scenario();
        let first = resolve_in("llama", &models).unwrap().canonical_name.clone();
        for _ in 0..10 {
            assert_eq!(resolve_in("llama", &models).unwrap().canonical_name, first);
        }
    }

    #[test]
    fn unknown_model_is_not_found() {
        let err = resolve_in("gpt-4o", &scenario()).unwrap_err();
        assert!(matches!(err, RouteError::ModelNotFound { .. }));
        assert!(resolve_in("   ", &scenario()).is_err());
    }

    #[test]
    fn code_prompt_detection() {
        assert!(is_code_prompt("write a function to reverse a string"));
        assert!(is_code_prompt("def foo(): pass"));
        assert!(is_code_prompt("```\nls -la\n```"));
        assert!(is_code_prompt("port this to C++ please"));
        assert!(!is_code_prompt("What is 2+2?"));
        assert!(!is_code_prompt("a classic novel recommendation"));
    }

    #[test]
    fn selection_rules() {
        let models = scenario();
        let pick = |prompt: &str| {
            select_default_in(prompt, &models, None)
                .unwrap()
                .canonical_name
                .clone()
        };

        assert_eq!(pick("write a function to reverse a string"), "llama-code");
        assert_eq!(pick("What is 2+2?"), "llama-small");
        assert_eq!(pick("def f"), "llama-code");
        assert_eq!(pick(&"Tell me about the history of rivers. ".repeat(9)), "llama-large");
        assert_eq!(
            pick("Summarize the main causes of the French Revolution in one paragraph."),
            "llama-small"
        );
    }

    #[test]
    fn configured_default_used_for_medium_prompts() {
        let models = scenario();
        let medium = "Summarize the main causes of the French Revolution in one paragraph.";
        let picked = select_default_in(medium, &models, Some("llama-large")).unwrap();
        assert_eq!(picked.canonical_name, "llama-large");
    }

    #[test]
    fn long_prompt_without_large_model_falls_through() {
        let models = vec![make_descriptor("phi3", 2), make_descriptor("llama3", 5)];
        let long = "word ".repeat(60);
        assert_eq!(select_default_in(&long, &models, None).unwrap().canonical_name, "phi3");
    }

    #[test]
    fn embedding_only_inventory_selects_nothing() {
        let models = vec![make_descriptor("nomic-embed-text", 1)];
        assert!(select_default_in("hi", &models, None).is_none());
    }
}
