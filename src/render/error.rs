//! Error rendering.
//!
//! Colored output with fix suggestions for terminals, one-line text for
//! pipes, and structured JSON for robot formats.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, RouteError};

// =============================================================================
// Public API
// =============================================================================

/// Render an error for `format`.
///
/// Colored output is used only for human format on a terminal stderr with
/// color enabled; everything else gets plain text or JSON.
#[must_use]
pub fn render_error(error: &RouteError, format: OutputFormat, no_color: bool) -> String {
    render_error_full(error, format, no_color, false)
}

/// Render an error with explicit control over JSON pretty-printing.
#[must_use]
pub fn render_error_full(
    error: &RouteError,
    format: OutputFormat,
    no_color: bool,
    pretty: bool,
) -> String {
    match format {
        OutputFormat::Json => return render_error_json(error, pretty),
        OutputFormat::Md => return render_error_json(error, true),
        OutputFormat::Human => {}
    }

    if crate::util::env::should_use_color(no_color) && crate::util::env::stderr_is_tty() {
        render_colored(error)
    } else {
        render_simple(error)
    }
}

/// Render an error as structured JSON.
#[must_use]
pub fn render_error_json(error: &RouteError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Colored Rendering
// =============================================================================

fn render_colored(error: &RouteError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![
        format!("{}", error.category().to_string().red().bold()),
        format!(
            "{}{}",
            error.to_string().red(),
            format!(" [{}]", error.error_code()).dimmed()
        ),
    ];

    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push(render_suggestions_section(&suggestions));
    }

    if let Some(first) = suggestions.first() {
        if !first.context.is_empty() {
            lines.push(String::new());
            lines.push(format!("{}", "Why this happened:".yellow()));
            lines.extend(wrap_text(&first.context, 60).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(prevention) = &first.prevention {
            lines.push(String::new());
            lines.push(format!("{}", "Prevention:".green()));
            lines.extend(wrap_text(prevention, 60).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(url) = &first.doc_url {
            lines.push(String::new());
            lines.push(format!("{}{}", "Docs: ".dimmed(), url.underline()));
        }
    }

    lines.join("\n")
}

fn render_suggestions_section(suggestions: &[FixSuggestion]) -> String {
    let mut lines = vec![format!("{}", "How to fix:".bold())];
    for (i, suggestion) in suggestions.iter().enumerate() {
        for (j, cmd) in suggestion.commands.iter().enumerate() {
            let prefix = if j == 0 {
                format!("  {}. ", i + 1)
            } else {
                "     Or: ".to_string()
            };
            lines.push(format!("{prefix}{}", cmd.cyan()));
        }
    }
    lines.join("\n")
}

// =============================================================================
// Simple Text Rendering
// =============================================================================

/// Plain text: the error line plus the first runnable fix command.
fn render_simple(error: &RouteError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];
    let fix = error
        .fix_suggestions()
        .into_iter()
        .flat_map(|s| s.commands)
        .find(|cmd| !cmd.starts_with('#'));
    if let Some(cmd) = fix {
        lines.push(format!("Fix: {cmd}"));
    }
    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

#[derive(serde::Serialize)]
struct ErrorJson {
    error_code: String,
    category: String,
    message: String,
    is_retryable: bool,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    suggestions: Vec<FixSuggestion>,
}

impl ErrorJson {
    fn from_error(error: &RouteError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_transient(),
            exit_code: i32::from(error.exit_code()),
            provider: error.provider().map(String::from),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            suggestions: error.fix_suggestions(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Greedy word wrap. Words longer than `width` get their own line.
pub(crate) fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use std::time::Duration;

    fn assert_no_ansi(s: &str) {
        assert!(!s.contains("\x1b["), "contains ANSI codes: {s}");
    }

    fn rate_limited() -> RouteError {
        RouteError::RemoteApi {
            provider: "openai".to_string(),
            kind: RemoteErrorKind::RateLimit,
            status: Some(429),
            retry_after: Some(Duration::from_secs(60)),
            message: "slow down".to_string(),
        }
    }

    #[test]
    fn simple_render_has_code_and_fix() {
        let output = render_simple(&RouteError::NoProviderConfigured);
        assert!(output.starts_with("Error [ROUTE-R002]"));
        assert!(output.contains("Fix: "));
        assert_no_ansi(&output);
    }

    #[test]
    fn simple_render_skips_comment_commands() {
        let err = RouteError::RemoteApi {
            provider: "anthropic".to_string(),
            kind: RemoteErrorKind::Auth,
            status: Some(401),
            retry_after: None,
            message: "invalid x-api-key".to_string(),
        };
        let output = render_simple(&err);
        assert!(!output.contains("Fix: #"));
    }

    #[test]
    fn json_render_includes_fields() {
        let parsed: serde_json::Value =
            serde_json::from_str(&render_error_json(&rate_limited(), false)).unwrap();
        assert_eq!(parsed["category"], "Provider error");
        assert_eq!(parsed["provider"], "openai");
        assert_eq!(parsed["retry_after_seconds"], 60);
        assert!(parsed["suggestions"].is_array());
    }

    #[test]
    fn json_render_omits_absent_fields() {
        let parsed: serde_json::Value =
            serde_json::from_str(&render_error_json(&RouteError::NoProviderConfigured, false))
                .unwrap();
        assert!(parsed.get("provider").is_none());
        assert!(parsed.get("retry_after_seconds").is_none());
        assert_eq!(parsed["exit_code"], 2);
    }

    #[test]
    fn timeouts_are_retryable() {
        let err = RouteError::Timeout {
            provider: "ollama".to_string(),
            after: Duration::from_secs(30),
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&render_error_json(&err, false)).unwrap();
        assert_eq!(parsed["is_retryable"], true);
    }

    #[test]
    fn colored_render_lists_suggestions() {
        let output = render_colored(&RouteError::NoProviderConfigured);
        assert!(output.contains("How to fix:"));
        assert!(output.contains("ollama pull"));
    }

    #[test]
    fn format_selection() {
        let err = RouteError::NoProviderConfigured;
        let json = render_error(&err, OutputFormat::Json, false);
        assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());
        assert!(!render_error_full(&err, OutputFormat::Json, false, false).contains("\n  "));
        assert!(render_error(&err, OutputFormat::Md, false).contains("\n  "));
        assert_no_ansi(&render_error(&err, OutputFormat::Human, true));
    }

    #[test]
    fn wrap_text_behaviour() {
        for line in wrap_text("a somewhat long line that should wrap at the given width", 20) {
            assert!(line.len() <= 20);
        }
        assert_eq!(wrap_text("", 60), vec![String::new()]);
        assert_eq!(wrap_text("one two three", 100), vec!["one two three".to_string()]);
    }
}
