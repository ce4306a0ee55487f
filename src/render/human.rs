//! Human-readable output using `colored`.
//!
//! Renders route results, provider tables, discovered models and the
//! savings summary. With `no_color` every function returns plain text.

use colored::{ColoredString, Colorize};

use super::RouteReport;
use crate::core::discovery::DiscoveryStatus;
use crate::core::registry::{ProviderConfig, ProviderStatus};
use crate::core::status::{DiscoveryView, StatusReport};
use crate::error::Result;
use crate::util::{
    format_bytes, format_cost, format_countdown, format_percent, format_relative_time,
    format_tokens,
};

/// Apply `style` unless color is off.
fn paint(text: &str, no_color: bool, style: impl FnOnce(&str) -> ColoredString) -> String {
    if no_color {
        text.to_string()
    } else {
        style(text).to_string()
    }
}

fn status_color(status: &ProviderStatus, text: &str, no_color: bool) -> String {
    paint(text, no_color, |t| match status {
        ProviderStatus::Available => t.green(),
        ProviderStatus::RateLimited { .. } | ProviderStatus::NeedsModelPull => t.yellow(),
        ProviderStatus::Unreachable => t.red(),
        ProviderStatus::NotConfigured | ProviderStatus::Disabled | ProviderStatus::Unknown => {
            t.dimmed()
        }
    })
}

/// Savings color: green once most traffic stays local.
fn savings_color(percent: f64, text: &str, no_color: bool) -> String {
    paint(text, no_color, |t| {
        if percent >= 50.0 {
            t.green()
        } else if percent > 0.0 {
            t.yellow()
        } else {
            t.red()
        }
    })
}

// =============================================================================
// Route
// =============================================================================

/// Render a route result: the response text, then a one-line footer.
pub fn render_route(report: &RouteReport<'_>, no_color: bool) -> Result<String> {
    let d = report.decision;
    let mut out = String::new();

    if let Some(response) = report.response {
        out.push_str(response.text.trim_end());
        out.push_str("\n\n");
    }

    let mut footer = format!(
        "{} {} {}",
        paint(d.provider.display_name(), no_color, |t| t.cyan().bold()),
        paint(&d.model, no_color, |t| t.bold()),
        paint(&format!("({})", d.reason), no_color, |t| t.dimmed()),
    );
    if let Some(response) = report.response {
        footer.push_str(&paint(
            &format!(
                " · {} tokens · {}ms{}",
                format_tokens(response.tokens_consumed),
                response.duration_ms,
                if response.retried { " · retried" } else { "" }
            ),
            no_color,
            |t| t.dimmed(),
        ));
    } else {
        footer.push_str(&paint(" · dry run", no_color, |t| t.dimmed()));
    }
    out.push_str(&footer);
    out.push('\n');

    for attempt in report.attempts.iter().filter(|a| !a.success) {
        let line = format!(
            "  fell back from {} {}: {}",
            attempt.provider,
            attempt.model,
            attempt.error.as_deref().unwrap_or("failed")
        );
        out.push_str(&paint(&line, no_color, |t| t.yellow()));
        out.push('\n');
    }

    Ok(out)
}

// =============================================================================
// Status
// =============================================================================

pub fn render_status(report: &StatusReport, no_color: bool) -> Result<String> {
    let mut out = String::new();

    out.push_str(&paint("Providers", no_color, |t| t.bold().underline()));
    out.push('\n');
    for provider in &report.providers {
        out.push_str(&provider_line(provider, no_color));
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&paint("Local models", no_color, |t| t.bold().underline()));
    out.push('\n');
    out.push_str(&discovery_summary(&report.discovery, no_color));

    out.push('\n');
    out.push_str(&paint("Usage", no_color, |t| t.bold().underline()));
    out.push('\n');
    let usage = &report.usage;
    out.push_str(&format!(
        "  Requests: {} local, {} remote\n",
        usage.local_request_count, usage.remote_request_count
    ));
    out.push_str(&format!(
        "  Tokens:   {}\n  Cost:     {}\n",
        format_tokens(usage.total_tokens),
        format_cost(usage.total_cost)
    ));
    for (provider, totals) in &usage.per_provider {
        out.push_str(&paint(
            &format!(
                "    {provider}: {} requests, {} tokens, {}\n",
                totals.requests,
                format_tokens(totals.tokens),
                format_cost(totals.cost_usd)
            ),
            no_color,
            |t| t.dimmed(),
        ));
    }
    let savings = format_percent(report.savings_percent);
    out.push_str(&format!(
        "  Savings:  {} vs all-remote ({} saved)\n",
        savings_color(report.savings_percent, &savings, no_color),
        format_cost(usage.cost_saved_usd)
    ));

    out.push('\n');
    out.push_str(&paint(&report.recommendation, no_color, |t| t.italic()));
    out.push('\n');

    Ok(out)
}

fn provider_line(provider: &ProviderConfig, no_color: bool) -> String {
    let status = match provider.status {
        ProviderStatus::RateLimited { until } => {
            format!("rate limited, retry {}", format_countdown(until))
        }
        other => other.label().to_string(),
    };
    let cost = if provider.name.is_local() {
        "free".to_string()
    } else {
        format!("${:.4}/1k", provider.cost_per_k_tokens)
    };
    let mut line = format!(
        "  {:<12} {} {cost:>12}",
        provider.name.display_name(),
        status_color(&provider.status, &format!("{status:<28}"), no_color),
    );
    if let Some(model) = &provider.default_model {
        line.push_str(&paint(&format!("  {model}"), no_color, |t| t.dimmed()));
    }
    if let Some(error) = &provider.last_error {
        line.push_str(&paint(&format!("  ({error})"), no_color, |t| t.red()));
    }
    line
}

fn discovery_summary(view: &DiscoveryView, no_color: bool) -> String {
    let mut out = String::new();
    let when = view
        .discovered_at
        .map(|at| format!(", refreshed {}", format_relative_time(at)))
        .unwrap_or_default();
    let state = match view.status {
        DiscoveryStatus::Stale { missed_cycles } => {
            format!("stale ({missed_cycles} missed refresh(es))")
        }
        other => other.label().to_string(),
    };
    out.push_str(&format!(
        "  {} model(s), {}{when}\n",
        view.models.len(),
        paint(&state, no_color, |t| if view.status == DiscoveryStatus::Ready {
            t.green()
        } else {
            t.yellow()
        })
    ));
    if let Some(error) = &view.last_error {
        out.push_str(&paint(&format!("  last error: {error}\n"), no_color, |t| t.red()));
    }
    out
}

// =============================================================================
// Models
// =============================================================================

pub fn render_models(view: &DiscoveryView, no_color: bool) -> Result<String> {
    let mut out = discovery_summary(view, no_color);
    if view.models.is_empty() {
        out.push_str(&paint(
            "  No local models. Pull one with: ollama pull llama3.2\n",
            no_color,
            |t| t.dimmed(),
        ));
        return Ok(out);
    }

    let width = view.models.iter().map(|m| m.name.len()).max().unwrap_or(0);
    for model in &view.models {
        let caps: Vec<&str> = model.capabilities.iter().map(|c| c.label()).collect();
        out.push_str(&format!(
            "  {}  {:>8}  {}\n",
            paint(&format!("{:<width$}", model.name), no_color, |t| t.bold()),
            format_bytes(model.size_bytes),
            paint(&caps.join(", "), no_color, |t| t.cyan()),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::DiscoverySnapshot;
    use crate::core::models::{DecisionReason, DispatchResult, RoutingDecision};
    use crate::core::policy::RouteAttempt;
    use crate::core::provider::ProviderId;
    use crate::test_utils::make_descriptor;
    use chrono::Utc;

    fn decision(provider: ProviderId, model: &str) -> RoutingDecision {
        RoutingDecision {
            provider,
            model: model.to_string(),
            reason: DecisionReason::AutoFallbackRemote,
        }
    }

    #[test]
    fn route_output_puts_text_first() {
        let decision = decision(ProviderId::OpenAI, "gpt-4o-mini");
        let response = DispatchResult {
            text: "four\n".to_string(),
            tokens_consumed: 12,
            duration_ms: 340,
            finish_reason: None,
            retried: true,
        };
        let attempts = vec![RouteAttempt {
            provider: ProviderId::Ollama,
            model: "llama3".to_string(),
            reason: DecisionReason::AutoLocalDefault,
            started_at: Utc::now(),
            duration_ms: 5,
            success: false,
            error: Some("connection refused".to_string()),
        }];
        let out = render_route(
            &RouteReport {
                decision: &decision,
                response: Some(&response),
                attempts: &attempts,
            },
            true,
        )
        .unwrap();
        assert!(out.starts_with("four\n\n"));
        assert!(out.contains("OpenAI gpt-4o-mini (auto-fallback-remote)"));
        assert!(out.contains("retried"));
        assert!(out.contains("fell back from ollama llama3: connection refused"));
        assert!(!out.contains("\x1b["));
    }

    #[test]
    fn dry_run_has_no_response() {
        let decision = decision(ProviderId::Ollama, "llama3");
        let out = render_route(
            &RouteReport {
                decision: &decision,
                response: None,
                attempts: &[],
            },
            true,
        )
        .unwrap();
        assert!(out.contains("dry run"));
    }

    #[test]
    fn models_listing_shows_size_and_capabilities() {
        let snapshot = DiscoverySnapshot::ready(vec![
            make_descriptor("llava:13b", 8),
            make_descriptor("llama3", 4),
        ]);
        let out = render_models(&DiscoveryView::from_snapshot(&snapshot), true).unwrap();
        assert!(out.contains("2 model(s), ready"));
        assert!(out.contains("8.0 GB"));
        assert!(out.contains("vision"));
    }

    #[test]
    fn empty_listing_suggests_pull() {
        let snapshot = DiscoverySnapshot::ready(Vec::new());
        let out = render_models(&DiscoveryView::from_snapshot(&snapshot), true).unwrap();
        assert!(out.contains("ollama pull"));
    }
}
