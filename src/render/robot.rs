//! Robot-mode output (JSON and Markdown).
//!
//! Stable, token-efficient output for scripts and agents. JSON payloads
//! are wrapped in a versioned [`RobotOutput`] envelope.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RouteReport;
use crate::core::status::{DiscoveryView, StatusReport};
use crate::error::Result;
use crate::util::{format_bytes, format_cost, format_percent, format_tokens};

/// Envelope schema identifier.
pub const SCHEMA_VERSION: &str = "infroute.v1";

/// Versioned JSON envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors: Vec::new(),
        }
    }
}

/// Render any serializable value as JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json<T: Serialize>(output: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    })
}

// =============================================================================
// Route
// =============================================================================

pub fn render_route_json(report: &RouteReport<'_>, pretty: bool) -> Result<String> {
    render_json(&RobotOutput::new("route", report), pretty)
}

pub fn render_route_md(report: &RouteReport<'_>) -> Result<String> {
    let mut out = String::new();
    let d = report.decision;
    writeln!(out, "## route").ok();
    writeln!(out, "- provider: {}", d.provider).ok();
    writeln!(out, "- model: {}", d.model).ok();
    writeln!(out, "- reason: {}", d.reason).ok();
    if let Some(response) = report.response {
        writeln!(out, "- tokens: {}", response.tokens_consumed).ok();
        writeln!(out, "- duration_ms: {}", response.duration_ms).ok();
        if response.retried {
            writeln!(out, "- retried: true").ok();
        }
        writeln!(out, "\n{}", response.text.trim_end()).ok();
    }
    if report.attempts.len() > 1 {
        writeln!(out, "\n### attempts").ok();
        for attempt in report.attempts {
            writeln!(
                out,
                "- {} {}: {}",
                attempt.provider,
                attempt.model,
                attempt.error.as_deref().unwrap_or("ok")
            )
            .ok();
        }
    }
    Ok(out)
}

// =============================================================================
// Status
// =============================================================================

pub fn render_status_json(report: &StatusReport, pretty: bool) -> Result<String> {
    render_json(&RobotOutput::new("status", report), pretty)
}

pub fn render_status_md(report: &StatusReport) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "## providers").ok();
    writeln!(out, "| provider | priority | status | credential | cost/1k |").ok();
    writeln!(out, "|---|---|---|---|---|").ok();
    for p in &report.providers {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            p.name,
            p.priority,
            p.status.label(),
            if p.credential_present { "yes" } else { "no" },
            if p.name.is_local() {
                "free".to_string()
            } else {
                format!("${:.4}", p.cost_per_k_tokens)
            }
        )
        .ok();
    }

    writeln!(out, "\n## discovery").ok();
    writeln!(out, "- status: {}", report.discovery.status.label()).ok();
    if let Some(at) = report.discovery.discovered_at {
        writeln!(out, "- discovered_at: {}", at.to_rfc3339()).ok();
    }
    writeln!(out, "- models: {}", report.discovery.models.len()).ok();

    let usage = &report.usage;
    writeln!(out, "\n## usage").ok();
    writeln!(out, "- requests: {} local, {} remote", usage.local_request_count, usage.remote_request_count).ok();
    writeln!(out, "- tokens: {}", format_tokens(usage.total_tokens)).ok();
    writeln!(out, "- total_cost: {}", format_cost(usage.total_cost)).ok();
    writeln!(out, "- savings: {}", format_percent(report.savings_percent)).ok();
    writeln!(out, "- recommendation: {}", report.recommendation).ok();
    Ok(out)
}

// =============================================================================
// Models
// =============================================================================

pub fn render_models_json(view: &DiscoveryView, pretty: bool) -> Result<String> {
    render_json(&RobotOutput::new("models", view), pretty)
}

pub fn render_models_md(view: &DiscoveryView) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "## models ({})", view.status.label()).ok();
    for model in &view.models {
        let caps: Vec<&str> = model.capabilities.iter().map(|c| c.label()).collect();
        writeln!(
            out,
            "- {} ({}): {}",
            model.name,
            format_bytes(model.size_bytes),
            caps.join(", ")
        )
        .ok();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::DiscoverySnapshot;
    use crate::core::models::{DecisionReason, DispatchResult, RoutingDecision};
    use crate::core::provider::ProviderId;
    use crate::test_utils::make_descriptor;

    fn decision() -> RoutingDecision {
        RoutingDecision {
            provider: ProviderId::Ollama,
            model: "llama3".to_string(),
            reason: DecisionReason::AutoLocalDefault,
        }
    }

    fn response() -> DispatchResult {
        DispatchResult {
            text: "4".to_string(),
            tokens_consumed: 9,
            duration_ms: 120,
            finish_reason: Some("stop".to_string()),
            retried: false,
        }
    }

    #[test]
    fn route_json_has_envelope() {
        let decision = decision();
        let response = response();
        let report = RouteReport {
            decision: &decision,
            response: Some(&response),
            attempts: &[],
        };
        let json: serde_json::Value =
            serde_json::from_str(&render_route_json(&report, false).unwrap()).unwrap();
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["command"], "route");
        assert_eq!(json["data"]["decision"]["reason"], "auto-local-default");
        assert_eq!(json["data"]["response"]["tokensConsumed"], 9);
    }

    #[test]
    fn compact_json_is_single_line() {
        let decision = decision();
        let report = RouteReport {
            decision: &decision,
            response: None,
            attempts: &[],
        };
        assert!(!render_route_json(&report, false).unwrap().contains('\n'));
        assert!(render_route_json(&report, true).unwrap().contains('\n'));
    }

    #[test]
    fn route_md_lists_decision() {
        let decision = decision();
        let response = response();
        let md = render_route_md(&RouteReport {
            decision: &decision,
            response: Some(&response),
            attempts: &[],
        })
        .unwrap();
        assert!(md.contains("- provider: ollama"));
        assert!(md.contains("- reason: auto-local-default"));
        assert!(md.trim_end().ends_with('4'));
    }

    #[test]
    fn models_md_lists_capabilities() {
        let snapshot = DiscoverySnapshot::ready(vec![make_descriptor("codellama:7b", 4)]);
        let md = render_models_md(&DiscoveryView::from_snapshot(&snapshot)).unwrap();
        assert!(md.contains("codellama:7b (4.0 GB): code, chat"));
    }
}
