//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::core::models::{DispatchResult, RoutingDecision};
use crate::core::policy::RouteAttempt;
use crate::core::status::{DiscoveryView, StatusReport};
use crate::error::Result;

/// What the `route` command prints. `response` is absent on a dry run.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReport<'a> {
    pub decision: &'a RoutingDecision,
    pub response: Option<&'a DispatchResult>,
    pub attempts: &'a [RouteAttempt],
}

/// Render a routed (or dry-run) request.
pub fn render_route(
    report: &RouteReport<'_>,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => human::render_route(report, no_color),
        OutputFormat::Json => robot::render_route_json(report, pretty),
        OutputFormat::Md => robot::render_route_md(report),
    }
}

/// Render the status report.
pub fn render_status(
    report: &StatusReport,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => human::render_status(report, no_color),
        OutputFormat::Json => robot::render_status_json(report, pretty),
        OutputFormat::Md => robot::render_status_md(report),
    }
}

/// Render the discovered model list.
pub fn render_models(
    view: &DiscoveryView,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => human::render_models(view, no_color),
        OutputFormat::Json => robot::render_models_json(view, pretty),
        OutputFormat::Md => robot::render_models_md(view),
    }
}
