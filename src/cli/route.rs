//! `route` command: send one prompt and print the response.

use crate::cli::args::{OutputFormat, RouteArgs};
use crate::core::router::Router;
use crate::error::Result;
use crate::render::{self, RouteReport};
use crate::storage::config::ResolvedConfig;

/// Execute the route command.
///
/// # Errors
///
/// Returns the routing or dispatch error for the request.
pub async fn execute(
    args: &RouteArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let request = args.request()?;
    let router = Router::from_config(config)?;
    router.refresh().await;

    if args.dry_run {
        let decision = router.decide(&request)?;
        let report = RouteReport {
            decision: &decision,
            response: None,
            attempts: &[],
        };
        print!("{}", render::render_route(&report, format, pretty, config.no_color)?);
        return Ok(());
    }

    let outcome = router.route(&request).await;
    tracing::debug!(
        state = ?outcome.final_state(),
        attempts = outcome.attempts.len(),
        "route finished"
    );
    let attempts = outcome.attempts.clone();
    let result = outcome.into_result();
    router.shutdown().await;
    let (decision, response) = result?;

    let report = RouteReport {
        decision: &decision,
        response: Some(&response),
        attempts: &attempts,
    };
    println!("{}", render::render_route(&report, format, pretty, config.no_color)?.trim_end());
    Ok(())
}
