//! `status` command: providers, discovery and cost savings.

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::core::router::Router;
use crate::error::Result;
use crate::render;
use crate::storage::config::ResolvedConfig;

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the router cannot be built or rendering fails.
pub async fn execute(
    args: &StatusArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let router = Router::from_config(config)?;
    if args.refresh {
        router.refresh().await;
    } else {
        // Discovery only; remote probes wait for --refresh.
        router.refresh_models().await;
    }

    let report = router.status();
    println!(
        "{}",
        render::render_status(&report, format, pretty, config.no_color)?.trim_end()
    );
    Ok(())
}
