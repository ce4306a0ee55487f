//! `models` command: list what the local engine has installed.

use crate::cli::args::OutputFormat;
use crate::core::router::Router;
use crate::core::status::DiscoveryView;
use crate::error::Result;
use crate::render;
use crate::storage::config::ResolvedConfig;

/// Execute the models command.
///
/// # Errors
///
/// Returns an error if the router cannot be built or rendering fails.
pub async fn execute(config: &ResolvedConfig, format: OutputFormat, pretty: bool) -> Result<()> {
    let router = Router::from_config(config)?;
    let snapshot = router.refresh_models().await;
    let view = DiscoveryView::from_snapshot(&snapshot);
    println!(
        "{}",
        render::render_models(&view, format, pretty, config.no_color)?.trim_end()
    );
    Ok(())
}
