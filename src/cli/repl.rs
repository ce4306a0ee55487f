//! `repl` command: route one prompt per input line.
//!
//! Background discovery and health timers run for the whole session, so
//! later prompts see models pulled after startup. Ctrl+C or end of input
//! ends the session and prints the usage summary.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::cli::args::{OutputFormat, ReplArgs};
use crate::core::router::Router;
use crate::error::Result;
use crate::render::{self, RouteReport, error::render_error_full};
use crate::storage::config::ResolvedConfig;

/// Counters for one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplState {
    pub routed: u64,
    pub failed: u64,
}

impl ReplState {
    const fn record(&mut self, ok: bool) {
        if ok {
            self.routed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Execute the repl command over stdin.
///
/// # Errors
///
/// Returns an error if the router cannot be built, stdin fails, or
/// rendering fails. Per-prompt routing errors are printed and skipped.
pub async fn execute(
    args: &ReplArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let router = Router::from_config(config)?;
    router.refresh().await;
    let _background = router.spawn_background();

    let stdin = BufReader::new(tokio::io::stdin());
    let state = run_session(&router, args, stdin, config, format, pretty).await;
    router.shutdown().await;
    let state = state?;

    tracing::info!(routed = state.routed, failed = state.failed, "session ended");
    eprintln!(
        "{}",
        render::render_status(&router.status(), OutputFormat::Human, false, config.no_color)?
            .trim_end()
    );
    Ok(())
}

pub(crate) async fn run_session<R>(
    router: &Router,
    args: &ReplArgs,
    input: R,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<ReplState>
where
    R: AsyncBufRead + Unpin,
{
    let mut state = ReplState::default();
    let mut lines = input.lines();

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown_rx => break,
        };
        let Some(line) = line else { break };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        let outcome = match args.request(prompt) {
            Ok(request) => router.route(&request).await,
            Err(e) => {
                eprintln!("{}", render_error_full(&e, format, config.no_color, pretty));
                state.record(false);
                continue;
            }
        };

        let attempts = outcome.attempts.clone();
        match outcome.into_result() {
            Ok((decision, response)) => {
                let report = RouteReport {
                    decision: &decision,
                    response: Some(&response),
                    attempts: &attempts,
                };
                println!(
                    "{}",
                    render::render_route(&report, format, pretty, config.no_color)?.trim_end()
                );
                state.record(true);
            }
            Err(e) => {
                eprintln!("{}", render_error_full(&e, format, config.no_color, pretty));
                state.record(false);
            }
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::EngineModel;
    use crate::test_utils::{ScriptedEngine, engine_model, resolved_config};
    use std::sync::Arc;

    fn router(models: Vec<EngineModel>) -> (Router, Arc<ScriptedEngine>, ResolvedConfig) {
        let config = resolved_config(&[]);
        let engine = Arc::new(ScriptedEngine::with_models(models));
        let router = Router::with_backends(&config, engine.clone(), Vec::new(), None);
        (router, engine, config)
    }

    fn args() -> ReplArgs {
        ReplArgs {
            model: None,
            provider: None,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn routes_each_non_blank_line() {
        let (router, engine, config) = router(vec![engine_model("llama3", 4)]);
        router.refresh().await;
        let input: &[u8] = b"first prompt\n\n   \nsecond prompt\n";
        let state = run_session(&router, &args(), input, &config, OutputFormat::Json, false)
            .await
            .unwrap();
        assert_eq!(state, ReplState { routed: 2, failed: 0 });
        assert_eq!(engine.generate_calls(), 2);
        assert_eq!(router.accountant().snapshot().local_request_count, 2);
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let (router, _engine, config) = router(Vec::new());
        router.refresh().await;
        let input: &[u8] = b"nothing can serve this\n";
        let state = run_session(&router, &args(), input, &config, OutputFormat::Json, false)
            .await
            .unwrap();
        assert_eq!(state, ReplState { routed: 0, failed: 1 });
    }
}
