//! infroute - local-first inference request router
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::Parser;

use infroute::cli::{Cli, Commands};
use infroute::core::logging;
use infroute::storage::config::{EnvSnapshot, ResolvedConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&logging::LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.json_output,
        cli.verbose,
        &EnvSnapshot::capture(),
    ));

    let format = cli.effective_format();
    let pretty = cli.pretty;
    let no_color = cli.no_color || !infroute::util::env::should_use_color(cli.no_color);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let rendered = infroute::render::error::render_error_full(&e, format, no_color, pretty);
            eprintln!("{rendered}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> infroute::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let overrides = cli.overrides();
    let env = EnvSnapshot::capture();

    let Some(command) = cli.command else {
        print_quickstart();
        return Ok(());
    };

    if let Commands::Status(args) = &command
        && args.config_path
    {
        println!("{}", ResolvedConfig::config_path(&overrides, &env).display());
        return Ok(());
    }

    let mut config = ResolvedConfig::resolve(&overrides, &env)?;
    config.no_color = config.no_color || !infroute::util::env::should_use_color(config.no_color);
    tracing::debug!(
        path = %config.config_path.display(),
        timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
        "configuration resolved"
    );

    match command {
        Commands::Route(args) => infroute::cli::route::execute(&args, &config, format, pretty).await,
        Commands::Status(args) => infroute::cli::status::execute(&args, &config, format, pretty).await,
        Commands::Models => infroute::cli::models::execute(&config, format, pretty).await,
        Commands::Repl(args) => infroute::cli::repl::execute(&args, &config, format, pretty).await,
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r#"infroute - local-first inference router

Sends prompts to a local Ollama model when one is available and falls back
to metered APIs only when it has to.

USAGE:
    infroute [OPTIONS] <COMMAND>

COMMANDS:
    route     Route one prompt and print the response
    status    Show providers, discovered models and cost savings
    models    List models installed in the local engine
    repl      Route one prompt per line of stdin

QUICK START:
    infroute route "explain this stack trace"      # auto: local first
    infroute route --model llama3 "hello"          # explicit local model
    infroute route --model gpt-4o-mini "hello"     # explicit remote model
    infroute route --dry-run "hello"               # show the decision only
    infroute status --refresh                      # probe every provider

ROBOT MODE:
    infroute status --json                         # JSON output
    infroute models --format md                    # Markdown output

For more help: infroute --help
Version: {}"#,
        env!("CARGO_PKG_VERSION")
    );
}
