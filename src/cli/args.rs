//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::models::RoutingRequest;
use crate::core::provider::ProviderId;
use crate::error::{Result, RouteError};
use crate::storage::config::CliOverrides;

/// Local-first inference router - route prompts to Ollama or a metered API.
#[derive(Parser, Debug)]
#[command(name = "infroute")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Local engine base URL
    #[arg(long, value_name = "URL", global = true)]
    pub ollama_url: Option<String>,

    /// Shared usage store to append records to
    #[arg(long, value_name = "PATH", global = true)]
    pub usage_db: Option<PathBuf>,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    /// Configuration overrides given on the command line.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            timeout_seconds: match &self.command {
                Some(Commands::Route(args)) => args.timeout,
                Some(Commands::Repl(args)) => args.timeout,
                _ => None,
            },
            ollama_url: self.ollama_url.clone(),
            usage_db: self.usage_db.clone(),
            no_color: self.no_color,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route one prompt and print the response
    Route(RouteArgs),

    /// Show provider availability, discovery and cost savings
    Status(StatusArgs),

    /// List models discovered on the local engine
    Models,

    /// Route one prompt per stdin line
    Repl(ReplArgs),
}

/// Arguments for the `route` command.
#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Prompt text
    #[arg(value_name = "PROMPT", required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    /// Model name or alias (default: auto)
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Provider to use (ollama, anthropic, openai, google, xai, perplexity)
    #[arg(short, long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Dispatch timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Print the decision without sending the prompt
    #[arg(long)]
    pub dry_run: bool,
}

impl RouteArgs {
    /// Build the routing request.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidProvider`] for an unknown provider, or a
    /// config error for a blank prompt.
    pub fn request(&self) -> Result<RoutingRequest> {
        let prompt = self.prompt.join(" ");
        if prompt.trim().is_empty() {
            return Err(RouteError::Config("prompt must not be empty".to_string()));
        }
        build_request(prompt, self.model.as_deref(), self.provider.as_deref())
    }
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Probe every provider and rerun discovery first
    #[arg(long)]
    pub refresh: bool,

    /// Print the config file path and exit
    #[arg(long)]
    pub config_path: bool,
}

/// Arguments for the `repl` command.
#[derive(Parser, Debug)]
pub struct ReplArgs {
    /// Model name or alias for every prompt (default: auto)
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Provider for every prompt
    #[arg(short, long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Dispatch timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl ReplArgs {
    /// Build the routing request for one input line.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidProvider`] for an unknown provider.
    pub fn request(&self, line: &str) -> Result<RoutingRequest> {
        build_request(line.to_string(), self.model.as_deref(), self.provider.as_deref())
    }
}

fn build_request(
    prompt: String,
    model: Option<&str>,
    provider: Option<&str>,
) -> Result<RoutingRequest> {
    let mut request = RoutingRequest::auto(prompt);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    if let Some(name) = provider {
        request = request.with_provider(ProviderId::from_cli_name(name)?);
    }
    Ok(request)
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Markdown output
    Md,
}
