//! Diagnostics for the router.
//!
//! Every routed request runs inside a `route` span. The span carries a
//! process-unique `request_id`, the routing mode and the requested model,
//! and [`record_attempt`] fills in `provider`, `model` and `attempt` as the
//! policy walks its candidates. Events logged by the dispatcher and the
//! backend clients inherit those fields.
//!
//! Output is human, compact or JSON lines, written to stderr or to the file
//! named by `INFROUTE_LOG_FILE`.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Span;
use tracing::field::Empty;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::core::models::RoutingRequest;
use crate::core::provider::ProviderId;
use crate::storage::config::EnvSnapshot;

const LOG_LEVEL_ENV: &str = "INFROUTE_LOG";
const LOG_FORMAT_ENV: &str = "INFROUTE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "INFROUTE_LOG_FILE";

/// Level used when neither a flag nor the environment picks one.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line, with span fields.
    Json,
    Compact,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Parse a level name. Accepts `warning` and `verbose` as aliases.
#[must_use]
pub fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(LevelFilter::WARN),
        "verbose" => Some(LevelFilter::DEBUG),
        other => other.parse().ok(),
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Resolved logging settings: CLI flags over environment over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Resolve from the global CLI flags and the environment.
    ///
    /// `--verbose` raises the level to at least debug. An unparsable
    /// `--log-level` falls back to the environment.
    #[must_use]
    pub fn resolve(
        cli_level: Option<&str>,
        json_output: bool,
        verbose: bool,
        env: &EnvSnapshot,
    ) -> Self {
        let mut level = cli_level
            .and_then(parse_level)
            .or_else(|| env.get(LOG_LEVEL_ENV).and_then(parse_level))
            .unwrap_or(DEFAULT_LEVEL);
        if verbose && level < LevelFilter::DEBUG {
            level = LevelFilter::DEBUG;
        }

        let format = if json_output {
            LogFormat::Json
        } else {
            env.get(LOG_FORMAT_ENV)
                .and_then(LogFormat::parse)
                .unwrap_or_default()
        };

        Self {
            level,
            format,
            file: env.get(LOG_FILE_ENV).map(PathBuf::from),
        }
    }

    /// Filter directive for this crate. `RUST_LOG` still wins in [`init`].
    #[must_use]
    pub fn directive(&self) -> String {
        format!("infroute={}", self.level.to_string().to_ascii_lowercase())
    }
}

/// Install the global subscriber. A second call is a no-op.
///
/// A log file that cannot be opened falls back to stderr.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .inspect_err(|e| eprintln!("cannot open log file {}: {e}", path.display()))
            .ok()
    });
    let writer = match file.as_ref().and_then(|f: &File| f.try_clone().ok()) {
        Some(f) => BoxMakeWriter::new(f),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    let installed = match settings.format {
        // Closing spans carry the per-request timing.
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
        LogFormat::Human => builder.with_target(false).without_time().try_init(),
    };
    if installed.is_err() {
        tracing::debug!("logging already initialized");
    }
}

// =============================================================================
// Request Spans
// =============================================================================

/// Open the span for one routed request.
#[must_use]
pub fn route_span(request: &RoutingRequest) -> Span {
    let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    tracing::info_span!(
        "route",
        request_id,
        mode = if request.is_auto() { "auto" } else { "explicit" },
        requested = request.model().unwrap_or("-"),
        provider = Empty,
        model = Empty,
        attempt = Empty,
    )
}

/// Record the candidate being dispatched on a `route` span.
pub fn record_attempt(span: &Span, provider: ProviderId, model: &str, attempt: usize) {
    span.record("provider", provider.cli_name());
    span.record("model", model);
    span.record("attempt", attempt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn flag_beats_environment() {
        let env = env(&[(LOG_LEVEL_ENV, "trace"), (LOG_FORMAT_ENV, "compact")]);
        let settings = LogSettings::resolve(Some("info"), false, false, &env);
        assert_eq!(settings.level, LevelFilter::INFO);
        assert_eq!(settings.format, LogFormat::Compact);
        assert_eq!(settings.directive(), "infroute=info");

        let from_env = LogSettings::resolve(Some("loud"), true, false, &env);
        assert_eq!(from_env.level, LevelFilter::TRACE);
        assert_eq!(from_env.format, LogFormat::Json);
    }

    #[test]
    fn defaults_and_verbose() {
        let quiet = LogSettings::resolve(None, false, false, &env(&[]));
        assert_eq!(quiet.level, DEFAULT_LEVEL);
        assert_eq!(quiet.format, LogFormat::Human);
        assert!(quiet.file.is_none());

        let verbose = LogSettings::resolve(Some("error"), false, true, &env(&[]));
        assert_eq!(verbose.level, LevelFilter::DEBUG);
        let trace = LogSettings::resolve(Some("trace"), false, true, &env(&[]));
        assert_eq!(trace.level, LevelFilter::TRACE);
    }

    #[test]
    fn level_aliases() {
        assert_eq!(parse_level("Warning"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("verbose"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" off "), Some(LevelFilter::OFF));
        assert_eq!(parse_level("critical"), None);
        assert_eq!(LogFormat::parse("JSONL"), Some(LogFormat::Json));
    }

    #[test]
    fn blank_log_file_is_ignored() {
        let settings = LogSettings::resolve(None, false, false, &env(&[(LOG_FILE_ENV, "  ")]));
        assert!(settings.file.is_none());
        let settings =
            LogSettings::resolve(None, false, false, &env(&[(LOG_FILE_ENV, "/tmp/infroute.log")]));
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/infroute.log")));
    }

    #[test]
    #[traced_test]
    fn route_span_carries_attempt_fields() {
        let request = RoutingRequest::auto("hi").with_model("llama3");
        let span = route_span(&request);
        record_attempt(&span, ProviderId::Ollama, "llama3:latest", 2);
        span.in_scope(|| tracing::info!("dispatching"));

        assert!(logs_contain("mode=\"explicit\""));
        assert!(logs_contain("requested=\"llama3\""));
        assert!(logs_contain("provider=\"ollama\""));
        assert!(logs_contain("attempt=2"));
    }
}
