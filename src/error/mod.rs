//! Error types for infroute.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Routing failures fall into five externally visible kinds:
//! - **ProviderUnavailable**: health check failed, or credentials are missing
//!   for an explicitly requested provider
//! - **ModelNotFound**: an explicit model string resolves against no provider
//! - **Timeout**: a dispatch exceeded its deadline
//! - **RemoteApi**: non-success response from a remote provider
//!   (authentication, rate limit, other)
//! - **NoProviderConfigured**: terminal, nothing usable at all
//!
//! In auto mode `ProviderUnavailable`, `ModelNotFound`, `Timeout` and
//! `Transport` are recovered by moving to the next provider. For explicit
//! requests they are surfaced unchanged.
//!
//! Each error has a stable error code (e.g., `ROUTE-P001`) and can produce
//! [`FixSuggestion`]s via [`RouteError::fix_suggestions()`].

pub mod suggestions;

use std::time::Duration;

use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Routing could not find a usable provider or model.
    Routing,
    /// Provider-side failures (unavailable, API errors).
    Provider,
    /// Network failures (timeouts, resets).
    Network,
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// Unexpected errors.
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Routing => "Routing error",
            Self::Provider => "Provider error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Routing => "R",
            Self::Provider => "P",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Subtype of a remote provider's non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// 401/403: key missing, revoked or lacking scope.
    Auth,
    /// 429: provider throttled the request.
    RateLimit,
    /// Anything else the provider rejected.
    Other,
}

impl RemoteErrorKind {
    /// Classify an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Auth => "authentication",
            Self::RateLimit => "rate limit",
            Self::Other => "api",
        }
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NoProvider = 2,
    ConfigError = 3,
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for infroute operations.
#[derive(Error, Debug)]
pub enum RouteError {
    // ==========================================================================
    // Routing errors
    // ==========================================================================
    /// Health check failed or credentials are missing.
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// Model string matched no configured provider.
    #[error("model '{model}' not found{}", .provider.as_ref().map(|p| format!(" on {p}")).unwrap_or_default())]
    ModelNotFound {
        model: String,
        provider: Option<String>,
    },

    /// No provider is usable at all.
    #[error("no inference provider configured or available")]
    NoProviderConfigured,

    /// Every auto-mode candidate failed with a recoverable error.
    #[error("all providers failed: {}", .attempts.join("; "))]
    FallbackExhausted { attempts: Vec<String> },

    // ==========================================================================
    // Provider / network errors
    // ==========================================================================
    /// Dispatch exceeded its deadline.
    #[error("request to {provider} timed out after {}ms", .after.as_millis())]
    Timeout { provider: String, after: Duration },

    /// Connection reset, refused or otherwise broken before a response.
    #[error("transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    /// Remote provider returned a non-success response.
    #[error("{provider} {kind} error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RemoteApi {
        provider: String,
        kind: RemoteErrorKind,
        status: Option<u16>,
        retry_after: Option<Duration>,
        message: String,
    },

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Unknown provider name.
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    /// Malformed response body.
    #[error("failed to parse response from {provider}: {message}")]
    ParseResponse { provider: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RouteError {
    /// Shorthand for [`RouteError::ProviderUnavailable`].
    pub fn unavailable(provider: impl ToString, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::NoProviderConfigured => ExitCode::NoProvider,
            Self::InvalidProvider(_) | Self::Config(_) | Self::ConfigInvalid { .. } => {
                ExitCode::ConfigError
            }
            Self::Timeout { .. } => ExitCode::Timeout,
            Self::ProviderUnavailable { .. }
            | Self::ModelNotFound { .. }
            | Self::FallbackExhausted { .. }
            | Self::Transport { .. }
            | Self::RemoteApi { .. }
            | Self::ParseResponse { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Database(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ModelNotFound { .. } | Self::NoProviderConfigured | Self::FallbackExhausted { .. } => {
                ErrorCategory::Routing
            }
            Self::ProviderUnavailable { .. } | Self::RemoteApi { .. } | Self::ParseResponse { .. } => {
                ErrorCategory::Provider
            }
            Self::Timeout { .. } | Self::Transport { .. } => ErrorCategory::Network,
            Self::InvalidProvider(_) | Self::Config(_) | Self::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }
            Self::Io(_) | Self::Json(_) | Self::Database(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Stable error code: `ROUTE-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "ROUTE-R001",
            Self::NoProviderConfigured => "ROUTE-R002",
            Self::FallbackExhausted { .. } => "ROUTE-R003",

            Self::ProviderUnavailable { .. } => "ROUTE-P001",
            Self::RemoteApi { kind: RemoteErrorKind::Auth, .. } => "ROUTE-P002",
            Self::RemoteApi { kind: RemoteErrorKind::RateLimit, .. } => "ROUTE-P003",
            Self::RemoteApi { kind: RemoteErrorKind::Other, .. } => "ROUTE-P004",
            Self::ParseResponse { .. } => "ROUTE-P010",

            Self::Timeout { .. } => "ROUTE-N001",
            Self::Transport { .. } => "ROUTE-N002",

            Self::InvalidProvider(_) => "ROUTE-C001",
            Self::Config(_) => "ROUTE-C002",
            Self::ConfigInvalid { .. } => "ROUTE-C003",

            Self::Io(_) => "ROUTE-X001",
            Self::Json(_) => "ROUTE-X002",
            Self::Database(_) => "ROUTE-X003",
            Self::Other(_) => "ROUTE-X099",
        }
    }

    /// Network-level failure worth one more attempt on the same provider.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// Failure that auto mode absorbs by moving to the next provider.
    #[must_use]
    pub const fn is_recoverable_in_auto(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. }
                | Self::ModelNotFound { .. }
                | Self::Timeout { .. }
                | Self::Transport { .. }
        )
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RemoteApi { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::ProviderUnavailable { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Transport { provider, .. }
            | Self::RemoteApi { provider, .. }
            | Self::ParseResponse { provider, .. } => Some(provider),
            Self::ModelNotFound { provider, .. } => provider.as_deref(),
            Self::InvalidProvider(p) => Some(p),
            _ => None,
        }
    }

    /// Actionable fix suggestions, most useful first.
    ///
    /// For [`RouteError::NoProviderConfigured`] this is the remediation
    /// list: the free local engine first, then each remote provider's
    /// credential setup.
    ///
    /// # Example
    ///
    /// ```
    /// use infroute::error::RouteError;
    ///
    /// let steps = RouteError::NoProviderConfigured.fix_suggestions();
    /// assert!(steps[0].context.contains("Ollama"));
    /// ```
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::NoProviderConfigured => suggestions::no_provider_suggestions(),
            Self::ProviderUnavailable { provider, reason } => {
                suggestions::provider_unavailable_suggestions(provider, reason)
            }
            Self::ModelNotFound { model, provider } => {
                suggestions::model_not_found_suggestions(model, provider.as_deref())
            }
            Self::FallbackExhausted { attempts } => {
                suggestions::fallback_exhausted_suggestions(attempts)
            }
            Self::Timeout { provider, after } => suggestions::timeout_suggestions(provider, *after),
            Self::Transport { provider, message } => {
                suggestions::transport_suggestions(provider, message)
            }
            Self::RemoteApi {
                provider,
                kind,
                status,
                retry_after,
                message,
            } => suggestions::remote_api_suggestions(provider, *kind, *status, *retry_after, message),
            Self::InvalidProvider(name) => suggestions::invalid_provider_suggestions(name),
            Self::Config(msg) => vec![FixSuggestion::new(
                vec!["infroute status".to_string()],
                format!("Configuration error: {msg}"),
            )],
            Self::ConfigInvalid {
                key,
                value,
                message,
            } => suggestions::config_invalid_suggestions(key, value, message),
            Self::ParseResponse { provider, message } => vec![FixSuggestion::new(
                vec!["infroute status --refresh".to_string()],
                format!(
                    "{provider} returned a response that could not be parsed ({message}). \
                     The API may have changed."
                ),
            )],
            Self::Io(err) => vec![FixSuggestion::new(
                vec!["# Check file permissions and disk space".to_string()],
                format!("I/O error: {err}."),
            )],
            Self::Json(err) => vec![FixSuggestion::new(
                vec!["infroute status".to_string()],
                format!("JSON error: {err}."),
            )],
            Self::Database(err) => vec![FixSuggestion::new(
                vec!["# Check INFROUTE_USAGE_DB points at the shared store".to_string()],
                format!("Usage store error: {err}."),
            )],
            Self::Other(err) => vec![FixSuggestion::new(
                vec!["infroute status".to_string()],
                format!("Unexpected error: {err}. Please report this issue."),
            )],
        }
    }
}

/// Result type alias for infroute operations.
pub type Result<T> = std::result::Result<T, RouteError>;
