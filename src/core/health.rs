//! Pollable health checks.
//!
//! Each provider's availability comes from a [`PollableHealthCheck`]. The
//! registry bounds every probe with its own timeout, so implementations
//! only need to report what they saw.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::provider::ProviderId;
use super::registry::ProviderStatus;
use crate::providers::LocalEngine;

/// Name of the local engine's CLI binary.
pub const ENGINE_BINARY: &str = "ollama";

/// Structured outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResult {
    pub status: ProviderStatus,
    pub detail: Option<String>,
    pub latency: Duration,
}

impl HealthResult {
    #[must_use]
    pub const fn available(latency: Duration) -> Self {
        Self {
            status: ProviderStatus::Available,
            detail: None,
            latency,
        }
    }

    #[must_use]
    pub fn unreachable(detail: impl Into<String>, latency: Duration) -> Self {
        Self {
            status: ProviderStatus::Unreachable,
            detail: Some(detail.into()),
            latency,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == ProviderStatus::Available
    }
}

/// A provider health probe.
#[async_trait]
pub trait PollableHealthCheck: Send + Sync {
    async fn probe(&self) -> HealthResult;
}

// =============================================================================
// Remote Providers
// =============================================================================

/// Remote providers are healthy when a credential is configured. Probing
/// a metered API would cost money, so no request is made.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHealthCheck {
    provider: ProviderId,
    present: bool,
}

impl CredentialHealthCheck {
    #[must_use]
    pub const fn new(provider: ProviderId, present: bool) -> Self {
        Self { provider, present }
    }
}

#[async_trait]
impl PollableHealthCheck for CredentialHealthCheck {
    async fn probe(&self) -> HealthResult {
        if self.present {
            HealthResult::available(Duration::ZERO)
        } else {
            let vars = self.provider.credential_env_vars().join(" or ");
            HealthResult {
                status: ProviderStatus::NotConfigured,
                detail: Some(format!("{vars} not set")),
                latency: Duration::ZERO,
            }
        }
    }
}

// =============================================================================
// Local Engine
// =============================================================================

/// Probes the local engine over HTTP, falling back to its CLI to tell
/// "not installed" apart from "installed but not serving".
pub struct LocalEngineHealthCheck {
    engine: Arc<dyn LocalEngine>,
    timeout: Duration,
    binary: Option<String>,
}

impl LocalEngineHealthCheck {
    #[must_use]
    pub fn new(engine: Arc<dyn LocalEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            binary: Some(ENGINE_BINARY.to_string()),
        }
    }

    /// Disable the CLI fallback.
    #[must_use]
    pub fn without_cli_fallback(mut self) -> Self {
        self.binary = None;
        self
    }

    async fn diagnose_with_cli(&self, http_error: &str, started: Instant) -> HealthResult {
        let Some(binary) = self.binary.as_deref() else {
            return HealthResult::unreachable(http_error.to_string(), started.elapsed());
        };
        let Ok(path) = which::which(binary) else {
            return HealthResult::unreachable(
                format!("{binary} is not installed ({http_error})"),
                started.elapsed(),
            );
        };

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&path)
                .arg("list")
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let detail = match output {
            Ok(Ok(out)) if out.status.success() => format!(
                "`{binary} list` works but the HTTP API did not answer ({http_error}); \
                 check OLLAMA_BASE_URL"
            ),
            Ok(Ok(_)) | Ok(Err(_)) => {
                format!("{binary} is installed but not serving; run `{binary} serve`")
            }
            Err(_) => format!("`{binary} list` timed out; run `{binary} serve`"),
        };
        HealthResult::unreachable(detail, started.elapsed())
    }
}

#[async_trait]
impl PollableHealthCheck for LocalEngineHealthCheck {
    async fn probe(&self) -> HealthResult {
        let started = Instant::now();
        match self.engine.list_models(self.timeout).await {
            Ok(models) if models.is_empty() => HealthResult {
                status: ProviderStatus::NeedsModelPull,
                detail: Some("no models installed; run `ollama pull llama3.2`".to_string()),
                latency: started.elapsed(),
            },
            Ok(_) => HealthResult::available(started.elapsed()),
            Err(err) => self.diagnose_with_cli(&err.to_string(), started).await,
        }
    }
}
