//! HTTP client utilities.
//!
//! Provides the shared HTTP client used by the local engine client, the
//! remote provider clients and the health probes.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response};

use crate::core::provider::ProviderId;
use crate::error::{RemoteErrorKind, Result, RouteError};

/// Upper bound on a single connection attempt. Whole-call deadlines are
/// applied per request by the caller.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 300;

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client() -> Result<Client> {
    ClientBuilder::new()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("infroute/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RouteError::Config(format!("failed to build HTTP client: {e}")))
}

/// Classify a `reqwest` send/receive failure.
///
/// Timeouts become [`RouteError::Timeout`]; connection-level failures
/// become [`RouteError::Transport`] so the dispatcher may retry once.
/// Messages never include the request URL.
#[must_use]
pub fn map_send_error(provider: ProviderId, err: reqwest::Error, after: Duration) -> RouteError {
    let err = err.without_url();
    if err.is_timeout() {
        RouteError::Timeout {
            provider: provider.to_string(),
            after,
        }
    } else if err.is_decode() {
        RouteError::ParseResponse {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        RouteError::Transport {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

/// Turn a non-success remote response into [`RouteError::RemoteApi`].
pub async fn remote_api_error(provider: ProviderId, response: Response) -> RouteError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    RouteError::RemoteApi {
        provider: provider.to_string(),
        kind: RemoteErrorKind::from_status(status),
        status: Some(status),
        retry_after,
        message: truncate_body(&body),
    }
}

/// Shorten a response body for inclusion in an error message.
#[must_use]
pub fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    if trimmed.chars().count() <= MAX_ERROR_BODY {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
    out.push_str("...");
    out
}

/// Join a base URL and a path without doubling or dropping slashes.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
