//! Request dispatch.
//!
//! Runs one call against the chosen provider under a single deadline.
//! Transient failures (timeouts, broken connections) get exactly one
//! same-provider retry if time remains; everything else is returned as-is
//! for the routing policy to classify.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::accountant::UsageAccountant;
use super::models::{Completion, DispatchResult, UsageRecord};
use super::provider::ProviderId;
use super::registry::ProviderConfig;
use crate::error::{Result, RouteError};
use crate::providers::{LocalEngine, RemoteClient};

/// Executes calls and records usage for the successful ones.
pub struct RequestDispatcher {
    engine: Arc<dyn LocalEngine>,
    remotes: HashMap<ProviderId, Arc<dyn RemoteClient>>,
    accountant: Arc<UsageAccountant>,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut remotes: Vec<_> = self.remotes.keys().map(|p| p.cli_name()).collect();
        remotes.sort_unstable();
        f.debug_struct("RequestDispatcher")
            .field("remotes", &remotes)
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(engine: Arc<dyn LocalEngine>, accountant: Arc<UsageAccountant>) -> Self {
        Self {
            engine,
            remotes: HashMap::new(),
            accountant,
        }
    }

    /// Register the client for a remote provider, replacing any previous one.
    #[must_use]
    pub fn with_remote(mut self, client: Arc<dyn RemoteClient>) -> Self {
        self.remotes.insert(client.provider(), client);
        self
    }

    /// Whether a client exists for `provider`.
    #[must_use]
    pub fn can_reach(&self, provider: ProviderId) -> bool {
        provider.is_local() || self.remotes.contains_key(&provider)
    }

    #[must_use]
    pub fn accountant(&self) -> &Arc<UsageAccountant> {
        &self.accountant
    }

    /// Send `prompt` to `model` on `provider`, finishing by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Timeout`] when the deadline passes, or the
    /// backend's own error after the transient retry has been used.
    pub async fn dispatch(
        &self,
        provider: &ProviderConfig,
        model: &str,
        prompt: &str,
        deadline: Instant,
    ) -> Result<DispatchResult> {
        let started = Instant::now();
        let budget = deadline.saturating_duration_since(started);
        let id = provider.name;

        let mut retried = false;
        let completion = loop {
            match self.call_once(id, model, prompt, deadline, budget).await {
                Ok(completion) => break completion,
                Err(err) if err.is_transient() && !retried && Instant::now() < deadline => {
                    tracing::warn!(
                        provider = %id,
                        model,
                        attempt = 1,
                        error = %err,
                        "transient dispatch failure, retrying once"
                    );
                    retried = true;
                }
                Err(err) => {
                    tracing::warn!(provider = %id, model, error = %err, "dispatch failed");
                    return Err(err);
                }
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.accountant.record(UsageRecord::priced(
            id,
            model,
            completion.tokens_consumed,
            provider.cost_per_k_tokens,
        ));

        tracing::info!(
            provider = %id,
            model,
            tokens = completion.tokens_consumed,
            duration_ms,
            retried,
            "dispatch completed"
        );

        Ok(DispatchResult {
            text: completion.text,
            tokens_consumed: completion.tokens_consumed,
            duration_ms,
            finish_reason: completion.finish_reason,
            retried,
        })
    }

    async fn call_once(
        &self,
        provider: ProviderId,
        model: &str,
        prompt: &str,
        deadline: Instant,
        budget: Duration,
    ) -> Result<Completion> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timed_out = || RouteError::Timeout {
            provider: provider.to_string(),
            after: budget,
        };
        if remaining.is_zero() {
            return Err(timed_out());
        }

        let call = async {
            if provider.is_local() {
                self.engine.generate(model, prompt, remaining).await
            } else {
                let client = self.remotes.get(&provider).ok_or_else(|| {
                    RouteError::unavailable(provider, "no client registered for this provider")
                })?;
                client.send(model, prompt, remaining).await
            }
        };

        tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or_else(|_| Err(timed_out()))
    }
}
