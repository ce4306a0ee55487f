//! Provider registry: static configuration plus live availability.
//!
//! Readers get an `Arc<RegistrySnapshot>` without waiting on in-flight
//! health probes. A refresh builds a new snapshot and swaps it in through a
//! `tokio::sync::watch` channel; snapshots already handed out never change.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::health::{CredentialHealthCheck, HealthResult, PollableHealthCheck};
use super::provider::{ProviderId, ProviderKind};
use crate::storage::config::{EnvSnapshot, ProviderSettings};

/// Cooldown applied after a rate-limit response without `Retry-After`.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(300);

// =============================================================================
// Credentials
// =============================================================================

/// Provider credentials read once at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: BTreeMap<ProviderId, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("configured", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Credentials {
    /// Read every provider's credential env vars, first non-blank wins.
    #[must_use]
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let keys = ProviderId::REMOTE
            .iter()
            .filter_map(|&id| {
                id.credential_env_vars()
                    .iter()
                    .find_map(|var| env.get(var))
                    .map(|key| (id, key.to_string()))
            })
            .collect();
        Self { keys }
    }

    #[must_use]
    pub fn with(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    /// The credential for a remote provider.
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }

    /// Whether the provider can be called. The local engine needs none.
    #[must_use]
    pub fn is_present(&self, provider: ProviderId) -> bool {
        provider.is_local() || self.keys.contains_key(&provider)
    }

    /// Remote providers with a credential, in default priority order.
    #[must_use]
    pub fn configured_remote(&self) -> Vec<ProviderId> {
        ProviderId::REMOTE
            .iter()
            .copied()
            .filter(|p| self.keys.contains_key(p))
            .collect()
    }
}

// =============================================================================
// Provider State
// =============================================================================

/// Live state of a provider as of its last health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ProviderStatus {
    Available,
    /// Remote provider without a credential.
    NotConfigured,
    /// Turned off in the config file.
    Disabled,
    Unreachable,
    /// Local engine is up but has no models installed.
    NeedsModelPull,
    RateLimited { until: DateTime<Utc> },
    /// Not probed yet.
    Unknown,
}

impl ProviderStatus {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::NotConfigured => "not configured",
            Self::Disabled => "disabled",
            Self::Unreachable => "unreachable",
            Self::NeedsModelPull => "needs model pull",
            Self::RateLimited { .. } => "rate limited",
            Self::Unknown => "unknown",
        }
    }
}

/// One provider's configuration and availability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: ProviderId,
    pub kind: ProviderKind,
    pub base_endpoint: String,
    pub credential_present: bool,
    /// Lower is tried earlier; the local engine is always 0.
    pub priority: u32,
    pub cost_per_k_tokens: f64,
    pub default_model: Option<String>,
    pub enabled: bool,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub available: bool,
    pub status: ProviderStatus,
    pub last_error: Option<String>,
}

impl ProviderConfig {
    /// Build the initial (unprobed) entry from resolved settings.
    ///
    /// A remote provider's health is its credential, so a configured remote
    /// starts `Available`. The local engine stays `Unknown` until probed.
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings, credentials: &Credentials) -> Self {
        let credential_present = credentials.is_present(settings.id);
        let status = if !settings.enabled {
            ProviderStatus::Disabled
        } else if !credential_present {
            ProviderStatus::NotConfigured
        } else if settings.id.is_local() {
            ProviderStatus::Unknown
        } else {
            ProviderStatus::Available
        };
        Self {
            name: settings.id,
            kind: settings.id.kind(),
            base_endpoint: settings.base_url.clone(),
            credential_present,
            priority: if settings.id.is_local() { 0 } else { settings.priority },
            cost_per_k_tokens: if settings.id.is_local() {
                0.0
            } else {
                settings.cost_per_1k_tokens
            },
            default_model: settings.default_model.clone(),
            enabled: settings.enabled,
            last_health_check_at: None,
            available: status == ProviderStatus::Available,
            status,
            last_error: None,
        }
    }

    /// Whether auto mode may pick this provider at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.credential_present
            && match self.status {
                ProviderStatus::Available => true,
                ProviderStatus::RateLimited { until } => until <= now,
                _ => false,
            }
    }

    fn apply(&mut self, result: &HealthResult, at: DateTime<Utc>) {
        self.last_health_check_at = Some(at);
        if let ProviderStatus::RateLimited { until } = self.status
            && until > at
            && result.status == ProviderStatus::Available
        {
            // Cooldown outlives a healthy probe.
            return;
        }
        self.status = result.status;
        self.available = result.status == ProviderStatus::Available;
        self.last_error = result.detail.clone().filter(|_| !self.available);
    }
}

/// Immutable view of every provider, sorted by (priority, name).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub providers: Vec<ProviderConfig>,
    pub generation: u64,
}

impl RegistrySnapshot {
    fn new(mut providers: Vec<ProviderConfig>) -> Self {
        providers.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.name.cli_name().cmp(b.name.cli_name()))
        });
        Self {
            providers,
            generation: 0,
        }
    }

    /// Build a snapshot from unsorted entries.
    #[must_use]
    pub fn from_providers(providers: Vec<ProviderConfig>) -> Self {
        Self::new(providers)
    }

    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == provider)
    }

    /// Providers auto mode may try at `now`, in fallback order.
    #[must_use]
    pub fn fallback_chain(&self, now: DateTime<Utc>) -> Vec<&ProviderConfig> {
        self.providers.iter().filter(|p| p.is_usable_at(now)).collect()
    }

    fn update(&self, provider: ProviderId, f: impl FnOnce(&mut ProviderConfig)) -> Self {
        let mut next = self.clone();
        if let Some(entry) = next.providers.iter_mut().find(|p| p.name == provider) {
            f(entry);
        }
        next.generation += 1;
        next
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Owner of provider availability. Pass by `Arc`; there is no global.
pub struct ProviderRegistry {
    tx: watch::Sender<Arc<RegistrySnapshot>>,
    credentials: Credentials,
    checks: HashMap<ProviderId, Arc<dyn PollableHealthCheck>>,
    ttl: Duration,
    probe_timeout: Duration,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("snapshot", &*self.snapshot())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Create a registry. Remote providers get a credential check; the
    /// local engine's probe is installed with [`Self::with_health_check`].
    #[must_use]
    pub fn new(
        settings: &[ProviderSettings],
        credentials: Credentials,
        ttl: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let providers = settings
            .iter()
            .map(|s| ProviderConfig::from_settings(s, &credentials))
            .collect();
        let checks = settings
            .iter()
            .filter(|s| !s.id.is_local())
            .map(|s| {
                let check: Arc<dyn PollableHealthCheck> = Arc::new(CredentialHealthCheck::new(
                    s.id,
                    credentials.is_present(s.id),
                ));
                (s.id, check)
            })
            .collect();
        let (tx, _) = watch::channel(Arc::new(RegistrySnapshot::new(providers)));
        Self {
            tx,
            credentials,
            checks,
            ttl,
            probe_timeout,
        }
    }

    #[must_use]
    pub fn with_health_check(
        mut self,
        provider: ProviderId,
        check: Arc<dyn PollableHealthCheck>,
    ) -> Self {
        self.checks.insert(provider, check);
        self
    }

    /// Current snapshot. Never waits on a refresh.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&*self.tx.borrow())
    }

    /// All providers in fallback order.
    #[must_use]
    pub fn list(&self) -> Vec<ProviderConfig> {
        self.snapshot().providers.clone()
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistrySnapshot>> {
        self.tx.subscribe()
    }

    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub fn credentials_for(&self, provider: ProviderId) -> Option<&str> {
        self.credentials.get(provider)
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Probe one provider under the probe timeout and publish the result.
    pub async fn refresh_health(&self, provider: ProviderId) -> Option<ProviderConfig> {
        let current = self.snapshot();
        let entry = current.get(provider)?;
        if !entry.enabled {
            return Some(entry.clone());
        }
        let check = self.checks.get(&provider)?;

        let result = match tokio::time::timeout(self.probe_timeout, check.probe()).await {
            Ok(result) => result,
            Err(_) => HealthResult::unreachable(
                format!("health probe timed out after {}ms", self.probe_timeout.as_millis()),
                self.probe_timeout,
            ),
        };

        tracing::debug!(
            provider = %provider,
            status = result.status.label(),
            latency_ms = u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
            "health probe finished"
        );

        let now = Utc::now();
        self.publish(provider, |p| p.apply(&result, now));
        self.snapshot().get(provider).cloned()
    }

    /// Probe every provider concurrently.
    pub async fn refresh_all(&self) {
        let ids: Vec<ProviderId> = self.snapshot().providers.iter().map(|p| p.name).collect();
        join_all(ids.into_iter().map(|id| self.refresh_health(id))).await;
    }

    /// Probe providers whose last result is older than the TTL.
    pub async fn refresh_if_stale(&self) {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let stale: Vec<ProviderId> = self
            .snapshot()
            .providers
            .iter()
            .filter(|p| p.last_health_check_at.is_none_or(|at| now - at >= ttl))
            .map(|p| p.name)
            .collect();
        join_all(stale.into_iter().map(|id| self.refresh_health(id))).await;
    }

    /// Record the local engine's state as observed by model discovery.
    pub fn set_local_status(&self, status: ProviderStatus, detail: Option<String>) {
        let result = HealthResult {
            status,
            detail,
            latency: Duration::ZERO,
        };
        let now = Utc::now();
        self.publish(ProviderId::Ollama, |p| p.apply(&result, now));
    }

    /// Put a remote provider in cooldown after a rate-limit response.
    pub fn mark_rate_limited(&self, provider: ProviderId, retry_after: Option<Duration>) {
        if provider.is_local() {
            return;
        }
        let cooldown = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN);
        let until = Utc::now()
            + chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::seconds(300));
        tracing::warn!(provider = %provider, %until, "provider rate limited");
        self.publish(provider, |p| {
            p.status = ProviderStatus::RateLimited { until };
            p.available = false;
            p.last_error = Some("rate limited".to_string());
        });
    }

    /// Re-probe stale providers every TTL until the registry is dropped.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = self.ttl.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.refresh_if_stale().await;
            }
        })
    }

    fn publish(&self, provider: ProviderId, f: impl FnOnce(&mut ProviderConfig)) {
        self.tx.send_modify(|snapshot| {
            *snapshot = Arc::new(snapshot.update(provider, f));
        });
    }
}
