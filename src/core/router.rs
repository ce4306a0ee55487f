//! Router facade.
//!
//! Wires the registry, discovery, dispatcher, accountant and status
//! reporter together from a [`ResolvedConfig`]. Components are shared by
//! `Arc`; there is no process-wide state.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::accountant::UsageAccountant;
use super::discovery::{DiscoverySettings, DiscoverySnapshot, ModelDiscovery};
use super::dispatch::RequestDispatcher;
use super::health::LocalEngineHealthCheck;
use super::http::build_client;
use super::models::{RoutingDecision, RoutingRequest};
use super::policy::{PolicySettings, RouteOutcome, RoutingPolicy};
use super::provider::ProviderId;
use super::registry::{ProviderRegistry, RegistrySnapshot};
use super::status::{StatusReport, StatusReporter};
use crate::error::Result;
use crate::providers::{HttpRemoteClient, LocalEngine, OllamaClient, RemoteClient};
use crate::storage::config::ResolvedConfig;
use crate::storage::usage_sink::{SqliteUsageSink, UsageSink};

/// Background refresh tasks. Aborted on drop.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// The inference-request router.
#[derive(Debug)]
pub struct Router {
    registry: Arc<ProviderRegistry>,
    discovery: Arc<ModelDiscovery>,
    accountant: Arc<UsageAccountant>,
    policy: RoutingPolicy,
    reporter: StatusReporter,
}

impl Router {
    /// Build a router with real HTTP clients.
    ///
    /// Remote clients are created only for providers with a credential.
    /// Must be called inside a Tokio runtime when a usage store is set.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let client = build_client()?;
        let engine: Arc<dyn LocalEngine> = Arc::new(OllamaClient::with_client(
            client.clone(),
            config.local.base_url.clone(),
        ));

        let mut remotes: Vec<Arc<dyn RemoteClient>> = Vec::new();
        for settings in config.providers.iter().filter(|p| !p.id.is_local() && p.enabled) {
            if let Some(key) = config.credentials.get(settings.id) {
                remotes.push(Arc::new(HttpRemoteClient::with_client(
                    client.clone(),
                    settings.id,
                    settings.base_url.clone(),
                    key,
                )?));
            }
        }

        let sink = config.usage_db.as_deref().and_then(|path| {
            SqliteUsageSink::open(path)
                .inspect_err(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "usage store unavailable; not persisting");
                })
                .ok()
                .map(|s| Arc::new(s) as Arc<dyn UsageSink>)
        });

        Ok(Self::with_backends(config, engine, remotes, sink))
    }

    /// Build a router over caller-supplied backends.
    ///
    /// Remote providers with a credential are usable immediately; the local
    /// engine is considered only after [`Self::refresh`] or a background cycle.
    #[must_use]
    pub fn with_backends(
        config: &ResolvedConfig,
        engine: Arc<dyn LocalEngine>,
        remotes: Vec<Arc<dyn RemoteClient>>,
        sink: Option<Arc<dyn UsageSink>>,
    ) -> Self {
        let registry = Arc::new(
            ProviderRegistry::new(
                &config.providers,
                config.credentials.clone(),
                config.health_ttl,
                config.probe_timeout,
            )
            .with_health_check(
                ProviderId::Ollama,
                Arc::new(LocalEngineHealthCheck::new(
                    Arc::clone(&engine),
                    config.probe_timeout,
                )),
            ),
        );

        let discovery = Arc::new(
            ModelDiscovery::new(
                Arc::clone(&engine),
                DiscoverySettings {
                    interval: config.local.discovery_interval,
                    timeout: config.local.discovery_timeout,
                    allow_stale: config.local.allow_stale,
                },
            )
            .with_registry(Arc::clone(&registry)),
        );

        let accountant = UsageAccountant::new(baseline_rate(config));
        let accountant = Arc::new(match sink {
            Some(sink) => accountant.with_sink(sink),
            None => accountant,
        });

        let dispatcher = remotes.into_iter().fold(
            RequestDispatcher::new(engine, Arc::clone(&accountant)),
            RequestDispatcher::with_remote,
        );

        let policy = RoutingPolicy::new(
            Arc::clone(&registry),
            Arc::clone(&discovery),
            Arc::new(dispatcher),
            PolicySettings {
                timeout: config.timeout,
                local_default_model: config.local.default_model.clone(),
                fallback_on_unknown_model: config.fallback_on_unknown_model,
            },
        );

        let reporter = StatusReporter::new(
            Arc::clone(&registry),
            Arc::clone(&discovery),
            Arc::clone(&accountant),
        );

        Self {
            registry,
            discovery,
            accountant,
            policy,
            reporter,
        }
    }

    /// Run one discovery cycle and probe every provider.
    pub async fn refresh(&self) {
        // Health first: discovery's verdict on the local engine wins.
        self.registry.refresh_all().await;
        let snapshot = self.discovery.refresh().await;
        tracing::info!(
            discovery = snapshot.status.label(),
            models = snapshot.models.len(),
            "refresh finished"
        );
    }

    /// Run one discovery cycle only.
    pub async fn refresh_models(&self) -> Arc<DiscoverySnapshot> {
        self.discovery.refresh().await
    }

    /// Wait for pending usage records to reach the store.
    pub async fn shutdown(&self) {
        self.accountant.flush().await;
    }

    /// Start the discovery and health timers.
    #[must_use]
    pub fn spawn_background(&self) -> BackgroundTasks {
        BackgroundTasks {
            handles: vec![self.discovery.spawn(), self.registry.spawn()],
        }
    }

    /// Route and dispatch one request.
    pub async fn route(&self, request: &RoutingRequest) -> RouteOutcome {
        self.policy.route(request).await
    }

    /// Decide without dispatching.
    ///
    /// # Errors
    ///
    /// Returns the routing error the request would fail with.
    pub fn decide(&self, request: &RoutingRequest) -> Result<RoutingDecision> {
        self.policy.decide(request)
    }

    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.reporter.report()
    }

    #[must_use]
    pub fn models(&self) -> Arc<DiscoverySnapshot> {
        self.discovery.current()
    }

    #[must_use]
    pub fn providers(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    #[must_use]
    pub const fn accountant(&self) -> &Arc<UsageAccountant> {
        &self.accountant
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}

/// Average remote rate for the savings baseline: over remote providers
/// with credentials, or every enabled remote provider if none have one.
fn baseline_rate(config: &ResolvedConfig) -> f64 {
    let remote = || config.providers.iter().filter(|p| !p.id.is_local() && p.enabled);
    let configured: Vec<f64> = remote()
        .filter(|p| config.credentials.is_present(p.id))
        .map(|p| p.cost_per_1k_tokens)
        .collect();
    if configured.is_empty() {
        let all: Vec<f64> = remote().map(|p| p.cost_per_1k_tokens).collect();
        UsageAccountant::average_rate(&all)
    } else {
        UsageAccountant::average_rate(&configured)
    }
}
