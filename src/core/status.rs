//! Diagnostic status view.
//!
//! Read-only composition of registry, discovery and usage state for
//! external tooling. Nothing here feeds back into routing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::accountant::{UsageAccountant, UsageSnapshot};
use super::discovery::{DiscoverySnapshot, DiscoveryStatus, ModelDiscovery};
use super::models::{Capability, ModelDescriptor};
use super::provider::ProviderId;
use super::registry::{ProviderConfig, ProviderRegistry};

/// Summary of one discovered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub name: String,
    pub size_bytes: u64,
    pub family: Option<String>,
    pub capabilities: Vec<Capability>,
}

impl From<&ModelDescriptor> for ModelSummary {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            name: model.canonical_name.clone(),
            size_bytes: model.size_bytes,
            family: model.family.clone(),
            capabilities: model.capabilities.iter().copied().collect(),
        }
    }
}

/// Discovery half of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryView {
    pub status: DiscoveryStatus,
    pub discovered_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub models: Vec<ModelSummary>,
}

impl DiscoveryView {
    #[must_use]
    pub fn from_snapshot(snapshot: &DiscoverySnapshot) -> Self {
        Self {
            status: snapshot.status,
            discovered_at: snapshot.discovered_at,
            last_attempt_at: snapshot.last_attempt_at,
            last_error: snapshot.last_error.clone(),
            models: snapshot.models.iter().map(ModelSummary::from).collect(),
        }
    }
}

/// Everything `status` shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub providers: Vec<ProviderConfig>,
    pub configured_credentials: Vec<ProviderId>,
    pub discovery: DiscoveryView,
    pub usage: UsageSnapshot,
    /// Savings against the all-remote baseline, in percent.
    pub savings_percent: f64,
    pub recommendation: String,
}

impl StatusReport {
    /// Providers auto mode could use right now.
    #[must_use]
    pub fn usable_providers(&self) -> Vec<ProviderId> {
        self.providers
            .iter()
            .filter(|p| p.is_usable_at(self.generated_at))
            .map(|p| p.name)
            .collect()
    }

    #[must_use]
    pub fn local(&self) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name.is_local())
    }
}

/// Builds [`StatusReport`]s from live components.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    registry: Arc<ProviderRegistry>,
    discovery: Arc<ModelDiscovery>,
    accountant: Arc<UsageAccountant>,
}

impl StatusReporter {
    #[must_use]
    pub const fn new(
        registry: Arc<ProviderRegistry>,
        discovery: Arc<ModelDiscovery>,
        accountant: Arc<UsageAccountant>,
    ) -> Self {
        Self {
            registry,
            discovery,
            accountant,
        }
    }

    #[must_use]
    pub fn report(&self) -> StatusReport {
        let registry = self.registry.snapshot();
        let discovery = self.discovery.current();
        let local_available = registry
            .get(ProviderId::Ollama)
            .is_some_and(|p| p.available)
            || discovery.status == DiscoveryStatus::Ready;
        let usage = self.accountant.snapshot().with_local_available(local_available);

        StatusReport {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            providers: registry.providers.clone(),
            configured_credentials: self.registry.credentials().configured_remote(),
            discovery: DiscoveryView::from_snapshot(&discovery),
            savings_percent: usage.savings_vs_all_remote_baseline,
            recommendation: usage.recommendation.clone(),
            usage,
        }
    }
}
