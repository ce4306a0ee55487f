//! Local model discovery.
//!
//! Polls the local engine's model listing on a timer (and on demand),
//! turns the raw entries into validated [`ModelDescriptor`]s and publishes
//! them as one immutable [`DiscoverySnapshot`]. A failed cycle never edits
//! the previous model list; it publishes a new snapshot marked stale.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::models::{Capability, EngineModel, ModelDescriptor};
use super::provider::ProviderId;
use super::registry::{ProviderRegistry, ProviderStatus};
use crate::providers::LocalEngine;

/// Models at least this large are treated as long-context capable.
pub const LARGE_MODEL_BYTES: u64 = 20 * 1024 * 1024 * 1024;

const CODE_MARKERS: &[&str] = &["code", "coder", "starcoder"];
const VISION_MARKERS: &[&str] = &["vision", "llava", "bakllava", "moondream"];
const LARGE_CONTEXT_MARKERS: &[&str] = &["32k", "64k", "100k", "128k", "large"];
const EMBEDDING_MARKERS: &[&str] = &["embed", "bge", "nomic"];

// =============================================================================
// Snapshot
// =============================================================================

/// Outcome of the most recent discovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum DiscoveryStatus {
    /// No cycle has finished yet.
    Pending,
    Ready,
    /// Engine answered with no usable models.
    NeedsModelPull,
    /// Engine did not answer and there is no previous list.
    Unreachable,
    /// Engine did not answer; the previous list is kept.
    Stale { missed_cycles: u32 },
}

impl DiscoveryStatus {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::NeedsModelPull => "needs model pull",
            Self::Unreachable => "unreachable",
            Self::Stale { .. } => "stale",
        }
    }
}

/// One published discovery result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySnapshot {
    pub models: Arc<[ModelDescriptor]>,
    pub status: DiscoveryStatus,
    /// When the current model list was fetched.
    pub discovered_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub generation: u64,
    allow_stale: bool,
}

impl DiscoverySnapshot {
    /// Empty snapshot before the first cycle.
    #[must_use]
    pub fn pending(allow_stale: bool) -> Self {
        Self {
            models: Arc::from(Vec::new()),
            status: DiscoveryStatus::Pending,
            discovered_at: None,
            last_attempt_at: None,
            last_error: None,
            generation: 0,
            allow_stale,
        }
    }

    /// A ready snapshot over `models`.
    #[must_use]
    pub fn ready(models: Vec<ModelDescriptor>) -> Self {
        let now = Utc::now();
        Self {
            status: if models.is_empty() {
                DiscoveryStatus::NeedsModelPull
            } else {
                DiscoveryStatus::Ready
            },
            models: Arc::from(models),
            discovered_at: Some(now),
            last_attempt_at: Some(now),
            last_error: None,
            generation: 1,
            allow_stale: false,
        }
    }

    /// Models routing may use. A stale list counts only when stale
    /// snapshots are allowed.
    #[must_use]
    pub fn usable_models(&self) -> &[ModelDescriptor] {
        match self.status {
            DiscoveryStatus::Ready => &self.models[..],
            DiscoveryStatus::Stale { .. } if self.allow_stale => &self.models[..],
            _ => &[],
        }
    }

    #[must_use]
    pub fn has_usable_models(&self) -> bool {
        !self.usable_models().is_empty()
    }
}

// =============================================================================
// Descriptor Construction
// =============================================================================

/// Capability tags inferred from a model's name, family and size.
#[must_use]
pub fn infer_capabilities(name: &str, family: Option<&str>, size_bytes: u64) -> BTreeSet<Capability> {
    let haystack = format!("{} {}", name, family.unwrap_or_default()).to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| haystack.contains(m));

    let mut caps = BTreeSet::new();
    if has_any(CODE_MARKERS) {
        caps.insert(Capability::Code);
    }
    if has_any(VISION_MARKERS) {
        caps.insert(Capability::Vision);
    }
    if has_any(LARGE_CONTEXT_MARKERS) || size_bytes >= LARGE_MODEL_BYTES {
        caps.insert(Capability::LargeContext);
    }
    if !has_any(EMBEDDING_MARKERS) {
        caps.insert(Capability::Chat);
    }
    caps
}

/// Lookup keys for a model name: the case-folded name, plus the name
/// without a `:latest` tag.
#[must_use]
pub fn aliases_for(name: &str) -> BTreeSet<String> {
    let lower = name.trim().to_lowercase();
    let mut aliases = BTreeSet::new();
    if let Some(base) = lower.strip_suffix(":latest") {
        aliases.insert(base.to_string());
    }
    aliases.insert(lower);
    aliases
}

/// Validate raw engine entries and build descriptors. Entries with a
/// blank or whitespace-containing name are dropped, as are case-insensitive
/// duplicates.
#[must_use]
pub fn build_descriptors(entries: Vec<EngineModel>) -> Vec<ModelDescriptor> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.name.trim();
            if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
                tracing::warn!(name = %entry.name, "skipping malformed model entry");
                return None;
            }
            if !seen.insert(name.to_lowercase()) {
                tracing::warn!(name, "skipping duplicate model entry");
                return None;
            }
            Some(ModelDescriptor {
                canonical_name: name.to_string(),
                aliases: aliases_for(name),
                size_bytes: entry.size_bytes,
                capabilities: infer_capabilities(name, entry.family.as_deref(), entry.size_bytes),
                family: entry.family,
                owning_provider: ProviderId::Ollama,
                modified_at: entry.modified_at,
            })
        })
        .collect()
}

// =============================================================================
// Discovery Service
// =============================================================================

/// Timing for discovery cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub allow_stale: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            timeout: Duration::from_secs(3),
            allow_stale: false,
        }
    }
}

/// Periodic probe of the local engine's inventory.
pub struct ModelDiscovery {
    engine: Arc<dyn LocalEngine>,
    registry: Option<Arc<ProviderRegistry>>,
    tx: watch::Sender<Arc<DiscoverySnapshot>>,
    settings: DiscoverySettings,
    // Serializes refreshes; readers never take it.
    refreshing: Mutex<()>,
}

impl std::fmt::Debug for ModelDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDiscovery")
            .field("snapshot", &*self.current())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ModelDiscovery {
    #[must_use]
    pub fn new(engine: Arc<dyn LocalEngine>, settings: DiscoverySettings) -> Self {
        let (tx, _) = watch::channel(Arc::new(DiscoverySnapshot::pending(settings.allow_stale)));
        Self {
            engine,
            registry: None,
            tx,
            settings,
            refreshing: Mutex::new(()),
        }
    }

    /// Report local engine state to `registry` after every cycle.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Most recent committed snapshot. Never waits on a refresh.
    #[must_use]
    pub fn current(&self) -> Arc<DiscoverySnapshot> {
        Arc::clone(&*self.tx.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<DiscoverySnapshot>> {
        self.tx.subscribe()
    }

    #[must_use]
    pub const fn settings(&self) -> DiscoverySettings {
        self.settings
    }

    /// Run one discovery cycle, bounded by the discovery timeout, and
    /// publish the result.
    pub async fn refresh(&self) -> Arc<DiscoverySnapshot> {
        let _guard = self.refreshing.lock().await;
        let previous = self.current();
        let attempted_at = Utc::now();

        let listed = tokio::time::timeout(
            self.settings.timeout,
            self.engine.list_models(self.settings.timeout),
        )
        .await
        .unwrap_or_else(|_| {
            Err(crate::error::RouteError::Timeout {
                provider: ProviderId::Ollama.to_string(),
                after: self.settings.timeout,
            })
        });

        let next = match listed {
            Ok(entries) => {
                let models = build_descriptors(entries);
                let status = if models.is_empty() {
                    DiscoveryStatus::NeedsModelPull
                } else {
                    DiscoveryStatus::Ready
                };
                tracing::info!(count = models.len(), status = status.label(), "local models discovered");
                DiscoverySnapshot {
                    models: Arc::from(models),
                    status,
                    discovered_at: Some(attempted_at),
                    last_attempt_at: Some(attempted_at),
                    last_error: None,
                    generation: previous.generation + 1,
                    allow_stale: self.settings.allow_stale,
                }
            }
            Err(err) => {
                let status = if previous.models.is_empty() {
                    DiscoveryStatus::Unreachable
                } else {
                    let missed = match previous.status {
                        DiscoveryStatus::Stale { missed_cycles } => missed_cycles + 1,
                        _ => 1,
                    };
                    DiscoveryStatus::Stale {
                        missed_cycles: missed,
                    }
                };
                tracing::warn!(error = %err, status = status.label(), "model discovery failed");
                DiscoverySnapshot {
                    models: Arc::clone(&previous.models),
                    status,
                    discovered_at: previous.discovered_at,
                    last_attempt_at: Some(attempted_at),
                    last_error: Some(err.to_string()),
                    generation: previous.generation + 1,
                    allow_stale: self.settings.allow_stale,
                }
            }
        };

        if let Some(registry) = &self.registry {
            let (status, detail) = match next.status {
                DiscoveryStatus::Ready => (ProviderStatus::Available, None),
                DiscoveryStatus::NeedsModelPull => (
                    ProviderStatus::NeedsModelPull,
                    Some("no models installed; run `ollama pull llama3.2`".to_string()),
                ),
                _ => (ProviderStatus::Unreachable, next.last_error.clone()),
            };
            registry.set_local_status(status, detail);
        }

        let next = Arc::new(next);
        self.tx.send_replace(Arc::clone(&next));
        next
    }

    /// Refresh every interval until the discovery service is dropped.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let discovery = Arc::downgrade(self);
        let period = self.settings.interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(discovery) = discovery.upgrade() else {
                    break;
                };
                discovery.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedEngine, engine_model};

    fn caps(name: &str) -> BTreeSet<Capability> {
        infer_capabilities(name, None, 1)
    }

    #[test]
    fn capability_rules() {
        assert!(caps("codellama:7b").contains(&Capability::Code));
        assert!(caps("qwen2.5-coder").contains(&Capability::Code));
        assert!(caps("llava:13b").contains(&Capability::Vision));
        assert!(caps("llama3.2-vision").contains(&Capability::Vision));
        assert!(caps("yarn-mistral:7b-128k").contains(&Capability::LargeContext));
        assert!(caps("llama-large").contains(&Capability::LargeContext));
        assert!(!caps("nomic-embed-text").contains(&Capability::Chat));
        assert_eq!(caps("llama-small"), BTreeSet::from([Capability::Chat]));
        assert!(infer_capabilities("llama3:70b", None, LARGE_MODEL_BYTES).contains(&Capability::LargeContext));
        assert!(infer_capabilities("x", Some("starcoder2"), 1).contains(&Capability::Code));
    }

    #[test]
    fn aliases_strip_latest_and_fold_case() {
        let aliases = aliases_for("Llama3.2:latest");
        assert!(aliases.contains("llama3.2:latest"));
        assert!(aliases.contains("llama3.2"));
    }

    #[test]
    fn malformed_and_duplicate_entries_are_rejected() {
        let models = build_descriptors(vec![
            engine_model("llama3", 10),
            engine_model("", 10),
            engine_model("bad name", 10),
            engine_model("LLAMA3", 20),
        ]);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].canonical_name, "llama3");
    }

    #[tokio::test]
    async fn failure_keeps_previous_list_but_marks_it_stale() {
        let engine = Arc::new(ScriptedEngine::with_models(vec![engine_model("llama3", 1)]));
        let discovery = ModelDiscovery::new(engine.clone(), DiscoverySettings::default());

        let first = discovery.refresh().await;
        assert_eq!(first.status, DiscoveryStatus::Ready);
        assert_eq!(first.usable_models().len(), 1);

        engine.set_reachable(false);
        let second = discovery.refresh().await;
        assert_eq!(second.status, DiscoveryStatus::Stale { missed_cycles: 1 });
        assert_eq!(second.models.len(), 1);
        assert!(second.usable_models().is_empty());

        // The first snapshot is untouched.
        assert_eq!(first.status, DiscoveryStatus::Ready);
        assert_eq!(discovery.refresh().await.status, DiscoveryStatus::Stale { missed_cycles: 2 });
    }

    #[tokio::test]
    async fn allow_stale_keeps_models_usable() {
        let engine = Arc::new(ScriptedEngine::with_models(vec![engine_model("llama3", 1)]));
        let settings = DiscoverySettings {
            allow_stale: true,
            ..DiscoverySettings::default()
        };
        let discovery = ModelDiscovery::new(engine.clone(), settings);
        discovery.refresh().await;
        engine.set_reachable(false);
        assert_eq!(discovery.refresh().await.usable_models().len(), 1);
    }

    #[tokio::test]
    async fn zero_models_means_needs_model_pull() {
        let engine = Arc::new(ScriptedEngine::with_models(vec![]));
        let discovery = ModelDiscovery::new(engine, DiscoverySettings::default());
        let snap = discovery.refresh().await;
        assert_eq!(snap.status, DiscoveryStatus::NeedsModelPull);
        assert!(!snap.has_usable_models());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_engine_is_bounded_by_timeout() {
        let engine = Arc::new(
            ScriptedEngine::with_models(vec![engine_model("llama3", 1)])
                .with_list_delay(Duration::from_secs(30)),
        );
        let discovery = ModelDiscovery::new(engine, DiscoverySettings::default());
        let snap = discovery.refresh().await;
        assert_eq!(snap.status, DiscoveryStatus::Unreachable);
        assert!(snap.last_error.as_deref().unwrap().contains("timed out"));
    }
}
