//! Test utilities for infroute.
//!
//! Scripted backends, data factories and an in-memory usage sink, shared
//! by unit tests and (through the `test-utils` feature) integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infroute::test_utils::*;
//!
//! let engine = Arc::new(ScriptedEngine::with_models(vec![engine_model("llama3", 4)]));
//! engine.push_generate(Ok(completion("hello", 5)));
//! ```

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::core::discovery::{aliases_for, infer_capabilities};
use crate::core::models::{Completion, EngineModel, ModelDescriptor, UsageRecord, estimate_tokens};
use crate::core::provider::ProviderId;
use crate::error::{Result, RouteError};
use crate::providers::{LocalEngine, RemoteClient};
use crate::storage::config::{CliOverrides, Config, EnvSnapshot, ResolvedConfig};
use crate::storage::usage_sink::UsageSink;

const GIB: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Test Data Factories
// =============================================================================

/// An engine listing entry of `size_gib` gibibytes.
#[must_use]
pub fn engine_model(name: &str, size_gib: u64) -> EngineModel {
    EngineModel {
        name: name.to_string(),
        size_bytes: size_gib * GIB,
        family: None,
        parameter_size: None,
        modified_at: None,
    }
}

/// A local model descriptor with capabilities inferred from its name.
#[must_use]
pub fn make_descriptor(name: &str, size_gib: u64) -> ModelDescriptor {
    let size_bytes = size_gib * GIB;
    ModelDescriptor {
        canonical_name: name.to_string(),
        aliases: aliases_for(name),
        size_bytes,
        family: None,
        capabilities: infer_capabilities(name, None, size_bytes),
        owning_provider: ProviderId::Ollama,
        modified_at: None,
    }
}

/// A completion with a fixed token count.
#[must_use]
pub fn completion(text: &str, tokens: u64) -> Completion {
    Completion {
        text: text.to_string(),
        tokens_consumed: tokens,
        finish_reason: Some("stop".to_string()),
    }
}

/// Resolve configuration from explicit env pairs and defaults only.
///
/// # Panics
///
/// Panics if the pairs produce an invalid configuration.
#[must_use]
pub fn resolved_config(env: &[(&str, &str)]) -> ResolvedConfig {
    ResolvedConfig::resolve_with(
        &CliOverrides::default(),
        &EnvSnapshot::from_pairs(env.iter().copied()),
        &Config::default(),
        PathBuf::from("test-config.toml"),
    )
    .expect("test configuration is valid")
}

/// Write `contents` as `config.toml` inside `dir`.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).expect("write test config");
    path
}

/// Create a shared usage store with the `mcp_storage` schema in `dir`.
///
/// # Panics
///
/// Panics if the database cannot be created.
#[must_use]
pub fn shared_usage_store(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("shared.db");
    create_usage_schema(&path);
    path
}

fn create_usage_schema(path: &Path) {
    let conn = rusqlite::Connection::open(path).expect("open test store");
    conn.execute_batch(
        "CREATE TABLE mcp_storage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mcp_name TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            ttl INTEGER,
            UNIQUE(mcp_name, key)
        );",
    )
    .expect("create mcp_storage");
}

fn engine_down() -> RouteError {
    RouteError::Transport {
        provider: ProviderId::Ollama.to_string(),
        message: "connection refused".to_string(),
    }
}

// =============================================================================
// Scripted Local Engine
// =============================================================================

/// Local engine whose listing and generations are set by the test.
///
/// Queued generate results are returned in order; once the queue is empty
/// every call succeeds with an echo of the prompt.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    models: Mutex<Vec<EngineModel>>,
    reachable: AtomicBool,
    list_delay: Duration,
    generate_delay: Mutex<Duration>,
    generate_results: Mutex<VecDeque<Result<Completion>>>,
    generate_calls: AtomicUsize,
    list_calls: AtomicUsize,
    generated_models: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    #[must_use]
    pub fn with_models(models: Vec<EngineModel>) -> Self {
        Self {
            models: Mutex::new(models),
            reachable: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// An engine that refuses every connection.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_models(&self, models: Vec<EngineModel>) {
        *self.models.lock().unwrap_or_else(PoisonError::into_inner) = models;
    }

    pub fn set_generate_delay(&self, delay: Duration) {
        *self.generate_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn push_generate(&self, result: Result<Completion>) {
        self.generate_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    #[must_use]
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Models passed to `generate`, in call order.
    #[must_use]
    pub fn generated_models(&self) -> Vec<String> {
        self.generated_models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LocalEngine for ScriptedEngine {
    async fn list_models(&self, _timeout: Duration) -> Result<Vec<EngineModel>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(engine_down());
        }
        Ok(self.models.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn generate(&self, model: &str, prompt: &str, _timeout: Duration) -> Result<Completion> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generated_models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(model.to_string());

        let delay = *self.generate_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .generate_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(result) => result,
            None if !self.reachable.load(Ordering::SeqCst) => Err(engine_down()),
            None => {
                let text = format!("{model}: {prompt}");
                Ok(Completion {
                    tokens_consumed: estimate_tokens(prompt, &text),
                    text,
                    finish_reason: Some("stop".to_string()),
                })
            }
        }
    }
}

// =============================================================================
// Scripted Remote Client
// =============================================================================

/// Remote client returning queued results, then a fixed success.
#[derive(Debug)]
pub struct ScriptedRemote {
    provider: ProviderId,
    results: Mutex<VecDeque<Result<Completion>>>,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    #[must_use]
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            results: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<Completion>) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn send(&self, model: &str, _prompt: &str, _timeout: Duration) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| Ok(completion(&format!("{} via {model}", self.provider), 100)))
    }
}

// =============================================================================
// In-memory Usage Sink
// =============================================================================

/// Usage sink that keeps records in memory, or fails every append.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<UsageRecord>>,
    fail: bool,
}

impl MemorySink {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl UsageSink for MemorySink {
    fn append(&self, record: &UsageRecord) -> Result<()> {
        if self.fail {
            return Err(RouteError::Other(anyhow::anyhow!("sink unavailable")));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

