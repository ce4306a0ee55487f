//! Usage accounting and savings.
//!
//! Every successful dispatch appends one [`UsageRecord`]. The ledger is
//! guarded by a single mutex so totals always equal the sum of the
//! recorded entries, even under concurrent writers. Persistence is handed
//! to a background task and never blocks or fails the caller.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::models::UsageRecord;
use super::provider::{ProviderId, ProviderKind};
use crate::storage::usage_sink::UsageSink;

/// Per-provider counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    pub requests: u64,
    pub tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub local_request_count: u64,
    pub remote_request_count: u64,
    pub per_provider: BTreeMap<ProviderId, ProviderUsage>,
    /// What the same tokens would have cost on remote providers.
    pub baseline_cost: f64,
    #[serde(rename = "costSavedUSD")]
    pub cost_saved_usd: f64,
    /// Savings against the all-remote baseline, in percent.
    pub savings_vs_all_remote_baseline: f64,
    pub recommendation: String,
}

impl UsageSnapshot {
    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.local_request_count + self.remote_request_count
    }

    /// Share of requests served locally, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn local_share(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            total => self.local_request_count as f64 / total as f64 * 100.0,
        }
    }

    /// Recompute the recommendation knowing whether the local engine is up.
    #[must_use]
    pub fn with_local_available(mut self, local_available: bool) -> Self {
        self.recommendation = self.recommend(local_available);
        self
    }

    fn recommend(&self, local_available: bool) -> String {
        if self.total_requests() == 0 {
            return "No usage yet. The local engine is recommended for free operation.".to_string();
        }
        if !local_available {
            return format!(
                "Install or start Ollama to save ${:.4} on future requests",
                self.total_cost
            );
        }
        if self.remote_request_count == 0 {
            return format!(
                "Using the local engine 100% of the time. Saved ${:.4} so far",
                self.cost_saved_usd
            );
        }
        format!(
            "Using the local engine {:.1}% of the time. Route more requests locally to save more",
            self.local_share()
        )
    }
}

#[derive(Debug, Default)]
struct Ledger {
    records: Vec<UsageRecord>,
    total_cost: f64,
    total_tokens: u64,
    local_requests: u64,
    remote_requests: u64,
    per_provider: BTreeMap<ProviderId, ProviderUsage>,
}

/// Accumulates usage records and derives savings.
pub struct UsageAccountant {
    ledger: Mutex<Ledger>,
    /// Average remote cost per 1k tokens used for the baseline.
    baseline_rate: f64,
    sink: Mutex<Option<mpsc::UnboundedSender<UsageRecord>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for UsageAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAccountant")
            .field("baseline_rate", &self.baseline_rate)
            .field("persisting", &self.sender().is_some())
            .finish_non_exhaustive()
    }
}

impl UsageAccountant {
    /// Create an accountant whose baseline prices every token at
    /// `baseline_rate` dollars per 1k.
    #[must_use]
    pub fn new(baseline_rate: f64) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            baseline_rate: baseline_rate.max(0.0),
            sink: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Average of the given per-1k rates, or zero when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_rate(rates: &[f64]) -> f64 {
        if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        }
    }

    /// Forward every record to `sink` from a background task.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_sink(self, sink: Arc<dyn UsageSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageRecord>();
        let writer = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let sink = Arc::clone(&sink);
                let persisted = tokio::task::spawn_blocking(move || sink.append(&record)).await;
                match persisted {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist usage record"),
                    Err(e) => tracing::warn!(error = %e, "usage sink task panicked"),
                }
            }
        });
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
        self
    }

    /// Stop accepting records for the sink and wait until every queued
    /// record has been written. Later records stay in memory only.
    pub async fn flush(&self) {
        drop(self.sink.lock().unwrap_or_else(PoisonError::into_inner).take());
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(writer) = writer
            && let Err(e) = writer.await
        {
            tracing::warn!(error = %e, "usage writer task failed");
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<UsageRecord>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub const fn baseline_rate(&self) -> f64 {
        self.baseline_rate
    }

    /// Append a record. Never blocks on persistence.
    pub fn record(&self, record: UsageRecord) {
        {
            let mut ledger = self.lock();
            ledger.total_cost += record.cost_usd;
            ledger.total_tokens += record.tokens_consumed;
            match record.provider.kind() {
                ProviderKind::Local => ledger.local_requests += 1,
                ProviderKind::Remote => ledger.remote_requests += 1,
            }
            let entry = ledger.per_provider.entry(record.provider).or_default();
            entry.requests += 1;
            entry.tokens += record.tokens_consumed;
            entry.cost_usd += record.cost_usd;
            ledger.records.push(record.clone());
        }

        tracing::debug!(
            provider = %record.provider,
            model = %record.model,
            tokens = record.tokens_consumed,
            cost_usd = record.cost_usd,
            "usage recorded"
        );

        if let Some(tx) = self.sender()
            && tx.send(record).is_err()
        {
            tracing::warn!("usage sink is closed; record kept in memory only");
        }
    }

    /// Every record so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        self.lock().records.clone()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> UsageSnapshot {
        let ledger = self.lock();
        let baseline_cost = ledger.total_tokens as f64 / 1000.0 * self.baseline_rate;
        let cost_saved_usd = baseline_cost - ledger.total_cost;
        let savings = if baseline_cost > 0.0 {
            cost_saved_usd / baseline_cost * 100.0
        } else {
            0.0
        };
        let mut snapshot = UsageSnapshot {
            total_cost: ledger.total_cost,
            total_tokens: ledger.total_tokens,
            local_request_count: ledger.local_requests,
            remote_request_count: ledger.remote_requests,
            per_provider: ledger.per_provider.clone(),
            baseline_cost,
            cost_saved_usd,
            savings_vs_all_remote_baseline: savings,
            recommendation: String::new(),
        };
        snapshot.recommendation = snapshot.recommend(true);
        snapshot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
