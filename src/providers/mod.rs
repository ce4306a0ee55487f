//! Backend clients.
//!
//! The router talks to two kinds of backend through narrow async traits:
//! the local engine ([`LocalEngine`]) and metered remote APIs
//! ([`RemoteClient`]). Each provider has its own submodule.

pub mod catalog;
pub mod ollama;
pub mod remote;

use std::time::Duration;

use async_trait::async_trait;

use crate::core::models::{Completion, EngineModel};
use crate::core::provider::ProviderId;
use crate::error::Result;

pub use ollama::OllamaClient;
pub use remote::HttpRemoteClient;

/// Client for the zero-cost engine running on this host.
#[async_trait]
pub trait LocalEngine: Send + Sync {
    /// List installed models. Must finish within `timeout`.
    async fn list_models(&self, timeout: Duration) -> Result<Vec<EngineModel>>;

    /// Run one non-streaming generation.
    async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> Result<Completion>;
}

/// Uniform client contract shared by every remote provider.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Send one prompt and wait for the full completion.
    async fn send(&self, model: &str, prompt: &str, timeout: Duration) -> Result<Completion>;
}
