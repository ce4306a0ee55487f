//! infroute - local-first inference request router
//!
//! Routes prompts to a local Ollama engine when it can serve them and falls
//! back to metered remote APIs (Anthropic, OpenAI, Google Gemini, xAI,
//! Perplexity) when it cannot. Model names are resolved against the locally
//! discovered catalog and a static remote catalog, and every dispatch is
//! priced so the router can report what staying local saved.

// deny (not forbid) so test helpers may opt in for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities, included in test builds or with the `test-utils` feature.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use core::router::Router;
pub use error::{ExitCode, Result, RouteError};
