//! Shared helpers for integration tests.
//!
//! - `logger`: phase-tagged test logging on stderr

pub mod logger;
