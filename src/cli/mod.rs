//! CLI argument parsing and command dispatch.

pub mod args;
pub mod models;
pub mod repl;
pub mod route;
pub mod status;

pub use args::{Cli, Commands, OutputFormat};
