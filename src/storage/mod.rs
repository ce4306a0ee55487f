//! Configuration, platform paths and the usage store.

pub mod config;
pub mod paths;
pub mod usage_sink;

pub use config::{
    CliOverrides, Config, ConfigSource, ConfigSources, EnvSnapshot, ResolvedConfig, ENV_CONFIG,
    ENV_NO_COLOR, ENV_NO_COLOR_STD, ENV_TIMEOUT, ENV_USAGE_DB,
};
pub use paths::AppPaths;
pub use usage_sink::{SqliteUsageSink, UsageSink};
