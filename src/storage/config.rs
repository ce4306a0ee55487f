//! Configuration file loading and resolution.
//!
//! Loads configuration from:
//! - Linux: `~/.config/infroute/config.toml`
//! - macOS: `~/Library/Application Support/infroute/config.toml`
//! - Windows: `%APPDATA%/infroute/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `INFROUTE_CONFIG`: Override config file path
//! - `INFROUTE_TIMEOUT`: Dispatch deadline in seconds
//! - `INFROUTE_PRIORITY_<PROVIDER>`: Fallback-chain priority override
//! - `INFROUTE_USAGE_DB`: Shared usage store (SQLite) path
//! - `OLLAMA_BASE_URL` or `OLLAMA_HOST`: Local engine endpoint
//! - `INFROUTE_NO_COLOR` or `NO_COLOR`: Disable colors
//! - Provider credentials: `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`,
//!   `GEMINI_API_KEY`/`GOOGLE_API_KEY`, `XAI_API_KEY`, `PERPLEXITY_API_KEY`
//!
//! The environment is captured once into an [`EnvSnapshot`] and never
//! re-read while the process runs.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::provider::ProviderId;
use crate::core::registry::Credentials;
use crate::error::{Result, RouteError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "INFROUTE_CONFIG";
/// Environment variable for the dispatch timeout in seconds.
pub const ENV_TIMEOUT: &str = "INFROUTE_TIMEOUT";
/// Environment variable for the shared usage store path.
pub const ENV_USAGE_DB: &str = "INFROUTE_USAGE_DB";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "INFROUTE_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
/// Local engine endpoint.
pub const ENV_OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
/// Local engine host as used by the engine itself.
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";

/// Longest accepted timeout, in seconds.
const MAX_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// Environment Snapshot
// =============================================================================

/// Immutable copy of the process environment taken at startup.
#[derive(Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl std::fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values may be credentials.
        let mut keys: Vec<_> = self.vars.keys().collect();
        keys.sort();
        f.debug_struct("EnvSnapshot").field("keys", &keys).finish()
    }
}

impl EnvSnapshot {
    /// Capture the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable, treating blank values as unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Check if a variable is set to a truthy value.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Settings supplied on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub ollama_url: Option<String>,
    pub usage_db: Option<PathBuf>,
    pub no_color: bool,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Dispatch deadline per request.
    pub timeout: Duration,
    pub local: LocalSettings,
    /// How long a health result stays fresh.
    pub health_ttl: Duration,
    /// Bound on a single health probe.
    pub probe_timeout: Duration,
    /// Send an unresolvable explicit model through the auto chain
    /// instead of failing with `ModelNotFound`.
    pub fallback_on_unknown_model: bool,
    /// Shared usage store, if persistence is wanted.
    pub usage_db: Option<PathBuf>,
    /// Per-provider settings, one entry per [`ProviderId::ALL`].
    pub providers: Vec<ProviderSettings>,
    pub credentials: Credentials,
    pub no_color: bool,
    /// Config file consulted (whether or not it existed).
    pub config_path: PathBuf,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Resolved local engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSettings {
    pub base_url: String,
    /// Preferred "balanced" model for auto mode.
    pub default_model: Option<String>,
    pub discovery_interval: Duration,
    pub discovery_timeout: Duration,
    /// Keep routing to the last good model list after a failed cycle.
    pub allow_stale: bool,
}

/// Resolved settings for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub id: ProviderId,
    pub enabled: bool,
    pub priority: u32,
    pub base_url: String,
    pub default_model: Option<String>,
    pub cost_per_1k_tokens: f64,
}

impl ProviderSettings {
    /// Built-in settings for a provider, before any file or env override.
    #[must_use]
    pub fn defaults_for(id: ProviderId) -> Self {
        Self {
            id,
            enabled: true,
            priority: id.default_priority(),
            base_url: id.default_base_url().to_string(),
            default_model: id.default_model().map(str::to_string),
            cost_per_1k_tokens: id.default_cost_per_1k_tokens(),
        }
    }
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub timeout: ConfigSource,
    pub local_base_url: ConfigSource,
    pub usage_db: ConfigSource,
    pub no_color: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI flags, the environment
    /// snapshot and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is out of range
    pub fn resolve(cli: &CliOverrides, env: &EnvSnapshot) -> Result<Self> {
        let config_path = Self::config_path(cli, env);
        let config = Config::load_from(&config_path)?;
        Self::resolve_with(cli, env, &config, config_path)
    }

    /// Resolve against an already loaded [`Config`].
    ///
    /// # Errors
    ///
    /// Returns an error if any resolved value is out of range.
    pub fn resolve_with(
        cli: &CliOverrides,
        env: &EnvSnapshot,
        config: &Config,
        config_path: PathBuf,
    ) -> Result<Self> {
        config.validate()?;

        let mut sources = ConfigSources::default();

        let timeout = Self::resolve_timeout(cli, env, config, &mut sources.timeout)?;
        let base_url = Self::resolve_local_url(cli, env, config, &mut sources.local_base_url);
        let usage_db = Self::resolve_usage_db(cli, env, config, &mut sources.usage_db);
        let no_color = Self::resolve_no_color(cli, env, config, &mut sources.no_color);
        let providers = Self::resolve_providers(env, config, &base_url)?;

        let local = LocalSettings {
            base_url,
            default_model: config.local.default_model.clone(),
            discovery_interval: Duration::from_secs(config.local.discovery_interval_seconds),
            discovery_timeout: Duration::from_secs(config.local.discovery_timeout_seconds),
            allow_stale: config.local.allow_stale,
        };

        Ok(Self {
            timeout,
            local,
            health_ttl: Duration::from_secs(config.health.ttl_seconds),
            probe_timeout: Duration::from_secs(config.health.probe_timeout_seconds),
            fallback_on_unknown_model: config.routing.fallback_on_unknown_model,
            usage_db,
            providers,
            credentials: Credentials::from_env(env),
            no_color,
            config_path,
            sources,
        })
    }

    /// Settings for one provider.
    #[must_use]
    pub fn provider(&self, id: ProviderId) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Config file path: CLI flag, then `INFROUTE_CONFIG`, then the
    /// platform default.
    #[must_use]
    pub fn config_path(cli: &CliOverrides, env: &EnvSnapshot) -> PathBuf {
        cli.config_path
            .clone()
            .or_else(|| env.get(ENV_CONFIG).map(PathBuf::from))
            .unwrap_or_else(|| AppPaths::new().config_file())
    }

    fn resolve_timeout(
        cli: &CliOverrides,
        env: &EnvSnapshot,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<Duration> {
        // 1. CLI flag
        if let Some(secs) = cli.timeout_seconds {
            *source = ConfigSource::Cli;
            return check_timeout("--timeout", secs).map(Duration::from_secs);
        }

        // 2. Environment variable
        if let Some(raw) = env.get(ENV_TIMEOUT) {
            *source = ConfigSource::Env;
            let secs = raw.parse::<u64>().map_err(|_| RouteError::ConfigInvalid {
                key: ENV_TIMEOUT.to_string(),
                value: raw.to_string(),
                message: "expected a whole number of seconds".to_string(),
            })?;
            return check_timeout(ENV_TIMEOUT, secs).map(Duration::from_secs);
        }

        // 3. Config file (defaults included)
        *source = if config.general.timeout_seconds == GeneralConfig::default().timeout_seconds {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        Ok(Duration::from_secs(config.general.timeout_seconds))
    }

    fn resolve_local_url(
        cli: &CliOverrides,
        env: &EnvSnapshot,
        config: &Config,
        source: &mut ConfigSource,
    ) -> String {
        if let Some(url) = &cli.ollama_url {
            *source = ConfigSource::Cli;
            return normalize_engine_url(url);
        }

        if let Some(url) = env.get(ENV_OLLAMA_BASE_URL).or_else(|| env.get(ENV_OLLAMA_HOST)) {
            *source = ConfigSource::Env;
            return normalize_engine_url(url);
        }

        if let Some(url) = config
            .providers
            .get(ProviderId::Ollama.cli_name())
            .and_then(|p| p.base_url.as_deref())
        {
            *source = ConfigSource::ConfigFile;
            return normalize_engine_url(url);
        }

        *source = ConfigSource::Default;
        ProviderId::Ollama.default_base_url().to_string()
    }

    fn resolve_usage_db(
        cli: &CliOverrides,
        env: &EnvSnapshot,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Option<PathBuf> {
        if let Some(path) = &cli.usage_db {
            *source = ConfigSource::Cli;
            return Some(path.clone());
        }
        if let Some(path) = env.get(ENV_USAGE_DB) {
            *source = ConfigSource::Env;
            return Some(PathBuf::from(path));
        }
        if let Some(path) = &config.usage.store_path {
            *source = ConfigSource::ConfigFile;
            return Some(path.clone());
        }
        *source = ConfigSource::Default;
        None
    }

    fn resolve_no_color(
        cli: &CliOverrides,
        env: &EnvSnapshot,
        config: &Config,
        source: &mut ConfigSource,
    ) -> bool {
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }
        if env.is_truthy(ENV_NO_COLOR) || env.get(ENV_NO_COLOR_STD).is_some() {
            *source = ConfigSource::Env;
            return true;
        }
        if !config.output.color {
            *source = ConfigSource::ConfigFile;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    fn resolve_providers(
        env: &EnvSnapshot,
        config: &Config,
        local_url: &str,
    ) -> Result<Vec<ProviderSettings>> {
        ProviderId::ALL
            .iter()
            .map(|&id| {
                let file = config.provider_table(id);

                let priority = if id.is_local() {
                    0
                } else if let Some(raw) = env.get(&id.priority_env_var()) {
                    let priority = raw.parse::<u32>().map_err(|_| RouteError::ConfigInvalid {
                        key: id.priority_env_var(),
                        value: raw.to_string(),
                        message: "expected a non-negative integer".to_string(),
                    })?;
                    check_remote_priority(&id.priority_env_var(), priority)?
                } else {
                    file.and_then(|f| f.priority)
                        .unwrap_or_else(|| id.default_priority())
                };

                let base_url = if id.is_local() {
                    local_url.to_string()
                } else {
                    file.and_then(|f| f.base_url.clone())
                        .unwrap_or_else(|| id.default_base_url().to_string())
                };

                let default_model = if id.is_local() {
                    config.local.default_model.clone()
                } else {
                    file.and_then(|f| f.default_model.clone())
                        .or_else(|| id.default_model().map(str::to_string))
                };

                Ok(ProviderSettings {
                    id,
                    enabled: file.is_none_or(|f| f.enabled),
                    priority,
                    base_url,
                    default_model,
                    cost_per_1k_tokens: file
                        .and_then(|f| f.cost_per_1k_tokens)
                        .unwrap_or_else(|| id.default_cost_per_1k_tokens()),
                })
            })
            .collect()
    }
}

fn check_timeout(key: &str, secs: u64) -> Result<u64> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(RouteError::ConfigInvalid {
            key: key.to_string(),
            value: secs.to_string(),
            message: format!("must be between 1 and {MAX_TIMEOUT_SECS} seconds"),
        });
    }
    Ok(secs)
}

fn check_remote_priority(key: &str, priority: u32) -> Result<u32> {
    if priority == 0 {
        return Err(RouteError::ConfigInvalid {
            key: key.to_string(),
            value: priority.to_string(),
            message: "priority 0 is reserved for the local engine".to_string(),
        });
    }
    Ok(priority)
}

/// Accept `host:port`, `http://host:port` or a bind address such as
/// `0.0.0.0:11434` and produce a client URL.
#[must_use]
pub fn normalize_engine_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    with_scheme.replace("://0.0.0.0", "://localhost")
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Local engine settings.
    pub local: LocalConfig,
    /// Health check settings.
    pub health: HealthConfig,
    /// Routing behaviour.
    pub routing: RoutingConfig,
    /// Usage persistence.
    pub usage: UsageConfig,
    /// Output settings.
    pub output: OutputConfig,
    /// Per-provider tables keyed by provider name.
    pub providers: BTreeMap<String, ProviderTable>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Dispatch deadline in seconds.
    pub timeout_seconds: u64,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// Local engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Preferred model for auto mode when the prompt is neither code,
    /// short, nor long.
    pub default_model: Option<String>,
    pub discovery_interval_seconds: u64,
    pub discovery_timeout_seconds: u64,
    pub allow_stale: bool,
}

/// Health check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub ttl_seconds: u64,
    pub probe_timeout_seconds: u64,
}

/// Routing behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub fallback_on_unknown_model: bool,
}

/// Usage persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Path to the shared SQLite store.
    pub store_path: Option<PathBuf>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub color: bool,
}

/// `[providers.<name>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderTable {
    pub enabled: bool,
    pub priority: Option<u32>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub cost_per_1k_tokens: Option<f64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            log_level: None,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            discovery_interval_seconds: 300,
            discovery_timeout_seconds: 3,
            allow_stale: false,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            probe_timeout_seconds: 2,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

impl Default for ProviderTable {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            base_url: None,
            default_model: None,
            cost_per_1k_tokens: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RouteError::Config(format!("Invalid config file: {e}")))
    }

    /// Table for a provider, accepting aliases such as `gemini`.
    #[must_use]
    pub fn provider_table(&self, id: ProviderId) -> Option<&ProviderTable> {
        self.providers
            .iter()
            .find(|(name, _)| ProviderId::from_cli_name(name).is_ok_and(|p| p == id))
            .map(|(_, table)| table)
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - Timeouts are within 1-600 seconds
    /// - Provider tables name known providers
    /// - Remote priorities are at least 1 and the local engine stays at 0
    /// - Costs are finite and non-negative
    pub fn validate(&self) -> Result<()> {
        check_timeout("general.timeout_seconds", self.general.timeout_seconds)?;
        check_timeout(
            "local.discovery_timeout_seconds",
            self.local.discovery_timeout_seconds,
        )?;
        check_timeout("health.probe_timeout_seconds", self.health.probe_timeout_seconds)?;

        if self.local.discovery_interval_seconds == 0 {
            return Err(RouteError::ConfigInvalid {
                key: "local.discovery_interval_seconds".to_string(),
                value: "0".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }

        for (name, table) in &self.providers {
            let id = ProviderId::from_cli_name(name).map_err(|_| {
                let valid = ProviderId::ALL
                    .iter()
                    .map(|p| p.cli_name())
                    .collect::<Vec<_>>()
                    .join(", ");
                RouteError::ConfigInvalid {
                    key: format!("providers.{name}"),
                    value: name.clone(),
                    message: format!("unknown provider. Valid providers: {valid}"),
                }
            })?;

            if let Some(priority) = table.priority {
                let key = format!("providers.{name}.priority");
                if id.is_local() && priority != 0 {
                    return Err(RouteError::ConfigInvalid {
                        key,
                        value: priority.to_string(),
                        message: "the local engine is always tried first (priority 0)"
                            .to_string(),
                    });
                }
                if !id.is_local() {
                    check_remote_priority(&key, priority)?;
                }
            }

            if let Some(cost) = table.cost_per_1k_tokens
                && (!cost.is_finite() || cost < 0.0)
            {
                return Err(RouteError::ConfigInvalid {
                    key: format!("providers.{name}.cost_per_1k_tokens"),
                    value: cost.to_string(),
                    message: "must be a non-negative number".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env() -> EnvSnapshot {
        EnvSnapshot::default()
    }

    fn resolve(config: &Config, env: &EnvSnapshot) -> Result<ResolvedConfig> {
        ResolvedConfig::resolve_with(
            &CliOverrides::default(),
            env,
            config,
            PathBuf::from("/nonexistent/config.toml"),
        )
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.timeout_seconds, 60);
        assert_eq!(config.local.discovery_interval_seconds, 300);
        assert_eq!(config.health.probe_timeout_seconds, 2);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.general.timeout_seconds, 60);
    }

    #[test]
    fn load_valid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[general]
timeout_seconds = 30

[local]
default_model = "llama3.2"
allow_stale = true

[routing]
fallback_on_unknown_model = true

[providers.openai]
priority = 5
cost_per_1k_tokens = 0.01

[providers.gemini]
enabled = false
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.general.timeout_seconds, 30);
        assert_eq!(config.local.default_model.as_deref(), Some("llama3.2"));
        assert!(config.local.allow_stale);
        assert!(config.routing.fallback_on_unknown_model);

        let resolved = resolve(&config, &no_env()).unwrap();
        let openai = resolved.provider(ProviderId::OpenAI).unwrap();
        assert_eq!(openai.priority, 5);
        assert!((openai.cost_per_1k_tokens - 0.01).abs() < f64::EPSILON);
        assert!(!resolved.provider(ProviderId::Google).unwrap().enabled);
        assert!(resolved.provider(ProviderId::Anthropic).unwrap().enabled);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_timeouts() {
        let mut config = Config::default();
        config.general.timeout_seconds = 0;
        assert!(config.validate().is_err());
        config.general.timeout_seconds = 601;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("general.timeout_seconds"));
    }

    #[test]
    fn validate_rejects_unknown_provider_table() {
        let mut config = Config::default();
        config
            .providers
            .insert("mystery".to_string(), ProviderTable::default());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("providers.mystery"));
    }

    #[test]
    fn validate_pins_local_priority() {
        let mut config = Config::default();
        config.providers.insert(
            "ollama".to_string(),
            ProviderTable {
                priority: Some(3),
                ..ProviderTable::default()
            },
        );
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderTable {
                priority: Some(0),
                ..ProviderTable::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_cost() {
        let mut config = Config::default();
        config.providers.insert(
            "xai".to_string(),
            ProviderTable {
                cost_per_1k_tokens: Some(-1.0),
                ..ProviderTable::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_source_display() {
        assert_eq!(format!("{}", ConfigSource::Cli), "CLI flag");
        assert_eq!(format!("{}", ConfigSource::Env), "environment variable");
        assert_eq!(format!("{}", ConfigSource::ConfigFile), "config file");
        assert_eq!(format!("{}", ConfigSource::Default), "default");
    }

    #[test]
    fn resolved_defaults() {
        let resolved = resolve(&Config::default(), &no_env()).unwrap();
        assert_eq!(resolved.timeout, Duration::from_secs(60));
        assert_eq!(resolved.local.base_url, "http://localhost:11434");
        assert_eq!(resolved.sources.timeout, ConfigSource::Default);
        assert_eq!(resolved.providers.len(), ProviderId::ALL.len());
        assert_eq!(resolved.provider(ProviderId::Ollama).unwrap().priority, 0);
        assert!(resolved.usage_db.is_none());
        assert!(!resolved.fallback_on_unknown_model);
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let env = EnvSnapshot::from_pairs([
            (ENV_TIMEOUT, "90"),
            ("INFROUTE_PRIORITY_PERPLEXITY", "1"),
            (ENV_OLLAMA_HOST, "0.0.0.0:11434"),
        ]);
        let mut config = Config::default();
        config.general.timeout_seconds = 30;

        let resolved = resolve(&config, &env).unwrap();
        assert_eq!(resolved.timeout, Duration::from_secs(90));
        assert_eq!(resolved.sources.timeout, ConfigSource::Env);
        assert_eq!(resolved.provider(ProviderId::Perplexity).unwrap().priority, 1);
        assert_eq!(resolved.local.base_url, "http://localhost:11434");

        let cli = CliOverrides {
            timeout_seconds: Some(5),
            ..CliOverrides::default()
        };
        let resolved =
            ResolvedConfig::resolve_with(&cli, &env, &config, PathBuf::from("x")).unwrap();
        assert_eq!(resolved.timeout, Duration::from_secs(5));
        assert_eq!(resolved.sources.timeout, ConfigSource::Cli);
    }

    #[test]
    fn invalid_env_values_are_config_errors() {
        let env = EnvSnapshot::from_pairs([(ENV_TIMEOUT, "soon")]);
        let err = resolve(&Config::default(), &env).unwrap_err();
        assert!(matches!(err, RouteError::ConfigInvalid { .. }));

        let env = EnvSnapshot::from_pairs([("INFROUTE_PRIORITY_OPENAI", "0")]);
        assert!(resolve(&Config::default(), &env).is_err());
    }

    #[test]
    fn credentials_come_from_env_snapshot() {
        let env = EnvSnapshot::from_pairs([("OPENAI_API_KEY", "sk-test"), ("XAI_API_KEY", " ")]);
        let resolved = resolve(&Config::default(), &env).unwrap();
        assert!(resolved.credentials.is_present(ProviderId::OpenAI));
        assert!(!resolved.credentials.is_present(ProviderId::Xai));
        assert!(resolved.credentials.is_present(ProviderId::Ollama));
    }

    #[test]
    fn env_snapshot_debug_hides_values() {
        let env = EnvSnapshot::from_pairs([("OPENAI_API_KEY", "sk-secret")]);
        let debug = format!("{env:?}");
        assert!(debug.contains("OPENAI_API_KEY"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn engine_url_normalization() {
        assert_eq!(normalize_engine_url("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_engine_url("https://gpu-box:11434/"), "https://gpu-box:11434");
    }
}
