//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags (applied by the binary after loading)
//! 2. Environment variables
//! 3. `--config <path>`, or `prchat.toml` in the working directory
//! 4. `~/.config/prchat/config.toml` (global defaults)
//! 5. Built-in defaults
//!
//! File layers merge key by key: a key set in a higher layer wins even when
//! its value equals the built-in default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::constants;
use crate::env::Env;
use crate::models::ProviderName;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to combine config files: {source}")]
    Layered { source: toml::de::Error },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub history: HistoryConfig,
    pub diffs: DiffsConfig,
    pub secrets: SecretsConfig,
}

/// Websocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: constants::DEFAULT_BIND.to_string(),
            static_dir: PathBuf::from("static"),
        }
    }
}

/// LLM provider configuration.
///
/// Holds no API key. The key is resolved once at startup by
/// the secrets provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub base_url: Option<String>,
    pub system_prompt: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::Anthropic,
            model: "claude-3-7-sonnet-20250219".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            base_url: None,
            system_prompt: "You're a helpful assistant.".to_string(),
            max_retries: 2,
            retry_backoff_ms: 1000,
        }
    }
}

/// Which backing store holds session history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Process-lifetime map; lost on restart.
    Memory,
    /// JSON-lines file per session on local disk.
    #[default]
    File,
    /// In-memory with a sliding expiry per session.
    Cache,
}

impl FromStr for HistoryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(HistoryBackend::Memory),
            "file" => Ok(HistoryBackend::File),
            "cache" => Ok(HistoryBackend::Cache),
            other => Err(format!(
                "unsupported history backend: '{other}'. Supported: memory, file, cache"
            )),
        }
    }
}

/// Session history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    /// Directory for the `file` backend (default `~/.config/prchat/history`).
    pub dir: Option<PathBuf>,
    /// Idle lifetime of a session in the `cache` backend.
    pub ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::File,
            dir: None,
            ttl_secs: 3600,
        }
    }
}

impl HistoryConfig {
    /// Directory the file backend writes to.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .map(|d| d.join(constants::CONFIG_DIR).join("history"))
                .unwrap_or_else(|| PathBuf::from(".prchat").join("history"))
        })
    }
}

/// What to do with a turn when the diff could not be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFailurePolicy {
    /// Continue with the raw user message.
    #[default]
    Proceed,
    /// Fail the turn and report the fetch error to the client.
    Abort,
}

/// Pull request diff source configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffsConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub on_failure: DiffFailurePolicy,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DiffsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffsConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("on_failure", &self.on_failure)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for DiffsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            on_failure: DiffFailurePolicy::Proceed,
            timeout_secs: 30,
        }
    }
}

/// Where the LLM credential comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretsSource {
    #[default]
    Env,
    File,
}

/// Credential bootstrap configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub source: SecretsSource,
    /// Variable to read for the `env` source (default: provider-specific key var).
    pub env_var: Option<String>,
    /// File to read for the `file` source.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// `explicit` is a `--config` path; when given it must exist. Otherwise
    /// `prchat.toml` in `cwd` is used if present.
    pub fn load(explicit: Option<&Path>, cwd: &Path, env: &Env) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                layers.push(Self::load_layer(&global_path)?);
            }
        }

        // Layer 3: explicit or working-directory config
        match explicit {
            Some(path) => layers.push(Self::load_layer(path)?),
            None => {
                let local_path = cwd.join(constants::CONFIG_FILENAME);
                if local_path.exists() {
                    layers.push(Self::load_layer(&local_path)?);
                }
            }
        }

        let mut config = Self::from_layers(layers)?;

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Read one config file as a raw table, checking it parses as a config
    /// on its own so errors name the offending file.
    fn load_layer(path: &Path) -> Result<toml::Table, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let parse_error = |source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        };
        let table: toml::Table = toml::from_str(&content).map_err(parse_error)?;
        table.clone().try_into::<Config>().map_err(parse_error)?;
        Ok(table)
    }

    /// Stack file layers, later ones on top, over the built-in defaults.
    ///
    /// Only keys a layer actually sets replace the layer below, so a local
    /// file can put back a default that the global file changed.
    fn from_layers(layers: Vec<toml::Table>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for layer in layers {
            overlay(&mut merged, layer);
        }
        merged
            .try_into::<Config>()
            .map_err(|source| ConfigError::Layered { source })
    }

    /// Get the global config file path.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.non_empty(constants::ENV_PROVIDER) {
            match val.parse::<ProviderName>() {
                Ok(name) => self.provider.name = name,
                Err(_) => tracing::warn!(
                    var = constants::ENV_PROVIDER,
                    value = %val,
                    "ignoring invalid provider override"
                ),
            }
        }
        if let Some(val) = env.non_empty(constants::ENV_MODEL) {
            self.provider.model = val;
        }
        if let Some(val) = env.non_empty(constants::ENV_TEMPERATURE) {
            match val.parse::<f64>() {
                Ok(t) if (0.0..=2.0).contains(&t) => self.provider.temperature = t,
                _ => tracing::warn!(
                    var = constants::ENV_TEMPERATURE,
                    value = %val,
                    "ignoring invalid temperature override"
                ),
            }
        }
        if let Some(val) = env.non_empty(constants::ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }
        if let Some(val) = env.non_empty(constants::ENV_BIND) {
            self.server.bind = val;
        }
        if let Some(val) = env.non_empty(constants::ENV_HISTORY_BACKEND) {
            match val.parse::<HistoryBackend>() {
                Ok(backend) => self.history.backend = backend,
                Err(_) => tracing::warn!(
                    var = constants::ENV_HISTORY_BACKEND,
                    value = %val,
                    "ignoring invalid history backend override"
                ),
            }
        }
        if let Some(val) = env.non_empty(constants::ENV_HISTORY_DIR) {
            self.history.dir = Some(PathBuf::from(val));
        }
        if let Some(val) = env.non_empty(constants::ENV_DIFFS_API_URL) {
            self.diffs.api_url = val;
        }
        if let Some(val) = env.non_empty(constants::ENV_GITHUB_TOKEN) {
            self.diffs.token = Some(val);
        }
        if let Some(val) = env.non_empty(constants::ENV_DIFFS_ON_FAILURE) {
            match val.to_lowercase().as_str() {
                "proceed" => self.diffs.on_failure = DiffFailurePolicy::Proceed,
                "abort" => self.diffs.on_failure = DiffFailurePolicy::Abort,
                _ => tracing::warn!(
                    var = constants::ENV_DIFFS_ON_FAILURE,
                    value = %val,
                    "ignoring invalid diff failure policy"
                ),
            }
        }
        if let Some(val) = env.non_empty(constants::ENV_SECRETS_SOURCE) {
            match val.to_lowercase().as_str() {
                "env" => self.secrets.source = SecretsSource::Env,
                "file" => self.secrets.source = SecretsSource::File,
                _ => tracing::warn!(
                    var = constants::ENV_SECRETS_SOURCE,
                    value = %val,
                    "ignoring invalid secrets source"
                ),
            }
        }
        if let Some(val) = env.non_empty(constants::ENV_SECRETS_PATH) {
            self.secrets.path = Some(PathBuf::from(val));
        }
    }
}

/// Recursively copy `layer` onto `base`. Nested tables merge key by key;
/// any other value replaces what was there.
fn overlay(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        if let toml::Value::Table(nested) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                overlay(existing, nested);
                continue;
            }
            base.insert(key, toml::Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}
