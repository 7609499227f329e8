//! Configuration loading and layering.
//!
//! Handles `prchat.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{
    Config, ConfigError, DiffFailurePolicy, DiffsConfig, HistoryBackend, HistoryConfig,
    ProviderConfig, SecretsConfig, SecretsSource, ServerConfig,
};
