//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and prompt markers so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "prchat";

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compilation target triple, set by `build.rs`.
pub const TARGET: &str = env!("TARGET");

/// Local config filename (e.g. `prchat.toml` in the working directory).
pub const CONFIG_FILENAME: &str = "prchat.toml";

/// Directory name under `~/.config/` for global config and history.
pub const CONFIG_DIR: &str = "prchat";

/// Default listen address for the websocket server.
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "prchat=info,tower_http=info";

/// Prefix for every error reply sent over a chat channel.
pub const ERROR_REPLY_PREFIX: &str = "[Server Error]";

/// Header placed before the pull request diff in a composed prompt.
pub const DIFF_SECTION_HEADER: &str = "PR DIFFS:";

/// Header placed before the user's own text in a composed prompt.
pub const MESSAGE_SECTION_HEADER: &str = "User Message:";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "PRCHAT_PROVIDER";
pub const ENV_MODEL: &str = "PRCHAT_MODEL";
pub const ENV_TEMPERATURE: &str = "PRCHAT_TEMPERATURE";
pub const ENV_BASE_URL: &str = "PRCHAT_BASE_URL";
pub const ENV_BIND: &str = "PRCHAT_BIND";
pub const ENV_HISTORY_BACKEND: &str = "PRCHAT_HISTORY_BACKEND";
pub const ENV_HISTORY_DIR: &str = "PRCHAT_HISTORY_DIR";
pub const ENV_DIFFS_API_URL: &str = "PRCHAT_DIFFS_API_URL";
pub const ENV_DIFFS_ON_FAILURE: &str = "PRCHAT_DIFFS_ON_FAILURE";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_SECRETS_SOURCE: &str = "PRCHAT_SECRETS_SOURCE";
pub const ENV_SECRETS_PATH: &str = "PRCHAT_SECRETS_PATH";
