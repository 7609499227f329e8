//! Clap argument types and config overrides.

use clap::Parser;
use std::path::PathBuf;

use prchat::config::{Config, HistoryBackend};

/// Chat about pull requests with an LLM over a websocket.
#[derive(Parser, Debug)]
#[command(name = "prchat", version = prchat::constants::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run the chat server.
    Serve(ServeArgs),

    /// Print the stored history of a session.
    History(HistoryArgs),

    /// Print version and build information.
    Version,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Path to a config file (default: ./prchat.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8000.
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory holding index.html and other static assets.
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Where session history is kept.
    #[arg(long, value_enum)]
    pub history_backend: Option<HistoryBackend>,
}

impl ServeArgs {
    /// Apply flags on top of the layered config. Flags win.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref bind) = self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(ref dir) = self.static_dir {
            config.server.static_dir = dir.clone();
        }
        if let Some(backend) = self.history_backend {
            config.history.backend = backend;
        }
    }
}

/// Arguments for the `history` subcommand.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Session to print.
    pub session_id: String,

    /// Path to a config file (default: ./prchat.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print turns as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
