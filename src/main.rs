//! prchat: pull request chat relay.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use prchat::chat::ChatOrchestrator;
use prchat::config::{Config, HistoryBackend};
use prchat::constants;
use prchat::diffs::github::GitHubDiffSource;
use prchat::env::Env;
use prchat::history;
use prchat::providers::rig::RigProvider;
use prchat::secrets;
use prchat::server::{self, ChatContext};

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::args::{Cli, Command, HistoryArgs, ServeArgs};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

/// Log to stderr, filtered by `RUST_LOG` or the built-in default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(constants::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::History(args) => run_history(args).await,
        Command::Version => run_version(),
    }
}

/// Print version and build information.
fn run_version() -> Result<()> {
    use colored::Colorize;

    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    println!("{}     {}", "target:".dimmed(), constants::TARGET);
    Ok(())
}

fn load_config(explicit: Option<&Path>, env: &Env) -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    Config::load(explicit, &cwd, env).context("failed to load configuration")
}

/// Resolve the credential, wire the collaborators, and serve.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let env = Env::real();
    let mut config = load_config(args.config.as_deref(), &env)?;
    args.apply(&mut config);

    let api_key = secrets::bootstrap(&config, &env)
        .await
        .context("refusing to start without an LLM credential")?;
    let model = RigProvider::new(config.provider.clone(), api_key)?;
    let diffs = GitHubDiffSource::new(&config.diffs)?;
    if config.diffs.token.is_none() {
        tracing::warn!(
            "no {} set, pull request diffs are limited to public repositories",
            constants::ENV_GITHUB_TOKEN
        );
    }

    let store = history::open_store(&config.history);
    tracing::info!(
        provider = %config.provider.name,
        model = %config.provider.model,
        history = ?config.history.backend,
        "starting chat server"
    );

    let orchestrator =
        ChatOrchestrator::from_config(store, Arc::new(diffs), Arc::new(model), &config);
    let static_dir = &config.server.static_dir;
    if !static_dir.join("index.html").is_file() {
        tracing::warn!(dir = %static_dir.display(), "index.html not found, / will return 404");
    }

    let router = server::create_router(ChatContext::new(orchestrator), static_dir);
    let listener = server::bind(&config.server.bind).await?;
    server::serve(listener, router).await?;
    Ok(())
}

/// Print a stored session.
async fn run_history(args: HistoryArgs) -> Result<()> {
    let env = Env::real();
    let config = load_config(args.config.as_deref(), &env)?;
    if config.history.backend != HistoryBackend::File {
        tracing::warn!(
            backend = ?config.history.backend,
            "this backend keeps nothing between runs"
        );
    }

    let store = history::open_store(&config.history);
    let turns = store
        .load(&args.session_id)
        .await
        .with_context(|| format!("failed to load session {}", args.session_id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&turns)?);
        return Ok(());
    }
    if turns.is_empty() {
        eprintln!("No history for session {}", args.session_id);
        return Ok(());
    }
    for (i, turn) in turns.iter().enumerate() {
        println!("{}", cli::render_turn(i, turn));
    }
    Ok(())
}
