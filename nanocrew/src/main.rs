//! Entry point for the `nanocrew` multi-agent gateway binary.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nanocrew_config::{AgentRegistry, AsyncEventSink};
use nanocrew_events::EventBus;
use nanocrew_manager::AgentManager;
use nanocrew_watch::{DEFAULT_DEBOUNCE, FileCache, FileWatcher};
use tracing::info;

use cli::{AgentCommand, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve(cli.config).await,
        Command::Agent { command } => match command {
            AgentCommand::List => cli::agent_list(cli.config),
            AgentCommand::Create { name, model, workspace } => {
                cli::agent_create(cli.config, name, model, workspace).await
            }
            AgentCommand::Bind { session_key, agent_name } => {
                cli::agent_bind(cli.config, session_key, agent_name)
            }
        },
    }
}

async fn serve(config_override: Option<std::path::PathBuf>) -> Result<()> {
    let config_path = match config_override {
        Some(path) => path,
        None => nanocrew_config::config_path().context("resolving default config path")?,
    };

    materialize_ambient_paths().await.context("materializing ambient startup paths")?;

    let bus = Arc::new(EventBus::new());
    let cache = FileCache::new(DEFAULT_DEBOUNCE);
    let watcher = FileWatcher::new(Arc::clone(&bus), Arc::clone(&cache));

    let sink = Arc::new(AsyncEventSink::new(Arc::clone(&bus)));
    let registry = Arc::new(
        AgentRegistry::new(config_path.clone(), sink)
            .context("loading config: the registry requires a 'main' agent to be defined")?,
    );

    let manager = AgentManager::new(Arc::clone(&registry), Arc::clone(&bus), Some(Arc::clone(&watcher)), None);

    watcher.start().await.context("starting file watcher")?;
    manager.start().await;

    info!(config = %config_path.display(), "nanocrew gateway running");

    shutdown_signal().await;
    info!("shutdown signal received, cleaning up");

    manager.cleanup().await;
    manager.stop().await;
    watcher.stop().await;

    Ok(())
}

/// Materializes the ambient startup paths carried from the original
/// service's workspace bootstrap: the default `main` agent's `.sessions`
/// directory and the interactive CLI's line-editing history file. Both are
/// created once, if absent, before the watcher or manager start; neither is
/// owned by the lifecycle subsystem itself.
async fn materialize_ambient_paths() -> Result<()> {
    let main_sessions = nanocrew_config::expand_tilde("~/.nanocrew/workspaces/main/.sessions");
    tokio::fs::create_dir_all(&main_sessions)
        .await
        .with_context(|| format!("creating {}", main_sessions.display()))?;

    let history_dir = nanocrew_config::expand_tilde("~/.nanocrew/history");
    tokio::fs::create_dir_all(&history_dir)
        .await
        .with_context(|| format!("creating {}", history_dir.display()))?;

    let cli_history = history_dir.join("cli_history");
    if tokio::fs::metadata(&cli_history).await.is_err() {
        tokio::fs::write(&cli_history, b"")
            .await
            .with_context(|| format!("creating {}", cli_history.display()))?;
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
