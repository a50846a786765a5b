//! Command-line surface: `serve` runs the gateway; `agent *` subcommands
//! read and write the config document directly, without going through a
//! running gateway process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nanocrew_config::{AgentDefinition, AgentRegistry, NullEventSink, expand_tilde, load_config_or_default, save_config};
use tracing::info;

/// Multi-agent gateway: routes inbound sessions to hot-reloadable agent instances.
#[derive(Debug, Parser)]
#[command(name = "nanocrew", version, about)]
pub struct Cli {
    /// Overrides the default `~/.nanocrew/config.json` path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the gateway until `SIGINT`/`SIGTERM`.
    Serve,
    /// Agent registry management.
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
}

/// `nanocrew agent <...>` subcommands.
#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    /// Lists every agent currently in the config document.
    List,
    /// Adds a new agent to the config document and materializes its workspace.
    Create {
        /// Name of the new agent.
        name: String,
        /// Model identifier override.
        #[arg(long)]
        model: Option<String>,
        /// Workspace path override (defaults to `~/.nanocrew/workspaces/<name>`).
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Binds a session key to an agent name.
    Bind {
        /// Session identifier, e.g. `feishu:oc_abc123`.
        session_key: String,
        /// Agent name to bind the session to.
        agent_name: String,
    },
}

fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path),
        None => nanocrew_config::config_path().context("resolving default config path"),
    }
}

/// Prints every agent currently in the config document.
///
/// # Errors
///
/// Returns an error if the config path cannot be resolved.
pub fn agent_list(config_path: Option<PathBuf>) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let registry = AgentRegistry::new(path, Arc::new(NullEventSink)).context("loading config")?;

    let mut agents: Vec<_> = registry.list_agents().into_iter().collect();
    agents.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

    for (name, definition) in agents {
        println!("{name}\tmodel={}\tworkspace={}", definition.model, definition.workspace);
    }

    Ok(())
}

/// Adds `name` to the config document and materializes its workspace.
///
/// # Errors
///
/// Returns an error if the agent already exists, the config cannot be
/// loaded or saved, or the workspace cannot be materialized.
pub async fn agent_create(
    config_path: Option<PathBuf>,
    name: String,
    model: Option<String>,
    workspace: Option<String>,
) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let mut config = load_config_or_default(&path);

    if config.agents.registry.contains_key(&name) {
        bail!("agent '{name}' already exists");
    }

    let mut definition = AgentDefinition::default();
    definition.workspace = workspace.unwrap_or_else(|| format!("~/.nanocrew/workspaces/{name}"));
    if let Some(model) = model {
        definition.model = model;
    }

    let expanded_workspace = expand_tilde(&definition.workspace);
    nanocrew_manager::ensure_workspace(&expanded_workspace, &name)
        .await
        .with_context(|| format!("materializing workspace for agent '{name}'"))?;

    config.agents.registry.insert(name.clone(), definition);
    save_config(&config, &path).context("saving config")?;

    info!(agent = %name, "agent created");
    println!("created agent '{name}' at {}", expanded_workspace.display());
    Ok(())
}

/// Binds `session_key` to `agent_name` in the config document.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or saved.
pub fn agent_bind(config_path: Option<PathBuf>, session_key: String, agent_name: String) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let mut config = load_config_or_default(&path);

    if !config.agents.registry.contains_key(&agent_name) {
        tracing::warn!(agent = %agent_name, "binding to an agent not yet present in the registry");
    }

    config.agents.bindings.insert(session_key.clone(), agent_name.clone());
    save_config(&config, &path).context("saving config")?;

    info!(session = %session_key, agent = %agent_name, "session bound");
    println!("bound '{session_key}' -> '{agent_name}'");
    Ok(())
}
