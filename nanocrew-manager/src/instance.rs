//! `AgentInstance`: the runtime materialization of one [`AgentDefinition`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nanocrew_adapters::traits::ModelAdapter;
use nanocrew_config::AgentDefinition;
use nanocrew_kernel::{AgentState, Lifecycle, LifecycleEvent, SchedulerConfig, TaskScheduler};
use nanocrew_memory::{FileJournal, Journal, MemoryBus, VolatileConfig};
use nanocrew_primitives::AgentName;
use tracing::{debug, info};

use crate::error::{ManagerError, ManagerResult};

fn agents_md(agent_name: &str) -> String {
    format!(
        r#"# Agent Instructions

You are a helpful AI assistant. Be concise, accurate, and friendly.

## Guidelines

- Always explain what you're doing before taking actions
- Ask for clarification when the request is ambiguous
- Use tools to help accomplish tasks
- Remember important information in memory/MEMORY.md; past events are logged in memory/HISTORY.md

## Multi-Agent System

This is agent `{agent_name}` with its own isolated workspace.
"#
    )
}

fn soul_md(agent_name: &str) -> String {
    format!(
        r#"# Soul

I am {agent_name}, a lightweight AI assistant.

## Personality

- Helpful and friendly
- Concise and to the point
- Curious and eager to learn

## Values

- Accuracy over speed
- User privacy and safety
- Transparency in actions
"#
    )
}

const USER_MD: &str = r#"# User

Information about the user goes here.

## Preferences

- Communication style: (casual/formal)
- Timezone: (your timezone)
- Language: (your preferred language)
"#;

const MEMORY_MD: &str = r#"# Long-term Memory

This file stores important information that should persist across sessions.

## User Information

(Important facts about the user)

## Preferences

(User preferences learned over time)

## Important Notes

(Things to remember)
"#;

/// Creates the workspace directory tree and materializes the canonical
/// bootstrap files, if they are not already present.
///
/// Idempotent: the presence of `AGENTS.md` is treated as the sentinel for
/// "this workspace is already initialized," mirroring the donor's
/// `ensure_agent_workspace`. Existing files are never overwritten.
///
/// # Errors
///
/// Propagates any I/O failure encountered while creating directories or
/// writing template files.
pub async fn ensure_workspace(workspace: &Path, agent_name: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace).await?;
    let memory_dir = workspace.join("memory");
    tokio::fs::create_dir_all(&memory_dir).await?;
    tokio::fs::create_dir_all(workspace.join("skills")).await?;
    tokio::fs::create_dir_all(workspace.join(".sessions")).await?;

    let sentinel = workspace.join("AGENTS.md");
    if tokio::fs::metadata(&sentinel).await.is_ok() {
        debug!(workspace = %workspace.display(), "workspace already initialized");
        return Ok(());
    }

    info!(agent = agent_name, workspace = %workspace.display(), "materializing workspace bootstrap files");

    write_if_absent(&sentinel, &agents_md(agent_name)).await?;
    write_if_absent(&workspace.join("SOUL.md"), &soul_md(agent_name)).await?;
    write_if_absent(&workspace.join("USER.md"), USER_MD).await?;
    write_if_absent(&memory_dir.join("MEMORY.md"), MEMORY_MD).await?;
    write_if_absent(&memory_dir.join("HISTORY.md"), "").await?;

    Ok(())
}

async fn write_if_absent(path: &Path, content: &str) -> std::io::Result<()> {
    if tokio::fs::metadata(path).await.is_ok() {
        return Ok(());
    }
    tokio::fs::write(path, content).await
}

/// The runtime materialization of an [`AgentDefinition`]: a workspace, a
/// session-history store, a bounded task scheduler, and (optionally) a
/// reference to an LLM provider collaborator.
///
/// Owned exclusively by an [`crate::manager::AgentManager`]; created lazily
/// on first request and destroyed (its reference dropped, after a `stop`
/// signal) when its agent is removed from the registry.
pub struct AgentInstance {
    name: AgentName,
    workspace: PathBuf,
    definition: AgentDefinition,
    lifecycle: Mutex<Lifecycle>,
    scheduler: TaskScheduler,
    memory: MemoryBus,
    adapter: Option<Arc<dyn ModelAdapter>>,
}

impl AgentInstance {
    /// Constructs a new instance: expands `~` in the definition's
    /// workspace, materializes the workspace bootstrap files, and wires a
    /// session-history store rooted at `<workspace>/.sessions/<name>.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InstanceConstruction`] if the workspace
    /// cannot be created or its bootstrap files cannot be written.
    pub async fn new(
        name: AgentName,
        definition: AgentDefinition,
        adapter: Option<Arc<dyn ModelAdapter>>,
    ) -> ManagerResult<Self> {
        let workspace = nanocrew_config::expand_tilde(&definition.workspace);

        ensure_workspace(&workspace, name.as_str())
            .await
            .map_err(|source| ManagerError::InstanceConstruction {
                name: name.clone(),
                source,
            })?;

        let journal_path = workspace.join(".sessions").join(format!("{}.jsonl", name.as_str()));
        let journal = FileJournal::open(&journal_path)
            .await
            .map_err(|source| ManagerError::InstanceConstruction {
                name: name.clone(),
                source: std::io::Error::other(source),
            })?;
        let journal: Arc<dyn Journal> = Arc::new(journal);

        let capacity = NonZeroUsize::new(definition.memory_window as usize)
            .unwrap_or_else(|| NonZeroUsize::new(50).expect("non-zero"));
        let memory = MemoryBus::builder(VolatileConfig::new(capacity))
            .with_journal(journal)
            .build()
            .expect("journal was just provided");

        let mut lifecycle = Lifecycle::new(name.clone());
        lifecycle
            .transition(LifecycleEvent::Boot)
            .expect("Init -> Ready is always valid immediately after construction");

        info!(agent = %name, workspace = %workspace.display(), "agent instance constructed");

        Ok(Self {
            name,
            workspace,
            definition,
            lifecycle: Mutex::new(lifecycle),
            scheduler: TaskScheduler::new(SchedulerConfig::default()),
            memory,
            adapter,
        })
    }

    /// Returns the agent's name.
    #[must_use]
    pub fn name(&self) -> &AgentName {
        &self.name
    }

    /// Returns the expanded workspace path.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the definition this instance was constructed from.
    #[must_use]
    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Returns the session-history store.
    #[must_use]
    pub fn memory(&self) -> &MemoryBus {
        &self.memory
    }

    /// Returns the bounded task scheduler used for this instance's work.
    #[must_use]
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Returns the configured LLM provider collaborator, if any.
    #[must_use]
    pub fn adapter(&self) -> Option<&Arc<dyn ModelAdapter>> {
        self.adapter.as_ref()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.lifecycle.lock().expect("lifecycle mutex poisoned").state()
    }

    /// Marks this instance active, ready to accept inbound sessions.
    ///
    /// # Errors
    ///
    /// Returns [`nanocrew_kernel::LifecycleError`] if the instance is not in
    /// the `Ready` state.
    pub fn activate(&self) -> nanocrew_kernel::LifecycleResult<AgentState> {
        self.lifecycle.lock().expect("lifecycle mutex poisoned").transition(LifecycleEvent::Activate)
    }

    /// Begins a graceful shutdown: closes the task scheduler (refusing new
    /// work) and transitions the lifecycle to `Retiring` then `Terminated`.
    pub fn stop(&self) {
        self.scheduler.close();
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle mutex poisoned");
        if !lifecycle.state().is_terminal() {
            let _ = lifecycle.transition(LifecycleEvent::Retire);
            let _ = lifecycle.transition(LifecycleEvent::Terminate);
        }
        debug!(agent = %self.name, "agent instance stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir(label: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nanocrew-instance-{}-{label}", Uuid::new_v4()));
        path
    }

    #[tokio::test]
    async fn construction_materializes_bootstrap_files() {
        let workspace = scratch_dir("bootstrap");
        let mut definition = AgentDefinition::default();
        definition.workspace = workspace.to_string_lossy().into_owned();

        let instance = AgentInstance::new(AgentName::new("backend").unwrap(), definition, None)
            .await
            .unwrap();

        assert!(tokio::fs::metadata(workspace.join("AGENTS.md")).await.is_ok());
        assert!(tokio::fs::metadata(workspace.join("SOUL.md")).await.is_ok());
        assert!(tokio::fs::metadata(workspace.join("USER.md")).await.is_ok());
        assert!(tokio::fs::metadata(workspace.join("memory/MEMORY.md")).await.is_ok());
        assert!(tokio::fs::metadata(workspace.join("memory/HISTORY.md")).await.is_ok());
        assert_eq!(instance.state(), AgentState::Ready);

        let _ = tokio::fs::remove_dir_all(&workspace).await;
    }

    #[tokio::test]
    async fn ensure_workspace_is_idempotent() {
        let workspace = scratch_dir("idempotent");
        ensure_workspace(&workspace, "main").await.unwrap();
        tokio::fs::write(workspace.join("USER.md"), "customized").await.unwrap();

        ensure_workspace(&workspace, "main").await.unwrap();

        let content = tokio::fs::read_to_string(workspace.join("USER.md")).await.unwrap();
        assert_eq!(content, "customized");

        let _ = tokio::fs::remove_dir_all(&workspace).await;
    }

    #[tokio::test]
    async fn stop_transitions_to_terminated_and_closes_scheduler() {
        let workspace = scratch_dir("stop");
        let mut definition = AgentDefinition::default();
        definition.workspace = workspace.to_string_lossy().into_owned();

        let instance = AgentInstance::new(AgentName::new("main").unwrap(), definition, None)
            .await
            .unwrap();
        instance.activate().unwrap();
        assert_eq!(instance.state(), AgentState::Active);

        instance.stop();
        assert_eq!(instance.state(), AgentState::Terminated);
        assert!(instance.scheduler().is_closed());

        let _ = tokio::fs::remove_dir_all(&workspace).await;
    }
}
