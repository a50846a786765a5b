//! The hot-reloadable [`AgentRegistry`]: the authoritative view of
//! [`Config`], re-parsed on every public read when the on-disk document's
//! mtime has advanced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use nanocrew_events::{Event, EventBus};
use nanocrew_primitives::AgentName;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::loader::{self, LoaderError, expand_tilde};
use crate::schema::{AgentDefinition, Config};

/// Errors surfaced by [`AgentRegistry`] construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The validated config document has no `"main"` entry in its agent
    /// registry. Per spec this is a fatal condition: the process should
    /// refuse to serve requests.
    #[error("config has no \"main\" agent; refusing to start")]
    MainMissing,
    /// The initial config document could not be loaded or resolved.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// The lifecycle changes detected by one `reload_check`, handed to an
/// [`EventSink`] for publication.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    /// Newly added agents: name, expanded workspace path, and a snapshot of
    /// the full config document at the moment of the reload.
    pub added: Vec<(AgentName, PathBuf, Value)>,
    /// Agents removed from the registry.
    pub removed: Vec<AgentName>,
    /// Agents whose canonical fields changed, paired with the field names.
    pub updated: Vec<(AgentName, Vec<String>)>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// The construction-time choice between asynchronous event emission and a
/// no-op, replacing the donor's runtime detection of an async context
/// (`asyncio.get_running_loop()` / `RuntimeError`).
///
/// `reload_check` itself stays fully synchronous; the sink decides what, if
/// anything, happens with the detected changes.
pub trait EventSink: Send + Sync {
    /// Publishes (or discards) the changes detected by one reload.
    fn emit(&self, changes: Changes);
}

/// Fire-and-forgets a task on the ambient Tokio runtime that publishes
/// `agent.added`, `agent.removed`, then `agent.updated` events, in that
/// order, for every changed name.
pub struct AsyncEventSink {
    bus: Arc<EventBus>,
}

impl AsyncEventSink {
    /// Creates a sink that publishes onto `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl EventSink for AsyncEventSink {
    fn emit(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }

        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            for (name, workspace, config_snapshot) in changes.added {
                bus.publish(Event::AgentAdded {
                    name,
                    workspace,
                    config_snapshot,
                })
                .await;
            }
            for name in changes.removed {
                bus.publish(Event::AgentRemoved { name }).await;
            }
            for (name, changed_fields) in changes.updated {
                bus.publish(Event::AgentUpdated { name, changed_fields }).await;
            }
        });
    }
}

/// Discards every detected change. State is still updated by
/// `reload_check`; subscribers relying on a `Null` sink only observe new
/// state on their next direct access, matching the donor's behavior when
/// no event loop is running (e.g. the CLI).
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _changes: Changes) {}
}

struct RegistryState {
    config: Config,
    last_mtime: Option<SystemTime>,
    last_agents: HashSet<AgentName>,
}

/// The authoritative, hot-reloadable view of [`Config`].
///
/// `reload_check` is synchronous and is called from every public read path;
/// it never blocks on anything beyond a single `stat` and, on change, a
/// single file read.
pub struct AgentRegistry {
    config_path: PathBuf,
    sink: Arc<dyn EventSink>,
    state: Mutex<RegistryState>,
}

fn stat_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn agent_name_set(config: &Config) -> HashSet<AgentName> {
    config
        .agents
        .registry
        .keys()
        .filter_map(|name| AgentName::new(name.clone()).ok())
        .collect()
}

impl AgentRegistry {
    /// Loads the config document at `config_path` (or falls back to
    /// [`Config::default`] if it does not yet exist) and constructs a
    /// registry that publishes lifecycle changes through `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MainMissing`] if the resolved config has no
    /// `"main"` agent — a fatal condition the caller should refuse to start
    /// from.
    pub fn new(config_path: PathBuf, sink: Arc<dyn EventSink>) -> RegistryResult<Self> {
        let config = loader::load_config_or_default(&config_path);
        Self::from_config(config_path, sink, config)
    }

    fn from_config(config_path: PathBuf, sink: Arc<dyn EventSink>, config: Config) -> RegistryResult<Self> {
        if !config.agents.registry.contains_key(nanocrew_primitives::MAIN_AGENT) {
            return Err(RegistryError::MainMissing);
        }

        let last_mtime = stat_mtime(&config_path);
        let last_agents = agent_name_set(&config);

        Ok(Self {
            config_path,
            sink,
            state: Mutex::new(RegistryState {
                config,
                last_mtime,
                last_agents,
            }),
        })
    }

    /// Re-stats the config path and, if its mtime has advanced, reparses,
    /// migrates, diffs, atomically swaps the in-memory config, and hands
    /// the detected [`Changes`] to the [`EventSink`].
    ///
    /// Returns `false` (leaving the in-memory config untouched) when the
    /// file is unchanged or fails to parse; malformed edits are logged and
    /// never replace known-good state.
    pub fn reload_check(&self) -> bool {
        let current_mtime = stat_mtime(&self.config_path);
        let mut state = self.state.lock().expect("registry mutex poisoned");

        if current_mtime <= state.last_mtime {
            return false;
        }

        let new_config = match loader::load_config(&self.config_path) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %self.config_path.display(), error = %err, "failed to reload config, keeping previous state");
                return false;
            }
        };

        let new_agents = agent_name_set(&new_config);
        let old_agents = state.last_agents.clone();

        let added_names: Vec<AgentName> = new_agents.difference(&old_agents).cloned().collect();
        let removed_names: Vec<AgentName> = old_agents.difference(&new_agents).cloned().collect();

        let mut updated = Vec::new();
        for name in old_agents.intersection(&new_agents) {
            let old_def = state.config.agents.registry.get(name.as_str());
            let new_def = new_config.agents.registry.get(name.as_str());
            if let (Some(old_def), Some(new_def)) = (old_def, new_def) {
                let changed = old_def.changed_fields(new_def);
                if !changed.is_empty() {
                    updated.push((name.clone(), changed));
                }
            }
        }

        let snapshot = serde_json::to_value(&new_config).unwrap_or(Value::Null);
        let added: Vec<(AgentName, PathBuf, Value)> = added_names
            .into_iter()
            .filter_map(|name| {
                new_config
                    .agents
                    .registry
                    .get(name.as_str())
                    .map(|def| (name.clone(), expand_tilde(&def.workspace), snapshot.clone()))
            })
            .collect();

        debug!(
            path = %self.config_path.display(),
            added = added.len(),
            removed = removed_names.len(),
            updated = updated.len(),
            "reloaded config"
        );

        state.config = new_config;
        state.last_mtime = current_mtime;
        state.last_agents = new_agents;
        drop(state);

        self.sink.emit(Changes {
            added,
            removed: removed_names,
            updated,
        });

        true
    }

    /// Returns `name`'s definition, or `"main"`'s as a fallback (warning
    /// once per call) if `name` is unknown. Triggers a reload-check first.
    #[must_use]
    pub fn get_agent_config(&self, name: &str) -> AgentDefinition {
        self.reload_check();
        let state = self.state.lock().expect("registry mutex poisoned");
        if let Some(def) = state.config.agents.registry.get(name) {
            return def.clone();
        }

        warn!(agent = name, "unknown agent name, falling back to main");
        state
            .config
            .agents
            .registry
            .get(nanocrew_primitives::MAIN_AGENT)
            .cloned()
            .expect("invariant: \"main\" always present in a constructed registry")
    }

    /// Returns the agent name bound to `session_key`, or `"main"` if
    /// unbound or if the binding targets an agent no longer present in the
    /// registry. Triggers a reload-check first.
    #[must_use]
    pub fn get_agent_name_for_session(&self, session_key: &str) -> AgentName {
        self.reload_check();
        let state = self.state.lock().expect("registry mutex poisoned");

        if let Some(name) = state.config.agents.bindings.get(session_key) {
            if state.config.agents.registry.contains_key(name) {
                if let Ok(agent_name) = AgentName::new(name.clone()) {
                    return agent_name;
                }
            }
            warn!(session = session_key, agent = name, "binding references unknown agent, falling back to main");
        }

        AgentName::main()
    }

    /// Returns the definition bound to `session_key` (or `"main"`'s).
    /// Triggers a reload-check first.
    #[must_use]
    pub fn get_for_session(&self, session_key: &str) -> AgentDefinition {
        let name = self.get_agent_name_for_session(session_key);
        self.get_agent_config(name.as_str())
    }

    /// Returns the expanded workspace path for `session_key`'s agent.
    #[must_use]
    pub fn get_workspace_for_session(&self, session_key: &str) -> PathBuf {
        expand_tilde(&self.get_for_session(session_key).workspace)
    }

    /// Snapshots the full agent registry. Triggers a reload-check first.
    #[must_use]
    pub fn list_agents(&self) -> std::collections::HashMap<AgentName, AgentDefinition> {
        self.reload_check();
        let state = self.state.lock().expect("registry mutex poisoned");
        state
            .config
            .agents
            .registry
            .iter()
            .filter_map(|(name, def)| AgentName::new(name.clone()).ok().map(|name| (name, def.clone())))
            .collect()
    }

    /// Snapshots the session→agent-name bindings. Triggers a reload-check
    /// first.
    #[must_use]
    pub fn list_bindings(&self) -> std::collections::HashMap<String, String> {
        self.reload_check();
        self.state.lock().expect("registry mutex poisoned").config.agents.bindings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::save_config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nanocrew-registry-{}-{name}", Uuid::new_v4()));
        path
    }

    fn write_config(path: &Path, agents: &[(&str, &str)], bindings: &[(&str, &str)]) {
        let mut config = Config::default();
        config.agents.registry.clear();
        for (name, model) in agents {
            let mut def = AgentDefinition::default();
            def.model = (*model).to_owned();
            config.agents.registry.insert((*name).to_owned(), def);
        }
        for (session, agent) in bindings {
            config.agents.bindings.insert((*session).to_owned(), (*agent).to_owned());
        }
        save_config(&config, path).unwrap();
    }

    #[test]
    fn construction_fails_fatally_without_main() {
        let path = scratch_path("no-main.json");
        write_config(&path, &[("backend", "x")], &[]);

        let err = AgentRegistry::new(path.clone(), Arc::new(NullEventSink))
            .expect_err("missing main must be fatal");
        assert!(matches!(err, RegistryError::MainMissing));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_session_binding_falls_back_to_main() {
        let path = scratch_path("fallback.json");
        write_config(&path, &[("main", "m")], &[("feishu:T", "ghost")]);

        let registry = AgentRegistry::new(path.clone(), Arc::new(NullEventSink)).unwrap();
        assert_eq!(registry.get_agent_name_for_session("feishu:T").as_str(), "main");
        assert_eq!(registry.get_agent_name_for_session("unbound:1").as_str(), "main");

        let _ = std::fs::remove_file(&path);
    }

    // S1 — Hot add.
    #[test]
    fn hot_add_is_visible_after_reload_check() {
        let path = scratch_path("hot-add.json");
        write_config(&path, &[("main", "m")], &[]);
        let registry = AgentRegistry::new(path.clone(), Arc::new(NullEventSink)).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        write_config(&path, &[("main", "m"), ("backend", "b")], &[("feishu:G1", "backend")]);

        assert_eq!(registry.get_agent_name_for_session("feishu:G1").as_str(), "backend");
        assert_eq!(registry.list_agents().len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    // S2 — Hot remove.
    #[test]
    fn hot_remove_falls_back_and_drops_from_registry() {
        let path = scratch_path("hot-remove.json");
        write_config(&path, &[("main", "m"), ("temp", "t")], &[("feishu:T", "temp")]);
        let registry = AgentRegistry::new(path.clone(), Arc::new(NullEventSink)).unwrap();
        assert_eq!(registry.list_agents().len(), 2);

        std::thread::sleep(std::time::Duration::from_millis(10));
        write_config(&path, &[("main", "m")], &[("feishu:T", "temp")]);

        assert_eq!(registry.get_agent_name_for_session("feishu:T").as_str(), "main");
        assert_eq!(registry.list_agents().len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    // S5 — Malformed edit leaves state intact.
    #[test]
    fn malformed_edit_leaves_state_intact() {
        let path = scratch_path("malformed.json");
        write_config(&path, &[("main", "m"), ("backend", "b")], &[]);
        let registry = AgentRegistry::new(path.clone(), Arc::new(NullEventSink)).unwrap();
        assert_eq!(registry.list_agents().len(), 2);

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&path, "{ not valid json").unwrap();

        assert!(!registry.reload_check());
        assert_eq!(registry.list_agents().len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unchanged_mtime_skips_reload() {
        let path = scratch_path("unchanged.json");
        write_config(&path, &[("main", "m")], &[]);
        let registry = AgentRegistry::new(path.clone(), Arc::new(NullEventSink)).unwrap();

        assert!(!registry.reload_check());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn async_sink_publishes_events_on_reload() {
        let path = scratch_path("async-sink.json");
        write_config(&path, &[("main", "m")], &[]);

        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        struct CountHandler(Arc<AtomicUsize>);
        #[async_trait::async_trait]
        impl nanocrew_events::Handler for CountHandler {
            async fn handle(&self, _event: &Event) -> nanocrew_events::HandlerOutcome {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        bus.subscribe(nanocrew_events::Topic::AgentAdded, Arc::new(CountHandler(Arc::clone(&seen))))
            .await;

        let registry = AgentRegistry::new(path.clone(), Arc::new(AsyncEventSink::new(Arc::clone(&bus)))).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        write_config(&path, &[("main", "m"), ("backend", "b")], &[]);
        registry.reload_check();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_file(&path);
    }
}
