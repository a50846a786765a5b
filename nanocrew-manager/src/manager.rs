//! `AgentManager`: owns the lazily-instantiated `agent-name -> AgentInstance`
//! map and reacts to the registry's lifecycle events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nanocrew_adapters::traits::ModelAdapter;
use nanocrew_config::AgentRegistry;
use nanocrew_events::{Event, EventBus, Handler, HandlerOutcome, SubscriptionId, Topic};
use nanocrew_primitives::AgentName;
use nanocrew_watch::FileWatcher;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::ManagerResult;
use crate::instance::AgentInstance;

struct LifecycleHandlers {
    added: SubscriptionId,
    removed: SubscriptionId,
    updated: SubscriptionId,
}

/// Owns every live [`AgentInstance`], creating them on first request and
/// reacting to `agent.added` / `agent.removed` / `agent.updated` events
/// published by the [`AgentRegistry`].
pub struct AgentManager {
    registry: Arc<AgentRegistry>,
    bus: Arc<EventBus>,
    watcher: Option<Arc<FileWatcher>>,
    adapter: Option<Arc<dyn ModelAdapter>>,
    loops: Mutex<HashMap<AgentName, Arc<AgentInstance>>>,
    subscriptions: Mutex<Option<LifecycleHandlers>>,
}

impl AgentManager {
    /// Creates a manager bound to `registry` and `bus`. `watcher`, if
    /// provided, has newly-constructed instances registered against it;
    /// `adapter` is shared by every instance the manager creates, mirroring
    /// the donor's single `provider` handed to every `AgentLoop`.
    #[must_use]
    pub fn new(
        registry: Arc<AgentRegistry>,
        bus: Arc<EventBus>,
        watcher: Option<Arc<FileWatcher>>,
        adapter: Option<Arc<dyn ModelAdapter>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            bus,
            watcher,
            adapter,
            loops: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(None),
        })
    }

    async fn create_instance(&self, name: &AgentName) -> ManagerResult<Arc<AgentInstance>> {
        let definition = self.registry.get_agent_config(name.as_str());
        let instance = Arc::new(AgentInstance::new(name.clone(), definition, self.adapter.clone()).await?);

        if let Some(watcher) = &self.watcher {
            watcher
                .register_agent(name.clone(), instance.workspace(), None, None)
                .await;
        }

        info!(agent = %name, workspace = %instance.workspace().display(), "created agent instance");
        Ok(instance)
    }

    /// Gets or lazily creates the instance for `agent_name`.
    ///
    /// Triggers a registry reload-check first, so an agent added moments
    /// ago by editing the config file is visible here without restarting
    /// the process.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ManagerError::InstanceConstruction`] if the
    /// instance's workspace cannot be materialized.
    pub async fn get_loop(&self, agent_name: &str) -> ManagerResult<Arc<AgentInstance>> {
        self.registry.reload_check();

        let name = AgentName::new(agent_name).unwrap_or_else(|_| AgentName::main());
        let mut loops = self.loops.lock().await;
        if let Some(instance) = loops.get(&name) {
            return Ok(Arc::clone(instance));
        }

        let instance = self.create_instance(&name).await?;
        loops.insert(name, Arc::clone(&instance));
        Ok(instance)
    }

    /// Resolves `session_key` to its agent and gets or creates that
    /// agent's instance.
    ///
    /// # Errors
    ///
    /// See [`Self::get_loop`].
    pub async fn get_loop_for_session(&self, session_key: &str) -> ManagerResult<Arc<AgentInstance>> {
        let name = self.registry.get_agent_name_for_session(session_key);
        info!(session = session_key, agent = %name, "resolved session to agent");
        self.get_loop(name.as_str()).await
    }

    /// Returns the names of every currently-instantiated agent.
    pub async fn list_active_agents(&self) -> Vec<AgentName> {
        self.loops.lock().await.keys().cloned().collect()
    }

    /// Stops every live instance and clears the cache, then forces a
    /// registry reload. Used when configuration has changed in a way that
    /// warrants recreating every instance (e.g. workspace paths moved).
    pub async fn reload_agents(&self) {
        info!("reloading all agents");
        let mut loops = self.loops.lock().await;
        for (name, instance) in loops.drain() {
            instance.stop();
            if let Some(watcher) = &self.watcher {
                watcher.unregister_agent(&name).await;
            }
        }
        drop(loops);
        self.registry.reload_check();
    }

    /// Subscribes to the registry's lifecycle events.
    pub async fn start(self: &Arc<Self>) {
        let added = self
            .bus
            .subscribe(Topic::AgentAdded, Arc::new(AgentAddedHandler { manager: Arc::clone(self) }))
            .await;
        let removed = self
            .bus
            .subscribe(Topic::AgentRemoved, Arc::new(AgentRemovedHandler { manager: Arc::clone(self) }))
            .await;
        let updated = self
            .bus
            .subscribe(Topic::AgentUpdated, Arc::new(AgentUpdatedHandler))
            .await;

        *self.subscriptions.lock().await = Some(LifecycleHandlers { added, removed, updated });
        info!("agent manager started, subscribed to lifecycle events");
    }

    /// Unsubscribes from lifecycle events.
    pub async fn stop(&self) {
        if let Some(handlers) = self.subscriptions.lock().await.take() {
            let _ = self.bus.unsubscribe(Topic::AgentAdded, handlers.added).await;
            let _ = self.bus.unsubscribe(Topic::AgentRemoved, handlers.removed).await;
            let _ = self.bus.unsubscribe(Topic::AgentUpdated, handlers.updated).await;
        }
        info!("agent manager stopped");
    }

    /// Stops every live instance and clears the cache, swallowing
    /// per-instance failures (there are none today; `AgentInstance::stop`
    /// cannot fail, but the isolation mirrors the source's `cleanup`).
    pub async fn cleanup(&self) {
        info!("cleaning up agent manager");
        let mut loops = self.loops.lock().await;
        for (_, instance) in loops.drain() {
            instance.stop();
        }
    }
}

struct AgentAddedHandler {
    manager: Arc<AgentManager>,
}

#[async_trait]
impl Handler for AgentAddedHandler {
    async fn handle(&self, event: &Event) -> HandlerOutcome {
        if let Event::AgentAdded { name, .. } = event {
            if self.manager.loops.lock().await.contains_key(name) {
                return Ok(());
            }
            match self.manager.create_instance(name).await {
                Ok(instance) => {
                    self.manager.loops.lock().await.insert(name.clone(), instance);
                }
                Err(err) => {
                    error!(agent = %name, error = %err, "failed to pre-create agent instance");
                }
            }
        }
        Ok(())
    }
}

struct AgentRemovedHandler {
    manager: Arc<AgentManager>,
}

#[async_trait]
impl Handler for AgentRemovedHandler {
    async fn handle(&self, event: &Event) -> HandlerOutcome {
        if let Event::AgentRemoved { name } = event {
            if let Some(instance) = self.manager.loops.lock().await.remove(name) {
                instance.stop();
                if let Some(watcher) = &self.manager.watcher {
                    watcher.unregister_agent(name).await;
                }
                info!(agent = %name, "stopped agent instance after removal");
            } else {
                warn!(agent = %name, "agent.removed for an agent with no live instance");
            }
        }
        Ok(())
    }
}

struct AgentUpdatedHandler;

#[async_trait]
impl Handler for AgentUpdatedHandler {
    async fn handle(&self, event: &Event) -> HandlerOutcome {
        if let Event::AgentUpdated { name, changed_fields } = event {
            info!(agent = %name, fields = ?changed_fields, "agent configuration updated, live instance left running");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanocrew_config::{AgentRegistry, NullEventSink};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn scratch_config(agents: &[(&str, &str)]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nanocrew-manager-{}.json", Uuid::new_v4()));

        let mut config = nanocrew_config::Config::default();
        config.agents.registry.clear();
        for (name, workspace) in agents {
            let mut def = nanocrew_config::AgentDefinition::default();
            def.workspace = (*workspace).to_owned();
            config.agents.registry.insert((*name).to_owned(), def);
        }
        nanocrew_config::save_config(&config, &path).unwrap();
        path
    }

    fn scratch_workspace(label: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("nanocrew-manager-ws-{}-{label}", Uuid::new_v4()));
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn get_loop_lazily_creates_and_caches_instances() {
        let main_ws = scratch_workspace("main");
        let config_path = scratch_config(&[("main", &main_ws)]);
        let registry = Arc::new(AgentRegistry::new(config_path.clone(), Arc::new(NullEventSink)).unwrap());
        let bus = Arc::new(EventBus::new());
        let manager = AgentManager::new(registry, bus, None, None);

        let first = manager.get_loop("main").await.unwrap();
        let second = manager.get_loop("main").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.list_active_agents().await.len(), 1);

        let _ = std::fs::remove_file(&config_path);
        let _ = std::fs::remove_dir_all(&main_ws);
    }

    #[tokio::test]
    async fn session_with_unknown_binding_resolves_to_main() {
        let main_ws = scratch_workspace("session-main");
        let config_path = scratch_config(&[("main", &main_ws)]);
        let registry = Arc::new(AgentRegistry::new(config_path.clone(), Arc::new(NullEventSink)).unwrap());
        let bus = Arc::new(EventBus::new());
        let manager = AgentManager::new(registry, bus, None, None);

        let instance = manager.get_loop_for_session("feishu:unbound").await.unwrap();
        assert_eq!(instance.name().as_str(), "main");

        let _ = std::fs::remove_file(&config_path);
        let _ = std::fs::remove_dir_all(&main_ws);
    }

    #[tokio::test]
    async fn agent_added_event_precreates_instance() {
        let main_ws = scratch_workspace("event-main");
        let backend_ws = scratch_workspace("event-backend");
        let config_path = scratch_config(&[("main", &main_ws)]);
        let registry = Arc::new(AgentRegistry::new(config_path.clone(), Arc::new(NullEventSink)).unwrap());
        let bus = Arc::new(EventBus::new());
        let manager = AgentManager::new(Arc::clone(&registry), Arc::clone(&bus), None, None);
        manager.start().await;

        let mut definition = nanocrew_config::AgentDefinition::default();
        definition.workspace = backend_ws.clone();
        bus.publish(Event::AgentAdded {
            name: AgentName::new("backend").unwrap(),
            workspace: PathBuf::from(&backend_ws),
            config_snapshot: serde_json::json!({}),
        })
        .await;

        assert!(manager.list_active_agents().await.contains(&AgentName::new("backend").unwrap()));

        manager.stop().await;
        let _ = std::fs::remove_file(&config_path);
        let _ = std::fs::remove_dir_all(&main_ws);
        let _ = std::fs::remove_dir_all(&backend_ws);
    }

    #[tokio::test]
    async fn agent_removed_event_stops_and_drops_instance() {
        let main_ws = scratch_workspace("remove-main");
        let config_path = scratch_config(&[("main", &main_ws)]);
        let registry = Arc::new(AgentRegistry::new(config_path.clone(), Arc::new(NullEventSink)).unwrap());
        let bus = Arc::new(EventBus::new());
        let manager = AgentManager::new(Arc::clone(&registry), Arc::clone(&bus), None, None);
        manager.start().await;

        manager.get_loop("main").await.unwrap();
        bus.publish(Event::AgentRemoved { name: AgentName::main() }).await;

        assert!(manager.list_active_agents().await.is_empty());

        manager.stop().await;
        let _ = std::fs::remove_file(&config_path);
        let _ = std::fs::remove_dir_all(&main_ws);
    }
}
