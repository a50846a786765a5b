//! Filesystem observer: translates raw `notify` events into cache
//! invalidations and per-agent "affected" notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nanocrew_events::{Event as BusEvent, EventBus, Handler, HandlerOutcome, Topic};
use nanocrew_primitives::AgentName;
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::{FileCache, Invalidator};
use crate::router::{WatchRouter, WatchedPath};

/// The ordered set of paths watched for one agent's workspace.
pub type WatchRegistration = Vec<WatchedPath>;

/// Errors surfaced by [`FileWatcher`] setup and teardown.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The underlying `notify` backend could not be constructed or could
    /// not install a watch.
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias used by watcher operations.
pub type WatchResult<T> = std::result::Result<T, WatchError>;

fn canonical_workspace_paths(workspace: &Path) -> WatchRegistration {
    vec![
        WatchedPath::file(workspace.join("AGENTS.md")),
        WatchedPath::file(workspace.join("SOUL.md")),
        WatchedPath::file(workspace.join("USER.md")),
        WatchedPath::file(workspace.join("TOOLS.md")),
        WatchedPath::file(workspace.join("IDENTITY.md")),
        WatchedPath::file(workspace.join("memory").join("MEMORY.md")),
        WatchedPath::dir(workspace.join("skills")),
    ]
}

/// Observes filesystem paths and keeps the [`FileCache`] and [`WatchRouter`]
/// in sync with live edits.
///
/// Holds a background `notify` watcher (driven from a dedicated OS thread,
/// since `notify`'s callback is not `Send` across an async boundary) that
/// forwards raw events over a bounded channel to a tokio task, which is the
/// only task allowed to touch `router`/`watch_handles`.
pub struct FileWatcher {
    bus: Arc<EventBus>,
    cache: Arc<FileCache>,
    router: Arc<Mutex<WatchRouter>>,
    watch_handles: Mutex<HashMap<PathBuf, ()>>,
    agent_invalidators: Mutex<HashMap<AgentName, Vec<Arc<dyn Invalidator>>>>,
    inner: Mutex<Option<WatcherInner>>,
}

struct WatcherInner {
    watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
    subscription: nanocrew_events::SubscriptionId,
}

struct AgentAddedHandler {
    watcher: Arc<FileWatcher>,
}

#[async_trait]
impl Handler for AgentAddedHandler {
    async fn handle(&self, event: &BusEvent) -> HandlerOutcome {
        if let BusEvent::AgentAdded { name, workspace, .. } = event {
            self.watcher.on_agent_added(name.clone(), workspace.clone()).await;
        }
        Ok(())
    }
}

impl FileWatcher {
    /// Creates a watcher over the given cache and event bus. Does not start
    /// observing the filesystem until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, cache: Arc<FileCache>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            cache,
            router: Arc::new(Mutex::new(WatchRouter::new())),
            watch_handles: Mutex::new(HashMap::new()),
            agent_invalidators: Mutex::new(HashMap::new()),
            inner: Mutex::new(None),
        })
    }

    /// Launches the filesystem observer and subscribes to `agent.added`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError`] if the underlying `notify` backend cannot be
    /// constructed.
    pub async fn start(self: &Arc<Self>) -> WatchResult<()> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<NotifyEvent>>();

        let watcher = notify::recommended_watcher(move |res| {
            // Runs on notify's own thread; never blocks, so no await here.
            let _ = tx.send(res);
        })?;

        let this = Arc::clone(self);
        let pump = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => this.handle_notify_event(event).await,
                    Err(err) => error!(error = %err, "filesystem watcher error"),
                }
            }
        });

        let subscription = self
            .bus
            .subscribe(
                Topic::AgentAdded,
                Arc::new(AgentAddedHandler {
                    watcher: Arc::clone(self),
                }),
            )
            .await;

        *self.inner.lock().await = Some(WatcherInner {
            watcher,
            pump,
            subscription,
        });

        debug!("FileWatcher started");
        Ok(())
    }

    /// Unsubscribes from the event bus, clears pending cache invalidations,
    /// halts the observer, and joins its pump task.
    pub async fn stop(&self) {
        self.cache.clear_pending().await;

        if let Some(inner) = self.inner.lock().await.take() {
            let _ = self.bus.unsubscribe(Topic::AgentAdded, inner.subscription).await;
            drop(inner.watcher);
            inner.pump.abort();
        }

        debug!("FileWatcher stopped");
    }

    /// Synchronously computes `name`'s [`WatchRegistration`], installs
    /// watches for it, and registers the provided invalidators on the
    /// cache.
    pub async fn register_agent(
        &self,
        name: AgentName,
        workspace: &Path,
        context_invalidator: Option<Arc<dyn Invalidator>>,
        skills_invalidator: Option<Arc<dyn Invalidator>>,
    ) {
        let mut registered_invalidators = Vec::new();
        for invalidator in [context_invalidator, skills_invalidator].into_iter().flatten() {
            self.cache.register_invalidator(Arc::clone(&invalidator)).await;
            registered_invalidators.push(invalidator);
        }
        if !registered_invalidators.is_empty() {
            self.agent_invalidators
                .lock()
                .await
                .insert(name.clone(), registered_invalidators);
        }

        let paths = canonical_workspace_paths(workspace);
        let registered = {
            let mut router = self.router.lock().await;
            router.register(name.clone(), paths).to_vec()
        };

        for entry in &registered {
            self.install_watch(entry).await;
        }

        debug!(agent = %name, paths = registered.len(), "registered agent with watcher");
    }

    /// Removes `name` from the router and unregisters any invalidators it
    /// registered on the cache. Existing `notify` watches on shared
    /// directories are left installed (another agent may still need them);
    /// `notify` has no per-caller unwatch semantics finer than a path.
    pub async fn unregister_agent(&self, name: &AgentName) {
        self.router.lock().await.unregister(name);

        if let Some(invalidators) = self.agent_invalidators.lock().await.remove(name) {
            for invalidator in &invalidators {
                self.cache.unregister_invalidator(invalidator).await;
            }
        }
    }

    async fn on_agent_added(&self, name: AgentName, workspace: PathBuf) {
        for _ in 0..10 {
            if tokio::fs::metadata(&workspace).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if tokio::fs::metadata(&workspace).await.is_err() {
            warn!(agent = %name, workspace = %workspace.display(), "workspace not created after 1s, skipping watch registration");
            return;
        }

        self.register_agent(name, &workspace, None, None).await;
    }

    async fn install_watch(&self, entry: &WatchedPath) {
        let mut handles = self.watch_handles.lock().await;
        if handles.contains_key(&entry.path) {
            return;
        }

        let (watch_path, recursive) = if entry.is_dir {
            (entry.path.clone(), RecursiveMode::Recursive)
        } else {
            match entry.path.parent() {
                Some(parent) => (parent.to_path_buf(), RecursiveMode::NonRecursive),
                None => {
                    warn!(path = %entry.path.display(), "watched path has no parent, skipping");
                    return;
                }
            }
        };

        if tokio::fs::metadata(&watch_path).await.is_err() {
            warn!(path = %watch_path.display(), "skipping watch for non-existent directory");
            return;
        }

        let mut inner = self.inner.lock().await;
        let Some(inner) = inner.as_mut() else {
            warn!("watcher not started, cannot install watch");
            return;
        };

        match inner.watcher.watch(&watch_path, recursive) {
            Ok(()) => {
                handles.insert(entry.path.clone(), ());
                debug!(path = %watch_path.display(), recursive = matches!(recursive, RecursiveMode::Recursive), "installed watch");
            }
            Err(err) => {
                error!(path = %watch_path.display(), error = %err, "failed to install watch");
            }
        }
    }

    async fn handle_notify_event(&self, event: NotifyEvent) {
        if !matches!(event.kind, EventKind::Modify(_)) {
            return;
        }

        for path in event.paths {
            if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
                continue;
            }

            self.cache.invalidate(path.clone()).await;

            let affected = self.router.lock().await.get_affected_agents(&path);
            for agent in affected {
                debug!(agent = %agent, path = %path.display(), "agent affected by file change");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{DEFAULT_DEBOUNCE, InvalidatorOutcome};

    struct CountingInvalidator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Invalidator for CountingInvalidator {
        async fn invalidate(&self, _path: &Path) -> InvalidatorOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unregister_agent_tears_down_its_registered_invalidators() {
        let bus = Arc::new(EventBus::new());
        let cache = FileCache::new(std::time::Duration::from_millis(20));
        let watcher = FileWatcher::new(Arc::clone(&bus), Arc::clone(&cache));

        let calls = Arc::new(AtomicUsize::new(0));
        let invalidator: Arc<dyn Invalidator> = Arc::new(CountingInvalidator {
            calls: Arc::clone(&calls),
        });

        let workspace = std::env::temp_dir();
        let name = AgentName::new("backend").unwrap();
        watcher
            .register_agent(name.clone(), &workspace, Some(Arc::clone(&invalidator)), None)
            .await;

        // While still registered, an invalidation reaches the invalidator.
        cache.invalidate(PathBuf::from("/tmp/nanocrew-watcher-test-1")).await;
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // After tearing down the agent, further invalidations are silent.
        watcher.unregister_agent(&name).await;
        cache.invalidate(PathBuf::from("/tmp/nanocrew-watcher-test-2")).await;
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
