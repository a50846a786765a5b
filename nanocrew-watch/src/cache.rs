//! Mtime-validated content cache with debounced, fan-out invalidation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Default debounce window, matching the original service's default.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Outcome returned by an [`Invalidator`].
pub type InvalidatorOutcome = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A capability notified when a cached path becomes stale.
///
/// Implemented by the per-agent context builder and skills loader
/// collaborators; the cache itself never depends on their concrete types.
#[async_trait]
pub trait Invalidator: Send + Sync {
    /// Called once per invalidated path, outside the cache's internal lock.
    async fn invalidate(&self, path: &Path) -> InvalidatorOutcome;
}

#[derive(Clone)]
struct CacheEntry {
    mtime: SystemTime,
    content: String,
}

/// Mtime-validated string cache for small UTF-8 text files.
///
/// `get` never fails: a missing file, an unreadable file, or invalid UTF-8
/// all simply produce "no content" (logged at the point of failure).
/// `invalidate` is debounced — see [`FileCache::invalidate`] for the exact
/// contract.
pub struct FileCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    pending: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
    invalidators: Mutex<Vec<Arc<dyn Invalidator>>>,
    debounce: Duration,
}

impl FileCache {
    /// Creates an empty cache with the given debounce window.
    #[must_use]
    pub fn new(debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            invalidators: Mutex::new(Vec::new()),
            debounce,
        })
    }

    /// Registers an invalidator to be notified on future invalidations.
    pub async fn register_invalidator(&self, invalidator: Arc<dyn Invalidator>) {
        self.invalidators.lock().await.push(invalidator);
    }

    /// Removes a previously-registered invalidator, identified by `Arc`
    /// pointer identity (trait objects have no other portable identity).
    ///
    /// A no-op if `invalidator` was never registered or was already removed.
    pub async fn unregister_invalidator(&self, invalidator: &Arc<dyn Invalidator>) {
        self.invalidators
            .lock()
            .await
            .retain(|registered| !Arc::ptr_eq(registered, invalidator));
    }

    /// Returns the content of `path`, reading and caching it if necessary.
    ///
    /// Returns `None` if the path does not exist, cannot be read, or is not
    /// valid UTF-8 — never as an error.
    pub async fn get(&self, path: &Path) -> Option<String> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(_) => return None,
        };
        let current_mtime = metadata.modified().ok()?;

        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(path) {
                if entry.mtime == current_mtime {
                    debug!(path = %path.display(), "cache hit");
                    return Some(entry.content.clone());
                }
            }
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let mut entries = self.entries.lock().await;
                entries.insert(
                    path.to_path_buf(),
                    CacheEntry {
                        mtime: current_mtime,
                        content: content.clone(),
                    },
                );
                debug!(path = %path.display(), "cache miss, loaded from disk");
                Some(content)
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to read cached file");
                None
            }
        }
    }

    /// Schedules a debounced removal of `path`'s entry.
    ///
    /// Repeated calls for the same path within the debounce window cancel
    /// the previous timer and restart the window; the debounced effect
    /// fires exactly once per quiet period.
    pub async fn invalidate(self: &Arc<Self>, path: PathBuf) {
        {
            let mut pending = self.pending.lock().await;
            if let Some(handle) = pending.remove(&path) {
                handle.abort();
            }
        }

        let this = Arc::clone(self);
        let debounce_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            this.fire_invalidation(&debounce_path).await;
            this.pending.lock().await.remove(&debounce_path);
        });

        self.pending.lock().await.insert(path, handle);
    }

    /// Immediately clears every entry and notifies every invalidator for
    /// every previously-cached path, cancelling any pending debounced work.
    pub async fn invalidate_all(self: &Arc<Self>) {
        let paths: Vec<PathBuf> = {
            let mut entries = self.entries.lock().await;
            let paths = entries.keys().cloned().collect();
            entries.clear();
            paths
        };

        self.clear_pending().await;

        for path in &paths {
            self.notify_invalidators(path).await;
        }
        debug!(count = paths.len(), "invalidated all cache entries");
    }

    /// Cancels all pending debounced invalidations without executing them.
    pub async fn clear_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, handle) in pending.drain() {
            handle.abort();
        }
    }

    async fn fire_invalidation(&self, path: &Path) {
        {
            let mut entries = self.entries.lock().await;
            if entries.remove(path).is_some() {
                debug!(path = %path.display(), "invalidated cache entry");
            }
        }
        self.notify_invalidators(path).await;
    }

    async fn notify_invalidators(&self, path: &Path) {
        let invalidators = self.invalidators.lock().await.clone();
        for invalidator in invalidators {
            if let Err(err) = invalidator.invalidate(path).await {
                error!(path = %path.display(), error = %err, "invalidator failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::time::Duration as TokioDuration;

    use uuid::Uuid;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nanocrew-cache-{}-{name}", Uuid::new_v4()));
        path
    }

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
    async fn missing_file_is_absent_not_an_error() {
        let cache = FileCache::new(DEFAULT_DEBOUNCE);
        let path = temp_path("missing.md");
        assert_eq!(cache.get(&path).await, None);
    }

    #[tokio::test]
    async fn repeated_get_does_not_change_content_until_modified() {
        let cache = FileCache::new(DEFAULT_DEBOUNCE);
        let path = temp_path("agents.md");
        tokio::fs::write(&path, "v1").await.unwrap();

        assert_eq!(cache.get(&path).await, Some("v1".to_owned()));
        assert_eq!(cache.get(&path).await, Some("v1".to_owned()));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn debounced_invalidation_fires_once_after_quiet_window() {
        let cache = FileCache::new(TokioDuration::from_millis(50));
        let path = temp_path("soul.md");
        tokio::fs::write(&path, "v1").await.unwrap();
        cache.get(&path).await;

        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .register_invalidator(Arc::new(CountingInvalidator {
                calls: Arc::clone(&calls),
            }))
            .await;

        for _ in 0..3 {
            cache.invalidate(path.clone()).await;
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
        }

        tokio::time::sleep(TokioDuration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn clear_pending_prevents_invalidator_from_firing() {
        let cache = FileCache::new(TokioDuration::from_millis(30));
        let path = temp_path("user.md");

        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .register_invalidator(Arc::new(CountingInvalidator {
                calls: Arc::clone(&calls),
            }))
            .await;

        cache.invalidate(path).await;
        cache.clear_pending().await;
        tokio::time::sleep(TokioDuration::from_millis(80)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregister_invalidator_stops_future_notifications() {
        let cache = FileCache::new(TokioDuration::from_millis(20));
        let path = temp_path("tools.md");

        let calls = Arc::new(AtomicUsize::new(0));
        let invalidator: Arc<dyn Invalidator> = Arc::new(CountingInvalidator {
            calls: Arc::clone(&calls),
        });
        cache.register_invalidator(Arc::clone(&invalidator)).await;
        cache.unregister_invalidator(&invalidator).await;

        cache.invalidate(path).await;
        tokio::time::sleep(TokioDuration::from_millis(80)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
