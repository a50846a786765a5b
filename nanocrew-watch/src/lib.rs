//! Debounced file cache and filesystem watcher.
//!
//! Together these keep each agent's prompt/memory files synchronized with
//! live edits: the cache answers "what does this file currently contain"
//! cheaply, and the watcher tells the cache, and interested agents, when
//! that answer has changed.

#![warn(missing_docs, clippy::pedantic)]

mod cache;
mod router;
mod watcher;

/// Mtime-validated content cache with debounced invalidation.
pub use cache::{DEFAULT_DEBOUNCE, FileCache, Invalidator, InvalidatorOutcome};
/// Bidirectional path/agent index used to resolve "affected agents".
pub use router::WatchRouter;
/// Filesystem observer wiring the router and cache together.
pub use watcher::{FileWatcher, WatchError, WatchResult, WatchRegistration};
