//! Collaborator contracts an [`crate::instance::AgentInstance`] depends on
//! but does not implement.
//!
//! The per-agent prompt/context builder and skills loader are named
//! external collaborators whose internals are out of scope here: what this
//! crate needs from them is the one capability the cache and watcher
//! already know how to call — "something to notify when a watched file
//! changes."

use std::path::Path;

use async_trait::async_trait;
use nanocrew_watch::{Invalidator, InvalidatorOutcome};

/// Rebuilds an agent's assembled prompt/context when its bootstrap files or
/// memory change.
pub trait ContextBuilder: Invalidator {
    /// Returns the agent name this context builder serves.
    fn agent_name(&self) -> &str;
}

/// Loads an agent's `skills/` directory contents.
pub trait SkillsLoader: Invalidator {
    /// Returns the agent name this skills loader serves.
    fn agent_name(&self) -> &str;
}

/// An [`Invalidator`] that does nothing, used when an instance has no
/// context builder or skills loader collaborator wired in.
pub struct NullInvalidator;

#[async_trait]
impl Invalidator for NullInvalidator {
    async fn invalidate(&self, _path: &Path) -> InvalidatorOutcome {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_invalidator_always_succeeds() {
        assert!(NullInvalidator.invalidate(Path::new("/tmp/anything")).await.is_ok());
    }
}
