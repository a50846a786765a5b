//! Lazily-instantiated agent runtime manager for the nanocrew gateway.
//!
//! Owns the `agent name -> AgentInstance` cache, materializes each
//! instance's workspace on first use, and reacts to the
//! `nanocrew_config::AgentRegistry`'s lifecycle events to keep that cache in
//! sync with the config document.

#![warn(missing_docs, clippy::pedantic)]

mod collaborators;
mod error;
mod instance;
mod manager;

/// Collaborator contracts an instance depends on but does not implement.
pub use collaborators::{ContextBuilder, NullInvalidator, SkillsLoader};
/// Error and result types for instance construction and manager operations.
pub use error::{ManagerError, ManagerResult};
/// The runtime materialization of one agent definition.
pub use instance::{AgentInstance, ensure_workspace};
/// The lazily-instantiated agent cache and its lifecycle-event reactions.
pub use manager::AgentManager;
