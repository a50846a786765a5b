//! Error types for agent instance construction and manager operations.

use nanocrew_primitives::AgentName;
use thiserror::Error;

/// Errors surfaced while constructing or operating on agent instances.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Workspace directories or bootstrap files could not be materialized.
    #[error("failed to construct agent instance '{name}': {source}")]
    InstanceConstruction {
        /// Name of the agent being constructed.
        name: AgentName,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The config document has no `"main"` agent, a fatal startup condition.
    #[error(transparent)]
    Registry(#[from] nanocrew_config::RegistryError),
}

/// Result alias for manager operations.
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
