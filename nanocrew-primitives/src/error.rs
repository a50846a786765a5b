//! Shared error definitions for the gateway's primitive types.

use thiserror::Error;

/// Result alias used throughout the gateway runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating agent names and session keys.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided agent name or session key failed validation.
    #[error("invalid name: {reason}")]
    InvalidName {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
