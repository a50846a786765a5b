//! Shared identifiers and error types for the nanocrew agent gateway.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;

/// Error type and result alias shared across the gateway crates.
pub use error::{Error, Result};
/// Agent names.
pub use ids::AgentName;

/// The reserved agent name that must always resolve to a valid definition.
pub const MAIN_AGENT: &str = "main";
