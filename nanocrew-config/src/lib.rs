//! Hot-reloadable agent configuration registry for the nanocrew gateway.
//!
//! Owns the on-disk config document (`<HOME>/.nanocrew/config.json`): its
//! JSON shape, camelCase⇄snake_case key conversion, schema migration, and
//! the [`AgentRegistry`] that re-checks the document's mtime on every public
//! read and publishes `agent.added`/`agent.removed`/`agent.updated` events
//! through an [`EventSink`] when it changes.

#![warn(missing_docs, clippy::pedantic)]

mod keys;
mod loader;
mod migration;
mod registry;
mod schema;

/// camelCase⇄snake_case key conversion, preserving session identifiers.
pub use keys::{camel_to_snake, convert_keys_to_camel, convert_keys_to_snake, snake_to_camel};
/// Reading and writing the config document.
pub use loader::{LoaderError, LoaderResult, config_path, expand_tilde, load_config, load_config_or_default, save_config};
/// Idempotent config-document migrations.
pub use migration::migrate;
/// The hot-reloadable registry and its event-publication contract.
pub use registry::{AgentRegistry, AsyncEventSink, Changes, EventSink, NullEventSink, RegistryError, RegistryResult};
/// The config document's strongly-typed shape.
pub use schema::{AgentDefinition, AgentsConfig, CANONICAL_FIELDS, Config};
