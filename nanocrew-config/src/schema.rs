//! The config document's strongly-typed shape.
//!
//! Types here operate on already key-converted data (snake_case field
//! names): [`crate::keys`] handles the camelCase on-disk convention before
//! anything here sees a [`serde_json::Value`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_model() -> String {
    "anthropic/claude-opus-4-5".to_owned()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    8192
}

const fn default_max_tool_iterations() -> u32 {
    20
}

const fn default_memory_window() -> u32 {
    50
}

fn default_main_workspace() -> String {
    "~/.nanocrew/workspaces/main".to_owned()
}

/// The seven fields compared when the registry detects an "update" on reload.
pub const CANONICAL_FIELDS: [&str; 7] = [
    "workspace",
    "model",
    "temperature",
    "max_tokens",
    "max_tool_iterations",
    "memory_window",
    "system_prompt",
];

/// The static description of one agent.
///
/// Replaced wholesale on every config reload; fields absent from the
/// on-disk document fall back to provider-meaningful defaults mirroring the
/// donor's `_migrate_config` synthesis of `agents.defaults`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Absolute filesystem path to the agent's workspace (`~` expansion
    /// applied by [`crate::registry::AgentRegistry`], not here).
    #[serde(default = "default_main_workspace")]
    pub workspace: String,
    /// Opaque model identifier handed to the LLM provider collaborator.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Maximum number of tool-call iterations per turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    /// Number of recent turns kept in the session-history window.
    #[serde(default = "default_memory_window")]
    pub memory_window: u32,
    /// Optional system prompt prepended to every turn.
    #[serde(default)]
    pub system_prompt: String,
}

impl Default for AgentDefinition {
    fn default() -> Self {
        Self {
            workspace: default_main_workspace(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_tool_iterations: default_max_tool_iterations(),
            memory_window: default_memory_window(),
            system_prompt: String::new(),
        }
    }
}

impl AgentDefinition {
    /// Returns the names of the canonical fields that differ between `self`
    /// (the old definition) and `other` (the newly-loaded one), in the
    /// fixed order given by [`CANONICAL_FIELDS`].
    #[must_use]
    pub fn changed_fields(&self, other: &Self) -> Vec<String> {
        let mut changed = Vec::new();
        if self.workspace != other.workspace {
            changed.push("workspace".to_owned());
        }
        if self.model != other.model {
            changed.push("model".to_owned());
        }
        if (self.temperature - other.temperature).abs() > f32::EPSILON {
            changed.push("temperature".to_owned());
        }
        if self.max_tokens != other.max_tokens {
            changed.push("max_tokens".to_owned());
        }
        if self.max_tool_iterations != other.max_tool_iterations {
            changed.push("max_tool_iterations".to_owned());
        }
        if self.memory_window != other.memory_window {
            changed.push("memory_window".to_owned());
        }
        if self.system_prompt != other.system_prompt {
            changed.push("system_prompt".to_owned());
        }
        changed
    }
}

/// The agent registry and session→agent bindings section of [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Agent name → static definition.
    #[serde(default)]
    pub registry: HashMap<String, AgentDefinition>,
    /// Session key → agent name. Session keys (containing `:`) are never
    /// subject to key-case conversion.
    #[serde(default)]
    pub bindings: HashMap<String, String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        let mut registry = HashMap::new();
        registry.insert(nanocrew_primitives::MAIN_AGENT.to_owned(), AgentDefinition::default());
        Self {
            registry,
            bindings: HashMap::new(),
        }
    }
}

/// The full config document at `<HOME>/.nanocrew/config.json`.
///
/// Only `agents` is relevant to the lifecycle subsystem; `providers`,
/// `channels`, and `tools` are round-tripped as opaque JSON since their
/// internals belong to components outside this crate's scope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent definitions and session bindings.
    #[serde(default)]
    pub agents: AgentsConfig,
    /// Opaque LLM provider configuration, round-tripped verbatim.
    #[serde(default)]
    pub providers: Value,
    /// Opaque channel-adapter configuration, round-tripped verbatim.
    #[serde(default)]
    pub channels: Value,
    /// Opaque tool configuration, round-tripped verbatim.
    #[serde(default)]
    pub tools: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_always_has_main() {
        let config = Config::default();
        assert!(config.agents.registry.contains_key(nanocrew_primitives::MAIN_AGENT));
    }

    #[test]
    fn changed_fields_reports_only_canonical_differences() {
        let old = AgentDefinition::default();
        let mut new = old.clone();
        new.temperature = 0.2;

        assert_eq!(old.changed_fields(&new), vec!["temperature".to_owned()]);
        assert!(old.changed_fields(&old).is_empty());
    }

    #[test]
    fn binding_changes_alone_are_not_a_canonical_update() {
        let old = AgentDefinition::default();
        let new = old.clone();
        assert!(old.changed_fields(&new).is_empty());
    }
}
