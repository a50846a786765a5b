//! The tagged-sum event type published on the bus.

use std::path::PathBuf;

use nanocrew_primitives::AgentName;
use serde_json::Value;

/// Topic under which an [`Event`] is published.
///
/// Kept as a separate, cheaply-comparable type (rather than deriving the
/// topic from the event's discriminant at dispatch time) so subscribers can
/// name a topic before any event of that shape has ever been constructed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Topic {
    /// `agent.added`
    AgentAdded,
    /// `agent.removed`
    AgentRemoved,
    /// `agent.updated`
    AgentUpdated,
    /// `file.changed` — reserved for future use.
    FileChanged,
}

impl Topic {
    /// Returns the dotted-string name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentAdded => "agent.added",
            Self::AgentRemoved => "agent.removed",
            Self::AgentUpdated => "agent.updated",
            Self::FileChanged => "file.changed",
        }
    }
}

/// A lifecycle or filesystem event published on the [`crate::EventBus`].
///
/// Modeled as a tagged sum rather than a stringly-typed payload bag: each
/// variant carries exactly the fields its subscribers need, and the
/// compiler enforces that every subscriber handles every shape it destructures.
#[derive(Clone, Debug)]
pub enum Event {
    /// A new agent appeared in the registry (or was eagerly registered).
    AgentAdded {
        /// The agent's name.
        name: AgentName,
        /// The agent's workspace directory.
        workspace: PathBuf,
        /// A snapshot of the full config document at publish time.
        config_snapshot: Value,
    },
    /// An agent was removed from the registry.
    AgentRemoved {
        /// The removed agent's name.
        name: AgentName,
    },
    /// One or more of an agent's canonical fields changed on reload.
    AgentUpdated {
        /// The updated agent's name.
        name: AgentName,
        /// Names of the canonical fields that changed.
        changed_fields: Vec<String>,
    },
    /// A watched file changed on disk. Reserved for future use.
    FileChanged {
        /// The absolute path that changed.
        path: PathBuf,
    },
}

impl Event {
    /// Returns the topic this event is published under.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::AgentAdded { .. } => Topic::AgentAdded,
            Self::AgentRemoved { .. } => Topic::AgentRemoved,
            Self::AgentUpdated { .. } => Topic::AgentUpdated,
            Self::FileChanged { .. } => Topic::FileChanged,
        }
    }
}
