//! Agent name newtype.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The name of an agent as it appears in the config document's registry.
///
/// Unlike a generated identifier, agent names are human-chosen strings such
/// as `"main"` or `"backend"` and are never transformed by key-case
/// conversion.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentName(String);

impl AgentName {
    /// Creates an agent name, rejecting empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if `name` is empty or whitespace-only.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidName {
                reason: "agent name cannot be empty".into(),
            });
        }
        Ok(Self(name))
    }

    /// Returns the reserved `"main"` agent name.
    #[must_use]
    pub fn main() -> Self {
        Self(crate::MAIN_AGENT.to_owned())
    }

    /// Returns true if this is the reserved `"main"` agent name.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.0 == crate::MAIN_AGENT
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AgentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<AgentName> for String {
    fn from(value: AgentName) -> Self {
        value.0
    }
}

impl AsRef<str> for AgentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
