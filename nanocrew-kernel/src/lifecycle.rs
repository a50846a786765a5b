//! Lifecycle state machine for agent instances.

use nanocrew_primitives::AgentName;
use thiserror::Error;
use tracing::debug;

/// Discrete states an [`AgentInstance`](nanocrew_primitives::AgentName) can occupy during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Constructed but not yet initialized.
    Init,
    /// Workspace materialized and collaborators wired; ready for activation.
    Ready,
    /// Actively handling inbound sessions.
    Active,
    /// Draining in-flight work prior to shut down.
    Retiring,
    /// Fully terminated; no further work should be scheduled.
    Terminated,
}

impl AgentState {
    /// Returns `true` when the state represents a running instance.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` once the instance has terminated.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Events that trigger lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Finish bootstrapping the workspace and collaborators.
    Boot,
    /// Begin accepting inbound sessions.
    Activate,
    /// Initiate a graceful shutdown (the manager's `stop` signal).
    Retire,
    /// Finalize shutdown after draining work.
    Terminate,
}

/// Lifecycle state manager for one `AgentInstance`.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    agent_name: AgentName,
    state: AgentState,
}

impl Lifecycle {
    /// Constructs a lifecycle controller for the given agent.
    #[must_use]
    pub fn new(agent_name: AgentName) -> Self {
        Self {
            agent_name,
            state: AgentState::Init,
        }
    }

    /// Returns the owning agent name.
    #[must_use]
    pub fn agent_name(&self) -> &AgentName {
        &self.agent_name
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Applies a lifecycle event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the supplied event
    /// is not allowed from the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<AgentState> {
        let next = match (self.state, event) {
            (AgentState::Init, LifecycleEvent::Boot) => Some(AgentState::Ready),
            (AgentState::Ready, LifecycleEvent::Activate) => Some(AgentState::Active),
            (AgentState::Ready | AgentState::Active, LifecycleEvent::Retire) => {
                Some(AgentState::Retiring)
            }
            (AgentState::Retiring | AgentState::Terminated, LifecycleEvent::Terminate) => {
                Some(AgentState::Terminated)
            }
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                agent_name: self.agent_name.clone(),
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(
                agent = %self.agent_name,
                ?self.state,
                ?next_state,
                ?event,
                "agent lifecycle transition"
            );
            self.state = next_state;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid lifecycle transition from {from:?} via {event:?} for agent {agent_name}")]
    InvalidTransition {
        /// Name of the agent whose transition failed.
        agent_name: AgentName,
        /// State prior to the attempted transition.
        from: AgentState,
        /// Event that triggered the failure.
        event: LifecycleEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> AgentName {
        AgentName::new("main").unwrap()
    }

    #[test]
    fn boot_to_active_flow() {
        let mut lifecycle = Lifecycle::new(name());

        assert_eq!(lifecycle.state(), AgentState::Init);
        lifecycle.transition(LifecycleEvent::Boot).unwrap();
        assert_eq!(lifecycle.state(), AgentState::Ready);
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        assert!(lifecycle.state().is_active());
    }

    #[test]
    fn retire_then_terminate() {
        let mut lifecycle = Lifecycle::new(name());
        lifecycle.transition(LifecycleEvent::Boot).unwrap();
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        lifecycle.transition(LifecycleEvent::Retire).unwrap();
        assert_eq!(lifecycle.state(), AgentState::Retiring);
        lifecycle.transition(LifecycleEvent::Terminate).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn invalid_transition_errors() {
        let mut lifecycle = Lifecycle::new(name());

        let err = lifecycle
            .transition(LifecycleEvent::Activate)
            .expect_err("activate should fail from init");

        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}
