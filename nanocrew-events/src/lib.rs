//! In-process, topic-keyed publish/subscribe event bus.
//!
//! Decouples config reloads, filesystem observations, and agent lifecycle
//! side-effects: publishers and subscribers never call each other directly.

#![warn(missing_docs, clippy::pedantic)]

mod bus;
mod event;

/// The event bus itself, plus its error and subscription types.
pub use bus::{BusError, BusResult, EventBus, Handler, HandlerError, HandlerOutcome, SubscriptionId};
/// The tagged-sum event type and its topic enumeration.
pub use event::{Event, Topic};
