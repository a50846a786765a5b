//! The topic-keyed, parallel-dispatch event bus implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::event::{Event, Topic};

/// Error produced by handlers while processing a dispatched event.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias returned by [`Handler::handle`].
pub type HandlerOutcome = std::result::Result<(), HandlerError>;

/// Result alias used by bus operations.
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Errors surfaced directly by the bus (not by individual handlers, whose
/// failures are isolated and only logged).
#[derive(Debug, Error)]
pub enum BusError {
    /// The supplied subscription token was not registered on this topic.
    #[error("subscription {token:?} is not registered for topic {topic}")]
    UnknownSubscription {
        /// The token the caller attempted to unsubscribe.
        token: SubscriptionId,
        /// The topic it was attempted against.
        topic: &'static str,
    },
}

/// A one-method capability invoked for each event delivered to a subscriber.
///
/// Modeled as a trait object (rather than a bare function pointer) so
/// subscribers can close over state; identity for unsubscription is tracked
/// by the [`SubscriptionId`] token returned from [`EventBus::subscribe`],
/// not by comparing trait objects, which have no portable identity.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles one dispatched event.
    ///
    /// # Errors
    ///
    /// Any error returned here is logged by the bus together with the
    /// handler's subscription id and topic; it never reaches other
    /// handlers or the publisher.
    async fn handle(&self, event: &Event) -> HandlerOutcome;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(&Event) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = HandlerOutcome> + Send,
{
    async fn handle(&self, event: &Event) -> HandlerOutcome {
        (self)(event).await
    }
}

/// Opaque token identifying one subscription, returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn Handler>,
}

/// In-process, topic-keyed publish/subscribe event bus.
///
/// See the module documentation for the semantics this type must uphold:
/// parallel dispatch, error isolation, and publish-time subscriber
/// snapshotting.
pub struct EventBus {
    subscribers: Mutex<HashMap<Topic, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates an empty event bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes `handler` to `topic`, returning a token for later removal.
    pub async fn subscribe(&self, topic: Topic, handler: Arc<dyn Handler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.lock().await;
        subscribers
            .entry(topic)
            .or_default()
            .push(Subscription { id, handler });
        debug!(topic = topic.as_str(), subscription = id.0, "subscribed");
        id
    }

    /// Removes a previously-registered subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownSubscription`] if `token` is not currently
    /// registered for `topic`.
    pub async fn unsubscribe(&self, topic: Topic, token: SubscriptionId) -> BusResult<()> {
        let mut subscribers = self.subscribers.lock().await;
        let Some(handlers) = subscribers.get_mut(&topic) else {
            return Err(BusError::UnknownSubscription {
                token,
                topic: topic.as_str(),
            });
        };

        let before = handlers.len();
        handlers.retain(|sub| sub.id != token);
        if handlers.len() == before {
            return Err(BusError::UnknownSubscription {
                token,
                topic: topic.as_str(),
            });
        }

        if handlers.is_empty() {
            subscribers.remove(&topic);
        }
        debug!(topic = topic.as_str(), subscription = token.0, "unsubscribed");
        Ok(())
    }

    /// Dispatches `event` to every handler currently subscribed to its topic.
    ///
    /// Handlers run concurrently; a failing handler is logged and does not
    /// prevent delivery to, or affect the outcome of, any other handler.
    /// Publishing to a topic with no subscribers is a no-op.
    pub async fn publish(&self, event: Event) {
        let topic = event.topic();
        let handlers: Vec<Arc<dyn Handler>> = {
            let subscribers = self.subscribers.lock().await;
            subscribers
                .get(&topic)
                .map(|subs| subs.iter().map(|sub| Arc::clone(&sub.handler)).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let tasks = handlers.into_iter().enumerate().map(|(index, handler)| {
            let event = Arc::clone(&event);
            tokio::spawn(async move { (index, handler.handle(&event).await) })
        });

        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(err))) => {
                    error!(topic = topic.as_str(), handler = index, error = %err, "event handler failed");
                }
                Err(join_err) => {
                    error!(topic = topic.as_str(), error = %join_err, "event handler task panicked");
                }
            }
        }
    }
}
