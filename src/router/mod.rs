//! In-process named-topic relay.
//!
//! [`EventRouter`] decouples receiving an event from acting on it: the
//! broker consumer publishes, the dispatch orchestrator subscribes, and
//! neither knows about the other.
//!
//! Publishing is synchronous. Every handler subscribed to the topic runs
//! in subscription order on the publisher's call stack before `publish`
//! returns, so a slow or panicking handler affects the publisher.
//! Handlers that need asynchronous work must spawn it themselves.

use std::sync::Arc;

use dashmap::DashMap;

/// Topic on which parsed broker events are published
pub const EVENT_RECEIVED: &str = "event-received";

pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct EventRouter<T> {
    topics: DashMap<String, Vec<Handler<T>>>,
}

impl<T> Default for EventRouter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventRouter<T> {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Register a handler for `topic`
    pub fn subscribe<F>(&self, topic: &str, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
        tracing::debug!(topic = %topic, "Handler subscribed");
    }

    /// Invoke every handler of `topic` with `payload`, returning how many ran
    pub fn publish(&self, topic: &str, payload: &T) -> usize {
        // Snapshot so handlers may subscribe without deadlocking on the map shard
        let handlers: Vec<Handler<T>> = match self.topics.get(topic) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::debug!(topic = %topic, "No subscribers for topic");
                return 0;
            }
        };

        for handler in &handlers {
            handler(payload);
        }

        handlers.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|entry| entry.len()).unwrap_or(0)
    }
}
