//! Alarm bus for routing transport trouble to the owning manager
//!
//! Routes are keyed by the publisher's [`SenderId`], so any number of
//! manager/transport pairs can share one bus without seeing each other's
//! events. Handlers run synchronously inside [`AlarmBus::publish`], outside the
//! dispatch table lock.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an alarm publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId(u64);

impl SenderId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender-{}", self.0)
    }
}

/// What an alarm event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A connection detected an unexpected failure
    Alarm,
    /// A connection withdrew a previously raised alarm
    AlarmSilenced,
    /// A background listener could not read from its channel
    ReadError,
}

/// An event on the bus. Carries nothing beyond its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmEvent {
    pub topic: Topic,
    pub sender: SenderId,
}

type Handler = Arc<dyn Fn(AlarmEvent) + Send + Sync>;

struct Route {
    topic: Topic,
    handler: Handler,
}

/// Publish/subscribe conduit for [`AlarmEvent`]s.
///
/// Cheap to clone; clones share one dispatch table.
#[derive(Clone, Default)]
pub struct AlarmBus {
    routes: Arc<DashMap<SenderId, Vec<Route>>>,
}

impl AlarmBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events with this `topic` from `sender`.
    ///
    /// Events published before this call are not replayed.
    pub fn subscribe<F>(&self, topic: Topic, sender: SenderId, handler: F)
    where
        F: Fn(AlarmEvent) + Send + Sync + 'static,
    {
        self.routes.entry(sender).or_default().push(Route {
            topic,
            handler: Arc::new(handler),
        });
        trace!(%sender, ?topic, "alarm route added");
    }

    /// Deliver an event to every matching handler registered right now.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, topic: Topic, sender: SenderId) -> usize {
        // Snapshot the handlers so the shard guard is released before any of
        // them runs; a handler may subscribe or unsubscribe.
        let handlers: Vec<Handler> = match self.routes.get(&sender) {
            Some(routes) => routes
                .iter()
                .filter(|route| route.topic == topic)
                .map(|route| route.handler.clone())
                .collect(),
            None => Vec::new(),
        };

        let event = AlarmEvent { topic, sender };
        for handler in &handlers {
            handler(event);
        }

        trace!(%sender, ?topic, delivered = handlers.len(), "alarm published");
        handlers.len()
    }

    /// Drop every route registered for `sender`. Idempotent.
    ///
    /// Returns the number of routes removed.
    pub fn unsubscribe(&self, sender: SenderId) -> usize {
        let removed = self
            .routes
            .remove(&sender)
            .map(|(_, routes)| routes.len())
            .unwrap_or(0);
        if removed > 0 {
            trace!(%sender, removed, "alarm routes removed");
        }
        removed
    }

    /// Number of senders with at least one route
    pub fn sender_count(&self) -> usize {
        self.routes.len()
    }
}

impl fmt::Debug for AlarmBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmBus")
            .field("senders", &self.routes.len())
            .finish()
    }
}
