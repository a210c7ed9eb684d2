//! Fan-out of decision events to observers.
//!
//! Observers are called synchronously from the door loop, one after another,
//! outside the subscriber lock. An observer that reports a permanent failure
//! is unsubscribed after the dispatch that saw it fail.

use proxgate_core::DecisionEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by an observer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The event was lost but later events may succeed.
    #[error("transient observer failure: {0}")]
    Transient(String),

    /// The observer can never succeed again and should be dropped.
    #[error("permanent observer failure: {0}")]
    Permanent(String),
}

/// Consumer of decision events.
pub trait DecisionObserver: Send + Sync {
    fn on_decision(&self, event: &DecisionEvent) -> Result<(), ObserverError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "observer"
    }
}

/// Identifies one subscription for [`EventDispatcher::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    observer: Arc<dyn DecisionObserver>,
}

#[derive(Default)]
struct Subscribers {
    list: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Subscriber list shared between a door loop and its handles.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<Subscribers>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn DecisionObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(observer = observer.name(), "observer subscribed");
        self.list().push(Subscriber { id, observer });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.list();
        let before = list.len();
        list.retain(|subscriber| subscriber.id != id);
        list.len() != before
    }

    /// Deliver `event` to every current subscriber, returning how many
    /// accepted it.
    pub fn dispatch(&self, event: &DecisionEvent) -> usize {
        let snapshot: Vec<(SubscriptionId, Arc<dyn DecisionObserver>)> = self
            .list()
            .iter()
            .map(|subscriber| (subscriber.id, Arc::clone(&subscriber.observer)))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, observer) in snapshot {
            match observer.on_decision(event) {
                Ok(()) => delivered += 1,
                Err(ObserverError::Transient(reason)) => {
                    warn!(observer = observer.name(), %reason, "observer dropped an event");
                }
                Err(ObserverError::Permanent(reason)) => {
                    warn!(observer = observer.name(), %reason, "removing failed observer");
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            self.list().retain(|subscriber| !dead.contains(&subscriber.id));
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn list(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.len())
            .finish()
    }
}
