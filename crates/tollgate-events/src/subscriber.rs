//! Handler trait and registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::PolicyEvent;

/// Filter function type for event subscribers.
pub type EventFilter = Box<dyn Fn(&PolicyEvent) -> bool + Send + Sync>;

/// A synchronous event handler.
///
/// `on_event` runs on the publisher's task while the publishing session's
/// lock is held, so it must return quickly and must not call back into the
/// policy engine for the same session. Hand heavy work to a channel.
/// Evaluations that wait on a slow handler give up and ask the user.
pub trait EventSubscriber: Send + Sync {
    /// Called for every accepted event.
    fn on_event(&self, event: &PolicyEvent);

    /// Return `false` to skip an event. Accepts everything by default.
    fn accepts(&self, event: &PolicyEvent) -> bool {
        let _ = event;
        true
    }

    /// Name used in logs.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Handle returned by [`SubscriberRegistry::register`]; pass it back to
/// unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Registry of synchronous handlers.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriptionHandle, Arc<dyn EventSubscriber>>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscriber_count", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new();
        let name = subscriber.name().to_string();

        let mut subs = self.subscribers.write().unwrap_or_else(|e| {
            warn!("SubscriberRegistry lock poisoned, recovering");
            e.into_inner()
        });
        subs.insert(handle, subscriber);

        debug!(subscriber_name = %name, "Subscriber registered");
        handle
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unregister(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| {
            warn!("SubscriberRegistry lock poisoned, recovering");
            e.into_inner()
        });
        let removed = subs.remove(&handle).is_some();
        if removed {
            debug!(?handle, "Subscriber unregistered");
        }
        removed
    }

    /// Deliver an event to every accepting handler.
    ///
    /// The handler set is snapshotted first, so a handler may unsubscribe
    /// (itself or others) from inside `on_event` without deadlocking. A
    /// panicking handler is logged and does not affect the others.
    pub fn notify(&self, event: &PolicyEvent) {
        let snapshot: Vec<(SubscriptionHandle, Arc<dyn EventSubscriber>)> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| {
                warn!("SubscriberRegistry lock poisoned, recovering");
                e.into_inner()
            });
            subs.iter().map(|(h, s)| (*h, Arc::clone(s))).collect()
        };

        for (handle, subscriber) in snapshot {
            if !subscriber.accepts(event) {
                continue;
            }
            trace!(
                subscriber_name = %subscriber.name(),
                event_type = %event.event_type(),
                "Notifying subscriber"
            );

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_event(event);
            }));
            if let Err(e) = result {
                warn!(
                    ?handle,
                    subscriber_name = %subscriber.name(),
                    error = ?e,
                    "Subscriber panicked"
                );
            }
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .map(|s| s.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A closure-backed handler with an optional filter.
pub struct FilterSubscriber<F>
where
    F: Fn(&PolicyEvent) + Send + Sync,
{
    name: String,
    filter: Option<EventFilter>,
    handler: F,
}

impl<F> FilterSubscriber<F>
where
    F: Fn(&PolicyEvent) + Send + Sync,
{
    /// Create a handler that accepts every event.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            filter: None,
            handler,
        }
    }

    /// Only accept events matching `predicate`.
    #[must_use]
    pub fn with_filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&PolicyEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }
}

impl<F> EventSubscriber for FilterSubscriber<F>
where
    F: Fn(&PolicyEvent) + Send + Sync,
{
    fn on_event(&self, event: &PolicyEvent) {
        (self.handler)(event);
    }

    fn accepts(&self, event: &PolicyEvent) -> bool {
        self.filter.as_ref().is_none_or(|f| f(event))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
