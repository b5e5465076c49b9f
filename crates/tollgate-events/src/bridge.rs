//! The notification bridge between the policy engine and its observers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use tollgate_core::SessionId;

use crate::event::PolicyEvent;
use crate::subscriber::{EventSubscriber, SubscriberRegistry, SubscriptionHandle};

/// Default broadcast channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Fan-out point for [`PolicyEvent`]s.
///
/// Cloning is cheap and every clone shares the same channel and handler
/// registry.
///
/// Storing a clone of the bridge inside one of its own handlers creates an
/// `Arc` cycle; hold a `std::sync::Weak` or a channel sender instead.
#[derive(Debug, Clone)]
pub struct NotificationBridge {
    sender: broadcast::Sender<Arc<PolicyEvent>>,
    registry: Arc<SubscriberRegistry>,
    capacity: usize,
}

impl NotificationBridge {
    /// Create a bridge with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bridge whose async receivers buffer up to `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registry: Arc::new(SubscriberRegistry::new()),
            capacity,
        }
    }

    /// Register a synchronous handler.
    pub fn subscribe(&self, handler: Arc<dyn EventSubscriber>) -> SubscriptionHandle {
        self.registry.register(handler)
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.registry.unregister(handle)
    }

    /// Open an async receiver for every event.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), None)
    }

    /// Open an async receiver that only yields events for `session_id`.
    #[must_use]
    pub fn receiver_for(&self, session_id: SessionId) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), Some(session_id))
    }

    /// Publish an event to receivers and handlers.
    ///
    /// Returns the number of async receivers the event was queued for.
    pub fn publish(&self, event: PolicyEvent) -> usize {
        let event = Arc::new(event);
        trace!(
            event_type = %event.event_type(),
            session_id = %event.session_id(),
            "Publishing event"
        );

        let count = match self.sender.send(Arc::clone(&event)) {
            Ok(c) => {
                debug!(
                    event_type = %event.event_type(),
                    receiver_count = c,
                    "Event published"
                );
                c
            },
            Err(_) => 0,
        };

        self.registry.notify(&event);
        count
    }

    /// Number of live async receivers plus registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .receiver_count()
            .saturating_add(self.registry.len())
    }

    /// Channel capacity for async receivers.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for NotificationBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Async receiver of bridge events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<PolicyEvent>>,
    session_filter: Option<SessionId>,
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("session_filter", &self.session_filter)
            .finish_non_exhaustive()
    }
}

impl EventReceiver {
    fn new(
        receiver: broadcast::Receiver<Arc<PolicyEvent>>,
        session_filter: Option<SessionId>,
    ) -> Self {
        Self {
            receiver,
            session_filter,
        }
    }

    fn matches(&self, event: &PolicyEvent) -> bool {
        self.session_filter
            .as_ref()
            .is_none_or(|id| event.session_id() == id)
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once every bridge clone has been dropped. Lagging past
    /// the channel capacity drops the oldest events and logs a warning.
    pub async fn recv(&mut self) -> Option<Arc<PolicyEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<PolicyEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {},
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}
