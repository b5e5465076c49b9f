//! Tollgate Events - publish/subscribe for approval policy changes.
//!
//! The policy engine publishes [`PolicyEvent`]s to a [`NotificationBridge`]
//! without knowing who listens. There are two ways to listen:
//!
//! 1. **Handlers**: register an [`EventSubscriber`] with
//!    [`NotificationBridge::subscribe`]. Handlers run synchronously inside
//!    `publish`, so every registered handler sees every event exactly once,
//!    in publish order.
//!
//! 2. **Async receivers**: [`NotificationBridge::receiver`] returns an
//!    [`EventReceiver`] backed by a bounded broadcast channel. A receiver that
//!    falls more than the channel capacity behind loses the oldest events
//!    (logged as a warning).
//!
//! # Ordering
//!
//! The engine publishes while holding the session's lock, so two events for
//! the same session always reach a subscriber in the order they happened.
//! Events for different sessions may interleave arbitrarily.
//!
//! # Example
//!
//! ```rust
//! use tollgate_core::{ApprovalMode, SessionId};
//! use tollgate_events::{EventMetadata, NotificationBridge, PolicyEvent};
//!
//! # async fn example() {
//! let bridge = NotificationBridge::new();
//! let mut receiver = bridge.receiver();
//!
//! bridge.publish(PolicyEvent::PolicyChanged {
//!     metadata: EventMetadata::new("engine"),
//!     session_id: SessionId::new("laptop"),
//!     new_mode: ApprovalMode::AlwaysApprove,
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "policy_changed");
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bridge;
mod event;
mod subscriber;

pub use bridge::{DEFAULT_CHANNEL_CAPACITY, EventReceiver, NotificationBridge};
pub use event::{EventMetadata, PolicyEvent};
pub use subscriber::{
    EventFilter, EventSubscriber, FilterSubscriber, SubscriberRegistry, SubscriptionHandle,
};
