//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_events::prelude::*;` to import all essential types.

pub use crate::{
    EventMetadata, EventReceiver, EventSubscriber, FilterSubscriber, NotificationBridge,
    PolicyEvent, SubscriptionHandle,
};
