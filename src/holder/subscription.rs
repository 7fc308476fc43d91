//! Subscription identity for listener registries.
//!
//! Every `follow`, `subscribe`, or `add_received_listener` call returns a
//! [`SubscriptionId`] that uniquely identifies the registration and can
//! later be used to unregister it. IDs are process-wide unique so an ID
//! handed out by one holder can never accidentally match a registration
//! on another.

use std::sync::atomic::{AtomicU64, Ordering};

static SUBSCRIPTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate the next process-wide unique ID.
    pub(crate) fn next() -> Self {
        SubscriptionId(SUBSCRIPTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
