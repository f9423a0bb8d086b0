// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::traits::QueueSubscription;

/// Control handle handed to a subscriber through `on_subscribe`.
///
/// `request` may be called from any thread, and concurrently with emission.
/// `cancel` is idempotent; once it returns, at most one signal that was
/// already in flight can still reach the subscriber.
pub trait Subscription<T>: Send + Sync {
    fn request(&self, n: u64);

    fn cancel(&self);

    /// Queue view used for fusion, when the producer offers one.
    fn as_queue(&self) -> Option<&dyn QueueSubscription<T>> {
        None
    }

    fn name(&self) -> &'static str {
        "Subscription"
    }
}

pub type SubscriptionRef<T> = Arc<dyn Subscription<T>>;

/// Subscription for runs that terminate during `subscribe`.
pub struct EmptySubscription;

impl<T> Subscription<T> for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}

    fn name(&self) -> &'static str {
        "EmptySubscription"
    }
}
