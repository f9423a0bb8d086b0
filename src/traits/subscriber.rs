// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::errors::FlowError;
use crate::traits::Subscription;

/// Consumer side of the protocol.
///
/// Producers serialize calls: a subscriber never sees two signals at once,
/// and nothing follows `on_error` or `on_complete`.
pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription<T>>);

    fn on_next(&self, value: T);

    fn on_error(&self, error: FlowError);

    fn on_complete(&self);

    /// ASYNC fusion only: new values can be polled from the subscription's
    /// queue. Plain subscribers never receive this.
    fn on_available(&self) {}
}

pub type SubscriberRef<T> = Arc<dyn Subscriber<T>>;
