// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::traits::Subscriber;

/// A cold description of future signal emission.
///
/// Every call to [`Publisher::subscribe`] starts an independent run. The
/// subscriber receives exactly one `on_subscribe` before any other signal,
/// possibly on another thread and possibly after `subscribe` returns.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

pub type PublisherRef<T> = Arc<dyn Publisher<T>>;
