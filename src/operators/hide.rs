// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::FlowError;
use crate::hooks;
use crate::operators::Upstream;
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

/// Relays every signal unchanged while hiding upstream's queue, so that no
/// fusion can be negotiated across this point.
pub struct HidePublisher<T> {
    source: PublisherRef<T>,
}

impl<T> HidePublisher<T> {
    pub fn new(source: PublisherRef<T>) -> Self {
        Self { source }
    }
}

impl<T: Send + 'static> Publisher<T> for HidePublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let subscriber = Arc::new_cyclic(|me| HideSubscriber {
            me: me.clone(),
            actual,
            upstream: Upstream::new(),
            done: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct HideSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    done: AtomicBool,
}

impl<T: Send + 'static> Subscriber<T> for HideSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.actual.on_subscribe(me);
        }
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        self.actual.on_next(value);
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        self.upstream.release();
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        self.actual.on_complete();
    }
}

impl<T: Send + 'static> Subscription<T> for HideSubscriber<T> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }

    fn name(&self) -> &'static str {
        "HideSubscriber"
    }
}
