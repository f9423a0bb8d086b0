// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::operators::Upstream;
use crate::traits::{
    FusionMode, Publisher, PublisherRef, QueueSubscription, Subscriber, SubscriberRef,
    Subscription, SubscriptionRef,
};

pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Passes values matching a predicate. Every rejected value is replaced by a
/// request for one more, so downstream demand is still honoured.
pub struct FilterPublisher<T> {
    source: PublisherRef<T>,
    predicate: Predicate<T>,
}

impl<T> FilterPublisher<T> {
    pub fn new(source: PublisherRef<T>, predicate: Predicate<T>) -> Self {
        Self { source, predicate }
    }
}

impl<T: Send + 'static> Publisher<T> for FilterPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let predicate = Arc::clone(&self.predicate);
        let subscriber = Arc::new_cyclic(|me| FilterSubscriber {
            me: me.clone(),
            actual,
            predicate,
            upstream: Upstream::new(),
            done: AtomicBool::new(false),
            mode: AtomicU8::new(FusionMode::NONE.bits()),
        });
        self.source.subscribe(subscriber);
    }
}

struct FilterSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    predicate: Predicate<T>,
    upstream: Upstream<T>,
    done: AtomicBool,
    mode: AtomicU8,
}

impl<T: Send + 'static> FilterSubscriber<T> {
    fn fused(&self) -> bool {
        self.mode.load(Ordering::Acquire) != FusionMode::NONE.bits()
    }
}

impl<T: Send + 'static> Subscriber<T> for FilterSubscriber<T> {
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
        if (self.predicate)(&value) {
            self.actual.on_next(value);
        } else {
            self.upstream.request(1);
        }
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        if !self.fused() {
            self.upstream.release();
        }
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.fused() {
            self.upstream.release();
        }
        self.actual.on_complete();
    }

    fn on_available(&self) {
        self.actual.on_available();
    }
}

impl<T: Send + 'static> Subscription<T> for FilterSubscriber<T> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<T>> {
        let fuseable = self
            .upstream
            .get()
            .is_some_and(|s| s.as_queue().is_some());
        if fuseable {
            Some(self)
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "FilterSubscriber"
    }
}

impl<T: Send + 'static> QueueSubscription<T> for FilterSubscriber<T> {
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.contains(FusionMode::THREAD_BARRIER) {
            return FusionMode::NONE;
        }
        let granted = self
            .upstream
            .get()
            .and_then(|s| s.as_queue().map(|q| q.request_fusion(requested)))
            .unwrap_or(FusionMode::NONE);
        self.mode.store(granted.bits(), Ordering::Release);
        granted
    }

    fn poll(&self) -> Result<Option<T>, FlowError> {
        let Some(upstream) = self.upstream.get() else {
            return Ok(None);
        };
        let Some(queue) = upstream.as_queue() else {
            return Ok(None);
        };
        let mut dropped = 0;
        let polled = loop {
            match queue.poll().map_err(throw_if_fatal)? {
                Some(value) if (self.predicate)(&value) => break Some(value),
                Some(_) => dropped += 1,
                None => break None,
            }
        };
        if dropped > 0 && self.mode.load(Ordering::Acquire) == FusionMode::ASYNC.bits() {
            upstream.request(dropped);
        }
        Ok(polled)
    }

    fn is_empty(&self) -> bool {
        self.upstream
            .get()
            .and_then(|s| s.as_queue().map(|q| q.is_empty()))
            .unwrap_or(true)
    }

    fn size(&self) -> usize {
        self.upstream
            .get()
            .and_then(|s| s.as_queue().map(|q| q.size()))
            .unwrap_or(0)
    }

    fn clear(&self) {
        if let Some(s) = self.upstream.get() {
            if let Some(q) = s.as_queue() {
                q.clear();
            }
        }
    }
}
