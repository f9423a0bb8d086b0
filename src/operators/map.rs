// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Value transformation.
//!
//! The stage is fuseable: when downstream negotiates fusion and upstream
//! offers a queue, `poll` applies the mapper to values pulled from upstream's
//! queue. A thread-barrier request disables fusion, since the mapper would
//! otherwise run on the draining thread instead of the producing one.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::operators::Upstream;
use crate::traits::{
    FusionMode, Publisher, PublisherRef, QueueSubscription, Subscriber, SubscriberRef,
    Subscription, SubscriptionRef,
};

pub type Mapper<T, U> = Arc<dyn Fn(T) -> Result<U, FlowError> + Send + Sync>;

pub struct MapPublisher<T, U> {
    source: PublisherRef<T>,
    mapper: Mapper<T, U>,
}

impl<T, U> MapPublisher<T, U> {
    pub fn new(source: PublisherRef<T>, mapper: Mapper<T, U>) -> Self {
        Self { source, mapper }
    }
}

impl<T: Send + 'static, U: Send + 'static> Publisher<U> for MapPublisher<T, U> {
    fn subscribe(&self, actual: SubscriberRef<U>) {
        let mapper = Arc::clone(&self.mapper);
        let subscriber = Arc::new_cyclic(|me| MapSubscriber {
            me: me.clone(),
            actual,
            mapper,
            upstream: Upstream::new(),
            done: AtomicBool::new(false),
            mode: AtomicU8::new(FusionMode::NONE.bits()),
        });
        self.source.subscribe(subscriber);
    }
}

struct MapSubscriber<T, U> {
    me: Weak<Self>,
    actual: SubscriberRef<U>,
    mapper: Mapper<T, U>,
    upstream: Upstream<T>,
    done: AtomicBool,
    mode: AtomicU8,
}

impl<T: Send + 'static, U: Send + 'static> Subscriber<T> for MapSubscriber<T, U> {
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
        match (self.mapper)(value) {
            Ok(mapped) => self.actual.on_next(mapped),
            Err(e) => {
                let e = throw_if_fatal(e);
                self.upstream.cancel();
                self.on_error(e);
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        if self.mode.load(Ordering::Acquire) == FusionMode::NONE.bits() {
            self.upstream.release();
        }
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.mode.load(Ordering::Acquire) == FusionMode::NONE.bits() {
            self.upstream.release();
        }
        self.actual.on_complete();
    }

    fn on_available(&self) {
        self.actual.on_available();
    }
}

impl<T: Send + 'static, U: Send + 'static> Subscription<U> for MapSubscriber<T, U> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<U>> {
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
        "MapSubscriber"
    }
}

impl<T: Send + 'static, U: Send + 'static> QueueSubscription<U> for MapSubscriber<T, U> {
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

    fn poll(&self) -> Result<Option<U>, FlowError> {
        let Some(upstream) = self.upstream.get() else {
            return Ok(None);
        };
        let Some(queue) = upstream.as_queue() else {
            return Ok(None);
        };
        match queue.poll()? {
            Some(value) => (self.mapper)(value).map(Some).map_err(throw_if_fatal),
            None => Ok(None),
        }
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
