// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::FlowError;
use crate::hooks;
use crate::operators::{complete_subscribe, Upstream};
use crate::traits::{
    FusionMode, Publisher, PublisherRef, QueueSubscription, Subscriber, SubscriberRef,
    Subscription, SubscriptionRef,
};

/// Relays the first `limit` values, then cancels upstream and completes.
///
/// Fuseable like map: a fused `poll` counts down the same limit. Under SYNC
/// fusion the exhausted limit reads as an empty queue; under ASYNC fusion
/// the stage cancels upstream and completes from inside `poll`.
pub struct TakePublisher<T> {
    source: PublisherRef<T>,
    limit: u64,
}

impl<T> TakePublisher<T> {
    pub fn new(source: PublisherRef<T>, limit: u64) -> Self {
        Self { source, limit }
    }
}

impl<T: Send + 'static> Publisher<T> for TakePublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let limit = self.limit;
        let subscriber = Arc::new_cyclic(|me| TakeSubscriber {
            me: me.clone(),
            actual,
            upstream: Upstream::new(),
            remaining: AtomicU64::new(limit),
            done: AtomicBool::new(false),
            mode: AtomicU8::new(FusionMode::NONE.bits()),
        });
        self.source.subscribe(subscriber);
    }
}

struct TakeSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    remaining: AtomicU64,
    done: AtomicBool,
    mode: AtomicU8,
}

impl<T> TakeSubscriber<T> {
    fn fused(&self) -> bool {
        self.mode.load(Ordering::Acquire) != FusionMode::NONE.bits()
    }
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if self.remaining.load(Ordering::Acquire) == 0 {
            subscription.cancel();
            self.done.store(true, Ordering::Release);
            complete_subscribe(&self.actual);
            return;
        }
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
        let remaining = self.remaining.load(Ordering::Acquire);
        if remaining == 0 {
            hooks::value_dropped(value);
            return;
        }
        self.remaining.store(remaining - 1, Ordering::Release);
        self.actual.on_next(value);
        if remaining == 1 && !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.cancel();
            self.actual.on_complete();
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

impl<T: Send + 'static> Subscription<T> for TakeSubscriber<T> {
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
        "TakeSubscriber"
    }
}

impl<T: Send + 'static> QueueSubscription<T> for TakeSubscriber<T> {
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
        if self.remaining.load(Ordering::Acquire) == 0 {
            return Ok(None);
        }
        let Some(upstream) = self.upstream.get() else {
            return Ok(None);
        };
        let Some(queue) = upstream.as_queue() else {
            return Ok(None);
        };
        let Some(value) = queue.poll()? else {
            return Ok(None);
        };
        let remaining = self.remaining.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0
            && self.mode.load(Ordering::Acquire) == FusionMode::ASYNC.bits()
            && !self.done.swap(true, Ordering::AcqRel)
        {
            self.upstream.cancel();
            self.actual.on_complete();
        }
        Ok(Some(value))
    }

    fn is_empty(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
            || self
                .upstream
                .get()
                .and_then(|s| s.as_queue().map(|q| q.is_empty()))
                .unwrap_or(true)
    }

    fn size(&self) -> usize {
        let remaining = usize::try_from(self.remaining.load(Ordering::Acquire)).unwrap_or(usize::MAX);
        self.upstream
            .get()
            .and_then(|s| s.as_queue().map(|q| q.size()))
            .unwrap_or(0)
            .min(remaining)
    }

    fn clear(&self) {
        if let Some(s) = self.upstream.get() {
            if let Some(q) = s.as_queue() {
                q.clear();
            }
        }
    }
}
