// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error recovery by substitution.
//!
//! A failed run is never resumed. The `Error` signal is intercepted and a new
//! sequence is subscribed in its place; its signals become downstream's from
//! that point on, with the unconsumed demand carried over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::operators::{SubscriptionArbiter, Upstream};
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

pub type Fallback<T> = Arc<dyn Fn(FlowError) -> PublisherRef<T> + Send + Sync>;

/// Switches to `fallback(error)` when upstream fails.
pub struct ResumePublisher<T> {
    source: PublisherRef<T>,
    fallback: Fallback<T>,
}

impl<T> ResumePublisher<T> {
    pub fn new(source: PublisherRef<T>, fallback: Fallback<T>) -> Self {
        Self { source, fallback }
    }
}

impl<T: Send + 'static> Publisher<T> for ResumePublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let fallback = Arc::clone(&self.fallback);
        let subscriber = Arc::new_cyclic(|me| ResumeSubscriber {
            me: me.clone(),
            actual,
            fallback,
            arbiter: SubscriptionArbiter::new(),
            subscribed: AtomicBool::new(false),
            switched: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct ResumeSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    fallback: Fallback<T>,
    arbiter: SubscriptionArbiter<T>,
    subscribed: AtomicBool,
    switched: AtomicBool,
    done: AtomicBool,
}

impl<T: Send + 'static> Subscriber<T> for ResumeSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if !self.subscribed.swap(true, Ordering::AcqRel) {
            if let Some(me) = self.me.upgrade() {
                self.actual.on_subscribe(me);
            }
        }
        self.arbiter.set(subscription);
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        self.arbiter.produced(1);
        self.actual.on_next(value);
    }

    fn on_error(&self, error: FlowError) {
        if self.done.load(Ordering::Acquire) {
            hooks::error_dropped(&error);
            return;
        }
        if !self.switched.swap(true, Ordering::AcqRel) {
            let error = throw_if_fatal(error);
            self.arbiter.release();
            let replacement = (self.fallback)(error);
            if let Some(me) = self.me.upgrade() {
                replacement.subscribe(me);
            }
            return;
        }
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        self.arbiter.release();
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.arbiter.release();
        self.actual.on_complete();
    }
}

impl<T: Send + 'static> Subscription<T> for ResumeSubscriber<T> {
    fn request(&self, n: u64) {
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        self.arbiter.cancel();
    }

    fn name(&self) -> &'static str {
        "ResumeSubscriber"
    }
}

/// Rewrites the error carried by an `Error` signal.
pub struct MapErrPublisher<T> {
    source: PublisherRef<T>,
    mapper: Arc<dyn Fn(FlowError) -> FlowError + Send + Sync>,
}

impl<T> MapErrPublisher<T> {
    pub fn new(
        source: PublisherRef<T>,
        mapper: Arc<dyn Fn(FlowError) -> FlowError + Send + Sync>,
    ) -> Self {
        Self { source, mapper }
    }
}

impl<T: Send + 'static> Publisher<T> for MapErrPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let mapper = Arc::clone(&self.mapper);
        let subscriber = Arc::new_cyclic(|me| MapErrSubscriber {
            me: me.clone(),
            actual,
            mapper,
            upstream: Upstream::new(),
            done: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct MapErrSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    mapper: Arc<dyn Fn(FlowError) -> FlowError + Send + Sync>,
    upstream: Upstream<T>,
    done: AtomicBool,
}

impl<T: Send + 'static> Subscriber<T> for MapErrSubscriber<T> {
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
        self.actual.on_error((self.mapper)(error));
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        self.actual.on_complete();
    }
}

impl<T: Send + 'static> Subscription<T> for MapErrSubscriber<T> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }

    fn name(&self) -> &'static str {
        "MapErrSubscriber"
    }
}
