// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded re-subscription to the original upstream.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::observability::messages::operators::RetryAttempt;
use crate::observability::messages::StructuredLog;
use crate::operators::SubscriptionArbiter;
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

/// Re-subscribes to `source` after each of the first `max_retries` failures.
/// Failure number `max_retries + 1` reaches downstream unchanged.
pub struct RetryPublisher<T> {
    source: PublisherRef<T>,
    max_retries: u64,
}

impl<T> RetryPublisher<T> {
    pub fn new(source: PublisherRef<T>, max_retries: u64) -> Self {
        Self { source, max_retries }
    }
}

impl<T: Send + 'static> Publisher<T> for RetryPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let source = Arc::clone(&self.source);
        let max_retries = self.max_retries;
        let subscriber = Arc::new_cyclic(|me| RetrySubscriber {
            me: me.clone(),
            actual: Arc::clone(&actual),
            source,
            arbiter: SubscriptionArbiter::new(),
            max_retries,
            attempts: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        });
        actual.on_subscribe(Arc::clone(&subscriber) as Arc<dyn Subscription<T>>);
        subscriber.resubscribe();
    }
}

struct RetrySubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    source: PublisherRef<T>,
    arbiter: SubscriptionArbiter<T>,
    max_retries: u64,
    attempts: AtomicU64,
    wip: AtomicUsize,
    done: AtomicBool,
}

impl<T: Send + 'static> RetrySubscriber<T> {
    /// Subscribes are trampolined: a source that fails synchronously inside
    /// `subscribe` re-enters here and only bumps `wip`, so retries loop
    /// instead of recursing.
    fn resubscribe(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.arbiter.is_cancelled() {
                return;
            }
            match self.me.upgrade() {
                Some(me) => self.source.subscribe(me),
                None => return,
            }
            if self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                break;
            }
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for RetrySubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
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
        let error = throw_if_fatal(error);
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if attempt <= self.max_retries {
            RetryAttempt {
                attempt,
                max_attempts: Some(self.max_retries),
                error: &error,
            }
            .log();
            self.arbiter.release();
            self.resubscribe();
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

impl<T: Send + 'static> Subscription<T> for RetrySubscriber<T> {
    fn request(&self, n: u64) {
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        self.arbiter.cancel();
    }

    fn name(&self) -> &'static str {
        "RetrySubscriber"
    }
}
