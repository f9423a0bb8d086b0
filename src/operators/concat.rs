// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::FlowError;
use crate::hooks;
use crate::operators::SubscriptionArbiter;
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

/// Subscribes to each source in turn once the previous one completed.
/// Demand left over from one source carries to the next.
pub struct ConcatPublisher<T> {
    sources: Arc<[PublisherRef<T>]>,
}

impl<T> ConcatPublisher<T> {
    pub fn new(sources: Vec<PublisherRef<T>>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ConcatPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let sources = Arc::clone(&self.sources);
        let subscriber = Arc::new_cyclic(|me| ConcatSubscriber {
            me: me.clone(),
            actual: Arc::clone(&actual),
            sources,
            index: AtomicUsize::new(0),
            arbiter: SubscriptionArbiter::new(),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        });
        actual.on_subscribe(Arc::clone(&subscriber) as Arc<dyn Subscription<T>>);
        subscriber.on_complete();
    }
}

struct ConcatSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    sources: Arc<[PublisherRef<T>]>,
    index: AtomicUsize,
    arbiter: SubscriptionArbiter<T>,
    wip: AtomicUsize,
    done: AtomicBool,
}

impl<T: Send + 'static> Subscriber<T> for ConcatSubscriber<T> {
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
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        self.arbiter.release();
        self.actual.on_error(error);
    }

    /// Advances to the next source; trampolined so that sources completing
    /// synchronously inside `subscribe` do not grow the stack.
    fn on_complete(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.arbiter.is_cancelled() || self.done.load(Ordering::Acquire) {
                return;
            }
            let index = self.index.fetch_add(1, Ordering::AcqRel);
            match self.sources.get(index) {
                None => {
                    if !self.done.swap(true, Ordering::AcqRel) {
                        self.arbiter.release();
                        self.actual.on_complete();
                    }
                    return;
                }
                Some(source) => {
                    self.arbiter.release();
                    match self.me.upgrade() {
                        Some(me) => source.subscribe(me),
                        None => return,
                    }
                }
            }
            if self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                break;
            }
        }
    }
}

impl<T: Send + 'static> Subscription<T> for ConcatSubscriber<T> {
    fn request(&self, n: u64) {
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        self.arbiter.cancel();
    }

    fn name(&self) -> &'static str {
        "ConcatSubscriber"
    }
}
