// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reductions of an unbounded sequence to a single value.
//!
//! Upstream is requested unbounded; the folded value is held in a
//! [`DeferredScalar`] and delivered once downstream requested it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::operators::{DeferredScalar, Upstream};
use crate::signal::UNBOUNDED;
use crate::traits::{
    Publisher, PublisherRef, QueueSubscription, Subscriber, SubscriberRef, Subscription,
    SubscriptionRef,
};
use crate::utils::sync::locked;

/// How a reduction folds values.
pub struct Reducer<T, A> {
    /// Accumulator for the first value.
    pub first: Arc<dyn Fn(T) -> Result<A, FlowError> + Send + Sync>,
    /// Folds every later value into the accumulator.
    pub step: Arc<dyn Fn(A, T) -> Result<A, FlowError> + Send + Sync>,
    /// Result for an empty upstream; `None` completes empty.
    pub empty: Option<Arc<dyn Fn() -> A + Send + Sync>>,
}

impl<T, A> Clone for Reducer<T, A> {
    fn clone(&self) -> Self {
        Self {
            first: Arc::clone(&self.first),
            step: Arc::clone(&self.step),
            empty: self.empty.clone(),
        }
    }
}

pub struct ReducePublisher<T, A> {
    source: PublisherRef<T>,
    reducer: Reducer<T, A>,
}

impl<T, A> ReducePublisher<T, A> {
    pub fn new(source: PublisherRef<T>, reducer: Reducer<T, A>) -> Self {
        Self { source, reducer }
    }
}

impl<T: Send + 'static, A: Send + 'static> Publisher<A> for ReducePublisher<T, A> {
    fn subscribe(&self, actual: SubscriberRef<A>) {
        let reducer = self.reducer.clone();
        let subscriber = Arc::new_cyclic(|me| ReduceSubscriber {
            me: me.clone(),
            scalar: DeferredScalar::new(actual),
            reducer,
            upstream: Upstream::new(),
            accumulator: Mutex::new(None),
            done: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct ReduceSubscriber<T, A> {
    me: Weak<Self>,
    scalar: DeferredScalar<A>,
    reducer: Reducer<T, A>,
    upstream: Upstream<T>,
    accumulator: Mutex<Option<A>>,
    done: AtomicBool,
}

impl<T: Send + 'static, A: Send + 'static> Subscriber<T> for ReduceSubscriber<T, A> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.scalar.actual().on_subscribe(me);
        }
        self.upstream.request(UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        let current = locked(&self.accumulator).take();
        let folded = match current {
            None => (self.reducer.first)(value),
            Some(acc) => (self.reducer.step)(acc, value),
        };
        match folded {
            Ok(acc) => *locked(&self.accumulator) = Some(acc),
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
        self.upstream.release();
        locked(&self.accumulator).take();
        self.scalar.error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        let result = locked(&self.accumulator)
            .take()
            .or_else(|| self.reducer.empty.as_ref().map(|empty| empty()));
        match result {
            Some(value) => self.scalar.complete(value),
            None => self.scalar.complete_empty(),
        }
    }
}

impl<T: Send + 'static, A: Send + 'static> Subscription<A> for ReduceSubscriber<T, A> {
    fn request(&self, n: u64) {
        self.scalar.request(n);
    }

    fn cancel(&self) {
        self.scalar.cancel();
        self.upstream.cancel();
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<A>> {
        self.scalar.as_queue()
    }

    fn name(&self) -> &'static str {
        "ReduceSubscriber"
    }
}
