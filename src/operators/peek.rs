// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Side-effect callbacks on every signal kind.
//!
//! Callbacks observe signals without altering them. A failing callback turns
//! into an `Error` signal that replaces the observed one:
//!
//! | callback       | on failure                                                        |
//! |----------------|-------------------------------------------------------------------|
//! | `on_subscribe` | upstream is cancelled, downstream gets an empty subscription and the error |
//! | `on_next`      | upstream is cancelled, downstream gets the error                  |
//! | `on_error`     | downstream gets the callback error; the original is dropped       |
//! | `on_complete`  | downstream gets the error instead of completion                   |
//! | `on_request`, `on_cancel` | the error is dropped; the request or cancel still proceeds |
//!
//! A [`FlowError::Fatal`] returned by any callback panics instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::observability::messages::operators::CallbackFailed;
use crate::observability::messages::StructuredLog;
use crate::operators::{fail_subscribe, Upstream};
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

type Hook = Arc<dyn Fn() -> Result<(), FlowError> + Send + Sync>;
type ValueHook<T> = Arc<dyn Fn(&T) -> Result<(), FlowError> + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&FlowError) -> Result<(), FlowError> + Send + Sync>;
type RequestHook = Arc<dyn Fn(u64) -> Result<(), FlowError> + Send + Sync>;

/// Callbacks invoked by a peek stage. Unset callbacks are skipped.
pub struct PeekCallbacks<T> {
    pub on_subscribe: Option<Hook>,
    pub on_next: Option<ValueHook<T>>,
    pub on_error: Option<ErrorHook>,
    pub on_complete: Option<Hook>,
    pub on_cancel: Option<Hook>,
    pub on_request: Option<RequestHook>,
}

impl<T> Default for PeekCallbacks<T> {
    fn default() -> Self {
        Self {
            on_subscribe: None,
            on_next: None,
            on_error: None,
            on_complete: None,
            on_cancel: None,
            on_request: None,
        }
    }
}

pub struct PeekPublisher<T> {
    source: PublisherRef<T>,
    callbacks: Arc<PeekCallbacks<T>>,
}

impl<T> PeekPublisher<T> {
    pub fn new(source: PublisherRef<T>, callbacks: PeekCallbacks<T>) -> Self {
        Self {
            source,
            callbacks: Arc::new(callbacks),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for PeekPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let callbacks = Arc::clone(&self.callbacks);
        let subscriber = Arc::new_cyclic(|me| PeekSubscriber {
            me: me.clone(),
            actual,
            callbacks,
            upstream: Upstream::new(),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct PeekSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    callbacks: Arc<PeekCallbacks<T>>,
    upstream: Upstream<T>,
    done: AtomicBool,
    cancelled: AtomicBool,
}

fn failed(stage: &str, error: &FlowError) {
    CallbackFailed { stage, error }.log();
}

impl<T: Send + 'static> Subscriber<T> for PeekSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if let Some(hook) = &self.callbacks.on_subscribe {
            if let Err(e) = hook() {
                let e = throw_if_fatal(e);
                failed("do_on_subscribe", &e);
                subscription.cancel();
                self.done.store(true, Ordering::Release);
                fail_subscribe(&self.actual, e);
                return;
            }
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
        if let Some(hook) = &self.callbacks.on_next {
            if let Err(e) = hook(&value) {
                let e = throw_if_fatal(e);
                failed("do_on_next", &e);
                self.upstream.cancel();
                self.on_error(e);
                return;
            }
        }
        self.actual.on_next(value);
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        self.upstream.release();
        if let Some(hook) = &self.callbacks.on_error {
            if let Err(e) = hook(&error) {
                let e = throw_if_fatal(e);
                failed("do_on_error", &e);
                hooks::error_dropped(&error);
                self.actual.on_error(e);
                return;
            }
        }
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        if let Some(hook) = &self.callbacks.on_complete {
            if let Err(e) = hook() {
                let e = throw_if_fatal(e);
                failed("do_on_complete", &e);
                self.actual.on_error(e);
                return;
            }
        }
        self.actual.on_complete();
    }
}

impl<T: Send + 'static> Subscription<T> for PeekSubscriber<T> {
    fn request(&self, n: u64) {
        if let Some(hook) = &self.callbacks.on_request {
            if let Err(e) = hook(n) {
                let e = throw_if_fatal(e);
                failed("do_on_request", &e);
                hooks::error_dropped(&e);
            }
        }
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hook) = &self.callbacks.on_cancel {
            if let Err(e) = hook() {
                let e = throw_if_fatal(e);
                failed("do_on_cancel", &e);
                hooks::error_dropped(&e);
            }
        }
        self.upstream.cancel();
    }

    fn name(&self) -> &'static str {
        "PeekSubscriber"
    }
}
