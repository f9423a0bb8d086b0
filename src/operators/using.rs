// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Resource-scoped sequences.
//!
//! The resource is acquired per subscription, a sequence is derived from it,
//! and the resource is released exactly once when that sequence terminates or
//! is cancelled. Release runs before the terminal signal is forwarded, so a
//! downstream observer of completion can rely on the resource being gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::hooks;
use crate::observability::messages::operators::ResourceReleased;
use crate::observability::messages::StructuredLog;
use crate::operators::{fail_subscribe, Upstream};
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};
use crate::utils::sync::locked;

pub type Acquire<R> = Arc<dyn Fn() -> Result<R, FlowError> + Send + Sync>;
pub type Derive<R, T> = Arc<dyn Fn(&R) -> PublisherRef<T> + Send + Sync>;
pub type Release<R> = Arc<dyn Fn(R) + Send + Sync>;

pub struct UsingPublisher<T, R> {
    acquire: Acquire<R>,
    derive: Derive<R, T>,
    release: Release<R>,
}

impl<T, R> UsingPublisher<T, R> {
    pub fn new(acquire: Acquire<R>, derive: Derive<R, T>, release: Release<R>) -> Self {
        Self {
            acquire,
            derive,
            release,
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Publisher<T> for UsingPublisher<T, R> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let resource = match (self.acquire)() {
            Ok(resource) => resource,
            Err(e) => {
                fail_subscribe(&actual, throw_if_fatal(e));
                return;
            }
        };
        let source = (self.derive)(&resource);
        let release = Arc::clone(&self.release);
        let subscriber = Arc::new_cyclic(|me| UsingSubscriber {
            me: me.clone(),
            actual,
            upstream: Upstream::new(),
            resource: Mutex::new(Some(resource)),
            release,
            done: AtomicBool::new(false),
        });
        source.subscribe(subscriber);
    }
}

struct UsingSubscriber<T, R> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    resource: Mutex<Option<R>>,
    release: Release<R>,
    done: AtomicBool,
}

impl<T: Send + 'static, R: Send + 'static> UsingSubscriber<T, R> {
    fn release_once(&self, trigger: &str) {
        let resource = locked(&self.resource).take();
        if let Some(resource) = resource {
            (self.release)(resource);
            ResourceReleased { trigger }.log();
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<T> for UsingSubscriber<T, R> {
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
        self.release_once("error");
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        self.release_once("complete");
        self.actual.on_complete();
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscription<T> for UsingSubscriber<T, R> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
        self.release_once("cancel");
    }

    fn name(&self) -> &'static str {
        "UsingSubscriber"
    }
}
