// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Retry governed by a companion sequence.
//!
//! Every upstream failure is pushed into a flux of errors handed to a
//! user-supplied factory. The resulting companion decides what happens next:
//!
//! * a value from the companion re-subscribes to the original upstream
//! * companion completion completes downstream
//! * a companion error fails downstream with that error

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::{throw_if_fatal, FlowError};
use crate::flux::Flux;
use crate::hooks;
use crate::observability::messages::operators::{CompanionTerminated, RetryAttempt};
use crate::observability::messages::StructuredLog;
use crate::operators::{SubscriptionArbiter, Upstream};
use crate::signal::UNBOUNDED;
use crate::sinks::{self, UnicastSink};
use crate::traits::{Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

pub type CompanionFactory<R> = Arc<dyn Fn(Flux<FlowError>) -> Flux<R> + Send + Sync>;

pub struct RetryWhenPublisher<T, R> {
    source: PublisherRef<T>,
    factory: CompanionFactory<R>,
}

impl<T, R> RetryWhenPublisher<T, R> {
    pub fn new(source: PublisherRef<T>, factory: CompanionFactory<R>) -> Self {
        Self { source, factory }
    }
}

impl<T: Send + 'static, R: Send + 'static> Publisher<T> for RetryWhenPublisher<T, R> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let (errors, error_flux) = sinks::unicast::<FlowError>();
        let companion = (self.factory)(error_flux);

        let source = Arc::clone(&self.source);
        let main: Arc<RetryWhenMain<T, R>> = Arc::new_cyclic(|me| RetryWhenMain {
            me: me.clone(),
            actual: Arc::clone(&actual),
            source,
            arbiter: SubscriptionArbiter::new(),
            errors,
            companion: Upstream::new(),
            attempts: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        });

        actual.on_subscribe(Arc::clone(&main) as Arc<dyn Subscription<T>>);
        companion.subscribe(Arc::new(CompanionSubscriber {
            main: Arc::clone(&main),
            _marker: PhantomData,
        }));
        if !main.done.load(Ordering::Acquire) {
            main.resubscribe();
        }
    }
}

struct RetryWhenMain<T, R> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    source: PublisherRef<T>,
    arbiter: SubscriptionArbiter<T>,
    errors: UnicastSink<FlowError>,
    companion: Upstream<R>,
    attempts: AtomicU64,
    wip: AtomicUsize,
    done: AtomicBool,
}

impl<T: Send + 'static, R: Send + 'static> RetryWhenMain<T, R> {
    fn resubscribe(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.arbiter.is_cancelled() || self.done.load(Ordering::Acquire) {
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

    fn companion_next(&self) {
        self.resubscribe();
    }

    fn companion_terminated(&self, error: Option<FlowError>) {
        let outcome = if error.is_some() { "error" } else { "complete" };
        if self.done.swap(true, Ordering::AcqRel) {
            if let Some(e) = error {
                hooks::error_dropped(&e);
            }
            return;
        }
        CompanionTerminated {
            outcome,
            attempts: self.attempts.load(Ordering::Acquire),
        }
        .log();
        self.arbiter.cancel();
        self.companion.release();
        match error {
            Some(e) => self.actual.on_error(e),
            None => self.actual.on_complete(),
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<T> for RetryWhenMain<T, R> {
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
        RetryAttempt {
            attempt,
            max_attempts: None,
            error: &error,
        }
        .log();
        self.arbiter.release();
        if let Err(rejected) = self.errors.next(error) {
            hooks::error_dropped(&rejected);
        }
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.arbiter.release();
        self.companion.cancel();
        self.actual.on_complete();
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscription<T> for RetryWhenMain<T, R> {
    fn request(&self, n: u64) {
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        self.arbiter.cancel();
        self.companion.cancel();
    }

    fn name(&self) -> &'static str {
        "RetryWhenMainSubscriber"
    }
}

struct CompanionSubscriber<T, R> {
    main: Arc<RetryWhenMain<T, R>>,
    _marker: PhantomData<fn() -> R>,
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<R> for CompanionSubscriber<T, R> {
    fn on_subscribe(&self, subscription: SubscriptionRef<R>) {
        if self.main.companion.set(subscription) {
            self.main.companion.request(UNBOUNDED);
        }
    }

    fn on_next(&self, _value: R) {
        self.main.companion_next();
    }

    fn on_error(&self, error: FlowError) {
        self.main.companion_terminated(Some(error));
    }

    fn on_complete(&self) {
        self.main.companion_terminated(None);
    }
}
