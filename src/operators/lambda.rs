// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::FlowError;
use crate::hooks;
use crate::signal::UNBOUNDED;
use crate::traits::{Disposable, Subscriber, SubscriptionRef};
use crate::utils::sync::locked;

type OnNext<T> = Box<dyn Fn(T) + Send + Sync>;
type OnError = Box<dyn Fn(FlowError) + Send + Sync>;
type OnComplete = Box<dyn Fn() + Send + Sync>;

/// Terminal consumer built from closures. Requests unbounded demand on
/// subscription; disposing it cancels the run.
pub struct LambdaSubscriber<T> {
    on_next: OnNext<T>,
    on_error: OnError,
    on_complete: OnComplete,
    subscription: Mutex<Option<SubscriptionRef<T>>>,
    disposed: AtomicBool,
}

impl<T> LambdaSubscriber<T> {
    pub fn new(on_next: OnNext<T>, on_error: OnError, on_complete: OnComplete) -> Self {
        Self {
            on_next,
            on_error,
            on_complete,
            subscription: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for LambdaSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if self.disposed.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        *locked(&self.subscription) = Some(subscription.clone());
        subscription.request(UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        if self.disposed.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        (self.on_next)(value);
    }

    fn on_error(&self, error: FlowError) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        locked(&self.subscription).take();
        (self.on_error)(error);
    }

    fn on_complete(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        locked(&self.subscription).take();
        (self.on_complete)();
    }
}

impl<T: Send + 'static> Disposable for LambdaSubscriber<T> {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = locked(&self.subscription).take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
