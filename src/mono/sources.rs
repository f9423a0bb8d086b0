// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Origin publishers for bounded sequences.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::{throw_if_fatal, FlowError};
use crate::operators::{fail_subscribe, DeferredScalar};
use crate::scheduler::{SchedulerRef, TaskHandle, WorkerRef};
use crate::signal::demand;
use crate::traits::{Disposable, Publisher, SubscriberRef, Subscription};
use crate::utils::sync::locked;

type Callable<T> = Arc<dyn Fn() -> Result<Option<T>, FlowError> + Send + Sync>;

/// Runs a fallible supplier once per subscriber. `Ok(None)` completes empty.
pub struct CallablePublisher<T> {
    callable: Callable<T>,
}

impl<T> CallablePublisher<T> {
    pub fn new(callable: Callable<T>) -> Self {
        Self { callable }
    }
}

impl<T: Send + 'static> Publisher<T> for CallablePublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let scalar = Arc::new(DeferredScalar::new(Arc::clone(&actual)));
        actual.on_subscribe(Arc::clone(&scalar) as Arc<dyn Subscription<T>>);
        if scalar.is_cancelled() {
            return;
        }
        match (self.callable)() {
            Ok(Some(value)) => scalar.complete(value),
            Ok(None) => scalar.complete_empty(),
            Err(e) => scalar.error(throw_if_fatal(e)),
        }
    }
}

/// Emits `0` once, `delay` after subscription.
pub struct DelayPublisher {
    delay: Duration,
    scheduler: SchedulerRef,
}

impl DelayPublisher {
    pub fn new(delay: Duration, scheduler: SchedulerRef) -> Self {
        Self { delay, scheduler }
    }
}

impl Publisher<u64> for DelayPublisher {
    fn subscribe(&self, actual: SubscriberRef<u64>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                fail_subscribe(&actual, e);
                return;
            }
        };
        let timer = Arc::new(DelayTimer {
            actual: Arc::clone(&actual),
            worker: Arc::clone(&worker),
            requested: AtomicBool::new(false),
            done: AtomicBool::new(false),
            handle: Mutex::new(None),
        });
        actual.on_subscribe(Arc::clone(&timer) as Arc<dyn Subscription<u64>>);

        let fire = Arc::clone(&timer);
        match worker.schedule_after(Box::new(move || fire.fire()), self.delay) {
            Ok(handle) => {
                if timer.done.load(Ordering::Acquire) {
                    handle.dispose();
                } else {
                    *locked(&timer.handle) = Some(handle);
                }
            }
            Err(e) => {
                if !timer.done.swap(true, Ordering::AcqRel) {
                    actual.on_error(e);
                }
            }
        }
    }
}

struct DelayTimer {
    actual: SubscriberRef<u64>,
    worker: WorkerRef,
    requested: AtomicBool,
    done: AtomicBool,
    handle: Mutex<Option<TaskHandle>>,
}

impl DelayTimer {
    fn fire(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.worker.dispose();
        if self.requested.load(Ordering::Acquire) {
            self.actual.on_next(0);
            self.actual.on_complete();
        } else {
            self.actual.on_error(FlowError::Overflow(
                "Could not emit value due to lack of requests".to_string(),
            ));
        }
    }
}

impl Subscription<u64> for DelayTimer {
    fn request(&self, n: u64) {
        match demand::validate(n) {
            Ok(()) => self.requested.store(true, Ordering::Release),
            Err(e) => {
                if !self.done.swap(true, Ordering::AcqRel) {
                    self.cancel_timer();
                    self.actual.on_error(e);
                }
            }
        }
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.cancel_timer();
    }

    fn name(&self) -> &'static str {
        "DelaySubscription"
    }
}

impl DelayTimer {
    fn cancel_timer(&self) {
        if let Some(handle) = locked(&self.handle).take() {
            handle.dispose();
        }
        self.worker.dispose();
    }
}
