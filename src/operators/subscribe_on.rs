// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Subscription-time context switch.
//!
//! Subscribing to upstream is submitted to a worker, optionally after a
//! delay, so the source starts emitting on that worker. Downstream receives
//! its subscription immediately; requests made before upstream is attached
//! are replayed once it is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::FlowError;
use crate::hooks;
use crate::operators::{fail_subscribe, Upstream};
use crate::scheduler::{SchedulerRef, TaskHandle, WorkerRef};
use crate::traits::{
    Disposable, Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef,
};
use crate::utils::sync::locked;

pub struct SubscribeOnPublisher<T> {
    source: PublisherRef<T>,
    scheduler: SchedulerRef,
    delay: Option<Duration>,
}

impl<T> SubscribeOnPublisher<T> {
    pub fn new(source: PublisherRef<T>, scheduler: SchedulerRef) -> Self {
        Self {
            source,
            scheduler,
            delay: None,
        }
    }

    /// Subscribe to `source` only once `delay` elapsed on `scheduler`.
    pub fn delayed(source: PublisherRef<T>, scheduler: SchedulerRef, delay: Duration) -> Self {
        Self {
            source,
            scheduler,
            delay: Some(delay),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for SubscribeOnPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                fail_subscribe(&actual, e);
                return;
            }
        };
        let subscriber = Arc::new(SubscribeOnSubscriber {
            actual: Arc::clone(&actual),
            upstream: Upstream::new(),
            worker: Arc::clone(&worker),
            task: Mutex::new(None),
            done: AtomicBool::new(false),
        });
        actual.on_subscribe(Arc::clone(&subscriber) as Arc<dyn Subscription<T>>);

        let source = Arc::clone(&self.source);
        let target = Arc::clone(&subscriber);
        let task = Box::new(move || source.subscribe(target));
        let scheduled = match self.delay {
            Some(delay) => worker.schedule_after(task, delay),
            None => worker.schedule(task),
        };
        match scheduled {
            Ok(handle) => *locked(&subscriber.task) = Some(handle),
            Err(e) => subscriber.on_error(e),
        }
    }
}

struct SubscribeOnSubscriber<T> {
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    worker: WorkerRef,
    task: Mutex<Option<TaskHandle>>,
    done: AtomicBool,
}

impl<T: Send + 'static> SubscribeOnSubscriber<T> {
    fn shutdown(&self) {
        if let Some(task) = locked(&self.task).take() {
            task.dispose();
        }
        self.worker.dispose();
    }
}

impl<T: Send + 'static> Subscriber<T> for SubscribeOnSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        self.upstream.set(subscription);
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
        self.shutdown();
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        self.shutdown();
        self.actual.on_complete();
    }
}

impl<T: Send + 'static> Subscription<T> for SubscribeOnSubscriber<T> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
        self.shutdown();
    }

    fn name(&self) -> &'static str {
        "SubscribeOnSubscriber"
    }
}
