// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Time-driven stages: per-value delay and inactivity timeout.
//!
//! Timers run on a worker of the stage's scheduler, so under an installed
//! virtual clock they fire only when the clock is advanced.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::errors::FlowError;
use crate::hooks;
use crate::operators::{fail_subscribe, Upstream};
use crate::scheduler::{SchedulerRef, TaskHandle, WorkerRef};
use crate::signal::{demand, Demand};
use crate::traits::{
    Disposable, Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef,
};
use crate::utils::sync::locked;

/// Shifts every value by `delay`, one value at a time. Upstream is asked for
/// the next value only after the previous one was delivered.
pub struct DelayElementsPublisher<T> {
    source: PublisherRef<T>,
    delay: Duration,
    scheduler: SchedulerRef,
}

impl<T> DelayElementsPublisher<T> {
    pub fn new(source: PublisherRef<T>, delay: Duration, scheduler: SchedulerRef) -> Self {
        Self {
            source,
            delay,
            scheduler,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for DelayElementsPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                fail_subscribe(&actual, e);
                return;
            }
        };
        let delay = self.delay;
        let subscriber = Arc::new_cyclic(|me| DelayElementsSubscriber {
            me: me.clone(),
            actual,
            upstream: Upstream::new(),
            worker,
            delay,
            demand: Demand::new(),
            state: Mutex::new(DelayState {
                parked: None,
                in_flight: false,
                upstream_done: false,
            }),
            done: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct DelayState<T> {
    /// A value whose delay elapsed while downstream had no demand.
    parked: Option<T>,
    in_flight: bool,
    upstream_done: bool,
}

struct DelayElementsSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    worker: WorkerRef,
    delay: Duration,
    demand: Demand,
    state: Mutex<DelayState<T>>,
    done: AtomicBool,
}

impl<T: Send + 'static> DelayElementsSubscriber<T> {
    fn elapsed(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        if self.demand.get() == 0 {
            locked(&self.state).parked = Some(value);
            if self.demand.get() == 0 {
                return;
            }
            let parked = locked(&self.state).parked.take();
            if let Some(value) = parked {
                self.emit(value);
            }
            return;
        }
        self.emit(value);
    }

    fn emit(&self, value: T) {
        self.demand.produced(1);
        self.actual.on_next(value);
        let finished = {
            let mut state = locked(&self.state);
            state.in_flight = false;
            state.upstream_done
        };
        if finished {
            self.finish(None);
        } else {
            self.upstream.request(1);
        }
    }

    fn finish(&self, error: Option<FlowError>) {
        if self.done.swap(true, Ordering::AcqRel) {
            if let Some(e) = error {
                hooks::error_dropped(&e);
            }
            return;
        }
        self.upstream.release();
        self.worker.dispose();
        match error {
            Some(e) => self.actual.on_error(e),
            None => self.actual.on_complete(),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for DelayElementsSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.actual.on_subscribe(me);
        }
        self.upstream.request(1);
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        locked(&self.state).in_flight = true;
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let scheduled = self
            .worker
            .schedule_after(Box::new(move || me.elapsed(value)), self.delay);
        if let Err(e) = scheduled {
            self.upstream.cancel();
            self.finish(Some(e));
        }
    }

    fn on_error(&self, error: FlowError) {
        locked(&self.state).parked = None;
        self.finish(Some(error));
    }

    fn on_complete(&self) {
        let idle = {
            let mut state = locked(&self.state);
            state.upstream_done = true;
            !state.in_flight
        };
        if idle {
            self.finish(None);
        }
    }
}

impl<T: Send + 'static> Subscription<T> for DelayElementsSubscriber<T> {
    fn request(&self, n: u64) {
        if let Err(e) = demand::validate(n) {
            self.upstream.cancel();
            self.finish(Some(e));
            return;
        }
        self.demand.add(n);
        let parked = locked(&self.state).parked.take();
        if let Some(value) = parked {
            self.emit(value);
        }
    }

    fn cancel(&self) {
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
        self.worker.dispose();
        locked(&self.state).parked = None;
    }

    fn name(&self) -> &'static str {
        "DelayElementsSubscriber"
    }
}

/// Fails with [`FlowError::Timeout`] when no value or terminal signal arrives
/// within `window`, measured from subscription and then from each value.
pub struct TimeoutPublisher<T> {
    source: PublisherRef<T>,
    window: Duration,
    scheduler: SchedulerRef,
}

impl<T> TimeoutPublisher<T> {
    pub fn new(source: PublisherRef<T>, window: Duration, scheduler: SchedulerRef) -> Self {
        Self {
            source,
            window,
            scheduler,
        }
    }
}

/// Index value marking a run that already terminated or timed out.
const CLOSED: u64 = u64::MAX;

impl<T: Send + 'static> Publisher<T> for TimeoutPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                fail_subscribe(&actual, e);
                return;
            }
        };
        let window = self.window;
        let subscriber = Arc::new_cyclic(|me| TimeoutSubscriber {
            me: me.clone(),
            actual,
            upstream: Upstream::new(),
            worker,
            window,
            index: AtomicU64::new(0),
            timer: Mutex::new(None),
        });
        self.source.subscribe(subscriber);
    }
}

/// Each value bumps `index`; a timer only fires if the index it was armed
/// with is still current, so a timer and a value never both win.
struct TimeoutSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    worker: WorkerRef,
    window: Duration,
    index: AtomicU64,
    timer: Mutex<Option<TaskHandle>>,
}

impl<T: Send + 'static> TimeoutSubscriber<T> {
    fn arm(&self, index: u64) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        match self
            .worker
            .schedule_after(Box::new(move || me.fire(index)), self.window)
        {
            Ok(handle) => {
                if let Some(previous) = locked(&self.timer).replace(handle) {
                    previous.dispose();
                }
            }
            Err(e) => {
                if self.close() {
                    self.upstream.cancel();
                    self.actual.on_error(e);
                }
            }
        }
    }

    fn fire(&self, index: u64) {
        if self
            .index
            .compare_exchange(index, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.upstream.cancel();
            self.worker.dispose();
            self.actual.on_error(FlowError::Timeout(self.window));
        }
    }

    /// Claim the terminal slot. Returns `false` if a timer or terminal won.
    fn close(&self) -> bool {
        if self.index.swap(CLOSED, Ordering::AcqRel) == CLOSED {
            return false;
        }
        if let Some(timer) = locked(&self.timer).take() {
            timer.dispose();
        }
        self.worker.dispose();
        true
    }
}

impl<T: Send + 'static> Subscriber<T> for TimeoutSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.actual.on_subscribe(me);
        }
        self.arm(0);
    }

    fn on_next(&self, value: T) {
        let index = self.index.load(Ordering::Acquire);
        if index == CLOSED
            || self
                .index
                .compare_exchange(index, index + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            hooks::value_dropped(value);
            return;
        }
        if let Some(timer) = locked(&self.timer).take() {
            timer.dispose();
        }
        self.actual.on_next(value);
        self.arm(index + 1);
    }

    fn on_error(&self, error: FlowError) {
        if !self.close() {
            hooks::error_dropped(&error);
            return;
        }
        self.upstream.release();
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        if !self.close() {
            return;
        }
        self.upstream.release();
        self.actual.on_complete();
    }
}

impl<T: Send + 'static> Subscription<T> for TimeoutSubscriber<T> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.close();
        self.upstream.cancel();
    }

    fn name(&self) -> &'static str {
        "TimeoutSubscriber"
    }
}
