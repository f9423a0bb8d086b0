// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Mid-chain context switch.
//!
//! Upstream signals are queued and re-emitted downstream from a drain loop
//! running on a worker. Upstream is asked for `prefetch` values ahead and
//! replenished each time three quarters of them were consumed. An upstream
//! error waits until every queued value was delivered.
//!
//! When upstream offers a queue, the stage asks for fusion with a thread
//! barrier and drains upstream's queue directly from the worker:
//! * `SYNC` - no requests are made; an exhausted queue means completion
//! * `ASYNC` - `on_available` schedules the drain in place of `on_next`
//!
//! Downstream may fuse with the stage itself in `ASYNC` mode. The worker
//! then only signals `on_available` and the terminal signal; downstream
//! polls values out of the stage's queue (or upstream's, when fused) at its
//! own pace.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::errors::FlowError;
use crate::hooks;
use crate::operators::{fail_subscribe, Upstream};
use crate::scheduler::{SchedulerRef, WorkerRef};
use crate::signal::{demand, Demand, UNBOUNDED};
use crate::traits::{
    FusionMode, Publisher, PublisherRef, QueueSubscription, Subscriber, SubscriberRef,
    Subscription, SubscriptionRef,
};
use crate::utils::sync::locked;

pub struct PublishOnPublisher<T> {
    source: PublisherRef<T>,
    scheduler: SchedulerRef,
    prefetch: usize,
}

impl<T> PublishOnPublisher<T> {
    pub fn new(source: PublisherRef<T>, scheduler: SchedulerRef, prefetch: usize) -> Self {
        Self {
            source,
            scheduler,
            prefetch: prefetch.max(1),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for PublishOnPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                fail_subscribe(&actual, e);
                return;
            }
        };
        let prefetch = self.prefetch as u64;
        let limit = if prefetch == UNBOUNDED {
            UNBOUNDED
        } else {
            (prefetch - (prefetch >> 2)).max(1)
        };
        let subscriber = Arc::new_cyclic(|me| PublishOnSubscriber {
            me: me.clone(),
            actual,
            upstream: Upstream::new(),
            worker,
            queue: Mutex::new(VecDeque::new()),
            mode: AtomicU8::new(FusionMode::NONE.bits()),
            output_fused: AtomicBool::new(false),
            prefetch,
            limit,
            consumed: Mutex::new(0),
            requested: Demand::new(),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        });
        self.source.subscribe(subscriber);
    }
}

struct PublishOnSubscriber<T> {
    me: Weak<Self>,
    actual: SubscriberRef<T>,
    upstream: Upstream<T>,
    worker: WorkerRef,
    queue: Mutex<VecDeque<T>>,
    mode: AtomicU8,
    output_fused: AtomicBool,
    prefetch: u64,
    limit: u64,
    consumed: Mutex<u64>,
    requested: Demand,
    wip: AtomicUsize,
    done: AtomicBool,
    error: Mutex<Option<FlowError>>,
    cancelled: AtomicBool,
}

enum Polled<T> {
    Value(T),
    Empty,
    Failed(FlowError),
}

impl<T: Send + 'static> PublishOnSubscriber<T> {
    fn mode(&self) -> FusionMode {
        match self.mode.load(Ordering::Acquire) {
            m if m == FusionMode::SYNC.bits() => FusionMode::SYNC,
            m if m == FusionMode::ASYNC.bits() => FusionMode::ASYNC,
            _ => FusionMode::NONE,
        }
    }

    fn schedule(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        if let Err(e) = self.worker.schedule(Box::new(move || me.drain())) {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            self.discard();
            self.terminate(Some(e));
        }
    }

    fn poll_source(&self) -> Polled<T> {
        if self.mode() == FusionMode::NONE {
            return match locked(&self.queue).pop_front() {
                Some(v) => Polled::Value(v),
                None => Polled::Empty,
            };
        }
        let Some(upstream) = self.upstream.get() else {
            return Polled::Empty;
        };
        let Some(queue) = upstream.as_queue() else {
            return Polled::Empty;
        };
        match queue.poll() {
            Ok(Some(v)) => Polled::Value(v),
            Ok(None) => Polled::Empty,
            Err(e) => Polled::Failed(e),
        }
    }

    fn queue_is_empty(&self) -> bool {
        if self.mode() == FusionMode::NONE {
            return locked(&self.queue).is_empty();
        }
        self.upstream
            .get()
            .and_then(|s| s.as_queue().map(|q| q.is_empty()))
            .unwrap_or(true)
    }

    fn discard(&self) {
        locked(&self.queue).clear();
        if self.mode() != FusionMode::NONE {
            if let Some(s) = self.upstream.get() {
                if let Some(q) = s.as_queue() {
                    q.clear();
                }
            }
        }
    }

    fn replenish(&self) {
        if self.mode() == FusionMode::SYNC || self.limit == UNBOUNDED {
            return;
        }
        let request = {
            let mut consumed = locked(&self.consumed);
            *consumed += 1;
            if *consumed == self.limit {
                *consumed = 0;
                true
            } else {
                false
            }
        };
        if request {
            self.upstream.request(self.limit);
        }
    }

    fn terminate(&self, error: Option<FlowError>) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            if let Some(e) = error {
                hooks::error_dropped(&e);
            }
            return;
        }
        if !self.output_fused.load(Ordering::Acquire) {
            self.upstream.release();
        }
        self.worker.dispose();
        match error {
            Some(e) => self.actual.on_error(e),
            None => self.actual.on_complete(),
        }
    }

    /// Runs on the worker. Only one drain is active at a time.
    fn drain(&self) {
        if self.output_fused.load(Ordering::Acquire) {
            self.drain_fused();
            return;
        }
        let sync = self.mode() == FusionMode::SYNC;
        let mut missed = 1;
        loop {
            let requested = self.requested.get();
            let mut emitted = 0u64;
            while requested == UNBOUNDED || emitted < requested {
                if self.cancelled.load(Ordering::Acquire) {
                    self.discard();
                    return;
                }
                let done = self.done.load(Ordering::Acquire);
                match self.poll_source() {
                    Polled::Failed(e) => {
                        self.upstream.cancel();
                        self.discard();
                        self.terminate(Some(e));
                        return;
                    }
                    Polled::Empty => {
                        if sync || done {
                            let error = locked(&self.error).take();
                            self.terminate(error);
                            return;
                        }
                        break;
                    }
                    Polled::Value(v) => {
                        self.actual.on_next(v);
                        emitted += 1;
                        self.replenish();
                    }
                }
            }

            if !sync && requested != UNBOUNDED && emitted == requested {
                if self.cancelled.load(Ordering::Acquire) {
                    self.discard();
                    return;
                }
                if self.done.load(Ordering::Acquire) && self.queue_is_empty() {
                    let error = locked(&self.error).take();
                    self.terminate(error);
                    return;
                }
            }
            if sync && emitted == requested && self.queue_is_empty() {
                let error = locked(&self.error).take();
                self.terminate(error);
                return;
            }

            if emitted > 0 {
                self.requested.produced(emitted);
            }
            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                break;
            }
            missed = remaining;
        }
    }

    /// Drain for a fused downstream: announce availability, then terminate
    /// once upstream is done. Downstream holds back the terminal signal
    /// until it polled the queue dry.
    fn drain_fused(&self) {
        let mut missed = 1;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.discard();
                return;
            }
            let done = self.done.load(Ordering::Acquire);
            self.actual.on_available();
            if done {
                let error = locked(&self.error).take();
                self.terminate(error);
                return;
            }
            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                break;
            }
            missed = remaining;
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for PublishOnSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        let granted = subscription
            .as_queue()
            .map(|q| q.request_fusion(FusionMode::ANY | FusionMode::THREAD_BARRIER))
            .unwrap_or(FusionMode::NONE);
        if !self.upstream.set(subscription) {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        if granted == FusionMode::SYNC {
            self.mode.store(FusionMode::SYNC.bits(), Ordering::Release);
            self.done.store(true, Ordering::Release);
            self.actual.on_subscribe(me);
            return;
        }
        if granted == FusionMode::ASYNC {
            self.mode.store(FusionMode::ASYNC.bits(), Ordering::Release);
        }
        self.actual.on_subscribe(me);
        self.upstream.request(self.prefetch);
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        if self.mode() == FusionMode::ASYNC {
            self.schedule();
            return;
        }
        locked(&self.queue).push_back(value);
        self.schedule();
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        *locked(&self.error) = Some(error);
        self.schedule();
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.schedule();
    }

    fn on_available(&self) {
        self.schedule();
    }
}

impl<T: Send + 'static> Subscription<T> for PublishOnSubscriber<T> {
    fn request(&self, n: u64) {
        if let Err(e) = demand::validate(n) {
            self.upstream.cancel();
            *locked(&self.error) = Some(e);
            self.done.store(true, Ordering::Release);
            self.discard();
            self.schedule();
            return;
        }
        self.requested.add(n);
        self.schedule();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.cancel();
        self.worker.dispose();
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.discard();
        }
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<T>> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "PublishOnSubscriber"
    }
}

impl<T: Send + 'static> QueueSubscription<T> for PublishOnSubscriber<T> {
    /// Only `ASYNC`: values are handed over across the worker boundary.
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.contains(FusionMode::ASYNC) {
            self.output_fused.store(true, Ordering::Release);
            FusionMode::ASYNC
        } else {
            FusionMode::NONE
        }
    }

    fn poll(&self) -> Result<Option<T>, FlowError> {
        match self.poll_source() {
            Polled::Value(v) => {
                self.replenish();
                Ok(Some(v))
            }
            Polled::Empty => Ok(None),
            Polled::Failed(e) => Err(e),
        }
    }

    fn is_empty(&self) -> bool {
        self.queue_is_empty()
    }

    fn size(&self) -> usize {
        if self.mode() == FusionMode::NONE {
            return locked(&self.queue).len();
        }
        self.upstream
            .get()
            .and_then(|s| s.as_queue().map(|q| q.size()))
            .unwrap_or(0)
    }

    fn clear(&self) {
        self.discard();
    }
}
