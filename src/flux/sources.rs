// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Origin publishers for unbounded sequences.

use std::iter::Peekable;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::FlowError;
use crate::operators::{complete_subscribe, fail_subscribe};
use crate::scheduler::{SchedulerRef, TaskHandle, WorkerRef};
use crate::signal::{demand, Demand};
use crate::traits::{
    Disposable, EmptySubscription, FusionMode, Publisher, PublisherRef, QueueSubscription,
    SubscriberRef, Subscription,
};
use crate::utils::sync::locked;

/// Replays a cloneable iterable for every subscriber.
pub struct IterablePublisher<I> {
    source: I,
}

impl<I> IterablePublisher<I> {
    pub fn new(source: I) -> Self {
        Self { source }
    }
}

impl<I> Publisher<I::Item> for IterablePublisher<I>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe(&self, actual: SubscriberRef<I::Item>) {
        let mut iter = self.source.clone().into_iter().peekable();
        if iter.peek().is_none() {
            complete_subscribe(&actual);
            return;
        }
        let subscription = Arc::new(IterableSubscription {
            actual: Arc::clone(&actual),
            iter: Mutex::new(Some(iter)),
            demand: Demand::new(),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            invalid: Mutex::new(None),
        });
        actual.on_subscribe(subscription);
    }
}

/// Emission is owned by whichever caller moves `wip` off zero; concurrent
/// requests only bump the counter and leave the loop to that owner.
struct IterableSubscription<It: Iterator> {
    actual: SubscriberRef<It::Item>,
    iter: Mutex<Option<Peekable<It>>>,
    demand: Demand,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    invalid: Mutex<Option<FlowError>>,
}

impl<It> IterableSubscription<It>
where
    It: Iterator + Send,
    It::Item: Send + 'static,
{
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            loop {
                if self.cancelled.load(Ordering::Acquire) {
                    self.clear();
                    return;
                }
                let invalid = locked(&self.invalid).take();
                if let Some(error) = invalid {
                    self.cancelled.store(true, Ordering::Release);
                    self.clear();
                    self.actual.on_error(error);
                    return;
                }
                if self.demand.get() == 0 {
                    break;
                }
                let next = {
                    let mut iter = locked(&self.iter);
                    iter.as_mut()
                        .and_then(|it| it.next().map(|v| (v, it.peek().is_none())))
                };
                let Some((value, last)) = next else {
                    self.cancelled.store(true, Ordering::Release);
                    self.actual.on_complete();
                    return;
                };
                self.demand.produced(1);
                self.actual.on_next(value);
                if last {
                    if !self.cancelled.swap(true, Ordering::AcqRel) {
                        self.clear();
                        self.actual.on_complete();
                    }
                    return;
                }
            }
            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                break;
            }
            missed = remaining;
        }
    }
}

impl<It> Subscription<It::Item> for IterableSubscription<It>
where
    It: Iterator + Send,
    It::Item: Send + 'static,
{
    fn request(&self, n: u64) {
        if let Err(e) = demand::validate(n) {
            *locked(&self.invalid) = Some(e);
        } else {
            self.demand.add(n);
        }
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<It::Item>> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "IterableSubscription"
    }
}

impl<It> QueueSubscription<It::Item> for IterableSubscription<It>
where
    It: Iterator + Send,
    It::Item: Send + 'static,
{
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.contains(FusionMode::SYNC) {
            FusionMode::SYNC
        } else {
            FusionMode::NONE
        }
    }

    fn poll(&self) -> Result<Option<It::Item>, FlowError> {
        Ok(locked(&self.iter).as_mut().and_then(|it| it.next()))
    }

    fn is_empty(&self) -> bool {
        locked(&self.iter)
            .as_mut()
            .map_or(true, |it| it.peek().is_none())
    }

    fn size(&self) -> usize {
        locked(&self.iter)
            .as_ref()
            .map_or(0, |it| it.size_hint().0)
    }

    fn clear(&self) {
        *locked(&self.iter) = None;
    }
}

/// Completes right after subscription.
pub struct EmptyPublisher<T>(PhantomData<fn() -> T>);

impl<T> EmptyPublisher<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for EmptyPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Publisher<T> for EmptyPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        complete_subscribe(&actual);
    }
}

/// Fails right after subscription.
pub struct ErrorPublisher<T> {
    error: FlowError,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ErrorPublisher<T> {
    pub fn new(error: FlowError) -> Self {
        Self {
            error,
            _marker: PhantomData,
        }
    }
}

impl<T> Publisher<T> for ErrorPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        fail_subscribe(&actual, self.error.clone());
    }
}

/// Subscribes and then stays silent forever.
pub struct NeverPublisher<T>(PhantomData<fn() -> T>);

impl<T> NeverPublisher<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for NeverPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Publisher<T> for NeverPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        actual.on_subscribe(Arc::new(EmptySubscription));
    }
}

/// Builds a fresh upstream per subscriber.
pub struct DeferPublisher<T> {
    supplier: Arc<dyn Fn() -> PublisherRef<T> + Send + Sync>,
}

impl<T> DeferPublisher<T> {
    pub fn new(supplier: Arc<dyn Fn() -> PublisherRef<T> + Send + Sync>) -> Self {
        Self { supplier }
    }
}

impl<T> Publisher<T> for DeferPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        (self.supplier)().subscribe(actual);
    }
}

/// Emits 0, 1, 2, ... once per period on a worker of `scheduler`.
pub struct IntervalPublisher {
    initial_delay: Duration,
    period: Duration,
    scheduler: SchedulerRef,
}

impl IntervalPublisher {
    pub fn new(initial_delay: Duration, period: Duration, scheduler: SchedulerRef) -> Self {
        Self {
            initial_delay,
            period,
            scheduler,
        }
    }
}

impl Publisher<u64> for IntervalPublisher {
    fn subscribe(&self, actual: SubscriberRef<u64>) {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                fail_subscribe(&actual, e);
                return;
            }
        };
        let ticker = Arc::new(IntervalTicker {
            actual: Arc::clone(&actual),
            worker: Arc::clone(&worker),
            demand: Demand::new(),
            count: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            handle: Mutex::new(None),
        });
        actual.on_subscribe(Arc::clone(&ticker) as Arc<dyn Subscription<u64>>);

        let tick = Arc::clone(&ticker);
        match worker.schedule_periodically(
            Arc::new(move || tick.tick()),
            self.initial_delay,
            self.period,
        ) {
            Ok(handle) => {
                if ticker.cancelled.load(Ordering::Acquire) {
                    handle.dispose();
                } else {
                    *locked(&ticker.handle) = Some(handle);
                }
            }
            Err(e) => {
                if !ticker.cancelled.swap(true, Ordering::AcqRel) {
                    actual.on_error(e);
                }
            }
        }
    }
}

struct IntervalTicker {
    actual: SubscriberRef<u64>,
    worker: WorkerRef,
    demand: Demand,
    count: AtomicU64,
    cancelled: AtomicBool,
    handle: Mutex<Option<TaskHandle>>,
}

impl IntervalTicker {
    fn tick(&self) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let count = self.count.load(Ordering::Acquire);
        if self.demand.get() > 0 {
            self.demand.produced(1);
            self.count.store(count + 1, Ordering::Release);
            self.actual.on_next(count);
        } else {
            self.stop();
            self.actual.on_error(FlowError::Overflow(format!(
                "Could not emit tick {} due to lack of requests \
                 (interval doesn't support small downstream requests that replenish slower than the ticks)",
                count
            )));
        }
    }

    fn stop(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = locked(&self.handle).take() {
            handle.dispose();
        }
        self.worker.dispose();
    }
}

impl Subscription<u64> for IntervalTicker {
    fn request(&self, n: u64) {
        match demand::validate(n) {
            Ok(()) => {
                self.demand.add(n);
            }
            Err(e) => {
                if !self.cancelled.load(Ordering::Acquire) {
                    self.stop();
                    self.actual.on_error(e);
                }
            }
        }
    }

    fn cancel(&self) {
        self.stop();
    }

    fn name(&self) -> &'static str {
        "IntervalSubscription"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use crate::traits::Subscriber;

    #[derive(Default)]
    struct Collect {
        signals: Mutex<Vec<String>>,
        subscription: Mutex<Option<Arc<dyn Subscription<i32>>>>,
    }

    impl Subscriber<i32> for Collect {
        fn on_subscribe(&self, subscription: Arc<dyn Subscription<i32>>) {
            self.signals
                .lock()
                .unwrap()
                .push(Signal::<i32>::Subscribe(Arc::clone(&subscription)).to_string());
            *self.subscription.lock().unwrap() = Some(subscription);
        }

        fn on_next(&self, value: i32) {
            self.signals.lock().unwrap().push(Signal::Next(value).to_string());
        }

        fn on_error(&self, error: FlowError) {
            self.signals.lock().unwrap().push(Signal::<i32>::Error(error).to_string());
        }

        fn on_complete(&self) {
            self.signals.lock().unwrap().push(Signal::<i32>::Complete.to_string());
        }
    }

    impl Collect {
        fn request(&self, n: u64) {
            let subscription = self.subscription.lock().unwrap().clone().unwrap();
            subscription.request(n);
        }

        fn signals(&self) -> Vec<String> {
            self.signals.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_iterable_respects_demand() {
        let collect = Arc::new(Collect::default());
        IterablePublisher::new(vec![1, 2, 3]).subscribe(collect.clone());

        assert_eq!(collect.signals(), vec!["onSubscribe(IterableSubscription)"]);
        collect.request(2);
        assert_eq!(collect.signals().len(), 3);
        collect.request(1);
        assert_eq!(
            collect.signals(),
            vec![
                "onSubscribe(IterableSubscription)",
                "onNext(1)",
                "onNext(2)",
                "onNext(3)",
                "onComplete()"
            ]
        );
    }

    #[test]
    fn test_empty_iterable_completes_without_request() {
        let collect = Arc::new(Collect::default());
        IterablePublisher::new(Vec::<i32>::new()).subscribe(collect.clone());
        assert_eq!(
            collect.signals(),
            vec!["onSubscribe(EmptySubscription)", "onComplete()"]
        );
    }

    #[test]
    fn test_zero_request_is_signalled() {
        let collect = Arc::new(Collect::default());
        IterablePublisher::new(vec![1]).subscribe(collect.clone());
        collect.request(0);
        assert_eq!(
            collect.signals().last().unwrap(),
            "onError(request must be strictly positive, got: 0)"
        );
    }

    #[test]
    fn test_cancel_stops_emission() {
        let collect = Arc::new(Collect::default());
        IterablePublisher::new(vec![1, 2, 3]).subscribe(collect.clone());
        collect.request(1);
        collect.subscription.lock().unwrap().clone().unwrap().cancel();
        collect.request(5);
        assert_eq!(
            collect.signals(),
            vec!["onSubscribe(IterableSubscription)", "onNext(1)"]
        );
    }

    #[test]
    fn test_sync_fusion_polls_values() {
        let collect = Arc::new(Collect::default());
        IterablePublisher::new(vec![7, 8]).subscribe(collect.clone());
        let subscription = collect.subscription.lock().unwrap().clone().unwrap();
        let queue = subscription.as_queue().unwrap();

        assert_eq!(queue.request_fusion(FusionMode::ASYNC), FusionMode::NONE);
        assert_eq!(queue.request_fusion(FusionMode::ANY), FusionMode::SYNC);
        assert!(!queue.is_empty());
        assert_eq!(queue.poll().unwrap(), Some(7));
        assert_eq!(queue.poll().unwrap(), Some(8));
        assert_eq!(queue.poll().unwrap(), None);
        assert!(queue.is_empty());
    }
}
