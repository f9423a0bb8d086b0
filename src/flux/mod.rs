// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Unbounded sequences.
//!
//! A [`Flux`] is an immutable description: every operator returns a new flux
//! wrapping the previous one, and nothing runs until [`Flux::subscribe`].
//! Each subscription re-runs the chain from the original source.
//!
//! # Examples
//!
//! ```rust
//! use backflow::flux::Flux;
//!
//! let doubled_evens = Flux::range(1, 10)
//!     .filter(|n| n % 2 == 0)
//!     .map(|n| n * 2)
//!     .take(3);
//! # drop(doubled_evens);
//! ```

pub mod sources;

use std::sync::Arc;
use std::time::Duration;

use crate::config::consts::DEFAULT_PREFETCH;
use crate::errors::FlowError;
use crate::mono::Mono;
use crate::operators::concat::ConcatPublisher;
use crate::operators::filter::FilterPublisher;
use crate::operators::hide::HidePublisher;
use crate::operators::map::MapPublisher;
use crate::operators::peek::{PeekCallbacks, PeekPublisher};
use crate::operators::publish_on::PublishOnPublisher;
use crate::operators::recovery::{MapErrPublisher, ResumePublisher};
use crate::operators::reduce::{ReducePublisher, Reducer};
use crate::operators::retry::RetryPublisher;
use crate::operators::retry_when::RetryWhenPublisher;
use crate::operators::subscribe_on::SubscribeOnPublisher;
use crate::operators::take::TakePublisher;
use crate::operators::timed::{DelayElementsPublisher, TimeoutPublisher};
use crate::operators::using::UsingPublisher;
use crate::operators::LambdaSubscriber;
use crate::scheduler::{SchedulerRef, Schedulers};
use crate::traits::{Disposable, Publisher, PublisherRef, SubscriberRef};

use sources::{
    DeferPublisher, EmptyPublisher, ErrorPublisher, IntervalPublisher, IterablePublisher,
    NeverPublisher,
};

/// A sequence of zero or more values followed by an optional terminal signal.
pub struct Flux<T> {
    publisher: PublisherRef<T>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<T> Publisher<T> for Flux<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.publisher.subscribe(subscriber);
    }
}

impl<T: Send + 'static> From<Mono<T>> for Flux<T> {
    fn from(mono: Mono<T>) -> Self {
        Flux {
            publisher: mono.publisher(),
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    pub fn from_publisher<P: Publisher<T> + 'static>(publisher: P) -> Self {
        Self {
            publisher: Arc::new(publisher),
        }
    }

    pub fn from_publisher_ref(publisher: PublisherRef<T>) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> PublisherRef<T> {
        Arc::clone(&self.publisher)
    }

    /// Replay `iterable` to every subscriber.
    pub fn from_iterable<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_publisher(IterablePublisher::new(iterable))
    }

    pub fn just<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Clone + Sync,
    {
        Self::from_iterable(values.into_iter().collect::<Vec<_>>())
    }

    pub fn empty() -> Self {
        Self::from_publisher(EmptyPublisher::new())
    }

    pub fn error(error: FlowError) -> Self {
        Self::from_publisher(ErrorPublisher::new(error))
    }

    pub fn never() -> Self {
        Self::from_publisher(NeverPublisher::new())
    }

    /// Build the upstream lazily, once per subscriber.
    pub fn defer<F>(supplier: F) -> Self
    where
        F: Fn() -> Flux<T> + Send + Sync + 'static,
    {
        Self::from_publisher(DeferPublisher::new(Arc::new(move || supplier().publisher())))
    }

    /// Sequentially subscribe to each of `sources`.
    pub fn concat(sources: Vec<Flux<T>>) -> Self {
        Self::from_publisher(ConcatPublisher::new(
            sources.into_iter().map(|f| f.publisher).collect(),
        ))
    }

    /// Acquire a resource per subscription, derive a flux from it, and release
    /// it once that flux terminates or is cancelled.
    pub fn using<R, A, D, F>(acquire: A, derive: D, release: F) -> Self
    where
        R: Send + 'static,
        A: Fn() -> Result<R, FlowError> + Send + Sync + 'static,
        D: Fn(&R) -> Flux<T> + Send + Sync + 'static,
        F: Fn(R) + Send + Sync + 'static,
    {
        Self::from_publisher(UsingPublisher::new(
            Arc::new(acquire),
            Arc::new(move |r: &R| derive(r).publisher()),
            Arc::new(release),
        ))
    }

    pub fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.publisher.subscribe(subscriber);
    }

    /// Subscribe with closures and unbounded demand.
    pub fn subscribe_with<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Arc<dyn Disposable>
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(FlowError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let subscriber = Arc::new(LambdaSubscriber::new(
            Box::new(on_next),
            Box::new(on_error),
            Box::new(on_complete),
        ));
        self.publisher.subscribe(Arc::clone(&subscriber) as SubscriberRef<T>);
        subscriber
    }

    pub fn map<U, F>(&self, mapper: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Flux::from_publisher(MapPublisher::new(
            self.publisher(),
            Arc::new(move |v| Ok(mapper(v))),
        ))
    }

    /// Like [`Flux::map`], with a mapper that may fail the run.
    pub fn try_map<U, F>(&self, mapper: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, FlowError> + Send + Sync + 'static,
    {
        Flux::from_publisher(MapPublisher::new(self.publisher(), Arc::new(mapper)))
    }

    pub fn filter<F>(&self, predicate: F) -> Flux<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Flux::from_publisher(FilterPublisher::new(self.publisher(), Arc::new(predicate)))
    }

    pub fn take(&self, limit: u64) -> Flux<T> {
        Flux::from_publisher(TakePublisher::new(self.publisher(), limit))
    }

    /// Hide fusion capabilities from downstream.
    pub fn hide(&self) -> Flux<T> {
        Flux::from_publisher(HidePublisher::new(self.publisher()))
    }

    pub fn concat_with(&self, other: Flux<T>) -> Flux<T> {
        Flux::concat(vec![self.clone(), other])
    }

    pub fn count(&self) -> Mono<u64> {
        Mono::from_publisher(ReducePublisher::new(
            self.publisher(),
            Reducer {
                first: Arc::new(|_: T| Ok(1u64)),
                step: Arc::new(|n: u64, _: T| Ok(n + 1)),
                empty: Some(Arc::new(|| 0u64) as Arc<dyn Fn() -> u64 + Send + Sync>),
            },
        ))
    }

    pub fn collect_list(&self) -> Mono<Vec<T>> {
        Mono::from_publisher(ReducePublisher::new(
            self.publisher(),
            Reducer {
                first: Arc::new(|v: T| Ok(vec![v])),
                step: Arc::new(|mut list: Vec<T>, v: T| {
                    list.push(v);
                    Ok(list)
                }),
                empty: Some(Arc::new(Vec::new) as Arc<dyn Fn() -> Vec<T> + Send + Sync>),
            },
        ))
    }

    /// Fold values pairwise. An empty flux reduces to an empty mono.
    pub fn reduce<F>(&self, reducer: F) -> Mono<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Mono::from_publisher(ReducePublisher::new(
            self.publisher(),
            Reducer {
                first: Arc::new(|v: T| Ok(v)),
                step: Arc::new(move |acc, v| Ok(reducer(acc, v))),
                empty: None,
            },
        ))
    }

    fn peek(&self, callbacks: PeekCallbacks<T>) -> Flux<T> {
        Flux::from_publisher(PeekPublisher::new(self.publisher(), callbacks))
    }

    pub fn do_on_subscribe<F>(&self, callback: F) -> Flux<T>
    where
        F: Fn() -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.peek(PeekCallbacks {
            on_subscribe: Some(Arc::new(callback)),
            ..Default::default()
        })
    }

    pub fn do_on_next<F>(&self, callback: F) -> Flux<T>
    where
        F: Fn(&T) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.peek(PeekCallbacks {
            on_next: Some(Arc::new(callback)),
            ..Default::default()
        })
    }

    pub fn do_on_error<F>(&self, callback: F) -> Flux<T>
    where
        F: Fn(&FlowError) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.peek(PeekCallbacks {
            on_error: Some(Arc::new(callback)),
            ..Default::default()
        })
    }

    pub fn do_on_complete<F>(&self, callback: F) -> Flux<T>
    where
        F: Fn() -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.peek(PeekCallbacks {
            on_complete: Some(Arc::new(callback)),
            ..Default::default()
        })
    }

    pub fn do_on_cancel<F>(&self, callback: F) -> Flux<T>
    where
        F: Fn() -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.peek(PeekCallbacks {
            on_cancel: Some(Arc::new(callback)),
            ..Default::default()
        })
    }

    pub fn do_on_request<F>(&self, callback: F) -> Flux<T>
    where
        F: Fn(u64) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.peek(PeekCallbacks {
            on_request: Some(Arc::new(callback)),
            ..Default::default()
        })
    }

    /// Replace an error with `fallback` followed by completion.
    pub fn on_error_return(&self, fallback: T) -> Flux<T>
    where
        T: Clone + Sync,
    {
        self.on_error_resume(move |_| Flux::just([fallback.clone()]))
    }

    /// Replace an error with the flux `fallback` builds from it.
    pub fn on_error_resume<F>(&self, fallback: F) -> Flux<T>
    where
        F: Fn(FlowError) -> Flux<T> + Send + Sync + 'static,
    {
        Flux::from_publisher(ResumePublisher::new(
            self.publisher(),
            Arc::new(move |e| fallback(e).publisher()),
        ))
    }

    pub fn map_err<F>(&self, mapper: F) -> Flux<T>
    where
        F: Fn(FlowError) -> FlowError + Send + Sync + 'static,
    {
        Flux::from_publisher(MapErrPublisher::new(self.publisher(), Arc::new(mapper)))
    }

    /// Re-subscribe after each of the first `max_retries` errors.
    pub fn retry(&self, max_retries: u64) -> Flux<T> {
        Flux::from_publisher(RetryPublisher::new(self.publisher(), max_retries))
    }

    /// Re-subscribe whenever the companion built from the error flux emits.
    pub fn retry_when<R, F>(&self, companion: F) -> Flux<T>
    where
        R: Send + 'static,
        F: Fn(Flux<FlowError>) -> Flux<R> + Send + Sync + 'static,
    {
        Flux::from_publisher(RetryWhenPublisher::new(self.publisher(), Arc::new(companion)))
    }

    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Flux<T> {
        Flux::from_publisher(SubscribeOnPublisher::new(self.publisher(), scheduler))
    }

    pub fn publish_on(&self, scheduler: SchedulerRef) -> Flux<T> {
        self.publish_on_with_prefetch(scheduler, DEFAULT_PREFETCH)
    }

    pub fn publish_on_with_prefetch(&self, scheduler: SchedulerRef, prefetch: usize) -> Flux<T> {
        Flux::from_publisher(PublishOnPublisher::new(self.publisher(), scheduler, prefetch))
    }

    /// Delay each value by `delay` on the default parallel scheduler.
    pub fn delay_elements(&self, delay: Duration) -> Flux<T> {
        Schedulers::parallel()
            .map(|s| self.delay_elements_on(delay, s))
            .unwrap_or_else(Flux::error)
    }

    pub fn delay_elements_on(&self, delay: Duration, scheduler: SchedulerRef) -> Flux<T> {
        Flux::from_publisher(DelayElementsPublisher::new(self.publisher(), delay, scheduler))
    }

    /// Subscribe to upstream `delay` after subscription, on the default
    /// parallel scheduler.
    pub fn delay_subscription(&self, delay: Duration) -> Flux<T> {
        Schedulers::parallel()
            .map(|s| self.delay_subscription_on(delay, s))
            .unwrap_or_else(Flux::error)
    }

    pub fn delay_subscription_on(&self, delay: Duration, scheduler: SchedulerRef) -> Flux<T> {
        Flux::from_publisher(SubscribeOnPublisher::delayed(self.publisher(), scheduler, delay))
    }

    /// Fail with [`FlowError::Timeout`] when upstream stays silent for
    /// `window`, timed on the default parallel scheduler.
    pub fn timeout(&self, window: Duration) -> Flux<T> {
        Schedulers::parallel()
            .map(|s| self.timeout_on(window, s))
            .unwrap_or_else(Flux::error)
    }

    pub fn timeout_on(&self, window: Duration, scheduler: SchedulerRef) -> Flux<T> {
        Flux::from_publisher(TimeoutPublisher::new(self.publisher(), window, scheduler))
    }
}

impl Flux<i64> {
    /// `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: u64) -> Flux<i64> {
        let end = i64::try_from(count)
            .ok()
            .and_then(|count| start.checked_add(count));
        match end {
            Some(end) => Flux::from_iterable(start..end),
            None => Flux::error(FlowError::msg(format!(
                "range overflows: start {} count {}",
                start, count
            ))),
        }
    }
}

impl Flux<u64> {
    /// Emit 0, 1, 2, ... every `period` on the default parallel scheduler.
    /// The first value arrives one period after subscription.
    pub fn interval(period: Duration) -> Flux<u64> {
        Schedulers::parallel()
            .map(|s| Flux::interval_on(period, s))
            .unwrap_or_else(Flux::error)
    }

    pub fn interval_on(period: Duration, scheduler: SchedulerRef) -> Flux<u64> {
        Flux::from_publisher(IntervalPublisher::new(period, period, scheduler))
    }
}
