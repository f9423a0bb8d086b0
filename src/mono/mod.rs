// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sequences of at most one value.
//!
//! A [`Mono`] shares every stage with [`Flux`]; operators that cannot grow
//! the cardinality keep the mono type, everything else converts with
//! [`Mono::flux`]. [`Mono::to_future`] bridges into async code.

mod future;
pub mod sources;

use std::sync::Arc;
use std::time::Duration;

use crate::errors::FlowError;
use crate::flux::sources::{EmptyPublisher, ErrorPublisher, IterablePublisher, NeverPublisher};
use crate::flux::Flux;
use crate::scheduler::{SchedulerRef, Schedulers};
use crate::traits::{Disposable, Publisher, PublisherRef, SubscriberRef};

pub use future::MonoFuture;
use sources::{CallablePublisher, DelayPublisher};

/// A sequence of zero or one value followed by a terminal signal.
pub struct Mono<T> {
    publisher: PublisherRef<T>,
}

impl<T> Clone for Mono<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<T> Publisher<T> for Mono<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.publisher.subscribe(subscriber);
    }
}

impl<T: Send + 'static> Mono<T> {
    pub fn from_publisher<P: Publisher<T> + 'static>(publisher: P) -> Self {
        Self {
            publisher: Arc::new(publisher),
        }
    }

    pub fn publisher(&self) -> PublisherRef<T> {
        Arc::clone(&self.publisher)
    }

    /// Wrap a flux whose cardinality is already known to be at most one.
    fn assume(flux: Flux<T>) -> Self {
        Self {
            publisher: flux.publisher(),
        }
    }

    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_publisher(IterablePublisher::new(Some(value)))
    }

    pub fn just_or_empty(value: Option<T>) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_publisher(IterablePublisher::new(value))
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

    /// Run `callable` once per subscriber and emit its value.
    pub fn from_callable<F>(callable: F) -> Self
    where
        F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
    {
        Self::from_publisher(CallablePublisher::new(Arc::new(move || callable().map(Some))))
    }

    pub fn defer<F>(supplier: F) -> Self
    where
        F: Fn() -> Mono<T> + Send + Sync + 'static,
    {
        Self::assume(Flux::defer(move || Flux::from(supplier())))
    }

    pub fn using<R, A, D, F>(acquire: A, derive: D, release: F) -> Self
    where
        R: Send + 'static,
        A: Fn() -> Result<R, FlowError> + Send + Sync + 'static,
        D: Fn(&R) -> Mono<T> + Send + Sync + 'static,
        F: Fn(R) + Send + Sync + 'static,
    {
        Self::assume(Flux::using(acquire, move |r: &R| Flux::from(derive(r)), release))
    }

    pub fn flux(&self) -> Flux<T> {
        Flux::from(self.clone())
    }

    pub fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.publisher.subscribe(subscriber);
    }

    pub fn subscribe_with<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Arc<dyn Disposable>
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(FlowError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.flux().subscribe_with(on_next, on_error, on_complete)
    }

    /// Subscribe and resolve to the value, `None` for an empty mono, or the
    /// error. Dropping the future cancels the subscription.
    pub fn to_future(&self) -> MonoFuture<T> {
        MonoFuture::subscribe(self)
    }

    pub fn map<U, F>(&self, mapper: F) -> Mono<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Mono::assume(self.flux().map(mapper))
    }

    pub fn try_map<U, F>(&self, mapper: F) -> Mono<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, FlowError> + Send + Sync + 'static,
    {
        Mono::assume(self.flux().try_map(mapper))
    }

    pub fn filter<F>(&self, predicate: F) -> Mono<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::assume(self.flux().filter(predicate))
    }

    pub fn hide(&self) -> Mono<T> {
        Self::assume(self.flux().hide())
    }

    pub fn concat_with(&self, other: Mono<T>) -> Flux<T> {
        self.flux().concat_with(other.flux())
    }

    pub fn do_on_subscribe<F>(&self, callback: F) -> Mono<T>
    where
        F: Fn() -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::assume(self.flux().do_on_subscribe(callback))
    }

    pub fn do_on_next<F>(&self, callback: F) -> Mono<T>
    where
        F: Fn(&T) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::assume(self.flux().do_on_next(callback))
    }

    pub fn do_on_error<F>(&self, callback: F) -> Mono<T>
    where
        F: Fn(&FlowError) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::assume(self.flux().do_on_error(callback))
    }

    pub fn do_on_complete<F>(&self, callback: F) -> Mono<T>
    where
        F: Fn() -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::assume(self.flux().do_on_complete(callback))
    }

    pub fn do_on_cancel<F>(&self, callback: F) -> Mono<T>
    where
        F: Fn() -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::assume(self.flux().do_on_cancel(callback))
    }

    pub fn do_on_request<F>(&self, callback: F) -> Mono<T>
    where
        F: Fn(u64) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::assume(self.flux().do_on_request(callback))
    }

    pub fn on_error_return(&self, fallback: T) -> Mono<T>
    where
        T: Clone + Sync,
    {
        Self::assume(self.flux().on_error_return(fallback))
    }

    pub fn on_error_resume<F>(&self, fallback: F) -> Mono<T>
    where
        F: Fn(FlowError) -> Mono<T> + Send + Sync + 'static,
    {
        Self::assume(self.flux().on_error_resume(move |e| fallback(e).flux()))
    }

    pub fn map_err<F>(&self, mapper: F) -> Mono<T>
    where
        F: Fn(FlowError) -> FlowError + Send + Sync + 'static,
    {
        Self::assume(self.flux().map_err(mapper))
    }

    pub fn retry(&self, max_retries: u64) -> Mono<T> {
        Self::assume(self.flux().retry(max_retries))
    }

    pub fn retry_when<R, F>(&self, companion: F) -> Mono<T>
    where
        R: Send + 'static,
        F: Fn(Flux<FlowError>) -> Flux<R> + Send + Sync + 'static,
    {
        Self::assume(self.flux().retry_when(companion))
    }

    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Mono<T> {
        Self::assume(self.flux().subscribe_on(scheduler))
    }

    pub fn publish_on(&self, scheduler: SchedulerRef) -> Mono<T> {
        Self::assume(self.flux().publish_on(scheduler))
    }

    /// Delay the value, if any, on the default parallel scheduler.
    pub fn delay_element(&self, delay: Duration) -> Mono<T> {
        Self::assume(self.flux().delay_elements(delay))
    }

    pub fn delay_element_on(&self, delay: Duration, scheduler: SchedulerRef) -> Mono<T> {
        Self::assume(self.flux().delay_elements_on(delay, scheduler))
    }

    pub fn delay_subscription(&self, delay: Duration) -> Mono<T> {
        Self::assume(self.flux().delay_subscription(delay))
    }

    pub fn delay_subscription_on(&self, delay: Duration, scheduler: SchedulerRef) -> Mono<T> {
        Self::assume(self.flux().delay_subscription_on(delay, scheduler))
    }

    pub fn timeout(&self, window: Duration) -> Mono<T> {
        Self::assume(self.flux().timeout(window))
    }

    pub fn timeout_on(&self, window: Duration, scheduler: SchedulerRef) -> Mono<T> {
        Self::assume(self.flux().timeout_on(window, scheduler))
    }
}

impl Mono<u64> {
    /// Emit `0` after `delay` on the default parallel scheduler.
    pub fn delay(delay: Duration) -> Mono<u64> {
        Schedulers::parallel()
            .map(|s| Mono::delay_on(delay, s))
            .unwrap_or_else(Mono::error)
    }

    pub fn delay_on(delay: Duration, scheduler: SchedulerRef) -> Mono<u64> {
        Mono::from_publisher(DelayPublisher::new(delay, scheduler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_to_future_resolves_value() {
        let result = Mono::just(21).map(|n| n * 2).to_future().await;
        assert_eq!(result.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_to_future_resolves_empty_as_none() {
        let result = Mono::just(3).filter(|n| *n > 5).to_future().await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_to_future_resolves_error() {
        let result = Mono::<i32>::error(FlowError::msg("nope")).to_future().await;
        assert_eq!(result.unwrap_err().to_string(), "nope");
    }

    #[tokio::test]
    async fn test_from_callable_runs_per_subscriber() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mono = Mono::from_callable(move || Ok(counter.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(mono.to_future().await.unwrap(), Some(0));
        assert_eq!(mono.to_future().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_on_error_resume_switches_to_fallback() {
        let mono = Mono::<&str>::error(FlowError::msg("primary"))
            .on_error_resume(|_| Mono::just("fallback"));
        assert_eq!(mono.to_future().await.unwrap(), Some("fallback"));
    }

    #[tokio::test]
    async fn test_concat_with_builds_a_flux() {
        let list = Mono::just(1).concat_with(Mono::just(2)).collect_list();
        assert_eq!(list.to_future().await.unwrap(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_dropping_future_cancels_subscription() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = cancelled.clone();
        let future = Mono::<i32>::never()
            .do_on_cancel(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .to_future();
        drop(future);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }
}
