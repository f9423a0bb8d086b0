// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A manually driven publisher for tests.
//!
//! Values are pushed from the test body, usually through a `then` step, and
//! delivered to every live subscriber. The publisher records what its
//! subscribers did to it so tests can assert on demand and cancellation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::errors::FlowError;
use crate::flux::Flux;
use crate::mono::Mono;
use crate::signal::{demand, Demand, UNBOUNDED};
use crate::traits::{Publisher, SubscriberRef, Subscription};
use crate::utils::sync::locked;

/// Ways a non-compliant publisher breaks the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Emit values regardless of outstanding demand.
    RequestOverflow,
}

struct State<T> {
    subscriptions: Mutex<Vec<Arc<TestSubscription<T>>>>,
    violation: Option<Violation>,
    subscribed: AtomicBool,
    cancelled: AtomicBool,
    requested: AtomicU64,
}

impl<T> State<T> {
    fn live(&self) -> Vec<Arc<TestSubscription<T>>> {
        locked(&self.subscriptions).clone()
    }

    fn remove(&self, subscription: &TestSubscription<T>) {
        locked(&self.subscriptions).retain(|s| !std::ptr::eq(Arc::as_ptr(s), subscription));
    }

    fn add_requested(&self, n: u64) {
        let mut current = self.requested.load(Ordering::Acquire);
        while current != UNBOUNDED {
            match self.requested.compare_exchange_weak(
                current,
                current.saturating_add(n),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Publisher whose signals are triggered by the test.
///
/// ```rust
/// use backflow::verifier::{StepVerifier, TestPublisher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let publisher = TestPublisher::create();
/// let source = publisher.clone();
/// StepVerifier::create(publisher.flux())
///     .then(move || {
///         source.emit(["a", "b"]);
///     })
///     .expect_next("a")
///     .expect_next("b")
///     .verify_complete()
///     .await
///     .unwrap();
/// assert!(publisher.was_requested());
/// # }
/// ```
pub struct TestPublisher<T> {
    state: Arc<State<T>>,
}

impl<T> Clone for TestPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> TestPublisher<T> {
    /// A publisher that honours demand: a value pushed to a subscriber
    /// without outstanding demand fails that subscriber.
    pub fn create() -> Self {
        Self::with_violation(None)
    }

    pub fn create_noncompliant(violation: Violation) -> Self {
        Self::with_violation(Some(violation))
    }

    fn with_violation(violation: Option<Violation>) -> Self {
        Self {
            state: Arc::new(State {
                subscriptions: Mutex::new(Vec::new()),
                violation,
                subscribed: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                requested: AtomicU64::new(0),
            }),
        }
    }

    pub fn flux(&self) -> Flux<T> {
        Flux::from_publisher(self.clone())
    }

    pub fn mono(&self) -> Mono<T> {
        Mono::from_publisher(self.clone())
    }

    /// Push `value` to every live subscriber.
    pub fn next(&self, value: T) -> &Self {
        for subscription in self.state.live() {
            subscription.emit(value.clone());
        }
        self
    }

    /// Push every value, then complete.
    pub fn emit<I: IntoIterator<Item = T>>(&self, values: I) -> &Self {
        for value in values {
            self.next(value);
        }
        self.complete()
    }

    pub fn complete(&self) -> &Self {
        let live = std::mem::take(&mut *locked(&self.state.subscriptions));
        for subscription in live {
            subscription.actual.on_complete();
        }
        self
    }

    pub fn error(&self, error: FlowError) -> &Self {
        let live = std::mem::take(&mut *locked(&self.state.subscriptions));
        for subscription in live {
            subscription.actual.on_error(error.clone());
        }
        self
    }
}

impl<T> TestPublisher<T> {
    pub fn was_subscribed(&self) -> bool {
        self.state.subscribed.load(Ordering::Acquire)
    }

    pub fn was_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    pub fn was_requested(&self) -> bool {
        self.requested() > 0
    }

    /// Demand requested over the publisher's lifetime, across subscribers.
    pub fn requested(&self) -> u64 {
        self.state.requested.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        locked(&self.state.subscriptions).len()
    }
}

impl<T: Send + 'static> Publisher<T> for TestPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        let subscription = Arc::new(TestSubscription {
            actual: Arc::clone(&actual),
            state: Arc::downgrade(&self.state),
            demand: Demand::new(),
            cancelled: AtomicBool::new(false),
        });
        locked(&self.state.subscriptions).push(Arc::clone(&subscription));
        self.state.subscribed.store(true, Ordering::Release);
        actual.on_subscribe(subscription);
    }
}

struct TestSubscription<T> {
    actual: SubscriberRef<T>,
    state: Weak<State<T>>,
    demand: Demand,
    cancelled: AtomicBool,
}

impl<T> TestSubscription<T> {
    fn emit(&self, value: T) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let compliant = self
            .state
            .upgrade()
            .map(|s| s.violation.is_none())
            .unwrap_or(true);
        if compliant {
            if self.demand.get() == 0 {
                if let Some(state) = self.state.upgrade() {
                    state.remove(self);
                }
                self.actual.on_error(FlowError::Overflow(
                    "Can't deliver value due to lack of requests".into(),
                ));
                return;
            }
            self.demand.produced(1);
        }
        self.actual.on_next(value);
    }
}

impl<T: Send + 'static> Subscription<T> for TestSubscription<T> {
    fn request(&self, n: u64) {
        if let Err(e) = demand::validate(n) {
            self.cancel();
            self.actual.on_error(e);
            return;
        }
        self.demand.add(n);
        if let Some(state) = self.state.upgrade() {
            state.add_requested(n);
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.cancelled.store(true, Ordering::Release);
            state.remove(self);
        }
    }

    fn name(&self) -> &'static str {
        "TestSubscription"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Subscriber, SubscriptionRef};

    #[derive(Default)]
    struct Log {
        seen: Mutex<Vec<String>>,
        subscription: Mutex<Option<SubscriptionRef<i32>>>,
    }

    impl Subscriber<i32> for Log {
        fn on_subscribe(&self, subscription: SubscriptionRef<i32>) {
            *self.subscription.lock().unwrap() = Some(subscription);
        }

        fn on_next(&self, value: i32) {
            self.seen.lock().unwrap().push(format!("next {}", value));
        }

        fn on_error(&self, error: FlowError) {
            self.seen.lock().unwrap().push(format!("error {}", error));
        }

        fn on_complete(&self) {
            self.seen.lock().unwrap().push("complete".into());
        }
    }

    impl Log {
        fn request(&self, n: u64) {
            let subscription = self.subscription.lock().unwrap().clone().unwrap();
            subscription.request(n);
        }
    }

    #[test]
    fn test_compliant_publisher_fails_without_demand() {
        let publisher = TestPublisher::create();
        let log = Arc::new(Log::default());
        publisher.subscribe(log.clone());

        publisher.next(1);
        assert_eq!(
            *log.seen.lock().unwrap(),
            vec!["error Can't deliver value due to lack of requests"]
        );
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_compliant_publisher_respects_demand() {
        let publisher = TestPublisher::create();
        let log = Arc::new(Log::default());
        publisher.subscribe(log.clone());
        log.request(2);

        publisher.next(1).next(2).complete();
        assert_eq!(*log.seen.lock().unwrap(), vec!["next 1", "next 2", "complete"]);
        assert_eq!(publisher.requested(), 2);
        assert!(publisher.was_subscribed());
        assert!(!publisher.was_cancelled());
    }

    #[test]
    fn test_noncompliant_publisher_ignores_demand() {
        let publisher = TestPublisher::create_noncompliant(Violation::RequestOverflow);
        let log = Arc::new(Log::default());
        publisher.subscribe(log.clone());

        publisher.emit([1, 2]);
        assert_eq!(*log.seen.lock().unwrap(), vec!["next 1", "next 2", "complete"]);
        assert!(!publisher.was_requested());
    }

    #[test]
    fn test_cancel_is_recorded() {
        let publisher = TestPublisher::<i32>::create();
        let log = Arc::new(Log::default());
        publisher.subscribe(log.clone());
        assert_eq!(publisher.subscriber_count(), 1);

        let subscription = log.subscription.lock().unwrap().clone().unwrap();
        subscription.cancel();
        subscription.cancel();
        assert!(publisher.was_cancelled());
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
