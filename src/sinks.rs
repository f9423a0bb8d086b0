// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Push-driven sources.
//!
//! [`unicast`] pairs a [`UnicastSink`], which imperative code feeds, with the
//! [`Flux`] that replays what was fed to its single subscriber. Values are
//! buffered until demanded, and terminal signals wait until the buffer is
//! drained.
//!
//! # Examples
//!
//! ```rust
//! use backflow::sinks;
//!
//! let (sink, flux) = sinks::unicast::<&str>();
//! sink.next("queued before subscription").unwrap();
//! sink.complete();
//! # drop(flux);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::FlowError;
use crate::flux::Flux;
use crate::operators::fail_subscribe;
use crate::signal::{demand, Demand};
use crate::traits::{
    FusionMode, Publisher, QueueSubscription, SubscriberRef, Subscription,
};
use crate::utils::sync::locked;

/// Create a buffering, single-subscriber sink and the flux it feeds.
pub fn unicast<T: Send + 'static>() -> (UnicastSink<T>, Flux<T>) {
    let state = Arc::new(UnicastState {
        queue: Mutex::new(VecDeque::new()),
        actual: Mutex::new(None),
        error: Mutex::new(None),
        demand: Demand::new(),
        wip: AtomicUsize::new(0),
        subscribed: AtomicBool::new(false),
        terminated: AtomicBool::new(false),
        cancelled: AtomicBool::new(false),
        fused: AtomicBool::new(false),
    });
    let flux = Flux::from_publisher(UnicastPublisher {
        state: Arc::clone(&state),
    });
    (UnicastSink { state }, flux)
}

/// Imperative side of [`unicast`].
pub struct UnicastSink<T> {
    state: Arc<UnicastState<T>>,
}

impl<T: Send + 'static> UnicastSink<T> {
    /// Buffer `value` for the subscriber. Fails once the sink terminated or
    /// its subscriber cancelled.
    pub fn next(&self, value: T) -> Result<(), FlowError> {
        if self.state.terminated.load(Ordering::Acquire) {
            return Err(FlowError::Rejected("sink already terminated".to_string()));
        }
        if self.state.cancelled.load(Ordering::Acquire) {
            return Err(FlowError::Rejected("sink subscriber cancelled".to_string()));
        }
        locked(&self.state.queue).push_back(value);
        self.state.drain();
        Ok(())
    }

    pub fn complete(&self) {
        if self.state.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.drain();
    }

    pub fn error(&self, error: FlowError) {
        if self.state.terminated.swap(true, Ordering::AcqRel) {
            crate::hooks::error_dropped(&error);
            return;
        }
        *locked(&self.state.error) = Some(error);
        self.state.drain();
    }

    pub fn has_subscriber(&self) -> bool {
        locked(&self.state.actual).is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

struct UnicastState<T> {
    queue: Mutex<VecDeque<T>>,
    actual: Mutex<Option<SubscriberRef<T>>>,
    error: Mutex<Option<FlowError>>,
    demand: Demand,
    wip: AtomicUsize,
    subscribed: AtomicBool,
    terminated: AtomicBool,
    cancelled: AtomicBool,
    fused: AtomicBool,
}

impl<T: Send + 'static> UnicastState<T> {
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            let actual = locked(&self.actual).clone();
            if let Some(actual) = actual {
                if self.fused.load(Ordering::Acquire) {
                    self.drain_fused(&actual);
                } else {
                    self.drain_regular(&actual);
                }
            }
            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                break;
            }
            missed = remaining;
        }
    }

    fn drain_regular(&self, actual: &SubscriberRef<T>) {
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                locked(&self.queue).clear();
                return;
            }
            let done = self.terminated.load(Ordering::Acquire);
            let next = if self.demand.get() > 0 {
                locked(&self.queue).pop_front()
            } else {
                None
            };
            match next {
                Some(value) => {
                    self.demand.produced(1);
                    actual.on_next(value);
                }
                None => {
                    if done && locked(&self.queue).is_empty() {
                        self.finish(actual);
                    }
                    return;
                }
            }
        }
    }

    fn drain_fused(&self, actual: &SubscriberRef<T>) {
        if self.cancelled.load(Ordering::Acquire) {
            locked(&self.queue).clear();
            return;
        }
        let done = self.terminated.load(Ordering::Acquire);
        actual.on_available();
        if done {
            self.finish(actual);
        }
    }

    fn finish(&self, actual: &SubscriberRef<T>) {
        if locked(&self.actual).take().is_none() {
            return;
        }
        let error = locked(&self.error).take();
        match error {
            Some(error) => actual.on_error(error),
            None => actual.on_complete(),
        }
    }
}

struct UnicastPublisher<T> {
    state: Arc<UnicastState<T>>,
}

impl<T: Send + 'static> Publisher<T> for UnicastPublisher<T> {
    fn subscribe(&self, actual: SubscriberRef<T>) {
        if self.state.subscribed.swap(true, Ordering::AcqRel) {
            fail_subscribe(
                &actual,
                FlowError::ProtocolViolation(
                    "UnicastSink allows only a single Subscriber".to_string(),
                ),
            );
            return;
        }
        actual.on_subscribe(Arc::new(UnicastSubscription {
            state: Arc::clone(&self.state),
        }));
        if self.state.cancelled.load(Ordering::Acquire) {
            return;
        }
        *locked(&self.state.actual) = Some(actual);
        self.state.drain();
    }
}

struct UnicastSubscription<T> {
    state: Arc<UnicastState<T>>,
}

impl<T: Send + 'static> Subscription<T> for UnicastSubscription<T> {
    fn request(&self, n: u64) {
        match demand::validate(n) {
            Ok(()) => {
                self.state.demand.add(n);
            }
            Err(e) => {
                if !self.state.terminated.swap(true, Ordering::AcqRel) {
                    locked(&self.state.queue).clear();
                    *locked(&self.state.error) = Some(e);
                }
            }
        }
        self.state.drain();
    }

    fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        locked(&self.state.actual).take();
        self.state.drain();
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<T>> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "UnicastSubscription"
    }
}

impl<T: Send + 'static> QueueSubscription<T> for UnicastSubscription<T> {
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.contains(FusionMode::ASYNC) {
            self.state.fused.store(true, Ordering::Release);
            FusionMode::ASYNC
        } else {
            FusionMode::NONE
        }
    }

    fn poll(&self) -> Result<Option<T>, FlowError> {
        Ok(locked(&self.state.queue).pop_front())
    }

    fn is_empty(&self) -> bool {
        locked(&self.state.queue).is_empty()
    }

    fn size(&self) -> usize {
        locked(&self.state.queue).len()
    }

    fn clear(&self) {
        locked(&self.state.queue).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Subscriber;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        subscription: Mutex<Option<Arc<dyn Subscription<i32>>>>,
    }

    impl Subscriber<i32> for Recorder {
        fn on_subscribe(&self, subscription: Arc<dyn Subscription<i32>>) {
            *self.subscription.lock().unwrap() = Some(subscription);
        }

        fn on_next(&self, value: i32) {
            self.seen.lock().unwrap().push(format!("next {}", value));
        }

        fn on_error(&self, error: FlowError) {
            self.seen.lock().unwrap().push(format!("error {}", error));
        }

        fn on_complete(&self) {
            self.seen.lock().unwrap().push("complete".to_string());
        }
    }

    impl Recorder {
        fn request(&self, n: u64) {
            let subscription = self.subscription.lock().unwrap().clone().unwrap();
            subscription.request(n);
        }
    }

    #[test]
    fn test_values_buffer_until_requested() {
        let (sink, flux) = unicast::<i32>();
        sink.next(1).unwrap();
        sink.next(2).unwrap();
        sink.complete();

        let recorder = Arc::new(Recorder::default());
        flux.subscribe(recorder.clone());
        assert!(recorder.seen.lock().unwrap().is_empty());

        recorder.request(1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["next 1"]);
        recorder.request(1);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec!["next 1", "next 2", "complete"]
        );
    }

    #[test]
    fn test_second_subscriber_is_rejected() {
        let (_sink, flux) = unicast::<i32>();
        flux.subscribe(Arc::new(Recorder::default()));

        let late = Arc::new(Recorder::default());
        flux.subscribe(late.clone());
        assert_eq!(
            *late.seen.lock().unwrap(),
            vec!["error protocol violation: UnicastSink allows only a single Subscriber"]
        );
    }

    #[test]
    fn test_next_after_terminal_is_rejected() {
        let (sink, _flux) = unicast::<i32>();
        sink.complete();
        assert!(matches!(sink.next(1), Err(FlowError::Rejected(_))));
    }

    #[test]
    fn test_async_fusion_signals_availability() {
        let (sink, flux) = unicast::<i32>();
        let recorder = Arc::new(Recorder::default());
        flux.subscribe(recorder.clone());

        let subscription = recorder.subscription.lock().unwrap().clone().unwrap();
        let queue = subscription.as_queue().unwrap();
        assert_eq!(queue.request_fusion(FusionMode::SYNC), FusionMode::NONE);
        assert_eq!(queue.request_fusion(FusionMode::ANY), FusionMode::ASYNC);

        sink.next(5).unwrap();
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.poll().unwrap(), Some(5));
        assert!(queue.is_empty());
    }
}
