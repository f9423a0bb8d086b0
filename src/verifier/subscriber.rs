// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use crate::errors::FlowError;
use crate::hooks;
use crate::observability::messages::verifier::SignalObserved;
use crate::observability::messages::StructuredLog;
use crate::signal::{Signal, UNBOUNDED};
use crate::traits::{FusionMode, Subscriber, SubscriptionRef};
use crate::utils::sync::locked;

/// What the verifying subscriber hands to the step driver.
pub(crate) enum Event<T> {
    Signal(Signal<T>),
    /// The source broke the protocol; the text is the failure message.
    Violation(String),
}

/// Terminal subscriber of a verification run.
///
/// Every signal is forwarded over an unbounded channel so the driver can
/// await it. Fusion is negotiated inside `on_subscribe`, before any demand
/// is issued; fused values are drained here and forwarded as ordinary
/// `Next` signals. An ASYNC queue is drained only as far as the outstanding
/// demand allows, and its terminal signal waits until the queue is empty.
pub(crate) struct VerifySubscriber<T> {
    events: UnboundedSender<Event<T>>,
    initial_request: u64,
    requested_fusion: Option<FusionMode>,
    subscription: Mutex<Option<SubscriptionRef<T>>>,
    fuseable: AtomicBool,
    granted: AtomicU8,
    requested: AtomicU64,
    produced: AtomicU64,
    terminated: AtomicBool,
    overflowed: AtomicBool,
    cancelled: AtomicBool,
    wip: AtomicUsize,
    upstream_done: AtomicBool,
    upstream_error: Mutex<Option<FlowError>>,
}

impl<T> VerifySubscriber<T> {
    pub(crate) fn new(
        events: UnboundedSender<Event<T>>,
        initial_request: u64,
        requested_fusion: Option<FusionMode>,
    ) -> Self {
        Self {
            events,
            initial_request,
            requested_fusion,
            subscription: Mutex::new(None),
            fuseable: AtomicBool::new(false),
            granted: AtomicU8::new(FusionMode::NONE.bits()),
            requested: AtomicU64::new(0),
            produced: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            overflowed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            wip: AtomicUsize::new(0),
            upstream_done: AtomicBool::new(false),
            upstream_error: Mutex::new(None),
        }
    }

    pub(crate) fn is_fuseable(&self) -> bool {
        self.fuseable.load(Ordering::Acquire)
    }

    pub(crate) fn granted(&self) -> FusionMode {
        FusionMode::from_bits(self.granted.load(Ordering::Acquire))
    }

    /// A terminal signal reached this subscriber. The driver may not have
    /// consumed it yet.
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn subscription_name(&self) -> Option<&'static str> {
        locked(&self.subscription).as_ref().map(|s| s.name())
    }

    fn subscription(&self) -> Option<SubscriptionRef<T>> {
        locked(&self.subscription).clone()
    }

    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }

    /// Drop the subscription once the run is over.
    pub(crate) fn release(&self) {
        locked(&self.subscription).take();
    }

    fn send(&self, event: Event<T>) {
        // The driver stops listening once the run is decided.
        let _ = self.events.send(event);
    }
}

impl<T: Debug + Send + 'static> VerifySubscriber<T> {
    pub(crate) fn request(&self, n: u64) {
        let mut current = self.requested.load(Ordering::Acquire);
        while current != UNBOUNDED {
            match self.requested.compare_exchange_weak(
                current,
                current.saturating_add(n),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let granted = self.granted();
        if granted == FusionMode::SYNC {
            return;
        }
        if let Some(subscription) = self.subscription() {
            subscription.request(n);
        }
        if granted == FusionMode::ASYNC {
            self.drain_async();
        }
    }

    fn observe(&self, signal: Signal<T>) {
        SignalObserved {
            signal: &signal.to_string(),
        }
        .log();
        self.send(Event::Signal(signal));
    }

    fn drain_sync(&self, subscription: &SubscriptionRef<T>) {
        let Some(queue) = subscription.as_queue() else {
            return;
        };
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                queue.clear();
                return;
            }
            match queue.poll() {
                Ok(Some(value)) => self.observe(Signal::Next(value)),
                Ok(None) => {
                    self.terminated.store(true, Ordering::Release);
                    self.observe(Signal::Complete);
                    return;
                }
                Err(e) => {
                    self.terminated.store(true, Ordering::Release);
                    self.observe(Signal::Error(e));
                    return;
                }
            }
        }
    }

    fn drain_async(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            self.drain_async_ready();
            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                return;
            }
            missed = remaining;
        }
    }

    fn drain_async_ready(&self) {
        let Some(subscription) = self.subscription() else {
            return;
        };
        let Some(queue) = subscription.as_queue() else {
            return;
        };
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                queue.clear();
                return;
            }
            if self.is_terminated() {
                return;
            }
            let done = self.upstream_done.load(Ordering::Acquire);
            let requested = self.requested.load(Ordering::Acquire);
            if requested != UNBOUNDED && self.produced.load(Ordering::Acquire) >= requested {
                if done && queue.is_empty() {
                    self.finish_async();
                }
                return;
            }
            match queue.poll() {
                Ok(Some(value)) => {
                    self.produced.fetch_add(1, Ordering::AcqRel);
                    self.observe(Signal::Next(value));
                }
                Ok(None) => {
                    if done {
                        self.finish_async();
                    }
                    return;
                }
                Err(e) => {
                    self.terminated.store(true, Ordering::Release);
                    self.observe(Signal::Error(e));
                    return;
                }
            }
        }
    }

    fn finish_async(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let error = locked(&self.upstream_error).take();
        match error {
            Some(error) => self.observe(Signal::Error(error)),
            None => self.observe(Signal::Complete),
        }
    }

    /// Record an ASYNC source's terminal signal; it is observed once the
    /// queue runs dry.
    fn terminate_async(&self, error: Option<FlowError>) {
        if self.upstream_done.swap(true, Ordering::AcqRel) {
            if let Some(error) = error {
                hooks::error_dropped(&error);
            }
            return;
        }
        *locked(&self.upstream_error) = error;
        self.drain_async();
    }
}

impl<T: Debug + Send + 'static> Subscriber<T> for VerifySubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        {
            let mut slot = locked(&self.subscription);
            if slot.is_some() {
                drop(slot);
                subscription.cancel();
                self.send(Event::Violation(
                    FlowError::ProtocolViolation("onSubscribe received twice".into()).to_string(),
                ));
                return;
            }
            *slot = Some(Arc::clone(&subscription));
        }

        let queue = subscription.as_queue();
        self.fuseable.store(queue.is_some(), Ordering::Release);
        let granted = match (self.requested_fusion, queue) {
            (Some(requested), Some(queue)) => queue.request_fusion(requested),
            _ => FusionMode::NONE,
        };
        self.granted.store(granted.bits(), Ordering::Release);
        self.observe(Signal::Subscribe(Arc::clone(&subscription)));

        if self.requested_fusion.is_some() && !self.is_fuseable() {
            return;
        }
        if granted == FusionMode::SYNC {
            self.requested.store(self.initial_request, Ordering::Release);
            self.drain_sync(&subscription);
            return;
        }
        if self.initial_request > 0 {
            self.request(self.initial_request);
        }
    }

    fn on_next(&self, value: T) {
        if self.is_terminated() || self.overflowed.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        let produced = self.produced.fetch_add(1, Ordering::AcqRel) + 1;
        let requested = self.requested.load(Ordering::Acquire);
        if requested != UNBOUNDED && produced > requested {
            self.overflowed.store(true, Ordering::Release);
            self.send(Event::Violation(format!(
                "request overflow (expected production of at most {}; produced: {}; request overflown by signal: {})",
                requested,
                produced,
                Signal::Next(value)
            )));
            return;
        }
        self.observe(Signal::Next(value));
    }

    fn on_error(&self, error: FlowError) {
        if self.granted() == FusionMode::ASYNC {
            self.terminate_async(Some(error));
            return;
        }
        if self.terminated.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        self.observe(Signal::Error(error));
    }

    fn on_complete(&self) {
        if self.granted() == FusionMode::ASYNC {
            self.terminate_async(None);
            return;
        }
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.observe(Signal::Complete);
    }

    fn on_available(&self) {
        self.drain_async();
    }
}
