// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runs declared steps against the signals of one subscription.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tokio::time::{self, Instant};
use tracing::Instrument;

use crate::errors::VerifyError;
use crate::observability::messages::verifier::{
    VerificationFailed, VerificationStarted, VerificationSucceeded,
};
use crate::observability::messages::StructuredLog;
use crate::scheduler::VirtualTimeScheduler;
use crate::signal::Signal;
use crate::traits::{Disposable, SubscriberRef, SubscriptionRef};
use crate::verifier::builder::{Source, StepVerifier};
use crate::verifier::step::{Failure, Kind, Step};
use crate::verifier::subscriber::{Event, VerifySubscriber};

/// Used when a timeout is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// A failed step and whether the subscription should be cancelled for it.
///
/// Only a failure on a live signal cancels; a mismatched terminal signal
/// leaves the already finished source alone.
struct Failed {
    error: VerifyError,
    cancel: bool,
}

struct Driver<T> {
    events: UnboundedReceiver<Event<T>>,
    subscriber: Arc<VerifySubscriber<T>>,
    clock: Option<Arc<VirtualTimeScheduler>>,
    deadline: Instant,
    name: Option<String>,
    lookahead: Option<Signal<T>>,
    recording: Option<(Vec<T>, fn(&T) -> T)>,
}

fn mismatch<T>(label: &str, detail: String, signal: Signal<T>) -> Failed {
    let cancel = !signal.is_terminal();
    let error = match Failure::Detail(detail).into_error(label) {
        VerifyError::Assertion {
            message,
            mut suppressed,
        } => {
            if let Signal::Error(e) = signal {
                suppressed.push(e);
            }
            VerifyError::Assertion { message, suppressed }
        }
        other => other,
    };
    Failed { error, cancel }
}

impl<T: Debug + Send + 'static> Driver<T> {
    /// Calls into the pipeline see the virtual clock, if any, as the default
    /// scheduler.
    fn within<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.clock {
            Some(clock) => clock.enter(f),
            None => f(),
        }
    }

    fn failed(&self, error: VerifyError) -> Failed {
        Failed {
            error,
            cancel: !self.subscriber.is_terminated(),
        }
    }

    fn timed_out(&self) -> Failed {
        let name = self
            .name
            .clone()
            .or_else(|| self.subscriber.subscription_name().map(str::to_owned))
            .unwrap_or_else(|| "no subscription".to_owned());
        Failed {
            error: VerifyError::Timeout(name),
            cancel: true,
        }
    }

    fn violation(message: String) -> Failed {
        Failed {
            error: VerifyError::assertion(message),
            cancel: true,
        }
    }

    async fn next_signal(&mut self) -> Result<Signal<T>, Failed> {
        if let Some(signal) = self.lookahead.take() {
            return Ok(signal);
        }
        match time::timeout_at(self.deadline, self.events.recv()).await {
            Ok(Some(Event::Signal(signal))) => Ok(signal),
            Ok(Some(Event::Violation(message))) => Err(Self::violation(message)),
            Ok(None) | Err(_) => Err(self.timed_out()),
        }
    }

    /// A signal that already arrived, without waiting.
    fn buffered(&mut self) -> Option<Event<T>> {
        if let Some(signal) = self.lookahead.take() {
            return Some(Event::Signal(signal));
        }
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    fn record(&mut self, value: &T) {
        if let Some((values, clone)) = self.recording.as_mut() {
            values.push(clone(value));
        }
    }

    async fn expect_subscribe(&mut self, label: &str) -> Result<SubscriptionRef<T>, Failed> {
        match self.next_signal().await? {
            Signal::Subscribe(subscription) => Ok(subscription),
            other => Err(mismatch(
                label,
                format!("expected: onSubscribe(); actual: {}", other),
                other,
            )),
        }
    }

    async fn run_steps(&mut self, steps: Vec<Step<T>>) -> Result<(), Failed> {
        for step in steps {
            self.execute(step).await?;
        }
        Ok(())
    }

    async fn execute(&mut self, step: Step<T>) -> Result<(), Failed> {
        let Step { kind, label, .. } = step;
        match kind {
            Kind::Subscribe(check) => {
                let subscription = self.expect_subscribe(&label).await?;
                if let Some(check) = check {
                    check(&subscription).map_err(|f| self.failed(f.into_error(&label)))?;
                }
            }
            Kind::Fusion {
                requested,
                expected,
            } => {
                self.expect_subscribe(&label).await?;
                if !self.subscriber.is_fuseable() {
                    return Err(self.failed(VerifyError::assertion(format!(
                        "expectation failed (expected fuseable source but actual Subscription is not: {})",
                        requested.bits()
                    ))));
                }
                let granted = self.subscriber.granted();
                if !expected.contains(granted) {
                    return Err(self.failed(VerifyError::assertion(format!(
                        "expectation failed (expected fusion mode: {}; actual: {})",
                        expected, granted
                    ))));
                }
            }
            Kind::NoFusion => {
                let subscription = self.expect_subscribe(&label).await?;
                if self.subscriber.is_fuseable() {
                    return Err(self.failed(VerifyError::assertion(format!(
                        "expectation failed (expected no fusion support but actual Subscription is: {})",
                        subscription.name()
                    ))));
                }
            }
            Kind::Next { expected, check } => match self.next_signal().await? {
                Signal::Next(value) => {
                    self.record(&value);
                    check(&value).map_err(|f| Failed {
                        error: f.into_error(&label),
                        cancel: true,
                    })?;
                }
                other => {
                    return Err(mismatch(
                        &label,
                        format!("expected: {}; actual: {}", expected, other),
                        other,
                    ))
                }
            },
            Kind::Count(count) => {
                for counted in 0..count {
                    match self.next_signal().await? {
                        Signal::Next(value) => self.record(&value),
                        other => {
                            return Err(mismatch(
                                &label,
                                format!(
                                    "expected: count = {}; actual: counted = {}; signal: {}",
                                    count, counted, other
                                ),
                                other,
                            ))
                        }
                    }
                }
            }
            Kind::Sequence { expected, eq } => {
                for wanted in &expected {
                    match self.next_signal().await? {
                        Signal::Next(value) => {
                            self.record(&value);
                            if !eq(&value, wanted) {
                                return Err(Failed {
                                    error: Failure::Detail(format!(
                                        "expected value: {:?}; actual value: {:?}; iterable: {:?}",
                                        wanted, value, expected
                                    ))
                                    .into_error(&label),
                                    cancel: true,
                                });
                            }
                        }
                        other => {
                            return Err(mismatch(
                                &label,
                                format!(
                                    "expected next value: {:?}; actual signal: {}; iterable: {:?}",
                                    wanted, other, expected
                                ),
                                other,
                            ))
                        }
                    }
                }
            }
            Kind::ConsumeWhile {
                mut predicate,
                mut consumer,
            } => loop {
                match self.next_signal().await? {
                    Signal::Next(value) if predicate(&value) => {
                        if let Some(consumer) = consumer.as_mut() {
                            consumer(&value);
                        }
                        self.record(&value);
                    }
                    other => {
                        self.lookahead = Some(other);
                        break;
                    }
                }
            },
            Kind::RecordWith { supplier, clone } => match supplier() {
                Some(values) => self.recording = Some((values, clone)),
                None => {
                    return Err(self.failed(
                        Failure::Detail("expected collection; actual supplied is [null]".into())
                            .into_error(&label),
                    ))
                }
            },
            Kind::Recorded(check) => {
                let recorded = self.recording.take().map(|(values, _)| values);
                check(recorded).map_err(|f| self.failed(f.into_error(&label)))?;
            }
            Kind::NoEvent(window) => self.expect_no_event(window).await?,
            Kind::Request(n) => self.within(|| self.subscriber.request(n)),
            Kind::Run(task) => self.within(task),
            Kind::Await(duration) => match self.clock.clone() {
                Some(clock) => clock.enter(|| clock.advance_by(duration)),
                None => time::sleep(duration).await,
            },
            Kind::Complete => match self.next_signal().await? {
                Signal::Complete => {}
                other => {
                    return Err(mismatch(
                        &label,
                        format!("expected: onComplete(); actual: {}", other),
                        other,
                    ))
                }
            },
            Kind::Error { expected, check } => match self.next_signal().await? {
                Signal::Error(error) => {
                    check(&error).map_err(|f| Failed {
                        error: f.into_error(&label),
                        cancel: false,
                    })?;
                }
                other => {
                    return Err(mismatch(
                        &label,
                        format!("expected: {}; actual: {}", expected, other),
                        other,
                    ))
                }
            },
            Kind::Cancel => self.within(|| self.subscriber.cancel()),
        }
        Ok(())
    }

    async fn expect_no_event(&mut self, window: Duration) -> Result<(), Failed> {
        match self.buffered() {
            None => {}
            Some(Event::Violation(message)) => return Err(Self::violation(message)),
            Some(Event::Signal(signal)) if signal.is_terminal() => {
                return Err(Failed {
                    error: VerifyError::assertion("unexpected end during a no-event expectation"),
                    cancel: false,
                })
            }
            Some(Event::Signal(signal)) => {
                return Err(self.failed(VerifyError::assertion(format!(
                    "expectation failed (expected no event: {})",
                    signal
                ))))
            }
        }

        let mut violations = Vec::new();
        let mut observe = |event: Event<T>| {
            violations.push(match event {
                Event::Signal(signal) => VerifyError::assertion(format!(
                    "expectation failed (expected no event: {})",
                    signal
                )),
                Event::Violation(message) => VerifyError::assertion(message),
            })
        };

        match self.clock.clone() {
            Some(clock) => {
                let last = Duration::from_nanos(1).min(window);
                clock.enter(|| clock.advance_by(window - last));
                while let Ok(event) = self.events.try_recv() {
                    observe(event);
                }
                clock.enter(|| clock.advance_by(last));
            }
            None => {
                let end = Instant::now() + window;
                while let Ok(Some(event)) = time::timeout_at(end, self.events.recv()).await {
                    observe(event);
                }
            }
        }

        match VerifyError::combine(violations) {
            None => Ok(()),
            Some(error) => Err(self.failed(error)),
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

impl<T: Debug + Send + 'static> StepVerifier<T> {
    /// Subscribe and drive every step. In virtual time the clock is installed
    /// while the source is built and around every later call into the
    /// pipeline, and disposed once the run ends. No guard lives across an
    /// await, so the returned future is `Send`.
    pub(super) async fn run(self, timeout: Duration) -> Result<Duration, VerifyError> {
        let StepVerifier {
            source,
            options,
            steps,
            usage,
            ..
        } = self;
        if let Some(error) = usage {
            VerificationFailed { error: &error }.log();
            return Err(error);
        }

        let started = std::time::Instant::now();
        let virtual_time = matches!(source, Source::Supplier(_));
        let announce = VerificationStarted {
            steps: steps.len(),
            virtual_time,
        };
        announce.log();
        let span = announce.span(options.get_scenario_name().unwrap_or("verify"));

        let clock = virtual_time.then(|| {
            options
                .get_virtual_time_scheduler()
                .unwrap_or_else(VirtualTimeScheduler::create)
        });

        let requested_fusion = steps.first().and_then(|step| match step.kind {
            Kind::Fusion { requested, .. } => Some(requested.without_barrier()),
            _ => None,
        });
        let (events, receiver) = mpsc::unbounded_channel();
        let subscriber = Arc::new(VerifySubscriber::new(
            events,
            options.get_initial_request(),
            requested_fusion,
        ));
        let mut driver = Driver {
            events: receiver,
            subscriber: Arc::clone(&subscriber),
            clock: clock.clone(),
            deadline: deadline_after(timeout),
            name: options.get_scenario_name().map(str::to_owned),
            lookahead: None,
            recording: None,
        };

        driver.within(|| {
            let publisher = match source {
                Source::Publisher(publisher) => publisher,
                Source::Supplier(build) => build(),
            };
            publisher.subscribe(Arc::clone(&subscriber) as SubscriberRef<T>);
        });
        let outcome = driver.run_steps(steps).instrument(span).await;

        let result = match outcome {
            Ok(()) => Ok(started.elapsed()),
            Err(Failed { error, cancel }) => {
                if cancel {
                    driver.within(|| subscriber.cancel());
                }
                Err(error)
            }
        };
        subscriber.release();
        drop(driver);
        if let Some(clock) = clock {
            clock.dispose();
        }

        match &result {
            Ok(duration) => VerificationSucceeded {
                duration: *duration,
            }
            .log(),
            Err(error) => VerificationFailed { error }.log(),
        }
        result
    }
}
