// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{FlowError, VerifyError};
use crate::signal::UNBOUNDED;
use crate::traits::{FusionMode, Publisher, PublisherRef, SubscriptionRef};
use crate::verifier::options::StepVerifierOptions;
use crate::verifier::step::{ErrorCheck, Failure, Kind, Step};

pub(super) enum Source<T> {
    Publisher(PublisherRef<T>),
    /// Built inside the virtual clock's scope.
    Supplier(Box<dyn FnOnce() -> PublisherRef<T> + Send>),
}

/// Declarative scenario against a publisher.
///
/// Steps are recorded in order and run by one of the terminal `verify*`
/// calls. Nothing is subscribed before that.
///
/// # Examples
///
/// ```rust
/// use backflow::flux::Flux;
/// use backflow::verifier::StepVerifier;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// StepVerifier::create(Flux::just(["foo", "bar"]))
///     .expect_next("foo")
///     .expect_next("bar")
///     .verify_complete()
///     .await
///     .unwrap();
/// # }
/// ```
pub struct StepVerifier<T> {
    pub(super) source: Source<T>,
    pub(super) options: StepVerifierOptions,
    pub(super) steps: Vec<Step<T>>,
    requested: u64,
    expected: u64,
    pub(super) usage: Option<VerifyError>,
}

/// A scenario whose terminal expectation is declared; only labelling and
/// running remain.
pub struct LastStep<T> {
    verifier: StepVerifier<T>,
}

fn hang(label: &str, remaining: u64, expected: &str) -> VerifyError {
    VerifyError::Usage(format!(
        "The scenario will hang at {} due to too little request being performed for the expectations to finish; request remaining since last step: {}, expected: {}",
        label, remaining, expected
    ))
}

impl<T: Debug + Send + 'static> StepVerifier<T> {
    /// Verify `source` with unbounded initial demand.
    pub fn create<P: Publisher<T> + 'static>(source: P) -> Self {
        Self::create_with_options(source, StepVerifierOptions::create())
    }

    pub fn create_with_request<P: Publisher<T> + 'static>(source: P, n: u64) -> Self {
        Self::create_with_options(source, StepVerifierOptions::create().initial_request(n))
    }

    pub fn create_with_options<P: Publisher<T> + 'static>(
        source: P,
        options: StepVerifierOptions,
    ) -> Self {
        Self::build(Source::Publisher(Arc::new(source)), options)
    }

    /// Verify the publisher built by `supplier` while a virtual clock is the
    /// default scheduler. Time only moves through `then_await` and
    /// `expect_no_event`.
    ///
    /// The clock is installed on whichever thread is driving the run, only
    /// for the duration of each call into the pipeline, so the run may be
    /// spawned like any other future.
    pub fn with_virtual_time<P, F>(supplier: F) -> Self
    where
        P: Publisher<T> + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        Self::with_virtual_time_options(supplier, StepVerifierOptions::create())
    }

    pub fn with_virtual_time_options<P, F>(supplier: F, options: StepVerifierOptions) -> Self
    where
        P: Publisher<T> + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        Self::build(
            Source::Supplier(Box::new(move || Arc::new(supplier()) as PublisherRef<T>)),
            options,
        )
    }

    fn build(source: Source<T>, options: StepVerifierOptions) -> Self {
        let requested = options.get_initial_request();
        Self {
            source,
            options,
            steps: vec![Step::implicit_subscription()],
            requested,
            expected: 0,
            usage: None,
        }
    }

    /// First problem found while appending steps. `verify*` reports it
    /// without subscribing.
    pub fn usage_error(&self) -> Option<&VerifyError> {
        self.usage.as_ref()
    }

    fn push(mut self, step: Step<T>) -> Self {
        let replaces_implicit =
            step.observes_subscription() && self.steps.len() == 1 && self.steps[0].implicit;
        if replaces_implicit {
            self.steps[0] = step;
            return self;
        }
        if step.requires_subscription() {
            let error = VerifyError::Usage(format!("{} must be the first step", step.label));
            self.usage(error);
        }
        self.steps.push(step);
        self
    }

    fn usage(&mut self, error: VerifyError) {
        if self.usage.is_none() {
            self.usage = Some(error);
        }
    }

    fn remaining(&self) -> Option<u64> {
        if !self.options.get_check_under_requesting() || self.requested == UNBOUNDED {
            return None;
        }
        Some(self.requested.saturating_sub(self.expected))
    }

    fn expect_values(mut self, needed: u64, step: Step<T>) -> Self {
        if let Some(remaining) = self.remaining() {
            if needed > remaining {
                let error = hang(&step.label, remaining, &needed.to_string());
                self.usage(error);
            }
        }
        self.expected = self.expected.saturating_add(needed);
        self.push(step)
    }

    pub fn expect_subscription(self) -> Self {
        self.push(Step::new(Kind::Subscribe(None), "expectSubscription"))
    }

    pub fn expect_subscription_matches<F>(self, predicate: F) -> Self
    where
        F: FnOnce(&SubscriptionRef<T>) -> bool + Send + 'static,
    {
        let check = Box::new(move |s: &SubscriptionRef<T>| {
            if predicate(s) {
                Ok(())
            } else {
                Err(Failure::Detail(format!(
                    "predicate failed on subscription: {}",
                    s.name()
                )))
            }
        });
        self.push(Step::new(Kind::Subscribe(Some(check)), "expectSubscriptionMatches"))
    }

    pub fn consume_subscription_with<F>(self, consumer: F) -> Self
    where
        F: FnOnce(&SubscriptionRef<T>) -> Result<(), String> + Send + 'static,
    {
        let check = Box::new(move |s: &SubscriptionRef<T>| consumer(s).map_err(Failure::Raw));
        self.push(Step::new(Kind::Subscribe(Some(check)), "consumeSubscriptionWith"))
    }

    /// Request any fusion mode and expect one to be granted.
    pub fn expect_fusion(self) -> Self {
        self.expect_fusion_granted(FusionMode::ANY, FusionMode::ANY)
    }

    /// Request `requested` and expect a mode within it.
    pub fn expect_fusion_mode(self, requested: FusionMode) -> Self {
        self.expect_fusion_granted(requested, requested)
    }

    /// Request `requested` and expect the granted mode to be within
    /// `expected`. Only meaningful as the first step; later fusion steps still
    /// check the outcome of that first negotiation.
    pub fn expect_fusion_granted(self, requested: FusionMode, expected: FusionMode) -> Self {
        self.push(Step::new(Kind::Fusion { requested, expected }, "expectFusion"))
    }

    pub fn expect_no_fusion_support(self) -> Self {
        self.push(Step::new(Kind::NoFusion, "expectNoFusionSupport"))
    }

    pub fn expect_next(self, value: T) -> Self
    where
        T: PartialEq,
    {
        let label = format!("expectNext({:?})", value);
        let expected = format!("onNext({:?})", value);
        let check = Box::new(move |actual: &T| {
            if *actual == value {
                Ok(())
            } else {
                Err(Failure::Detail(format!(
                    "expected value: {:?}; actual value: {:?}",
                    value, actual
                )))
            }
        });
        self.expect_values(1, Step::new(Kind::Next { expected, check }, label))
    }

    /// One `expect_next` step per value.
    pub fn expect_next_values<I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: PartialEq,
    {
        values.into_iter().fold(self, |verifier, v| verifier.expect_next(v))
    }

    pub fn expect_next_count(self, count: u64) -> Self {
        self.expect_values(
            count,
            Step::new(Kind::Count(count), format!("expectNextCount({})", count)),
        )
    }

    pub fn expect_next_sequence<I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: PartialEq,
    {
        let expected: Vec<T> = values.into_iter().collect();
        let needed = expected.len() as u64;
        self.expect_values(
            needed,
            Step::new(
                Kind::Sequence {
                    expected,
                    eq: <T as PartialEq>::eq,
                },
                "expectNextSequence",
            ),
        )
    }

    pub fn expect_next_matches<F>(self, predicate: F) -> Self
    where
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        let check = Box::new(move |actual: &T| {
            if predicate(actual) {
                Ok(())
            } else {
                Err(Failure::Detail(format!(
                    "predicate failed on value: {:?}",
                    actual
                )))
            }
        });
        self.expect_values(
            1,
            Step::new(
                Kind::Next {
                    expected: "onNext()".into(),
                    check,
                },
                "expectNextMatches",
            ),
        )
    }

    /// Hand the next value to `consumer`; an `Err` fails the run with its
    /// message unchanged.
    pub fn consume_next_with<F>(self, consumer: F) -> Self
    where
        F: FnOnce(&T) -> Result<(), String> + Send + 'static,
    {
        self.consume_next_labelled(consumer, "consumeNextWith")
    }

    pub fn assert_next<F>(self, assertion: F) -> Self
    where
        F: FnOnce(&T) -> Result<(), String> + Send + 'static,
    {
        self.consume_next_labelled(assertion, "assertNext")
    }

    fn consume_next_labelled<F>(self, consumer: F, label: &str) -> Self
    where
        F: FnOnce(&T) -> Result<(), String> + Send + 'static,
    {
        let check = Box::new(move |actual: &T| consumer(actual).map_err(Failure::Raw));
        self.expect_values(
            1,
            Step::new(
                Kind::Next {
                    expected: "onNext()".into(),
                    check,
                },
                label,
            ),
        )
    }

    /// Consume values while `predicate` holds. The first value that fails it,
    /// or a terminal signal, is left for the next step.
    pub fn then_consume_while<F>(self, predicate: F) -> Self
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.consume_while(Box::new(predicate), None)
    }

    pub fn then_consume_while_with<F, C>(self, predicate: F, consumer: C) -> Self
    where
        F: FnMut(&T) -> bool + Send + 'static,
        C: FnMut(&T) + Send + 'static,
    {
        self.consume_while(Box::new(predicate), Some(Box::new(consumer)))
    }

    fn consume_while(
        mut self,
        predicate: Box<dyn FnMut(&T) -> bool + Send>,
        consumer: Option<Box<dyn FnMut(&T) + Send>>,
    ) -> Self {
        let step = Step::new(Kind::ConsumeWhile { predicate, consumer }, "thenConsumeWhile");
        if self.remaining() == Some(0) {
            let error = hang(&step.label, 0, "at least 1 (best effort estimation)");
            self.usage(error);
        }
        self.push(step)
    }

    /// Start collecting consumed values into the collection `supplier`
    /// returns. `None` fails the run.
    pub fn record_with<F>(self, supplier: F) -> Self
    where
        F: FnOnce() -> Option<Vec<T>> + Send + 'static,
        T: Clone,
    {
        self.push(Step::new(
            Kind::RecordWith {
                supplier: Box::new(supplier),
                clone: <T as Clone>::clone,
            },
            "recordWith",
        ))
    }

    pub fn expect_recorded_matches<F>(self, predicate: F) -> Self
    where
        F: FnOnce(&[T]) -> bool + Send + 'static,
    {
        let check = Box::new(move |recorded: Option<Vec<T>>| match recorded {
            None => Err(Failure::Detail(
                "expected record collector; actual record is [null]".into(),
            )),
            Some(values) if predicate(&values) => Ok(()),
            Some(values) => Err(Failure::Detail(format!(
                "expected collection predicate match; actual: {:?}",
                values
            ))),
        });
        self.push(Step::new(Kind::Recorded(check), "expectRecordedMatches"))
    }

    pub fn consume_recorded_with<F>(self, consumer: F) -> Self
    where
        F: FnOnce(&[T]) -> Result<(), String> + Send + 'static,
    {
        let check = Box::new(move |recorded: Option<Vec<T>>| match recorded {
            None => Err(Failure::Detail(
                "expected record collector; actual record is [null]".into(),
            )),
            Some(values) => consumer(&values).map_err(Failure::Raw),
        });
        self.push(Step::new(Kind::Recorded(check), "consumeRecordedWith"))
    }

    /// Expect silence for `duration`. Signals due exactly at the end of the
    /// window belong to the following steps.
    pub fn expect_no_event(self, duration: Duration) -> Self {
        self.push(Step::new(Kind::NoEvent(duration), "expectNoEvent"))
    }

    pub fn then_request(mut self, n: u64) -> Self {
        if n == 0 {
            self.usage(VerifyError::Usage(FlowError::InvalidRequest(0).to_string()));
            return self;
        }
        if self.requested != UNBOUNDED {
            self.requested = self.requested.saturating_add(n);
        }
        self.push(Step::new(Kind::Request(n), format!("thenRequest({})", n)))
    }

    /// Run a side effect, such as pushing values into a test publisher.
    pub fn then<F>(self, task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Step::new(Kind::Run(Box::new(task)), "then"))
    }

    /// Advance the virtual clock by `duration`, or sleep in real time.
    pub fn then_await(self, duration: Duration) -> Self {
        self.push(Step::new(Kind::Await(duration), "thenAwait"))
    }

    /// Label the previous step in failure messages. Only the first label
    /// given to a step is kept.
    pub fn described_as(mut self, label: impl Into<String>) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.describe(label);
        }
        self
    }

    fn finish(self, step: Step<T>) -> LastStep<T> {
        LastStep {
            verifier: self.push(step),
        }
    }

    pub fn expect_complete(self) -> LastStep<T> {
        self.finish(Step::new(Kind::Complete, "expectComplete"))
    }

    pub fn expect_error(self) -> LastStep<T> {
        self.expect_error_step("expectError()", "onError()".into(), Box::new(|_| Ok(())))
    }

    pub fn expect_error_message(self, message: impl Into<String>) -> LastStep<T> {
        let message = message.into();
        let expected = format!("onError({:?})", message);
        self.expect_error_step(
            "expectErrorMessage",
            expected,
            Box::new(move |e: &FlowError| {
                let actual = e.to_string();
                if actual == message {
                    Ok(())
                } else {
                    Err(Failure::Detail(format!(
                        "expected error message: {:?}; actual message: {:?}",
                        message, actual
                    )))
                }
            }),
        )
    }

    pub fn expect_error_matches<F>(self, predicate: F) -> LastStep<T>
    where
        F: FnOnce(&FlowError) -> bool + Send + 'static,
    {
        self.expect_error_step(
            "expectErrorMatches",
            "onError()".into(),
            Box::new(move |e: &FlowError| {
                if predicate(e) {
                    Ok(())
                } else {
                    Err(Failure::Detail(format!("predicate failed on exception: {}", e)))
                }
            }),
        )
    }

    pub fn expect_error_satisfies<F>(self, assertion: F) -> LastStep<T>
    where
        F: FnOnce(&FlowError) -> Result<(), String> + Send + 'static,
    {
        self.expect_error_step(
            "expectErrorSatisfies",
            "onError()".into(),
            Box::new(move |e: &FlowError| {
                assertion(e).map_err(|message| {
                    Failure::Detail(format!(
                        "assertion failed on exception <{}>: {}",
                        e, message
                    ))
                })
            }),
        )
    }

    pub fn consume_error_with<F>(self, consumer: F) -> LastStep<T>
    where
        F: FnOnce(&FlowError) -> Result<(), String> + Send + 'static,
    {
        self.expect_error_step(
            "consumeErrorWith",
            "onError()".into(),
            Box::new(move |e: &FlowError| consumer(e).map_err(Failure::Raw)),
        )
    }

    fn expect_error_step(
        self,
        label: &str,
        expected: String,
        check: ErrorCheck,
    ) -> LastStep<T> {
        self.finish(Step::new(Kind::Error { expected, check }, label))
    }

    /// Cancel the subscription and end the scenario successfully.
    pub fn then_cancel(self) -> LastStep<T> {
        self.finish(Step::new(Kind::Cancel, "thenCancel"))
    }

    pub async fn verify_complete(self) -> Result<Duration, VerifyError> {
        self.expect_complete().verify().await
    }

    pub async fn verify_error(self) -> Result<Duration, VerifyError> {
        self.expect_error().verify().await
    }

    pub async fn verify_error_message(
        self,
        message: impl Into<String>,
    ) -> Result<Duration, VerifyError> {
        self.expect_error_message(message).verify().await
    }

    pub async fn verify_error_matches<F>(self, predicate: F) -> Result<Duration, VerifyError>
    where
        F: FnOnce(&FlowError) -> bool + Send + 'static,
    {
        self.expect_error_matches(predicate).verify().await
    }

    pub async fn verify_error_satisfies<F>(self, assertion: F) -> Result<Duration, VerifyError>
    where
        F: FnOnce(&FlowError) -> Result<(), String> + Send + 'static,
    {
        self.expect_error_satisfies(assertion).verify().await
    }
}

impl<T: Debug + Send + 'static> LastStep<T> {
    pub fn described_as(self, label: impl Into<String>) -> Self {
        Self {
            verifier: self.verifier.described_as(label),
        }
    }

    pub fn usage_error(&self) -> Option<&VerifyError> {
        self.verifier.usage_error()
    }

    /// Subscribe and run every step, within the configured default timeout.
    /// Returns how long the run took.
    pub async fn verify(self) -> Result<Duration, VerifyError> {
        let timeout = self.verifier.options.get_default_timeout();
        self.verifier.run(timeout).await
    }

    pub async fn verify_timeout(self, timeout: Duration) -> Result<Duration, VerifyError> {
        self.verifier.run(timeout).await
    }
}
