// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests {
    use crate::errors::{FlowError, VerifyError};
    use crate::flux::Flux;
    use crate::mono::Mono;
    use crate::sinks;
    use crate::traits::FusionMode;
    use crate::verifier::{StepVerifier, StepVerifierOptions, TestPublisher, Violation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const TWO_DAYS: Duration = Duration::from_secs(2 * 24 * 60 * 60);

    fn cancel_counter() -> (Arc<AtomicUsize>, impl Fn() -> Result<(), FlowError> + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&count);
        (count, move || {
            hook.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn message(result: Result<Duration, VerifyError>) -> String {
        result.unwrap_err().to_string()
    }

    /// Values, then completion, in order
    #[tokio::test]
    async fn test_expected_values_then_complete() {
        StepVerifier::create(Flux::just(["foo", "bar"]))
            .expect_next("foo")
            .expect_next("bar")
            .verify_complete()
            .await
            .unwrap();
    }

    /// A wrong value fails the step and cancels the run
    #[tokio::test]
    async fn test_value_mismatch_cancels() {
        let (cancelled, on_cancel) = cancel_counter();
        let result = StepVerifier::create(Flux::just(["foo", "bar"]).do_on_cancel(on_cancel))
            .expect_next("foo")
            .expect_next("baz")
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "expectation \"expectNext(\"baz\")\" failed (expected value: \"baz\"; actual value: \"bar\")"
        );
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    /// Expecting completion while values keep coming
    #[tokio::test]
    async fn test_complete_expected_but_value_arrived() {
        let (cancelled, on_cancel) = cancel_counter();
        let result = StepVerifier::create(Flux::just(["foo", "bar"]).do_on_cancel(on_cancel))
            .expect_next("foo")
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "expectation \"expectComplete\" failed (expected: onComplete(); actual: onNext(\"bar\"))"
        );
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    /// A terminal signal in place of a value does not cancel
    #[tokio::test]
    async fn test_early_completion_does_not_cancel() {
        let (cancelled, on_cancel) = cancel_counter();
        let result = StepVerifier::create(Flux::just(["foo"]).do_on_cancel(on_cancel))
            .expect_next("foo")
            .expect_next("bar")
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "expectation \"expectNext(\"bar\")\" failed (expected: onNext(\"bar\"); actual: onComplete())"
        );
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_next_count_reports_what_was_counted() {
        let result = StepVerifier::create(Flux::just(["foo", "bar"]))
            .expect_next_count(3)
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "expectation \"expectNextCount(3)\" failed (expected: count = 3; actual: counted = 2; signal: onComplete())"
        );
    }

    #[tokio::test]
    async fn test_next_sequence_reports_the_iterable() {
        let result = StepVerifier::create(Flux::just(["foo", "bar"]))
            .expect_next_sequence(["foo", "bar", "baz"])
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "expectation \"expectNextSequence\" failed (expected next value: \"baz\"; actual signal: onComplete(); iterable: [\"foo\", \"bar\", \"baz\"])"
        );
    }

    /// A step description replaces its label in failures
    #[tokio::test]
    async fn test_described_step_label() {
        let result = StepVerifier::create(Flux::just(["foo", "bar"]))
            .expect_next("foo")
            .expect_next("baz")
            .described_as("third")
            .described_as("ignored")
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "expectation \"third\" failed (expected value: \"baz\"; actual value: \"bar\")"
        );
    }

    /// An unexpected error is attached to the failure as suppressed
    #[tokio::test]
    async fn test_unexpected_error_is_suppressed() {
        let result = StepVerifier::create(
            Flux::just(["foo"]).concat_with(Flux::error(FlowError::msg("boom"))),
        )
        .expect_next("foo")
        .verify_complete()
        .await;

        let error = result.unwrap_err();
        assert_eq!(
            error.to_string(),
            "expectation \"expectComplete\" failed (expected: onComplete(); actual: onError(boom))"
        );
        assert_eq!(error.suppressed().len(), 1);
        assert_eq!(error.suppressed()[0].to_string(), "boom");
    }

    #[tokio::test]
    async fn test_error_expectations() {
        StepVerifier::create(Flux::<i32>::error(FlowError::msg("boom")))
            .verify_error_message("boom")
            .await
            .unwrap();

        let result = StepVerifier::create(Flux::<i32>::error(FlowError::msg("boom")))
            .verify_error_message("foo")
            .await;
        assert_eq!(
            message(result),
            "expectation \"expectErrorMessage\" failed (expected error message: \"foo\"; actual message: \"boom\")"
        );

        let result = StepVerifier::create(Flux::<i32>::error(FlowError::msg("boom")))
            .verify_error_satisfies(|_| Err("wrong kind".to_string()))
            .await;
        assert_eq!(
            message(result),
            "expectation \"expectErrorSatisfies\" failed (assertion failed on exception <boom>: wrong kind)"
        );

        let result = StepVerifier::create(Flux::<i32>::error(FlowError::msg("boom")))
            .verify_error_matches(|e| matches!(e, FlowError::Timeout(_)))
            .await;
        assert_eq!(
            message(result),
            "expectation \"expectErrorMatches\" failed (predicate failed on exception: boom)"
        );
    }

    /// Consumer failures are reported verbatim
    #[tokio::test]
    async fn test_consumer_messages_are_raw() {
        let result = StepVerifier::create(Flux::just(["bar"]))
            .consume_next_with(|v| {
                if *v == "foo" {
                    Ok(())
                } else {
                    Err(format!("e:{}", v))
                }
            })
            .verify_complete()
            .await;
        assert_eq!(message(result), "e:bar");

        let result = StepVerifier::create(Flux::<i32>::error(FlowError::msg("boom")))
            .consume_error_with(|e| Err(format!("e:{}", e)))
            .verify()
            .await;
        assert_eq!(message(result), "e:boom");

        let result = StepVerifier::create(Flux::just([1]))
            .consume_subscription_with(|s| Err(format!("s:{}", s.name())))
            .expect_next(1)
            .verify_complete()
            .await;
        assert_eq!(message(result), "s:IterableSubscription");
    }

    #[tokio::test]
    async fn test_consume_while_leaves_first_mismatch() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        StepVerifier::create(Flux::range(1, 10))
            .then_consume_while_with(
                |n| *n < 10,
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
            .expect_next(10)
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_recorded_values() {
        StepVerifier::create(Flux::just([1, 2, 3]))
            .record_with(|| Some(Vec::new()))
            .then_consume_while(|n| *n < 3)
            .expect_recorded_matches(|values| values.to_vec() == vec![1, 2])
            .expect_next(3)
            .verify_complete()
            .await
            .unwrap();

        let result = StepVerifier::create(Flux::just([1]))
            .expect_next(1)
            .expect_recorded_matches(|values| values.is_empty())
            .verify_complete()
            .await;
        assert_eq!(
            message(result),
            "expectation \"expectRecordedMatches\" failed (expected record collector; actual record is [null])"
        );
    }

    #[tokio::test]
    async fn test_then_cancel_ends_successfully() {
        let (cancelled, on_cancel) = cancel_counter();
        StepVerifier::create(Flux::range(1, 1000).do_on_cancel(on_cancel))
            .expect_next(1)
            .expect_next(2)
            .then_cancel()
            .verify()
            .await
            .unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    /// A usage error is reported without subscribing
    #[tokio::test]
    async fn test_usage_error_skips_subscription() {
        let publisher = TestPublisher::<&str>::create();
        let result = StepVerifier::create_with_request(publisher.flux(), 1)
            .expect_next("foo")
            .expect_next("bar")
            .verify_complete()
            .await;

        assert!(matches!(result, Err(VerifyError::Usage(_))));
        assert!(!publisher.was_subscribed());
    }

    /// Values beyond the requested amount fail the run
    #[tokio::test]
    async fn test_request_overflow_is_detected() {
        let publisher = TestPublisher::create_noncompliant(Violation::RequestOverflow);
        let source = publisher.clone();
        let result = StepVerifier::create_with_request(publisher.flux(), 1)
            .then(move || {
                source.emit(["foo", "bar"]);
            })
            .expect_next("foo")
            .verify_complete()
            .await;

        assert_eq!(
            message(result),
            "request overflow (expected production of at most 1; produced: 2; request overflown by signal: onNext(\"bar\"))"
        );
    }

    #[tokio::test]
    async fn test_then_request_drives_test_publisher() {
        let publisher = TestPublisher::create();
        let source = publisher.clone();
        StepVerifier::create_with_request(publisher.flux(), 0)
            .then_request(2)
            .then(move || {
                source.emit([1, 2]);
            })
            .expect_next(1)
            .expect_next(2)
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(publisher.requested(), 2);
    }

    /// A compliant publisher fails a subscriber that asked for nothing
    #[tokio::test]
    async fn test_compliant_publisher_without_demand() {
        let publisher = TestPublisher::create();
        let source = publisher.clone();
        StepVerifier::create_with_request(publisher.flux(), 0)
            .then(move || {
                source.next(1);
            })
            .verify_error_message("Can't deliver value due to lack of requests")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_fusion_is_granted_by_iterables() {
        StepVerifier::create(Mono::just("foo"))
            .expect_fusion_mode(FusionMode::SYNC)
            .expect_next("foo")
            .verify_complete()
            .await
            .unwrap();

        StepVerifier::create(Flux::just([1, 2]).map(|n| n * 10))
            .expect_fusion()
            .expect_next(10)
            .expect_next(20)
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hidden_source_is_not_fuseable() {
        let result = StepVerifier::create(Mono::just("foo").hide())
            .expect_fusion()
            .expect_next("foo")
            .verify_complete()
            .await;
        assert_eq!(
            message(result),
            "expectation failed (expected fuseable source but actual Subscription is not: 3)"
        );

        StepVerifier::create(Flux::just([1]).hide())
            .expect_no_fusion_support()
            .expect_next(1)
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_fusion_support() {
        let result = StepVerifier::create(Flux::just([1]))
            .expect_no_fusion_support()
            .expect_next(1)
            .verify_complete()
            .await;
        assert_eq!(
            message(result),
            "expectation failed (expected no fusion support but actual Subscription is: IterableSubscription)"
        );
    }

    #[tokio::test]
    async fn test_wrong_fusion_mode_granted() {
        let result = StepVerifier::create(Flux::just([1]))
            .expect_fusion_granted(FusionMode::SYNC, FusionMode::ASYNC)
            .expect_next(1)
            .verify_complete()
            .await;
        assert_eq!(
            message(result),
            "expectation failed (expected fusion mode: (async); actual: (sync))"
        );
    }

    /// A fused ASYNC queue is drained no faster than demand, and its
    /// completion waits for the queue to empty
    #[tokio::test]
    async fn test_async_fusion_respects_demand() {
        let (sink, flux) = sinks::unicast::<i32>();
        StepVerifier::create_with_request(flux, 0)
            .expect_fusion_mode(FusionMode::ASYNC)
            .then(move || {
                sink.next(1).unwrap();
                sink.next(2).unwrap();
                sink.next(3).unwrap();
                sink.complete();
            })
            .expect_no_event(Duration::from_millis(20))
            .then_request(2)
            .expect_next_values([1, 2])
            .expect_no_event(Duration::from_millis(20))
            .then_request(1)
            .expect_next(3)
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_async_fusion_from_queues() {
        StepVerifier::create(Flux::range(1, 3).reduce(|a, b| a + b))
            .expect_fusion_mode(FusionMode::ASYNC)
            .expect_next(6)
            .verify_complete()
            .await
            .unwrap();

        let (sink, flux) = sinks::unicast::<i32>();
        StepVerifier::create(flux)
            .expect_fusion_mode(FusionMode::ASYNC)
            .then(move || {
                sink.next(1).unwrap();
                sink.next(2).unwrap();
                sink.complete();
            })
            .expect_next(1)
            .expect_next(2)
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_interval_in_virtual_time() {
        StepVerifier::with_virtual_time(|| Flux::interval(Duration::from_secs(3)).take(2))
            .expect_subscription()
            .expect_no_event(Duration::from_secs(3))
            .expect_next(0)
            .expect_no_event(Duration::from_secs(3))
            .expect_next(1)
            .verify_complete()
            .await
            .unwrap();
    }

    /// Every signal inside a no-event window is reported
    #[tokio::test]
    async fn test_no_event_window_collects_every_signal() {
        let result = StepVerifier::with_virtual_time(|| Flux::interval(Duration::from_secs(1)).take(2))
            .expect_subscription()
            .expect_no_event(Duration::from_secs(4))
            .verify_complete()
            .await;

        let rendered = message(result);
        assert!(rendered.starts_with("Multiple exceptions"));
        assert!(rendered.contains("\n\texpectation failed (expected no event: onNext(0))"));
        assert!(rendered.contains("\n\texpectation failed (expected no event: onNext(1))"));
        assert!(rendered.contains("\n\texpectation failed (expected no event: onComplete())"));
    }

    #[tokio::test]
    async fn test_no_event_after_termination() {
        let result = StepVerifier::with_virtual_time(Mono::<i32>::empty)
            .expect_subscription()
            .expect_no_event(Duration::from_secs(1))
            .verify_complete()
            .await;
        assert_eq!(message(result), "unexpected end during a no-event expectation");
    }

    /// A signal due exactly at the end of the window belongs to the next step
    #[tokio::test]
    async fn test_delayed_subscription_in_virtual_time() {
        StepVerifier::with_virtual_time(|| Mono::just("foo").delay_subscription(TWO_DAYS))
            .expect_subscription()
            .expect_no_event(TWO_DAYS)
            .expect_next("foo")
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_then_await_advances_virtual_clock() {
        StepVerifier::with_virtual_time(|| Mono::delay(TWO_DAYS))
            .expect_subscription()
            .then_await(TWO_DAYS)
            .expect_next(0)
            .verify_complete()
            .await
            .unwrap();
    }

    /// Verifications can be spawned onto a multi-threaded runtime, virtual or not
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_verification_can_be_spawned() {
        let real = tokio::spawn(
            StepVerifier::create(Flux::just([1, 2]))
                .expect_next_values([1, 2])
                .verify_complete(),
        );
        let virtual_time = tokio::spawn(
            StepVerifier::with_virtual_time(|| Mono::delay(TWO_DAYS))
                .expect_subscription()
                .then_await(TWO_DAYS)
                .expect_next(0)
                .verify_complete(),
        );

        real.await.unwrap().unwrap();
        virtual_time.await.unwrap().unwrap();
    }

    /// Without an explicit subscription step the no-event window sees onSubscribe
    #[tokio::test]
    async fn test_no_event_as_first_step_sees_subscription() {
        let result = StepVerifier::with_virtual_time(Mono::<i32>::never)
            .expect_no_event(Duration::from_secs(1))
            .then_cancel()
            .verify()
            .await;
        assert!(message(result).starts_with("expectation failed (expected no event: onSubscribe("));
    }

    #[tokio::test]
    async fn test_silent_source_times_out() {
        let result = StepVerifier::create(Mono::<i32>::never())
            .expect_subscription()
            .expect_complete()
            .verify_timeout(Duration::from_millis(50))
            .await;
        assert_eq!(message(result), "VerifySubscriber timed out on EmptySubscription");

        let options = StepVerifierOptions::create().scenario_name("slow");
        let result = StepVerifier::create_with_options(Mono::<i32>::never(), options)
            .expect_subscription()
            .expect_complete()
            .verify_timeout(Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(VerifyError::Timeout(ref name)) if name == "slow"));
    }

    /// Real-time windows wait on the wall clock
    #[tokio::test]
    async fn test_no_event_in_real_time() {
        StepVerifier::create(Mono::just(1).delay_element(Duration::from_millis(300)))
            .expect_subscription()
            .expect_no_event(Duration::from_millis(50))
            .expect_next(1)
            .verify_complete()
            .await
            .unwrap();
    }
}
