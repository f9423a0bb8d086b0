// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests {
    use crate::errors::FlowError;
    use crate::flux::Flux;
    use crate::hooks;
    use crate::mono::Mono;
    use crate::scheduler::Schedulers;
    use crate::sinks;
    use crate::traits::{EmptySubscription, FusionMode, Publisher, SubscriberRef};
    use crate::verifier::StepVerifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Dropped-error hooks are process-wide; tests installing one take turns.
    static HOOKS: Mutex<()> = Mutex::new(());

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&count), count)
    }

    fn current_thread_name() -> String {
        thread::current().name().unwrap_or("unnamed").to_string()
    }

    /// Retry re-runs the whole upstream, values included
    #[tokio::test]
    async fn test_retry_replays_values_then_fails() {
        let flaky = Flux::just([1, 2])
            .concat_with(Flux::error(FlowError::msg("boom")))
            .retry(1);

        StepVerifier::create(flaky)
            .expect_next_values([1, 2, 1, 2])
            .verify_error_message("boom")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let (attempts, seen) = counter();
        let failing = Flux::defer(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Flux::<i32>::error(FlowError::msg("boom"))
        });

        StepVerifier::create(failing.retry(2))
            .verify_error_message("boom")
            .await
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_when_source_succeeds() {
        let (attempts, seen) = counter();
        let recovering = Flux::defer(move || {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Flux::error(FlowError::msg("not yet"))
            } else {
                Flux::just(["ok"])
            }
        });

        StepVerifier::create(recovering.retry(5))
            .expect_next("ok")
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    /// Companion completion ends the run successfully
    #[tokio::test]
    async fn test_retry_when_companion_completion_completes() {
        let (attempts, seen) = counter();
        let failing = Flux::defer(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Flux::<i32>::error(FlowError::msg("boom"))
        });

        StepVerifier::create(failing.retry_when(|errors| errors.take(2)))
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_when_companion_error_fails() {
        let failing = Flux::<i32>::error(FlowError::msg("boom"));
        let companion = |errors: Flux<FlowError>| {
            errors.try_map(|e| -> Result<u64, FlowError> {
                Err(FlowError::msg(format!("giving up after {}", e)))
            })
        };

        StepVerifier::create(failing.retry_when(companion))
            .verify_error_message("giving up after boom")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recovery_operators() {
        StepVerifier::create(
            Flux::just([1])
                .concat_with(Flux::error(FlowError::msg("boom")))
                .on_error_return(-1),
        )
        .expect_next(1)
        .expect_next(-1)
        .verify_complete()
        .await
        .unwrap();

        StepVerifier::create(
            Mono::<i32>::error(FlowError::msg("boom"))
                .map_err(|e| FlowError::msg(format!("wrapped: {}", e))),
        )
        .verify_error_message("wrapped: boom")
        .await
        .unwrap();
    }

    /// A failing callback cancels upstream and fails downstream
    #[tokio::test]
    async fn test_peek_callback_failure() {
        let (cancelled, on_cancel) = counter();
        let source = Flux::range(1, 5)
            .do_on_cancel(move || {
                on_cancel.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .do_on_next(|n| {
                if *n == 2 {
                    Err(FlowError::msg("no twos"))
                } else {
                    Ok(())
                }
            });

        StepVerifier::create(source)
            .expect_next(1)
            .verify_error_message("no twos")
            .await
            .unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    /// Errors that cannot be delivered reach the dropped-error hook
    #[tokio::test]
    async fn test_undeliverable_error_reaches_hook() {
        let _hooks = HOOKS.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&dropped);
        hooks::on_error_dropped(move |e| sink.lock().unwrap().push(e.to_string()));

        StepVerifier::create(
            Flux::range(1, 100).do_on_cancel(|| Err(FlowError::msg("cancel callback failed"))),
        )
        .expect_next(1)
        .then_cancel()
        .verify()
        .await
        .unwrap();

        hooks::reset_on_error_dropped();
        assert!(dropped
            .lock()
            .unwrap()
            .iter()
            .any(|e| e == "cancel callback failed"));
    }

    /// Fatal errors raised by callbacks panic instead of becoming signals
    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_try_map_fatal_error_panics() {
        Flux::just([1]).try_map(|_| Err::<i32, _>(FlowError::Fatal("out of memory".into()))).subscribe_with(
            |_| {},
            |_| {},
            || {},
        );
    }

    #[tokio::test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    async fn test_fused_try_map_fatal_error_panics() {
        let mapped = Flux::range(1, 3).try_map(|_| Err::<i64, _>(FlowError::Fatal("out of memory".into())));
        let _ = StepVerifier::create(mapped)
            .expect_fusion_mode(FusionMode::SYNC)
            .expect_next(1)
            .verify_complete()
            .await;
    }

    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_do_on_next_fatal_error_panics() {
        Flux::just([1])
            .do_on_next(|_| Err(FlowError::Fatal("out of memory".into())))
            .subscribe_with(|_| {}, |_| {}, || {});
    }

    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_do_on_complete_fatal_error_panics() {
        Flux::just([1])
            .do_on_complete(|| Err(FlowError::Fatal("out of memory".into())))
            .subscribe_with(|_| {}, |_| {}, || {});
    }

    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_do_on_error_fatal_error_panics() {
        Flux::<i32>::error(FlowError::msg("boom"))
            .do_on_error(|_| Err(FlowError::Fatal("out of memory".into())))
            .subscribe_with(|_| {}, |_| {}, || {});
    }

    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_using_fatal_acquire_panics() {
        Flux::using(
            || Err::<i32, _>(FlowError::Fatal("out of memory".into())),
            |r: &i32| Flux::just([*r]),
            |_| {},
        )
        .subscribe_with(|_| {}, |_| {}, || {});
    }

    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_from_callable_fatal_error_panics() {
        Mono::<i32>::from_callable(|| Err(FlowError::Fatal("out of memory".into())))
            .subscribe_with(|_| {}, |_| {}, || {});
    }

    #[tokio::test]
    async fn test_using_releases_once_on_completion() {
        let (released, on_release) = counter();
        let scoped = Flux::using(
            || Ok(5),
            |r: &i32| Flux::just([*r, *r + 1]),
            move |_| {
                on_release.fetch_add(1, Ordering::SeqCst);
            },
        );

        StepVerifier::create(scoped)
            .expect_next(5)
            .expect_next(6)
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_using_releases_once_on_cancel() {
        let (released, on_release) = counter();
        let scoped = Flux::using(
            || Ok(1),
            |r: &i64| Flux::range(*r, 100),
            move |_| {
                on_release.fetch_add(1, Ordering::SeqCst);
            },
        );

        StepVerifier::create_with_request(scoped, 1)
            .expect_next(1)
            .then_cancel()
            .verify()
            .await
            .unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_using_acquire_failure() {
        let scoped = Flux::using(
            || Err::<i32, _>(FlowError::msg("no resource")),
            |r: &i32| Flux::just([*r]),
            |_| {},
        );
        StepVerifier::create(scoped)
            .verify_error_message("no resource")
            .await
            .unwrap();
    }

    /// Map and filter pass the source's fusion through
    #[tokio::test]
    async fn test_fusion_passes_through_map_and_filter() {
        StepVerifier::create(Flux::range(1, 6).filter(|n| n % 2 == 1).map(|n| n * 10))
            .expect_fusion_mode(FusionMode::SYNC)
            .expect_next_values([10, 30, 50])
            .verify_complete()
            .await
            .unwrap();
    }

    /// Publish-on hands values across the worker boundary as an ASYNC queue
    #[tokio::test]
    async fn test_publish_on_grants_async_fusion() {
        StepVerifier::create(Flux::just(["foo", "bar"]).publish_on(Schedulers::immediate()))
            .expect_fusion_granted(FusionMode::SYNC | FusionMode::ASYNC, FusionMode::ASYNC)
            .expect_next("foo")
            .expect_next("bar")
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_on_never_grants_sync_fusion() {
        let result = StepVerifier::create(Flux::just(["foo", "bar"]).publish_on(Schedulers::immediate()))
            .expect_fusion_granted(FusionMode::SYNC | FusionMode::ASYNC, FusionMode::SYNC)
            .expect_next("foo")
            .expect_next("bar")
            .verify_complete()
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "expectation failed (expected fusion mode: (sync); actual: (async))"
        );
    }

    #[tokio::test]
    async fn test_publish_on_fused_output_from_worker_thread() {
        let single = Schedulers::single().unwrap();
        StepVerifier::create(Flux::range(1, 5).publish_on(single))
            .expect_fusion_mode(FusionMode::ASYNC)
            .expect_next_values([1, 2, 3, 4, 5])
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_on_delivers_on_scheduler_thread() {
        let single = Schedulers::single().unwrap();
        let observed = Flux::range(1, 3)
            .publish_on(single)
            .map(|n| (n, current_thread_name()));

        let on_single = |(_, name): &(i64, String)| {
            if name.ends_with("-single") {
                Ok(())
            } else {
                Err(format!("delivered on {}", name))
            }
        };
        StepVerifier::create(observed)
            .assert_next(on_single)
            .assert_next(on_single)
            .assert_next(on_single)
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_on_runs_source_on_scheduler_thread() {
        let parallel = Schedulers::parallel().unwrap();
        let source = Flux::defer(|| Flux::just([current_thread_name()])).subscribe_on(parallel);

        StepVerifier::create(source)
            .assert_next(|name| {
                if name.ends_with("-parallel") {
                    Ok(())
                } else {
                    Err(format!("subscribed on {}", name))
                }
            })
            .verify_complete()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timeout_in_virtual_time() {
        StepVerifier::with_virtual_time(|| Flux::<i32>::never().timeout(Duration::from_secs(5)))
            .expect_subscription()
            .expect_no_event(Duration::from_secs(4))
            .then_await(Duration::from_secs(1))
            .verify_error_message("did not observe any item or terminal signal within 5s")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timeout_is_reset_by_values() {
        StepVerifier::with_virtual_time(|| {
            Flux::interval(Duration::from_secs(2))
                .take(3)
                .timeout(Duration::from_secs(3))
        })
        .expect_subscription()
        .then_await(Duration::from_secs(6))
        .expect_next_values([0, 1, 2])
        .verify_complete()
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_delay_elements_in_virtual_time() {
        StepVerifier::with_virtual_time(|| Flux::just(["a", "b"]).delay_elements(Duration::from_secs(1)))
            .expect_subscription()
            .expect_no_event(Duration::from_secs(1))
            .expect_next("a")
            .expect_no_event(Duration::from_secs(1))
            .expect_next("b")
            .verify_complete()
            .await
            .unwrap();
    }

    /// Take cancels upstream once its limit is reached
    #[tokio::test]
    async fn test_take_cancels_upstream() {
        let (cancelled, on_cancel) = counter();
        let limited = Flux::range(1, 100)
            .do_on_cancel(move || {
                on_cancel.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .take(2);

        StepVerifier::create(limited)
            .expect_next_values([1, 2])
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_filter_replenishes_demand() {
        StepVerifier::create_with_request(Flux::range(1, 10).filter(|n| n % 2 == 0), 2)
            .expect_next(2)
            .expect_next(4)
            .then_request(3)
            .expect_next_values([6, 8, 10])
            .verify_complete()
            .await
            .unwrap();
    }

    /// Fused take only hands out what was requested and stops at its limit
    #[tokio::test]
    async fn test_take_async_fused_respects_demand() {
        let (sink, flux) = sinks::unicast::<&str>();
        let feed = Arc::new(sink);
        let (first, second, third) = (Arc::clone(&feed), Arc::clone(&feed), Arc::clone(&feed));

        StepVerifier::create_with_request(flux.take(3), 0)
            .expect_fusion()
            .then(move || {
                first.next("test").unwrap();
                first.next("test2").unwrap();
            })
            .then_request(2)
            .expect_next_values(["test", "test2"])
            .then(move || {
                second.next("test3").unwrap();
                second.next("test4").unwrap();
            })
            .then_request(1)
            .expect_next("test3")
            .then(move || {
                let _ = third.next("test5");
            })
            .verify_complete()
            .await
            .unwrap();
        assert!(feed.is_cancelled());
    }

    #[tokio::test]
    async fn test_take_async_fused_cancel() {
        let (sink, flux) = sinks::unicast::<&str>();
        let feed = Arc::new(sink);
        let pusher = Arc::clone(&feed);

        StepVerifier::create_with_request(flux.take(3), 0)
            .expect_fusion()
            .then(move || {
                pusher.next("test").unwrap();
                pusher.next("test2").unwrap();
            })
            .then_request(2)
            .expect_next_values(["test", "test2"])
            .then_cancel()
            .verify()
            .await
            .unwrap();
        assert!(feed.is_cancelled());
    }

    #[tokio::test]
    async fn test_take_sync_fused_stops_at_limit() {
        StepVerifier::create(Flux::range(1, 10).take(3))
            .expect_fusion_mode(FusionMode::SYNC)
            .expect_next_values([1, 2, 3])
            .verify_complete()
            .await
            .unwrap();
    }

    /// Only the subscribe_on closest to the source decides where it subscribes
    #[tokio::test]
    async fn test_innermost_subscribe_on_wins() {
        let source = Flux::defer(|| Flux::just([current_thread_name()]))
            .subscribe_on(Schedulers::single().unwrap())
            .subscribe_on(Schedulers::parallel().unwrap());

        StepVerifier::create(source)
            .assert_next(|name| {
                if name.ends_with("-single") {
                    Ok(())
                } else {
                    Err(format!("subscribed on {}", name))
                }
            })
            .verify_complete()
            .await
            .unwrap();
    }

    /// Emits completion and then an error, as a misbehaving source might
    struct CompleteThenError;

    impl Publisher<i32> for CompleteThenError {
        fn subscribe(&self, subscriber: SubscriberRef<i32>) {
            subscriber.on_subscribe(Arc::new(EmptySubscription));
            subscriber.on_complete();
            subscriber.on_error(FlowError::msg("late failure"));
        }
    }

    /// The losing terminal signal of a race goes to the dropped-error hook
    #[tokio::test]
    async fn test_second_terminal_error_reaches_hook() {
        let _hooks = HOOKS.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&dropped);
        hooks::on_error_dropped(move |e| sink.lock().unwrap().push(e.to_string()));

        let result = StepVerifier::create(Flux::from_publisher(CompleteThenError).map(|n| n + 1))
            .verify_complete()
            .await;

        hooks::reset_on_error_dropped();
        result.unwrap();
        assert!(dropped.lock().unwrap().iter().any(|e| e == "late failure"));
    }

    /// Unused demand carries over to the next concatenated source
    #[tokio::test]
    async fn test_concat_carries_demand() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let second = Flux::just([3, 4]).do_on_request(move |n| {
            seen.lock().unwrap().push(n);
            Ok(())
        });

        StepVerifier::create_with_request(Flux::just([1, 2]).concat_with(second), 3)
            .expect_next_values([1, 2, 3])
            .then_request(1)
            .expect_next(4)
            .verify_complete()
            .await
            .unwrap();
        assert_eq!(*requests.lock().unwrap(), vec![1, 1]);
    }
}
