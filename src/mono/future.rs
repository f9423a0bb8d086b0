// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::errors::FlowError;
use crate::hooks;
use crate::mono::Mono;
use crate::signal::UNBOUNDED;
use crate::traits::{Subscriber, SubscriberRef, SubscriptionRef};
use crate::utils::sync::locked;

type Outcome<T> = Result<Option<T>, FlowError>;

/// Resolves with the outcome of a single [`Mono`] subscription.
pub struct MonoFuture<T> {
    receiver: oneshot::Receiver<Outcome<T>>,
    subscriber: Arc<FutureSubscriber<T>>,
}

impl<T: Send + 'static> MonoFuture<T> {
    pub(crate) fn subscribe(mono: &Mono<T>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let subscriber = Arc::new(FutureSubscriber {
            sender: Mutex::new(Some(sender)),
            value: Mutex::new(None),
            subscription: Mutex::new(None),
            done: AtomicBool::new(false),
        });
        mono.subscribe(Arc::clone(&subscriber) as SubscriberRef<T>);
        Self {
            receiver,
            subscriber,
        }
    }
}

impl<T> Future for MonoFuture<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(FlowError::msg("subscription ended without a terminal signal")))
        })
    }
}

impl<T> Drop for MonoFuture<T> {
    fn drop(&mut self) {
        self.subscriber.cancel();
    }
}

struct FutureSubscriber<T> {
    sender: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
    value: Mutex<Option<T>>,
    subscription: Mutex<Option<SubscriptionRef<T>>>,
    done: AtomicBool,
}

impl<T> FutureSubscriber<T> {
    fn cancel(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = locked(&self.subscription).take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    fn finish(&self, outcome: Outcome<T>) {
        locked(&self.subscription).take();
        let sender = locked(&self.sender).take();
        if let Some(sender) = sender {
            // The receiver is gone once the future was dropped.
            let _ = sender.send(outcome);
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for FutureSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef<T>) {
        if self.done.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        *locked(&self.subscription) = Some(Arc::clone(&subscription));
        subscription.request(UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::value_dropped(value);
            return;
        }
        *locked(&self.value) = Some(value);
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::error_dropped(&error);
            return;
        }
        self.finish(Err(error));
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        let value = locked(&self.value).take();
        self.finish(Ok(value));
    }
}
