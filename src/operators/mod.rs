// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Operator stages.
//!
//! Every stage is a [`Publisher`](crate::traits::Publisher) wrapping its
//! upstream plus an inner subscriber created per subscription. The inner
//! subscriber doubles as the [`Subscription`] handed downstream, so demand and
//! cancellation travel backward through the same object that forwards signals.
//!
//! Shared rules for every stage:
//! * a `done` flag is claimed with an atomic swap before any terminal signal;
//!   losers route errors to [`hooks::error_dropped`](crate::hooks::error_dropped)
//!   and values to [`hooks::value_dropped`](crate::hooks::value_dropped)
//! * no lock is held while calling into another stage
//! * the upstream subscription is released on termination so that
//!   subscriber/subscription pairs do not keep each other alive

pub mod arbiter;
pub mod concat;
pub mod filter;
pub mod hide;
pub mod lambda;
pub mod map;
pub mod peek;
pub mod publish_on;
pub mod recovery;
pub mod reduce;
pub mod retry;
pub mod retry_when;
pub mod scalar;
pub mod subscribe_on;
pub mod take;
pub mod timed;
pub mod using;

#[cfg(test)]
mod integration_tests;

use std::sync::{Arc, Mutex};

use crate::errors::FlowError;
use crate::hooks;
use crate::traits::{EmptySubscription, SubscriberRef, SubscriptionRef};
use crate::utils::sync::locked;

pub use arbiter::SubscriptionArbiter;
pub use lambda::LambdaSubscriber;
pub use peek::PeekCallbacks;
pub use scalar::DeferredScalar;

/// Terminate `actual` before it ever saw a real subscription.
pub fn fail_subscribe<T>(actual: &SubscriberRef<T>, error: FlowError) {
    actual.on_subscribe(Arc::new(EmptySubscription));
    actual.on_error(error);
}

/// Complete `actual` before it ever saw a real subscription.
pub fn complete_subscribe<T>(actual: &SubscriberRef<T>) {
    actual.on_subscribe(Arc::new(EmptySubscription));
    actual.on_complete();
}

/// Single upstream subscription slot of a stage.
///
/// Requests issued before the subscription arrives accumulate and are
/// replayed when it is set. Cancelling before arrival cancels the late
/// subscription as soon as it shows up.
pub struct Upstream<T> {
    state: Mutex<UpstreamState<T>>,
}

struct UpstreamState<T> {
    subscription: Option<SubscriptionRef<T>>,
    pending: u64,
    cancelled: bool,
}

impl<T> Default for Upstream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Upstream<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UpstreamState {
                subscription: None,
                pending: 0,
                cancelled: false,
            }),
        }
    }

    /// Store `subscription`, replaying deferred demand. Returns `false` if
    /// the slot was cancelled or already filled, in which case the new
    /// subscription has been cancelled.
    pub fn set(&self, subscription: SubscriptionRef<T>) -> bool {
        let pending = {
            let mut state = locked(&self.state);
            if state.cancelled {
                None
            } else if state.subscription.is_some() {
                hooks::error_dropped(&FlowError::ProtocolViolation(
                    "subscription already set".to_string(),
                ));
                None
            } else {
                state.subscription = Some(Arc::clone(&subscription));
                Some(std::mem::take(&mut state.pending))
            }
        };
        match pending {
            None => {
                subscription.cancel();
                false
            }
            Some(0) => true,
            Some(n) => {
                subscription.request(n);
                true
            }
        }
    }

    pub fn request(&self, n: u64) {
        let current = {
            let mut state = locked(&self.state);
            match &state.subscription {
                Some(s) => Some(Arc::clone(s)),
                None => {
                    if !state.cancelled {
                        state.pending = state.pending.saturating_add(n);
                    }
                    None
                }
            }
        };
        if let Some(s) = current {
            s.request(n);
        }
    }

    /// Idempotent; only the first call reaches upstream.
    pub fn cancel(&self) {
        let current = {
            let mut state = locked(&self.state);
            state.cancelled = true;
            state.subscription.take()
        };
        if let Some(s) = current {
            s.cancel();
        }
    }

    /// Forget the subscription after upstream terminated.
    pub fn release(&self) {
        let mut state = locked(&self.state);
        state.cancelled = true;
        state.subscription = None;
    }

    pub fn get(&self) -> Option<SubscriptionRef<T>> {
        locked(&self.state).subscription.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        locked(&self.state).cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Subscription;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct Recording {
        requested: AtomicU64,
        cancelled: AtomicBool,
    }

    impl Subscription<i32> for Recording {
        fn request(&self, n: u64) {
            self.requested.fetch_add(n, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deferred_requests_replay_on_set() {
        let upstream: Upstream<i32> = Upstream::new();
        upstream.request(2);
        upstream.request(3);

        let subscription = Arc::new(Recording::default());
        assert!(upstream.set(subscription.clone()));
        assert_eq!(subscription.requested.load(Ordering::SeqCst), 5);

        upstream.request(1);
        assert_eq!(subscription.requested.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_cancel_before_set_cancels_late_subscription() {
        let upstream: Upstream<i32> = Upstream::new();
        upstream.cancel();

        let subscription = Arc::new(Recording::default());
        assert!(!upstream.set(subscription.clone()));
        assert!(subscription.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_second_subscription_is_rejected() {
        let upstream: Upstream<i32> = Upstream::new();
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());

        assert!(upstream.set(first.clone()));
        assert!(!upstream.set(second.clone()));
        assert!(second.cancelled.load(Ordering::SeqCst));
        assert!(!first.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_drops_without_cancelling() {
        let upstream: Upstream<i32> = Upstream::new();
        let subscription = Arc::new(Recording::default());
        upstream.set(subscription.clone());

        upstream.release();
        upstream.cancel();
        assert!(upstream.get().is_none());
        assert!(!subscription.cancelled.load(Ordering::SeqCst));
    }
}
