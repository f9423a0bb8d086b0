// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Switchable upstream for stages that subscribe to more than one source per
//! run (recovery, retry, concatenation).
//!
//! The arbiter remembers how much demand downstream granted and how much of it
//! was consumed, so a replacement subscription receives exactly the demand the
//! previous one left unfulfilled.

use std::sync::{Arc, Mutex};

use crate::signal::UNBOUNDED;
use crate::traits::SubscriptionRef;
use crate::utils::sync::locked;

pub struct SubscriptionArbiter<T> {
    state: Mutex<ArbiterState<T>>,
}

struct ArbiterState<T> {
    current: Option<SubscriptionRef<T>>,
    outstanding: u64,
    cancelled: bool,
}

impl<T> Default for SubscriptionArbiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionArbiter<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                current: None,
                outstanding: 0,
                cancelled: false,
            }),
        }
    }

    /// Switch to `next`, carrying over the outstanding demand.
    pub fn set(&self, next: SubscriptionRef<T>) {
        let carried = {
            let mut state = locked(&self.state);
            if state.cancelled {
                None
            } else {
                state.current = Some(Arc::clone(&next));
                Some(state.outstanding)
            }
        };
        match carried {
            None => next.cancel(),
            Some(0) => {}
            Some(n) => next.request(n),
        }
    }

    pub fn request(&self, n: u64) {
        let current = {
            let mut state = locked(&self.state);
            if state.outstanding != UNBOUNDED {
                state.outstanding = state.outstanding.saturating_add(n);
            }
            state.current.clone()
        };
        if let Some(s) = current {
            s.request(n);
        }
    }

    /// Account for `n` values delivered downstream.
    pub fn produced(&self, n: u64) {
        let mut state = locked(&self.state);
        if state.outstanding != UNBOUNDED {
            state.outstanding = state.outstanding.saturating_sub(n);
        }
    }

    pub fn cancel(&self) {
        let current = {
            let mut state = locked(&self.state);
            state.cancelled = true;
            state.current.take()
        };
        if let Some(s) = current {
            s.cancel();
        }
    }

    /// Drop the current subscription after it terminated.
    pub fn release(&self) {
        locked(&self.state).current = None;
    }

    pub fn outstanding(&self) -> u64 {
        locked(&self.state).outstanding
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

    impl Subscription<&'static str> for Recording {
        fn request(&self, n: u64) {
            self.requested.fetch_add(n, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_unfulfilled_demand_carries_over() {
        let arbiter: SubscriptionArbiter<&'static str> = SubscriptionArbiter::new();
        let first = Arc::new(Recording::default());
        arbiter.set(first.clone());
        arbiter.request(5);
        arbiter.produced(2);

        let second = Arc::new(Recording::default());
        arbiter.set(second.clone());

        assert_eq!(first.requested.load(Ordering::SeqCst), 5);
        assert_eq!(second.requested.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unbounded_never_decreases() {
        let arbiter: SubscriptionArbiter<&'static str> = SubscriptionArbiter::new();
        arbiter.request(UNBOUNDED);
        arbiter.produced(10);
        assert_eq!(arbiter.outstanding(), UNBOUNDED);
    }

    #[test]
    fn test_cancelled_arbiter_cancels_replacements() {
        let arbiter: SubscriptionArbiter<&'static str> = SubscriptionArbiter::new();
        let first = Arc::new(Recording::default());
        arbiter.set(first.clone());
        arbiter.cancel();
        arbiter.cancel();

        let second = Arc::new(Recording::default());
        arbiter.set(second.clone());

        assert!(first.cancelled.load(Ordering::SeqCst));
        assert!(second.cancelled.load(Ordering::SeqCst));
        assert_eq!(second.requested.load(Ordering::SeqCst), 0);
    }
}
