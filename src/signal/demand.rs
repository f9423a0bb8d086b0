// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::FlowError;

/// Demand sentinel meaning "no limit". Once reached it never decreases.
pub const UNBOUNDED: u64 = u64::MAX;

/// Outstanding demand of one subscription.
///
/// Requests may arrive from any thread; additions saturate at [`UNBOUNDED`]
/// and deliveries never drive the counter below zero.
#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicU64,
}

impl Demand {
    pub fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }

    /// Add `n` and return the value before the addition.
    ///
    /// A previous value of zero tells the caller it now owns emission.
    pub fn add(&self, n: u64) -> u64 {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_add(n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Subtract `n` delivered values and return what remains.
    pub fn produced(&self, n: u64) -> u64 {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_sub(n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Reject `request(0)`.
pub fn validate(n: u64) -> Result<(), FlowError> {
    if n == 0 {
        return Err(FlowError::InvalidRequest(n));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_returns_previous() {
        let demand = Demand::new();
        assert_eq!(demand.add(3), 0);
        assert_eq!(demand.add(2), 3);
        assert_eq!(demand.get(), 5);
    }

    #[test]
    fn test_add_saturates_at_unbounded() {
        let demand = Demand::new();
        demand.add(UNBOUNDED - 1);
        demand.add(10);
        assert!(demand.is_unbounded());
        assert_eq!(demand.produced(1_000), UNBOUNDED);
        assert_eq!(demand.add(1), UNBOUNDED);
    }

    #[test]
    fn test_produced_never_goes_negative() {
        let demand = Demand::new();
        demand.add(2);
        assert_eq!(demand.produced(1), 1);
        assert_eq!(demand.produced(5), 0);
    }

    #[test]
    fn test_concurrent_requests_are_merged() {
        let demand = Arc::new(Demand::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let demand = Arc::clone(&demand);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        demand.add(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(demand.get(), 8_000);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(matches!(validate(0), Err(FlowError::InvalidRequest(0))));
        assert!(validate(1).is_ok());
    }
}
