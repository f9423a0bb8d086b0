// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fusion negotiation.
//!
//! A producer whose subscription exposes a [`QueueSubscription`] lets a
//! fusion-aware consumer drain values by polling instead of receiving
//! `on_next` calls. The consumer asks for a mode during `on_subscribe`, before
//! any request, and the producer answers with the mode it grants:
//!
//! * `SYNC` - every value is already available; `poll` returning `None` means
//!   the run completed. `request` is never called.
//! * `ASYNC` - values arrive over time; the producer calls `on_available`
//!   whenever new values can be polled and still delivers the terminal signal
//!   through `on_complete`/`on_error`.
//! * `NONE` - fusion refused; the ordinary protocol applies.
//!
//! Consumers that never ask see plain signals, so fusion stays invisible to
//! them.

use std::fmt::{self, Debug, Display, Formatter};
use std::ops::BitOr;

use crate::errors::FlowError;

/// Requested or granted fusion mode.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FusionMode(u8);

impl FusionMode {
    pub const NONE: FusionMode = FusionMode(0);
    pub const SYNC: FusionMode = FusionMode(1);
    pub const ASYNC: FusionMode = FusionMode(2);
    pub const ANY: FusionMode = FusionMode(3);
    /// Added to a request when the consumer drains on another thread than
    /// the one the producer runs on.
    pub const THREAD_BARRIER: FusionMode = FusionMode(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Inverse of [`FusionMode::bits`], for modes kept in an atomic.
    pub fn from_bits(bits: u8) -> FusionMode {
        FusionMode(bits)
    }

    /// True when every flag of `other` is set. `NONE` is never contained.
    pub fn contains(self, other: FusionMode) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_none(self) -> bool {
        self.0 & FusionMode::ANY.0 == 0
    }

    pub fn without_barrier(self) -> FusionMode {
        FusionMode(self.0 & !FusionMode::THREAD_BARRIER.0)
    }
}

impl BitOr for FusionMode {
    type Output = FusionMode;

    fn bitor(self, rhs: FusionMode) -> FusionMode {
        FusionMode(self.0 | rhs.0)
    }
}

impl Display for FusionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self.0 & FusionMode::ANY.0 {
            0 => "none",
            1 => "sync",
            2 => "async",
            _ => "any",
        };
        write!(f, "({})", name)
    }
}

impl Debug for FusionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Pollable view of a subscription.
pub trait QueueSubscription<T>: Send + Sync {
    fn request_fusion(&self, requested: FusionMode) -> FusionMode;

    /// Next available value. In `SYNC` mode `Ok(None)` means completion.
    fn poll(&self) -> Result<Option<T>, FlowError>;

    fn is_empty(&self) -> bool;

    fn size(&self) -> usize;

    fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(FusionMode::NONE.to_string(), "(none)");
        assert_eq!(FusionMode::SYNC.to_string(), "(sync)");
        assert_eq!(FusionMode::ASYNC.to_string(), "(async)");
        assert_eq!(FusionMode::ANY.to_string(), "(any)");
        assert_eq!((FusionMode::SYNC | FusionMode::THREAD_BARRIER).to_string(), "(sync)");
    }

    #[test]
    fn test_contains() {
        assert!(FusionMode::ANY.contains(FusionMode::SYNC));
        assert!(FusionMode::ANY.contains(FusionMode::ASYNC));
        assert!(!FusionMode::SYNC.contains(FusionMode::ASYNC));
        assert!(!FusionMode::ANY.contains(FusionMode::NONE));
        assert!((FusionMode::ASYNC | FusionMode::THREAD_BARRIER).contains(FusionMode::THREAD_BARRIER));
        assert_eq!(
            (FusionMode::ASYNC | FusionMode::THREAD_BARRIER).without_barrier(),
            FusionMode::ASYNC
        );
    }
}
