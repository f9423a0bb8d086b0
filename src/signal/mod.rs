// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The four protocol signals and demand accounting.

pub mod demand;

use std::fmt::{self, Debug, Display, Formatter};

use crate::errors::FlowError;
use crate::traits::SubscriptionRef;

pub use demand::{Demand, UNBOUNDED};

/// One signal exchanged between a producer and a consumer.
///
/// A run observes exactly one `Subscribe` first, then any number of `Next`,
/// then at most one of `Complete` or `Error`.
pub enum Signal<T> {
    Subscribe(SubscriptionRef<T>),
    Next(T),
    Complete,
    Error(FlowError),
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Signal::Complete | Signal::Error(_))
    }

    pub fn is_next(&self) -> bool {
        matches!(self, Signal::Next(_))
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            Signal::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl<T: Debug> Display for Signal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Subscribe(s) => write!(f, "onSubscribe({})", s.name()),
            Signal::Next(v) => write!(f, "onNext({:?})", v),
            Signal::Complete => write!(f, "onComplete()"),
            Signal::Error(e) => write!(f, "onError({})", e),
        }
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EmptySubscription;
    use std::sync::Arc;

    #[test]
    fn test_signal_rendering() {
        let subscribe: Signal<&str> = Signal::Subscribe(Arc::new(EmptySubscription));
        assert_eq!(subscribe.to_string(), "onSubscribe(EmptySubscription)");
        assert_eq!(Signal::Next("foo").to_string(), "onNext(\"foo\")");
        assert_eq!(Signal::<i32>::Complete.to_string(), "onComplete()");
        assert_eq!(
            Signal::<i32>::Error(FlowError::msg("boom")).to_string(),
            "onError(boom)"
        );
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Signal::<i32>::Complete.is_terminal());
        assert!(Signal::<i32>::Error(FlowError::msg("x")).is_terminal());
        assert!(!Signal::Next(1).is_terminal());
        assert!(Signal::Next(1).is_next());
    }
}
