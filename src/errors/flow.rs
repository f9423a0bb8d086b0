// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error carried by an `Error` signal.
///
/// Data errors (a failing callback, a failing source) and protocol errors
/// (overflow, invalid request) share this type so every stage can forward
/// them without knowing where they came from. Cloning is cheap; wrapped
/// foreign errors are reference counted.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// Free-form failure raised by user code.
    #[error("{0}")]
    Message(String),

    /// A foreign error surfaced through the protocol.
    #[error("{0}")]
    Source(Arc<dyn std::error::Error + Send + Sync>),

    /// `request(0)` was issued against a subscription.
    #[error("request must be strictly positive, got: {0}")]
    InvalidRequest(u64),

    /// A producer had more values than the consumer asked for.
    #[error("{0}")]
    Overflow(String),

    /// A signal arrived out of the order the protocol allows.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No signal was observed within the configured window.
    #[error("did not observe any item or terminal signal within {0:?}")]
    Timeout(Duration),

    /// A disposed scheduler or worker refused a task.
    #[error("task rejected: {0}")]
    Rejected(String),

    /// Resource exhaustion; never delivered as a signal.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl FlowError {
    pub fn msg(message: impl Into<String>) -> Self {
        FlowError::Message(message.into())
    }

    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FlowError::Source(Arc::new(error))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FlowError::Fatal(_))
    }

    /// Short label for the variant, used in diagnostics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FlowError::Message(_) => "message",
            FlowError::Source(_) => "source",
            FlowError::InvalidRequest(_) => "invalid_request",
            FlowError::Overflow(_) => "overflow",
            FlowError::ProtocolViolation(_) => "protocol_violation",
            FlowError::Timeout(_) => "timeout",
            FlowError::Rejected(_) => "rejected",
            FlowError::Fatal(_) => "fatal",
        }
    }
}

/// Pass a non-fatal error through unchanged.
///
/// # Panics
///
/// Panics when `error` is [`FlowError::Fatal`]. Fatal conditions leave the
/// signal protocol and unwind into whatever context is running the stage.
pub fn throw_if_fatal(error: FlowError) -> FlowError {
    if let FlowError::Fatal(reason) = &error {
        panic!("fatal error escaped the signal protocol: {}", reason);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_error_displays_source_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error = FlowError::from_error(io);
        assert_eq!(error.to_string(), "disk gone");
        assert_eq!(error.as_label(), "source");
    }

    #[test]
    fn test_non_fatal_passes_through() {
        let error = throw_if_fatal(FlowError::msg("boom"));
        assert_eq!(error.to_string(), "boom");
    }

    #[test]
    #[should_panic(expected = "fatal error escaped the signal protocol")]
    fn test_fatal_error_panics() {
        throw_if_fatal(FlowError::Fatal("out of memory".into()));
    }
}
