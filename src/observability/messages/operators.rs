// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for operator-level events.

use crate::errors::FlowError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A failed run is being re-subscribed.
///
/// # Log Level
/// `debug!` - Retries are routine
///
/// # Example
/// ```
/// use backflow::errors::FlowError;
/// use backflow::observability::messages::operators::RetryAttempt;
///
/// let error = FlowError::msg("connection reset");
/// let msg = RetryAttempt {
///     attempt: 2,
///     max_attempts: Some(3),
///     error: &error,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct RetryAttempt<'a> {
    pub attempt: u64,
    pub max_attempts: Option<u64>,
    pub error: &'a FlowError,
}

impl Display for RetryAttempt<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.max_attempts {
            Some(max) => write!(
                f,
                "Retrying after failure (attempt {}/{}): {}",
                self.attempt, max, self.error
            ),
            None => write!(
                f,
                "Retrying after failure (attempt {}, companion driven): {}",
                self.attempt, self.error
            ),
        }
    }
}

impl StructuredLog for RetryAttempt<'_> {
    fn log(&self) {
        tracing::debug!(
            attempt = self.attempt,
            max_attempts = ?self.max_attempts,
            error_kind = self.error.as_label(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "retry",
            span_name = name,
            attempt = self.attempt,
            max_attempts = ?self.max_attempts,
        )
    }
}

/// The retry companion terminated and ended the retry cycle.
///
/// # Log Level
/// `debug!` - Routine termination
pub struct CompanionTerminated<'a> {
    pub outcome: &'a str,
    pub attempts: u64,
}

impl Display for CompanionTerminated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Retry companion terminated with {} after {} attempts",
            self.outcome, self.attempts
        )
    }
}

impl StructuredLog for CompanionTerminated<'_> {
    fn log(&self) {
        tracing::debug!(outcome = self.outcome, attempts = self.attempts, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "companion_terminated",
            span_name = name,
            outcome = self.outcome,
            attempts = self.attempts,
        )
    }
}

/// A scoped resource was released.
///
/// # Log Level
/// `trace!` - Happens once per resource-scoped run
pub struct ResourceReleased<'a> {
    pub trigger: &'a str,
}

impl Display for ResourceReleased<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Scoped resource released on {}", self.trigger)
    }
}

impl StructuredLog for ResourceReleased<'_> {
    fn log(&self) {
        tracing::trace!(trigger = self.trigger, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("resource_released", span_name = name, trigger = self.trigger)
    }
}

/// A user callback failed inside a stage and became an `Error` signal.
///
/// # Log Level
/// `debug!` - Downstream observes the error anyway
pub struct CallbackFailed<'a> {
    pub stage: &'a str,
    pub error: &'a FlowError,
}

impl Display for CallbackFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Callback in '{}' failed: {}", self.stage, self.error)
    }
}

impl StructuredLog for CallbackFailed<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            error_kind = self.error.as_label(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("callback_failed", span_name = name, stage = self.stage)
    }
}
