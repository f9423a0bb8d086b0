// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for verification runs.

use crate::errors::VerifyError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A verification run subscribed to its source.
///
/// # Log Level
/// `debug!` - Test lifecycle detail
pub struct VerificationStarted {
    pub steps: usize,
    pub virtual_time: bool,
}

impl Display for VerificationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting verification of {} steps ({} time)",
            self.steps,
            if self.virtual_time { "virtual" } else { "real" }
        )
    }
}

impl StructuredLog for VerificationStarted {
    fn log(&self) {
        tracing::debug!(steps = self.steps, virtual_time = self.virtual_time, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "verification",
            span_name = name,
            steps = self.steps,
            virtual_time = self.virtual_time,
        )
    }
}

/// Every step matched.
///
/// # Log Level
/// `debug!` - Test lifecycle detail
pub struct VerificationSucceeded {
    pub duration: Duration,
}

impl Display for VerificationSucceeded {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Verification succeeded in {:?}", self.duration)
    }
}

impl StructuredLog for VerificationSucceeded {
    fn log(&self) {
        tracing::debug!(duration_ms = self.duration.as_millis() as u64, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("verification_succeeded", span_name = name, duration = ?self.duration)
    }
}

/// A step failed or the run timed out.
///
/// # Log Level
/// `info!` - The caller receives the failure; logged for context
pub struct VerificationFailed<'a> {
    pub error: &'a VerifyError,
}

impl Display for VerificationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Verification failed: {}", self.error)
    }
}

impl StructuredLog for VerificationFailed<'_> {
    fn log(&self) {
        tracing::info!(suppressed = self.error.suppressed().len(), "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("verification_failed", span_name = name)
    }
}

/// A signal reached the verifying subscriber.
///
/// # Log Level
/// `trace!` - One per signal
pub struct SignalObserved<'a> {
    pub signal: &'a str,
}

impl Display for SignalObserved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Observed {}", self.signal)
    }
}

impl StructuredLog for SignalObserved<'_> {
    fn log(&self) {
        tracing::trace!(signal = self.signal, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("signal", span_name = name, signal = self.signal)
    }
}
