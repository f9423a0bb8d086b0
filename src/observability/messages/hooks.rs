// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for signals that could not be delivered.

use crate::errors::FlowError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// An error arrived after its run had already terminated.
///
/// # Log Level
/// `error!` - The failure is otherwise invisible
pub struct ErrorDropped<'a> {
    pub error: &'a FlowError,
}

impl Display for ErrorDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Operator called default onErrorDropped: {}", self.error)
    }
}

impl StructuredLog for ErrorDropped<'_> {
    fn log(&self) {
        tracing::error!(error_kind = self.error.as_label(), "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "error_dropped",
            span_name = name,
            error_kind = self.error.as_label(),
        )
    }
}

/// A value arrived after its run had already terminated.
///
/// # Log Level
/// `debug!` - Expected during cancellation races
pub struct ValueDropped<'a> {
    pub value_type: &'a str,
}

impl Display for ValueDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "onNextDropped: discarded a value of type {}", self.value_type)
    }
}

impl StructuredLog for ValueDropped<'_> {
    fn log(&self) {
        tracing::debug!(value_type = self.value_type, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("value_dropped", span_name = name, value_type = self.value_type)
    }
}
