// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable text and
//! [`StructuredLog`] to emit the same event with typed fields at the level the
//! message owns.
//!
//! # Organization
//!
//! * `hooks` - dropped values and errors
//! * `scheduler` - scheduler and worker lifecycle, virtual clock
//! * `operators` - operator-level events
//! * `verifier` - verification harness runs

use tracing::Span;

pub mod hooks;
pub mod operators;
pub mod scheduler;
pub mod verifier;

/// Emit a message as a structured `tracing` event or span.
pub trait StructuredLog {
    /// Log the event at the level owned by the message.
    fn log(&self);

    /// Open a span carrying the message fields.
    fn span(&self, name: &str) -> Span;
}
