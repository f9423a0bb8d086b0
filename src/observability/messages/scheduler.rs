// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for scheduler lifecycle and the virtual clock.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A pooled scheduler started its execution context.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use backflow::observability::messages::scheduler::SchedulerCreated;
///
/// let msg = SchedulerCreated {
///     name: "parallel",
///     threads: 8,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct SchedulerCreated<'a> {
    pub name: &'a str,
    pub threads: usize,
}

impl Display for SchedulerCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Scheduler '{}' started with {} threads", self.name, self.threads)
    }
}

impl StructuredLog for SchedulerCreated<'_> {
    fn log(&self) {
        tracing::info!(scheduler = self.name, threads = self.threads, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scheduler_created",
            span_name = name,
            scheduler = self.name,
            threads = self.threads,
        )
    }
}

/// A scheduler was disposed; further scheduling is rejected.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct SchedulerDisposed<'a> {
    pub name: &'a str,
}

impl Display for SchedulerDisposed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Scheduler '{}' disposed", self.name)
    }
}

impl StructuredLog for SchedulerDisposed<'_> {
    fn log(&self) {
        tracing::debug!(scheduler = self.name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("scheduler_disposed", span_name = name, scheduler = self.name)
    }
}

/// A task was refused.
///
/// # Log Level
/// `warn!` - The caller receives the rejection as an error
pub struct TaskRejected<'a> {
    pub scheduler: &'a str,
    pub reason: &'a str,
}

impl Display for TaskRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Scheduler '{}' rejected a task: {}", self.scheduler, self.reason)
    }
}

impl StructuredLog for TaskRejected<'_> {
    fn log(&self) {
        tracing::warn!(scheduler = self.scheduler, reason = self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "task_rejected",
            span_name = name,
            scheduler = self.scheduler,
            reason = self.reason,
        )
    }
}

/// A task panicked on a worker. The worker keeps running.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct TaskPanicked<'a> {
    pub scheduler: &'a str,
    pub message: &'a str,
}

impl Display for TaskPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task panicked on scheduler '{}': {}", self.scheduler, self.message)
    }
}

impl StructuredLog for TaskPanicked<'_> {
    fn log(&self) {
        tracing::error!(scheduler = self.scheduler, panic = self.message, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "task_panicked",
            span_name = name,
            scheduler = self.scheduler,
            panic = self.message,
        )
    }
}

/// A virtual clock became the default scheduler on this thread.
///
/// # Log Level
/// `debug!` - Test lifecycle detail
pub struct VirtualTimeInstalled {
    pub depth: usize,
}

impl Display for VirtualTimeInstalled {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Virtual time installed (nesting depth {})", self.depth)
    }
}

impl StructuredLog for VirtualTimeInstalled {
    fn log(&self) {
        tracing::debug!(depth = self.depth, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("virtual_time_installed", span_name = name, depth = self.depth)
    }
}

/// A virtual clock guard was dropped and the previous factory restored.
///
/// # Log Level
/// `debug!` - Test lifecycle detail
pub struct VirtualTimeRestored {
    pub depth: usize,
}

impl Display for VirtualTimeRestored {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Virtual time restored (nesting depth {})", self.depth)
    }
}

impl StructuredLog for VirtualTimeRestored {
    fn log(&self) {
        tracing::debug!(depth = self.depth, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("virtual_time_restored", span_name = name, depth = self.depth)
    }
}

/// The virtual clock moved forward.
///
/// # Log Level
/// `trace!` - Emitted on every advance
pub struct VirtualTimeAdvanced {
    pub from: Duration,
    pub to: Duration,
    pub tasks_run: usize,
}

impl Display for VirtualTimeAdvanced {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Virtual time advanced from {:?} to {:?}, {} tasks run",
            self.from, self.to, self.tasks_run
        )
    }
}

impl StructuredLog for VirtualTimeAdvanced {
    fn log(&self) {
        tracing::trace!(
            from_ns = self.from.as_nanos() as u64,
            to_ns = self.to.as_nanos() as u64,
            tasks_run = self.tasks_run,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "virtual_time_advanced",
            span_name = name,
            from = ?self.from,
            to = ?self.to,
            tasks_run = self.tasks_run,
        )
    }
}
