// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution contexts.
//!
//! A [`Scheduler`] hands out [`Worker`]s; a worker runs submitted tasks one at
//! a time, in submission order for tasks that become runnable at the same
//! moment. Both are disposable, and scheduling against a disposed instance
//! fails with [`FlowError::Rejected`](crate::errors::FlowError::Rejected).
//!
//! Implementations:
//! * [`ImmediateScheduler`] - runs tasks inline on the caller's thread
//! * [`PooledScheduler`] - single, parallel and elastic pools on a dedicated
//!   tokio runtime
//! * [`VirtualTimeScheduler`] - a manually advanced clock for tests
//!
//! [`Schedulers`] resolves the process-wide defaults and honours a virtual
//! clock installed on the current thread.

pub mod immediate;
pub mod pooled;
pub mod schedulers;
pub mod task;
pub mod timed_queue;
pub mod virtual_time;

use std::sync::Arc;
use std::time::Duration;

use crate::errors::FlowError;
use crate::traits::Disposable;

pub use immediate::ImmediateScheduler;
pub use pooled::{PoolKind, PooledScheduler};
pub use schedulers::Schedulers;
pub use task::TaskHandle;
pub use virtual_time::{VirtualTimeGuard, VirtualTimeScheduler};

/// One-shot unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Unit of work that runs on every period.
pub type PeriodicTask = Arc<dyn Fn() + Send + Sync + 'static>;

pub trait Scheduler: Disposable {
    fn create_worker(&self) -> Result<WorkerRef, FlowError>;

    /// Time on this scheduler's clock, measured from its creation.
    fn now(&self) -> Duration;

    fn name(&self) -> &str;
}

/// Sequential execution context created by a [`Scheduler`].
pub trait Worker: Disposable {
    fn schedule(&self, task: Task) -> Result<TaskHandle, FlowError>;

    fn schedule_after(&self, task: Task, delay: Duration) -> Result<TaskHandle, FlowError>;

    fn schedule_periodically(
        &self,
        task: PeriodicTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, FlowError>;
}

pub type SchedulerRef = Arc<dyn Scheduler>;
pub type WorkerRef = Arc<dyn Worker>;
