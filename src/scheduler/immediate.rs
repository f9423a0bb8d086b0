// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;
use crate::observability::messages::scheduler::TaskRejected;
use crate::observability::messages::StructuredLog;
use crate::scheduler::{PeriodicTask, Scheduler, Task, TaskHandle, Worker, WorkerRef};
use crate::traits::Disposable;

const NAME: &str = "immediate";

/// Runs every task inline on the calling thread. Delays are not supported.
pub struct ImmediateScheduler {
    epoch: Instant,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for ImmediateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for ImmediateScheduler {
    // Shared and stateless; disposing it has no effect.
    fn dispose(&self) {}

    fn is_disposed(&self) -> bool {
        false
    }
}

impl Scheduler for ImmediateScheduler {
    fn create_worker(&self) -> Result<WorkerRef, FlowError> {
        Ok(Arc::new(ImmediateWorker {
            token: CancellationToken::new(),
        }))
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn name(&self) -> &str {
        NAME
    }
}

struct ImmediateWorker {
    token: CancellationToken,
}

impl ImmediateWorker {
    fn reject(reason: &str) -> FlowError {
        TaskRejected {
            scheduler: NAME,
            reason,
        }
        .log();
        FlowError::Rejected(format!("{}: {}", NAME, reason))
    }
}

impl Disposable for ImmediateWorker {
    fn dispose(&self) {
        self.token.cancel();
    }

    fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Worker for ImmediateWorker {
    fn schedule(&self, task: Task) -> Result<TaskHandle, FlowError> {
        if self.token.is_cancelled() {
            return Err(Self::reject("worker disposed"));
        }
        task();
        Ok(TaskHandle::finished())
    }

    fn schedule_after(&self, task: Task, delay: Duration) -> Result<TaskHandle, FlowError> {
        if delay.is_zero() {
            return self.schedule(task);
        }
        Err(Self::reject("delayed tasks are not supported"))
    }

    fn schedule_periodically(
        &self,
        _task: PeriodicTask,
        _initial_delay: Duration,
        _period: Duration,
    ) -> Result<TaskHandle, FlowError> {
        Err(Self::reject("periodic tasks are not supported"))
    }
}
