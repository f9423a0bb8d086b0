// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Thread-pool schedulers backed by a dedicated tokio runtime.
//!
//! Each scheduler owns its runtime, so it works whether or not the caller is
//! itself inside a runtime. A worker is a single tokio task draining an
//! unbounded channel, which gives per-worker FIFO ordering while different
//! workers run in parallel on the pool.
//!
//! * `Single` - one runtime thread shared by every worker
//! * `Parallel` - one runtime thread per available core, for CPU-bound work
//! * `Elastic` - tasks run on the runtime's blocking pool, which grows on
//!   demand up to a cap and evicts threads idle for longer than the TTL

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;
use crate::observability::messages::scheduler::{
    SchedulerCreated, SchedulerDisposed, TaskPanicked, TaskRejected,
};
use crate::observability::messages::StructuredLog;
use crate::scheduler::{PeriodicTask, Scheduler, Task, TaskHandle, Worker, WorkerRef};
use crate::traits::Disposable;
use crate::utils::sync::locked;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Single,
    Parallel,
    Elastic,
}

pub struct PooledScheduler {
    name: String,
    kind: PoolKind,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    token: CancellationToken,
    epoch: Instant,
}

impl PooledScheduler {
    pub fn single(name: &str) -> Result<Arc<Self>, FlowError> {
        let mut builder = Builder::new_multi_thread();
        builder.worker_threads(1);
        Self::build(name, PoolKind::Single, builder, 1)
    }

    pub fn parallel(name: &str, threads: usize) -> Result<Arc<Self>, FlowError> {
        let threads = threads.max(1);
        let mut builder = Builder::new_multi_thread();
        builder.worker_threads(threads);
        Self::build(name, PoolKind::Parallel, builder, threads)
    }

    pub fn elastic(name: &str, max_threads: usize, ttl: Duration) -> Result<Arc<Self>, FlowError> {
        let max_threads = max_threads.max(1);
        let mut builder = Builder::new_multi_thread();
        builder
            .worker_threads(1)
            .max_blocking_threads(max_threads)
            .thread_keep_alive(ttl);
        Self::build(name, PoolKind::Elastic, builder, max_threads)
    }

    fn build(
        name: &str,
        kind: PoolKind,
        mut builder: Builder,
        threads: usize,
    ) -> Result<Arc<Self>, FlowError> {
        let runtime = builder
            .thread_name(name.to_string())
            .enable_all()
            .build()
            .map_err(FlowError::from_error)?;
        SchedulerCreated { name, threads }.log();
        Ok(Arc::new(Self {
            name: name.to_string(),
            kind,
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            token: CancellationToken::new(),
            epoch: Instant::now(),
        }))
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    fn shutdown(&self) {
        self.token.cancel();
        if let Some(runtime) = locked(&self.runtime).take() {
            // Never blocks, so it is safe from inside any runtime.
            runtime.shutdown_background();
        }
    }
}

impl Disposable for PooledScheduler {
    fn dispose(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.shutdown();
        SchedulerDisposed { name: &self.name }.log();
    }

    fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PooledScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Scheduler for PooledScheduler {
    fn create_worker(&self) -> Result<WorkerRef, FlowError> {
        if self.token.is_cancelled() {
            return Err(reject(&self.name, "scheduler disposed"));
        }
        let token = self.token.child_token();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Queued>();
        let loop_token = token.clone();
        let name = self.name.clone();
        let blocking = self.kind == PoolKind::Elastic;

        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    next = receiver.recv() => match next {
                        Some(queued) => run_queued(&name, queued, blocking).await,
                        None => break,
                    },
                }
            }
        });

        Ok(Arc::new(PooledWorker {
            scheduler: self.name.clone(),
            handle: self.handle.clone(),
            sender,
            token,
        }))
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct Queued {
    task: Task,
    token: CancellationToken,
    once: bool,
}

async fn run_queued(scheduler: &str, queued: Queued, blocking: bool) {
    if queued.token.is_cancelled() {
        return;
    }
    let Queued { task, token, once } = queued;
    let outcome = if blocking {
        match tokio::task::spawn_blocking(move || catch_unwind(AssertUnwindSafe(task))).await {
            Ok(result) => result,
            Err(join_error) => Err(Box::new(join_error.to_string()) as Box<dyn Any + Send>),
        }
    } else {
        catch_unwind(AssertUnwindSafe(task))
    };
    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        TaskPanicked {
            scheduler,
            message: &message,
        }
        .log();
    }
    if once {
        token.cancel();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn reject(scheduler: &str, reason: &str) -> FlowError {
    TaskRejected { scheduler, reason }.log();
    FlowError::Rejected(format!("{}: {}", scheduler, reason))
}

struct PooledWorker {
    scheduler: String,
    handle: Handle,
    sender: mpsc::UnboundedSender<Queued>,
    token: CancellationToken,
}

impl PooledWorker {
    fn ensure_active(&self) -> Result<(), FlowError> {
        if self.token.is_cancelled() {
            return Err(reject(&self.scheduler, "worker disposed"));
        }
        Ok(())
    }
}

impl Disposable for PooledWorker {
    fn dispose(&self) {
        self.token.cancel();
    }

    fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Worker for PooledWorker {
    fn schedule(&self, task: Task) -> Result<TaskHandle, FlowError> {
        self.ensure_active()?;
        let token = self.token.child_token();
        self.sender
            .send(Queued {
                task,
                token: token.clone(),
                once: true,
            })
            .map_err(|_| reject(&self.scheduler, "worker loop stopped"))?;
        Ok(TaskHandle::new(token))
    }

    fn schedule_after(&self, task: Task, delay: Duration) -> Result<TaskHandle, FlowError> {
        if delay.is_zero() {
            return self.schedule(task);
        }
        self.ensure_active()?;
        let token = self.token.child_token();
        let cancel = token.clone();
        let queued_token = token.clone();
        let sender = self.sender.clone();

        self.handle.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = sender.send(Queued { task, token: queued_token, once: true });
                }
            }
        });
        Ok(TaskHandle::new(token))
    }

    fn schedule_periodically(
        &self,
        task: PeriodicTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, FlowError> {
        self.ensure_active()?;
        if period.is_zero() {
            return Err(reject(&self.scheduler, "period must be greater than zero"));
        }
        let token = self.token.child_token();
        let cancel = token.clone();
        let tick_token = token.clone();
        let sender = self.sender.clone();

        self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let tick = Arc::clone(&task);
                        let queued = Queued {
                            task: Box::new(move || tick()),
                            token: tick_token.clone(),
                            once: false,
                        };
                        if sender.send(queued).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(TaskHandle::new(token))
    }
}
