// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Manually advanced clock for deterministic timing tests.
//!
//! Time only moves when [`VirtualTimeScheduler::advance_by`] (or one of its
//! siblings) is called. Advancing runs every pending task whose due time is
//! reached, in `(due, sequence)` order, and moves the clock to each task's due
//! time before running it, so tasks scheduled from inside a task are placed
//! relative to the moment they were scheduled.
//!
//! The clock becomes the default scheduler only through a
//! [`VirtualTimeGuard`], which is bound to the installing thread and restores
//! the previous default when dropped.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//! use backflow::scheduler::{Scheduler, VirtualTimeScheduler};
//!
//! let clock = VirtualTimeScheduler::create();
//! let worker = clock.create_worker().unwrap();
//! let fired = Arc::new(Mutex::new(Vec::new()));
//!
//! let f = Arc::clone(&fired);
//! worker
//!     .schedule_after(Box::new(move || f.lock().unwrap().push("tick")), Duration::from_secs(60))
//!     .unwrap();
//!
//! clock.advance_by(Duration::from_secs(59));
//! assert!(fired.lock().unwrap().is_empty());
//! clock.advance_by(Duration::from_secs(1));
//! assert_eq!(*fired.lock().unwrap(), vec!["tick"]);
//! assert_eq!(clock.now(), Duration::from_secs(60));
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;
use crate::observability::messages::scheduler::{
    TaskRejected, VirtualTimeAdvanced, VirtualTimeInstalled, VirtualTimeRestored,
};
use crate::observability::messages::StructuredLog;
use crate::scheduler::timed_queue::{TaskBody, TimedQueue};
use crate::scheduler::{PeriodicTask, Scheduler, Task, TaskHandle, Worker, WorkerRef};
use crate::traits::Disposable;
use crate::utils::sync::locked;

const NAME: &str = "virtual";

thread_local! {
    static INSTALLED: RefCell<Vec<Arc<VirtualTimeScheduler>>> = RefCell::new(Vec::new());
}

pub struct VirtualTimeScheduler {
    state: Arc<ClockState>,
}

struct ClockState {
    queue: Mutex<TimedQueue>,
    now_nanos: AtomicU64,
    target_nanos: AtomicU64,
    wip: AtomicUsize,
    token: CancellationToken,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl ClockState {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos.load(Ordering::Acquire))
    }

    fn enqueue(&self, delay: Duration, body: TaskBody, token: CancellationToken) -> Result<(), FlowError> {
        if self.token.is_cancelled() {
            return Err(reject("scheduler disposed"));
        }
        let due = self.now().saturating_add(delay);
        locked(&self.queue).push(due, body, token);
        Ok(())
    }

    /// Run every task due at or before the highest requested target.
    ///
    /// Only one caller drains at a time; concurrent or re-entrant callers
    /// record their target and leave the work to the active drainer.
    fn drain(&self, target: Option<Duration>) {
        if let Some(target) = target {
            self.target_nanos.fetch_max(nanos(target), Ordering::AcqRel);
        }
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let from = self.now();
        let mut tasks_run = 0;
        let mut missed = 1;
        loop {
            let limit = Duration::from_nanos(
                self.target_nanos
                    .load(Ordering::Acquire)
                    .max(self.now_nanos.load(Ordering::Acquire)),
            );
            loop {
                if self.token.is_cancelled() {
                    break;
                }
                let next = locked(&self.queue).pop_due(limit);
                let Some(task) = next else { break };
                self.now_nanos.fetch_max(nanos(task.due), Ordering::AcqRel);
                tasks_run += 1;
                match task.body {
                    TaskBody::Once(run) => {
                        run();
                        task.token.cancel();
                    }
                    TaskBody::Periodic { task: run, period } => {
                        run();
                        if !task.token.is_cancelled() && !self.token.is_cancelled() {
                            locked(&self.queue).push(
                                task.due.saturating_add(period),
                                TaskBody::Periodic { task: run, period },
                                task.token,
                            );
                        }
                    }
                }
            }
            self.now_nanos.fetch_max(nanos(limit), Ordering::AcqRel);

            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                break;
            }
            missed = remaining;
        }
        if tasks_run > 0 || from != self.now() {
            VirtualTimeAdvanced {
                from,
                to: self.now(),
                tasks_run,
            }
            .log();
        }
    }
}

fn reject(reason: &str) -> FlowError {
    TaskRejected {
        scheduler: NAME,
        reason,
    }
    .log();
    FlowError::Rejected(format!("{}: {}", NAME, reason))
}

impl VirtualTimeScheduler {
    pub fn create() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(ClockState {
                queue: Mutex::new(TimedQueue::new()),
                now_nanos: AtomicU64::new(0),
                target_nanos: AtomicU64::new(0),
                wip: AtomicUsize::new(0),
                token: CancellationToken::new(),
            }),
        })
    }

    /// Install a fresh clock as this thread's default scheduler.
    pub fn install() -> VirtualTimeGuard {
        Self::install_with(Self::create())
    }

    /// Install `scheduler` as this thread's default scheduler. It is disposed
    /// when the returned guard drops.
    pub fn install_with(scheduler: Arc<VirtualTimeScheduler>) -> VirtualTimeGuard {
        let depth = INSTALLED.with(|installed| {
            let mut installed = installed.borrow_mut();
            installed.push(Arc::clone(&scheduler));
            installed.len()
        });
        VirtualTimeInstalled { depth }.log();
        VirtualTimeGuard {
            scheduler,
            _thread_bound: PhantomData,
        }
    }

    /// Run `f` with this clock installed on the calling thread. Unlike a
    /// [`VirtualTimeGuard`], nothing here outlives the call, so callers that
    /// hop threads between calls can re-enter wherever they resume.
    pub(crate) fn enter<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
        INSTALLED.with(|installed| installed.borrow_mut().push(Arc::clone(self)));
        let _entered = Entered(self);
        f()
    }

    /// The clock installed on this thread, if any.
    pub fn current() -> Option<Arc<VirtualTimeScheduler>> {
        INSTALLED.with(|installed| installed.borrow().last().cloned())
    }

    pub fn is_installed() -> bool {
        Self::current().is_some()
    }

    /// Move the clock forward by `duration`, running everything that comes due.
    pub fn advance_by(&self, duration: Duration) {
        self.state.drain(Some(self.state.now().saturating_add(duration)));
    }

    /// Move the clock to `instant`. Instants in the past only run due tasks.
    pub fn advance_to(&self, instant: Duration) {
        self.state.drain(Some(instant));
    }

    /// Run tasks that are due now without moving the clock.
    pub fn advance(&self) {
        self.state.drain(None);
    }

    pub fn pending_tasks(&self) -> usize {
        locked(&self.state.queue).len()
    }
}

impl Disposable for VirtualTimeScheduler {
    fn dispose(&self) {
        self.state.token.cancel();
        locked(&self.state.queue).clear();
    }

    fn is_disposed(&self) -> bool {
        self.state.token.is_cancelled()
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn create_worker(&self) -> Result<WorkerRef, FlowError> {
        if self.state.token.is_cancelled() {
            return Err(reject("scheduler disposed"));
        }
        Ok(Arc::new(VirtualWorker {
            state: Arc::clone(&self.state),
            token: self.state.token.child_token(),
        }))
    }

    fn now(&self) -> Duration {
        self.state.now()
    }

    fn name(&self) -> &str {
        NAME
    }
}

struct VirtualWorker {
    state: Arc<ClockState>,
    token: CancellationToken,
}

impl VirtualWorker {
    fn submit(&self, delay: Duration, body: TaskBody) -> Result<TaskHandle, FlowError> {
        if self.token.is_cancelled() {
            return Err(reject("worker disposed"));
        }
        let token = self.token.child_token();
        self.state.enqueue(delay, body, token.clone())?;
        if delay.is_zero() {
            self.state.drain(None);
        }
        Ok(TaskHandle::new(token))
    }
}

impl Disposable for VirtualWorker {
    fn dispose(&self) {
        self.token.cancel();
    }

    fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Worker for VirtualWorker {
    fn schedule(&self, task: Task) -> Result<TaskHandle, FlowError> {
        self.submit(Duration::ZERO, TaskBody::Once(task))
    }

    fn schedule_after(&self, task: Task, delay: Duration) -> Result<TaskHandle, FlowError> {
        self.submit(delay, TaskBody::Once(task))
    }

    fn schedule_periodically(
        &self,
        task: PeriodicTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, FlowError> {
        if period.is_zero() {
            return Err(reject("period must be greater than zero"));
        }
        self.submit(initial_delay, TaskBody::Periodic { task, period })
    }
}

/// Scope during which a virtual clock replaces the default schedulers on the
/// installing thread.
///
/// Dropping the guard restores whatever was installed before and disposes
/// the guarded clock. The guard cannot leave its thread.
pub struct VirtualTimeGuard {
    scheduler: Arc<VirtualTimeScheduler>,
    _thread_bound: PhantomData<*const ()>,
}

impl VirtualTimeGuard {
    pub fn scheduler(&self) -> &Arc<VirtualTimeScheduler> {
        &self.scheduler
    }
}

impl Drop for VirtualTimeGuard {
    fn drop(&mut self) {
        let depth = uninstall(&self.scheduler);
        self.scheduler.dispose();
        VirtualTimeRestored { depth }.log();
    }
}

fn uninstall(scheduler: &Arc<VirtualTimeScheduler>) -> usize {
    INSTALLED.with(|installed| {
        let mut installed = installed.borrow_mut();
        if let Some(position) = installed.iter().rposition(|s| Arc::ptr_eq(s, scheduler)) {
            installed.remove(position);
        }
        installed.len()
    })
}

/// Installation that lasts for one synchronous call and leaves the clock
/// running afterwards.
struct Entered<'a>(&'a Arc<VirtualTimeScheduler>);

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        uninstall(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Schedulers;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |name: &str| -> Task {
            let sink = Arc::clone(&sink);
            let name = name.to_string();
            Box::new(move || sink.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_advance_runs_tasks_in_due_order() {
        let clock = VirtualTimeScheduler::create();
        let worker = clock.create_worker().unwrap();
        let (log, task) = recorder();

        worker.schedule_after(task("c"), Duration::from_secs(3)).unwrap();
        worker.schedule_after(task("a"), Duration::from_secs(1)).unwrap();
        worker.schedule_after(task("b"), Duration::from_secs(2)).unwrap();

        clock.advance_by(Duration::from_secs(2));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(clock.now(), Duration::from_secs(2));

        clock.advance_by(Duration::from_secs(10));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(clock.now(), Duration::from_secs(12));
    }

    #[test]
    fn test_zero_delay_runs_synchronously() {
        let clock = VirtualTimeScheduler::create();
        let worker = clock.create_worker().unwrap();
        let (log, task) = recorder();

        worker.schedule(task("now")).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["now"]);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_task_scheduled_from_task_uses_its_due_time() {
        let clock = VirtualTimeScheduler::create();
        let worker = clock.create_worker().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_worker = Arc::clone(&worker);
        let inner_clock = Arc::clone(&clock);
        let inner_seen = Arc::clone(&seen);
        worker
            .schedule_after(
                Box::new(move || {
                    let seen = Arc::clone(&inner_seen);
                    let clock = Arc::clone(&inner_clock);
                    inner_worker
                        .schedule_after(
                            Box::new(move || seen.lock().unwrap().push(clock.now())),
                            Duration::from_secs(2),
                        )
                        .unwrap();
                }),
                Duration::from_secs(1),
            )
            .unwrap();

        clock.advance_by(Duration::from_secs(10));
        assert_eq!(*seen.lock().unwrap(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_periodic_ticks_are_deterministic() {
        let clock = VirtualTimeScheduler::create();
        let worker = clock.create_worker().unwrap();
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let t = Arc::clone(&ticks);
        let c = Arc::clone(&clock);

        let handle = worker
            .schedule_periodically(
                Arc::new(move || t.lock().unwrap().push(c.now().as_secs())),
                Duration::from_secs(3),
                Duration::from_secs(3),
            )
            .unwrap();

        for _ in 0..3 {
            clock.advance_by(Duration::from_secs(3));
        }
        assert_eq!(*ticks.lock().unwrap(), vec![3, 6, 9]);

        handle.dispose();
        clock.advance_by(Duration::from_secs(30));
        assert_eq!(ticks.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_disposed_handle_never_runs() {
        let clock = VirtualTimeScheduler::create();
        let worker = clock.create_worker().unwrap();
        let (log, task) = recorder();

        let handle = worker.schedule_after(task("never"), Duration::from_secs(1)).unwrap();
        handle.dispose();
        clock.advance_by(Duration::from_secs(5));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disposed_clock_rejects_scheduling() {
        let clock = VirtualTimeScheduler::create();
        let worker = clock.create_worker().unwrap();
        clock.dispose();

        assert!(matches!(worker.schedule(Box::new(|| {})), Err(FlowError::Rejected(_))));
        assert!(matches!(clock.create_worker(), Err(FlowError::Rejected(_))));
    }

    #[test]
    fn test_guard_replaces_and_restores_defaults() {
        assert!(!VirtualTimeScheduler::is_installed());
        let clock = {
            let guard = VirtualTimeScheduler::install();
            let clock = Arc::clone(guard.scheduler());
            let parallel = Schedulers::parallel().unwrap();
            assert_eq!(parallel.name(), "virtual");
            assert_eq!(Schedulers::single().unwrap().name(), "virtual");
            assert_eq!(Schedulers::immediate().name(), "immediate");
            clock
        };

        assert!(!VirtualTimeScheduler::is_installed());
        assert!(clock.is_disposed());
    }

    #[test]
    fn test_nested_guard_does_not_dispose_outer_clock() {
        let outer = VirtualTimeScheduler::install();
        {
            let inner = VirtualTimeScheduler::install();
            let current = VirtualTimeScheduler::current().unwrap();
            assert!(Arc::ptr_eq(&current, inner.scheduler()));
        }
        let current = VirtualTimeScheduler::current().unwrap();
        assert!(Arc::ptr_eq(&current, outer.scheduler()));
        assert!(!outer.scheduler().is_disposed());
    }

    #[test]
    fn test_enter_installs_for_one_call_without_disposing() {
        let clock = VirtualTimeScheduler::create();
        let name = clock.enter(|| Schedulers::parallel().unwrap().name().to_string());
        assert_eq!(name, "virtual");
        assert!(!VirtualTimeScheduler::is_installed());
        assert!(!clock.is_disposed());
    }

    #[test]
    fn test_install_is_scoped_to_thread() {
        let _guard = VirtualTimeScheduler::install();
        let seen_elsewhere = std::thread::spawn(VirtualTimeScheduler::is_installed)
            .join()
            .unwrap();
        assert!(!seen_elsewhere);
        assert!(VirtualTimeScheduler::is_installed());
    }
}
