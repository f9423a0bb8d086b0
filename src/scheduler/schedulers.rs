// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process-wide default schedulers.
//!
//! Pools are built lazily from the active [`SchedulerConfig`] and shared by
//! every caller. When a virtual clock is installed on the current thread,
//! every factory except [`Schedulers::immediate`] returns that clock instead,
//! so time-based sequences assembled inside the guard's scope run on virtual
//! time.

use std::sync::{Arc, Mutex, OnceLock};

use crate::config::SchedulerConfig;
use crate::errors::FlowError;
use crate::scheduler::{ImmediateScheduler, PooledScheduler, SchedulerRef, VirtualTimeScheduler};
use crate::traits::Disposable;
use crate::utils::sync::locked;

#[derive(Default)]
struct Defaults {
    config: SchedulerConfig,
    parallel: Option<Arc<PooledScheduler>>,
    single: Option<Arc<PooledScheduler>>,
    elastic: Option<Arc<PooledScheduler>>,
}

impl Defaults {
    fn take_all(&mut self) -> Vec<Arc<PooledScheduler>> {
        [self.parallel.take(), self.single.take(), self.elastic.take()]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Parallel,
    Single,
    Elastic,
}

fn defaults() -> &'static Mutex<Defaults> {
    static DEFAULTS: OnceLock<Mutex<Defaults>> = OnceLock::new();
    DEFAULTS.get_or_init(|| Mutex::new(Defaults::default()))
}

/// Entry point for the shared schedulers.
pub struct Schedulers;

impl Schedulers {
    /// Replace the pool settings. Pools already built stop being handed out
    /// and shut down once their last holder drops them; the next lookup
    /// builds fresh ones.
    pub fn configure(config: SchedulerConfig) {
        let mut defaults = locked(defaults());
        defaults.config = config;
        defaults.take_all();
    }

    /// Fixed pool sized to the configured parallelism, for CPU-bound work.
    pub fn parallel() -> Result<SchedulerRef, FlowError> {
        Self::resolve(Slot::Parallel)
    }

    /// One reusable thread.
    pub fn single() -> Result<SchedulerRef, FlowError> {
        Self::resolve(Slot::Single)
    }

    /// Growing pool with idle eviction, for blocking work.
    pub fn elastic() -> Result<SchedulerRef, FlowError> {
        Self::resolve(Slot::Elastic)
    }

    /// Caller's thread. Never replaced by a virtual clock.
    pub fn immediate() -> SchedulerRef {
        static IMMEDIATE: OnceLock<Arc<ImmediateScheduler>> = OnceLock::new();
        let immediate = IMMEDIATE.get_or_init(|| Arc::new(ImmediateScheduler::new()));
        Arc::clone(immediate) as SchedulerRef
    }

    /// Dispose every shared pool. Later lookups rebuild them.
    pub fn shutdown_now() {
        let retired = locked(defaults()).take_all();
        for scheduler in retired {
            scheduler.dispose();
        }
    }

    fn resolve(slot: Slot) -> Result<SchedulerRef, FlowError> {
        if let Some(clock) = VirtualTimeScheduler::current() {
            return Ok(clock as SchedulerRef);
        }

        let mut defaults = locked(defaults());
        let config = defaults.config.clone();
        let prefix = config.get_thread_name_prefix();
        let entry = match slot {
            Slot::Parallel => &mut defaults.parallel,
            Slot::Single => &mut defaults.single,
            Slot::Elastic => &mut defaults.elastic,
        };
        if let Some(existing) = entry.as_ref().filter(|s| !s.is_disposed()) {
            return Ok(Arc::clone(existing) as SchedulerRef);
        }

        let built = match slot {
            Slot::Parallel => {
                PooledScheduler::parallel(&format!("{}-parallel", prefix), config.get_parallelism())?
            }
            Slot::Single => PooledScheduler::single(&format!("{}-single", prefix))?,
            Slot::Elastic => PooledScheduler::elastic(
                &format!("{}-elastic", prefix),
                config.get_elastic_max_threads(),
                config.get_elastic_ttl(),
            )?,
        };
        *entry = Some(Arc::clone(&built));
        Ok(built as SchedulerRef)
    }
}
