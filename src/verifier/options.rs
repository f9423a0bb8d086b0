// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use crate::config::consts::DEFAULT_VERIFY_TIMEOUT_MS;
use crate::scheduler::VirtualTimeScheduler;
use crate::signal::UNBOUNDED;

/// Knobs for a [`StepVerifier`](crate::verifier::StepVerifier) run.
///
/// ```rust
/// use backflow::verifier::StepVerifierOptions;
///
/// let options = StepVerifierOptions::create()
///     .initial_request(2)
///     .check_under_requesting(false);
/// assert_eq!(options.get_initial_request(), 2);
/// ```
#[derive(Clone)]
pub struct StepVerifierOptions {
    initial_request: u64,
    check_under_requesting: bool,
    default_timeout: Duration,
    scenario_name: Option<String>,
    virtual_time_scheduler: Option<Arc<VirtualTimeScheduler>>,
}

impl Default for StepVerifierOptions {
    fn default() -> Self {
        Self {
            initial_request: UNBOUNDED,
            check_under_requesting: true,
            default_timeout: Duration::from_millis(DEFAULT_VERIFY_TIMEOUT_MS),
            scenario_name: None,
            virtual_time_scheduler: None,
        }
    }
}

impl StepVerifierOptions {
    pub fn create() -> Self {
        Self::default()
    }

    /// Demand requested as soon as the subscription arrives. Zero leaves all
    /// demand to `then_request` steps.
    pub fn initial_request(mut self, n: u64) -> Self {
        self.initial_request = n;
        self
    }

    /// Reject step lists that need more values than they request.
    pub fn check_under_requesting(mut self, enabled: bool) -> Self {
        self.check_under_requesting = enabled;
        self
    }

    /// Deadline for `verify()`.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Name used in log events and timeout reports.
    pub fn scenario_name(mut self, name: impl Into<String>) -> Self {
        self.scenario_name = Some(name.into());
        self
    }

    /// Clock to install for a virtual time run instead of a fresh one. It is
    /// disposed when the run ends.
    pub fn virtual_time_scheduler(mut self, scheduler: Arc<VirtualTimeScheduler>) -> Self {
        self.virtual_time_scheduler = Some(scheduler);
        self
    }

    pub fn get_initial_request(&self) -> u64 {
        self.initial_request
    }

    pub fn get_check_under_requesting(&self) -> bool {
        self.check_under_requesting
    }

    pub fn get_default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn get_scenario_name(&self) -> Option<&str> {
        self.scenario_name.as_deref()
    }

    pub fn get_virtual_time_scheduler(&self) -> Option<Arc<VirtualTimeScheduler>> {
        self.virtual_time_scheduler.clone()
    }
}
