// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single value that is delivered once both the value and a request exist.

use std::sync::Mutex;

use crate::errors::FlowError;
use crate::hooks;
use crate::signal::demand;
use crate::traits::{FusionMode, QueueSubscription, SubscriberRef, Subscription};
use crate::utils::sync::locked;

/// Emission side of a bounded stage that computes its value asynchronously.
///
/// Whichever of [`DeferredScalar::complete`] and [`DeferredScalar::request`]
/// happens second delivers `onNext` followed by `onComplete`.
pub struct DeferredScalar<T> {
    actual: SubscriberRef<T>,
    state: Mutex<ScalarState<T>>,
}

struct ScalarState<T> {
    value: Option<T>,
    has_value: bool,
    requested: bool,
    terminated: bool,
    cancelled: bool,
    fused: bool,
}

enum Outcome<T> {
    Emit(T),
    Available,
    Dropped(T),
    Parked,
}

impl<T: Send + 'static> DeferredScalar<T> {
    pub fn new(actual: SubscriberRef<T>) -> Self {
        Self {
            actual,
            state: Mutex::new(ScalarState {
                value: None,
                has_value: false,
                requested: false,
                terminated: false,
                cancelled: false,
                fused: false,
            }),
        }
    }

    pub fn actual(&self) -> &SubscriberRef<T> {
        &self.actual
    }

    /// Provide the value. Emits immediately if downstream already asked.
    pub fn complete(&self, value: T) {
        let outcome = {
            let mut state = locked(&self.state);
            if state.cancelled || state.terminated {
                Outcome::Dropped(value)
            } else {
                state.has_value = true;
                if state.fused {
                    state.terminated = true;
                    state.value = Some(value);
                    Outcome::Available
                } else if state.requested {
                    state.terminated = true;
                    Outcome::Emit(value)
                } else {
                    state.value = Some(value);
                    Outcome::Parked
                }
            }
        };
        match outcome {
            Outcome::Emit(value) => {
                self.actual.on_next(value);
                self.actual.on_complete();
            }
            Outcome::Available => {
                self.actual.on_available();
                self.actual.on_complete();
            }
            Outcome::Dropped(value) => hooks::value_dropped(value),
            Outcome::Parked => {}
        }
    }

    /// Finish without a value.
    pub fn complete_empty(&self) {
        if self.claim_terminal() {
            self.actual.on_complete();
        }
    }

    pub fn error(&self, error: FlowError) {
        if self.claim_terminal() {
            self.actual.on_error(error);
        } else {
            hooks::error_dropped(&error);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        locked(&self.state).cancelled
    }

    fn claim_terminal(&self) -> bool {
        let mut state = locked(&self.state);
        if state.cancelled || state.terminated {
            return false;
        }
        state.terminated = true;
        true
    }
}

impl<T: Send + 'static> Subscription<T> for DeferredScalar<T> {
    fn request(&self, n: u64) {
        if let Err(e) = demand::validate(n) {
            self.error(e);
            return;
        }
        let emit = {
            let mut state = locked(&self.state);
            if state.requested || state.cancelled || state.fused {
                None
            } else {
                state.requested = true;
                if state.has_value && !state.terminated {
                    state.terminated = true;
                    state.value.take()
                } else {
                    None
                }
            }
        };
        if let Some(value) = emit {
            self.actual.on_next(value);
            self.actual.on_complete();
        }
    }

    fn cancel(&self) {
        let dropped = {
            let mut state = locked(&self.state);
            state.cancelled = true;
            state.value.take()
        };
        if let Some(value) = dropped {
            hooks::value_dropped(value);
        }
    }

    fn as_queue(&self) -> Option<&dyn QueueSubscription<T>> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "DeferredScalarSubscription"
    }
}

impl<T: Send + 'static> QueueSubscription<T> for DeferredScalar<T> {
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        if requested.contains(FusionMode::ASYNC) {
            locked(&self.state).fused = true;
            FusionMode::ASYNC
        } else {
            FusionMode::NONE
        }
    }

    fn poll(&self) -> Result<Option<T>, FlowError> {
        Ok(locked(&self.state).value.take())
    }

    fn is_empty(&self) -> bool {
        locked(&self.state).value.is_none()
    }

    fn size(&self) -> usize {
        usize::from(locked(&self.state).value.is_some())
    }

    fn clear(&self) {
        locked(&self.state).value = None;
    }
}
