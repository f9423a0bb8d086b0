// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process-wide hooks for signals that lost a race with termination.
//!
//! A stage that already delivered its terminal signal cannot forward a late
//! error or value without breaking the protocol. It hands them here instead.
//! Without an installed hook the drop is logged.

use std::any::Any;
use std::sync::{Arc, OnceLock, RwLock, PoisonError};

use crate::errors::FlowError;
use crate::observability::messages::hooks::{ErrorDropped, ValueDropped};
use crate::observability::messages::StructuredLog;

type ErrorHook = Arc<dyn Fn(&FlowError) + Send + Sync>;
type ValueHook = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    error_dropped: Option<ErrorHook>,
    value_dropped: Option<ValueHook>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Install the hook invoked for every dropped error.
pub fn on_error_dropped<F>(hook: F)
where
    F: Fn(&FlowError) + Send + Sync + 'static,
{
    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
    registry.error_dropped = Some(Arc::new(hook));
}

/// Install the hook invoked for every dropped value. The value is boxed so
/// the hook can downcast it.
pub fn on_next_dropped<F>(hook: F)
where
    F: Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
{
    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
    registry.value_dropped = Some(Arc::new(hook));
}

pub fn reset_on_error_dropped() {
    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
    registry.error_dropped = None;
}

pub fn reset_on_next_dropped() {
    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
    registry.value_dropped = None;
}

/// Report an error that can no longer be delivered.
pub fn error_dropped(error: &FlowError) {
    let hook = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .error_dropped
        .clone();
    match hook {
        Some(hook) => hook(error),
        None => ErrorDropped { error }.log(),
    }
}

/// Report a value that can no longer be delivered.
pub fn value_dropped<T: Send + 'static>(value: T) {
    let hook = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .value_dropped
        .clone();
    match hook {
        Some(hook) => hook(Box::new(value)),
        None => ValueDropped {
            value_type: std::any::type_name::<T>(),
        }
        .log(),
    }
}
