// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lock helpers shared by every stage.
//!
//! Stages never hold a lock while calling into another stage, so a poisoned
//! mutex only means a user callback panicked mid-update. The guarded data is
//! still structurally valid and is recovered instead of propagating the panic.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
