// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use tokio_util::sync::CancellationToken;

use crate::traits::Disposable;

/// Handle to a scheduled task. Disposing it prevents the task from running
/// if it has not started yet, and stops a periodic task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Handle for a task that already ran to completion.
    pub(crate) fn finished() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Disposable for TaskHandle {
    fn dispose(&self) {
        self.token.cancel();
    }

    fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}
