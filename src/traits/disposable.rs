// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Something that can be released once and stays released.
pub trait Disposable: Send + Sync {
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}
