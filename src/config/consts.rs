// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Parallelism used when the platform cannot report its core count
pub const FALLBACK_PARALLELISM: usize = 4;
/// Upper bound on threads the elastic pool may grow to
pub const DEFAULT_ELASTIC_MAX_THREADS: usize = 64;
/// Seconds an idle elastic thread survives before eviction
pub const DEFAULT_ELASTIC_TTL_SECONDS: u64 = 60;
/// Prefix for every pooled scheduler thread name
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "backflow";
/// Wall-clock limit for a verification run
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 30_000;
/// Values `publish_on` requests ahead of downstream demand
pub const DEFAULT_PREFETCH: usize = 256;
