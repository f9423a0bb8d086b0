// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // config + runtime defaults
pub mod errors;     // error handling
pub mod flux;       // 0..N sequences
pub mod hooks;      // dropped signals
pub mod mono;       // 0..1 sequences
pub mod observability;
pub mod operators;  // operator stages
pub mod scheduler;  // execution contexts + virtual time
pub mod signal;     // signals and demand
pub mod sinks;      // push-driven sources
pub mod traits;     // protocol abstractions
pub mod utils;
pub mod verifier;   // step verification
