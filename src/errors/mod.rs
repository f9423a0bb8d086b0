// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod flow;
mod verify;

pub use config::ConfigError;
pub use flow::{throw_if_fatal, FlowError};
pub use verify::VerifyError;
