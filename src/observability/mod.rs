// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout backflow. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names consistent between the text and the structured fields
//! * Give every subsystem one place to look for what it logs
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::hooks` - values and errors dropped after a run terminated
//! * `messages::scheduler` - scheduler lifecycle, rejected tasks, virtual time
//! * `messages::operators` - retry, resource release and callback failures
//! * `messages::verifier` - verification runs
//!
//! # Usage
//!
//! ```rust
//! use backflow::errors::FlowError;
//! use backflow::observability::messages::hooks::ErrorDropped;
//! use backflow::observability::messages::StructuredLog;
//!
//! let error = FlowError::msg("late failure");
//! ErrorDropped { error: &error }.log();
//! ```
//!
//! The library never installs a `tracing` subscriber; the binary does.

pub mod messages;
