// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scripted verification of reactive sequences.
//!
//! A [`StepVerifier`] is built from an ordered list of expectations about the
//! signals a publisher emits, plus actions to take between them (requesting
//! more, cancelling, advancing a virtual clock). Nothing is subscribed until
//! one of the `verify` methods runs the script.
//!
//! Builders that can prove the script would hang on too little demand record
//! a usage error up front; `verify` then fails without subscribing.
//!
//! When the script is built with [`StepVerifier::with_virtual_time`], a
//! [`VirtualTimeScheduler`](crate::scheduler::VirtualTimeScheduler) is
//! installed on the verifying thread for the whole run. That future is not
//! `Send`; await it where it was created, as `#[tokio::test]` does.
//!
//! # Examples
//!
//! ```rust
//! use backflow::flux::Flux;
//! use backflow::verifier::StepVerifier;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! StepVerifier::create(Flux::just(["foo", "bar"]))
//!     .expect_next("foo")
//!     .expect_next("bar")
//!     .verify_complete()
//!     .await
//!     .unwrap();
//! # }
//! ```

mod builder;
mod driver;
pub mod options;
mod step;
mod subscriber;
pub mod test_publisher;

#[cfg(test)]
mod integration_tests;

pub use builder::{LastStep, StepVerifier};
pub use options::StepVerifierOptions;
pub use test_publisher::{TestPublisher, Violation};
