// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Declared steps of a verification scenario.

use std::time::Duration;

use crate::errors::{FlowError, VerifyError};
use crate::traits::{FusionMode, SubscriptionRef};

/// Why a check rejected what it saw.
pub(crate) enum Failure {
    /// Wrapped as `expectation "<label>" failed (<detail>)`.
    Detail(String),
    /// Reported as is; produced by user supplied assertion callbacks.
    Raw(String),
}

impl Failure {
    pub(crate) fn into_error(self, label: &str) -> VerifyError {
        match self {
            Failure::Detail(detail) => {
                VerifyError::assertion(format!("expectation \"{}\" failed ({})", label, detail))
            }
            Failure::Raw(message) => VerifyError::assertion(message),
        }
    }
}

pub(crate) type SubscriptionCheck<T> =
    Box<dyn FnOnce(&SubscriptionRef<T>) -> Result<(), Failure> + Send>;
pub(crate) type ValueCheck<T> = Box<dyn FnOnce(&T) -> Result<(), Failure> + Send>;
pub(crate) type ErrorCheck = Box<dyn FnOnce(&FlowError) -> Result<(), Failure> + Send>;
pub(crate) type RecordCheck<T> = Box<dyn FnOnce(Option<Vec<T>>) -> Result<(), Failure> + Send>;

pub(crate) enum Kind<T> {
    /// Consumes `onSubscribe`; the check is optional.
    Subscribe(Option<SubscriptionCheck<T>>),
    Fusion {
        requested: FusionMode,
        expected: FusionMode,
    },
    NoFusion,
    /// Consumes one `onNext`. `expected` renders the awaited signal when
    /// something else arrives.
    Next {
        expected: String,
        check: ValueCheck<T>,
    },
    Count(u64),
    Sequence {
        expected: Vec<T>,
        eq: fn(&T, &T) -> bool,
    },
    ConsumeWhile {
        predicate: Box<dyn FnMut(&T) -> bool + Send>,
        consumer: Option<Box<dyn FnMut(&T) + Send>>,
    },
    RecordWith {
        supplier: Box<dyn FnOnce() -> Option<Vec<T>> + Send>,
        clone: fn(&T) -> T,
    },
    Recorded(RecordCheck<T>),
    NoEvent(Duration),
    Request(u64),
    Run(Box<dyn FnOnce() + Send>),
    Await(Duration),
    Complete,
    Error {
        expected: String,
        check: ErrorCheck,
    },
    Cancel,
}

pub(crate) struct Step<T> {
    pub kind: Kind<T>,
    pub label: String,
    pub described: bool,
    /// Placeholder that the first subscription-level step replaces.
    pub implicit: bool,
}

impl<T> Step<T> {
    pub(crate) fn new(kind: Kind<T>, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            described: false,
            implicit: false,
        }
    }

    pub(crate) fn implicit_subscription() -> Self {
        Self {
            implicit: true,
            ..Self::new(Kind::Subscribe(None), "expectSubscription")
        }
    }

    /// Steps that may stand in for the implicit subscription expectation.
    pub(crate) fn observes_subscription(&self) -> bool {
        matches!(
            self.kind,
            Kind::Subscribe(_) | Kind::Fusion { .. } | Kind::NoFusion | Kind::NoEvent(_)
        )
    }

    /// Steps that consume `onSubscribe` and so cannot follow other steps.
    pub(crate) fn requires_subscription(&self) -> bool {
        matches!(
            self.kind,
            Kind::Subscribe(_) | Kind::Fusion { .. } | Kind::NoFusion
        )
    }

    pub(crate) fn describe(&mut self, label: impl Into<String>) {
        if !self.described {
            self.label = label.into();
            self.described = true;
        }
    }
}
