// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::FlowError;
use thiserror::Error;

/// Failure reported by a verification run.
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    /// An expectation did not match. `suppressed` holds stream errors that
    /// were observed while a different expectation was pending.
    #[error("{message}")]
    Assertion {
        message: String,
        suppressed: Vec<FlowError>,
    },

    /// The run did not reach its last step before the deadline.
    #[error("VerifySubscriber timed out on {0}")]
    Timeout(String),

    /// The scenario itself is unusable (bad argument, provable hang).
    #[error("{0}")]
    Usage(String),

    /// More than one expectation failed at once.
    #[error("Multiple exceptions{}", render_all(.0))]
    Multiple(Vec<VerifyError>),
}

fn render_all(errors: &[VerifyError]) -> String {
    errors
        .iter()
        .map(|e| format!("\n\t{}", e))
        .collect::<String>()
}

impl VerifyError {
    pub fn assertion(message: impl Into<String>) -> Self {
        VerifyError::Assertion {
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    /// Collapse a list of failures: one stays as is, several aggregate.
    pub fn combine(mut errors: Vec<VerifyError>) -> Option<VerifyError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(VerifyError::Multiple(errors)),
        }
    }

    pub fn suppressed(&self) -> &[FlowError] {
        match self {
            VerifyError::Assertion { suppressed, .. } => suppressed,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_single_is_unwrapped() {
        let combined = VerifyError::combine(vec![VerifyError::assertion("one")]).unwrap();
        assert_eq!(combined.to_string(), "one");
    }

    #[test]
    fn test_combine_many_aggregates_messages() {
        let combined = VerifyError::combine(vec![
            VerifyError::assertion("first"),
            VerifyError::assertion("second"),
        ])
        .unwrap();
        let message = combined.to_string();
        assert!(message.starts_with("Multiple exceptions"));
        assert!(message.contains("first"));
        assert!(message.contains("second"));
    }

    #[test]
    fn test_combine_empty_is_none() {
        assert!(VerifyError::combine(Vec::new()).is_none());
    }
}
