// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation for scheduler and verifier settings.
//!
//! Validation runs every check and collects all failures, so a single pass
//! reports everything wrong with a file instead of stopping at the first
//! problem.
//!
//! # Checks
//!
//! 1. **Scheduler sizing**: parallelism and elastic thread caps must be non-zero
//! 2. **Elastic eviction**: the idle TTL must be at least one second
//! 3. **Thread naming**: the prefix must not be blank
//! 4. **Verifier timeout**: the default timeout must be non-zero
//!
//! Fields left unset are never reported; they fall back to defaults that are
//! valid by construction.

use crate::config::Config;
use crate::errors::ConfigError;

/// Validates a configuration, returning every failure found.
pub fn validate_config(cfg: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if cfg.schedulers.parallelism == Some(0) {
        errors.push(invalid("schedulers.parallelism", "must be at least 1"));
    }

    if cfg.schedulers.elastic_max_threads == Some(0) {
        errors.push(invalid("schedulers.elastic_max_threads", "must be at least 1"));
    }

    if cfg.schedulers.elastic_ttl_seconds == Some(0) {
        errors.push(invalid("schedulers.elastic_ttl_seconds", "must be at least 1"));
    }

    if let Some(prefix) = &cfg.schedulers.thread_name_prefix {
        if prefix.trim().is_empty() {
            errors.push(invalid("schedulers.thread_name_prefix", "must not be blank"));
        }
    }

    if cfg.verifier.default_timeout_ms == Some(0) {
        errors.push(invalid("verifier.default_timeout_ms", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedulerConfig, VerifierConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let cfg = Config {
            schedulers: SchedulerConfig {
                parallelism: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ConfigError::InvalidValue { field: "schedulers.parallelism", .. }
        ));
    }

    #[test]
    fn test_all_failures_collected() {
        let cfg = Config {
            schedulers: SchedulerConfig {
                parallelism: Some(0),
                elastic_max_threads: Some(0),
                elastic_ttl_seconds: Some(0),
                thread_name_prefix: Some("   ".into()),
            },
            verifier: VerifierConfig {
                default_timeout_ms: Some(0),
                ..Default::default()
            },
        };

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_zero_initial_request_is_allowed() {
        let cfg = Config {
            verifier: VerifierConfig {
                initial_request: Some(crate::config::InitialRequest::Count(0)),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(validate_config(&cfg).is_ok());
    }
}
