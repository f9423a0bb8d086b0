// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::{validate_config, Config};
use crate::errors::ConfigError;
use crate::scheduler::Schedulers;
use crate::verifier::StepVerifierOptions;

/// Runtime builder - applies a configuration to the process-wide schedulers and
/// derives the verification defaults from it.
///
/// # Examples
///
/// ```
/// use backflow::config::{Config, RuntimeBuilder};
///
/// let options = RuntimeBuilder::from_config(&Config::default()).unwrap();
/// assert_eq!(options.get_initial_request(), u64::MAX);
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Validate `cfg`, reconfigure the shared scheduler pools, and return the
    /// verifier options it describes.
    ///
    /// Pools created before this call keep running for whoever already holds
    /// them; later lookups through [`Schedulers`] see the new sizing.
    pub fn from_config(cfg: &Config) -> Result<StepVerifierOptions, ConfigError> {
        validate_config(cfg).map_err(ConfigError::Invalid)?;

        Schedulers::configure(cfg.schedulers.clone());

        Ok(StepVerifierOptions::create()
            .initial_request(cfg.verifier.get_initial_request())
            .check_under_requesting(cfg.verifier.get_check_under_requesting())
            .default_timeout(cfg.verifier.get_default_timeout()))
    }
}
