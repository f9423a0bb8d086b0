// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_ELASTIC_MAX_THREADS, DEFAULT_ELASTIC_TTL_SECONDS, DEFAULT_THREAD_NAME_PREFIX,
    DEFAULT_VERIFY_TIMEOUT_MS, FALLBACK_PARALLELISM,
};
use crate::errors::ConfigError;
use crate::signal::UNBOUNDED;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Runtime configuration for the shared schedulers and the verification harness.
///
/// Every section and every field is optional; missing values fall back to the
/// constants in [`crate::config::consts`].
///
/// # Example
/// ```yaml
/// schedulers:
///   parallelism: 8
///   elastic_max_threads: 32
///   elastic_ttl_seconds: 30
///   thread_name_prefix: "backflow"
/// verifier:
///   default_timeout_ms: 5000
///   initial_request: unbounded
///   check_under_requesting: true
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedulers: SchedulerConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
}

/// Settings for the pools behind [`crate::scheduler::Schedulers`].
///
/// # Fields
/// * `parallelism` - Threads in the parallel pool (defaults to available cores)
/// * `elastic_max_threads` - Cap on the elastic pool's blocking threads
/// * `elastic_ttl_seconds` - Idle time before an elastic thread is evicted
/// * `thread_name_prefix` - Prefix for pool thread names
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    pub parallelism: Option<usize>,
    pub elastic_max_threads: Option<usize>,
    pub elastic_ttl_seconds: Option<u64>,
    pub thread_name_prefix: Option<String>,
}

/// Get the default parallelism based on system capabilities
///
/// Returns the number of available CPU cores, falling back to
/// [`FALLBACK_PARALLELISM`] if detection fails.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_PARALLELISM)
}

impl SchedulerConfig {
    pub fn get_parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(default_parallelism)
    }

    pub fn get_elastic_max_threads(&self) -> usize {
        self.elastic_max_threads.unwrap_or(DEFAULT_ELASTIC_MAX_THREADS)
    }

    pub fn get_elastic_ttl(&self) -> Duration {
        Duration::from_secs(self.elastic_ttl_seconds.unwrap_or(DEFAULT_ELASTIC_TTL_SECONDS))
    }

    pub fn get_thread_name_prefix(&self) -> String {
        self.thread_name_prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_THREAD_NAME_PREFIX.to_string())
    }
}

/// Defaults applied to every verification built from the config.
///
/// # Fields
/// * `default_timeout_ms` - Wall-clock limit for `verify()`
/// * `initial_request` - Demand requested on subscription; a count or `unbounded`
/// * `check_under_requesting` - Reject scenarios that would hang for lack of demand
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifierConfig {
    pub default_timeout_ms: Option<u64>,
    pub initial_request: Option<InitialRequest>,
    pub check_under_requesting: Option<bool>,
}

impl VerifierConfig {
    pub fn get_default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.unwrap_or(DEFAULT_VERIFY_TIMEOUT_MS))
    }

    pub fn get_initial_request(&self) -> u64 {
        self.initial_request
            .map(|r| r.as_demand())
            .unwrap_or(UNBOUNDED)
    }

    pub fn get_check_under_requesting(&self) -> bool {
        self.check_under_requesting.unwrap_or(true)
    }
}

/// Initial demand, written either as a number or as `unbounded`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InitialRequest {
    Count(u64),
    Named(NamedRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedRequest {
    Unbounded,
}

impl InitialRequest {
    pub fn as_demand(&self) -> u64 {
        match self {
            InitialRequest::Count(n) => *n,
            InitialRequest::Named(NamedRequest::Unbounded) => UNBOUNDED,
        }
    }
}

/// Parse a config document, picking the format from `extension`.
pub fn parse_config(content: &str, extension: &str) -> Result<Config, ConfigError> {
    match extension.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(content)?),
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a config from a YAML, TOML or JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    parse_config(&content, extension)
}

/// Load and validate a config file
///
/// Every validation failure is reported at once in a single
/// [`ConfigError::Invalid`].
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}
