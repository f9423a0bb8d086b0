// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while loading or validating a runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format: '{0}' (expected yaml, yml, toml or json)")]
    UnsupportedFormat(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Configuration validation failed:{}", render_all(.0))]
    Invalid(Vec<ConfigError>),
}

fn render_all(errors: &[ConfigError]) -> String {
    errors.iter().map(|e| format!("\n{}", e)).collect::<String>()
}
