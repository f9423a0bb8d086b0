// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests {
    use crate::config::{
        load_and_validate_config, load_config, InitialRequest, NamedRequest, RuntimeBuilder,
    };
    use crate::errors::ConfigError;
    use std::io::Write;
    use std::time::Duration;

    /// The shipped YAML configuration loads and validates
    #[test]
    fn test_default_yaml_loading() {
        let config = load_and_validate_config("configs/default.yaml").unwrap();

        assert_eq!(config.schedulers.get_parallelism(), 4);
        assert_eq!(config.schedulers.get_elastic_max_threads(), 32);
        assert_eq!(config.schedulers.get_elastic_ttl(), Duration::from_secs(60));
        assert_eq!(config.schedulers.get_thread_name_prefix(), "backflow");
        assert_eq!(
            config.verifier.initial_request,
            Some(InitialRequest::Named(NamedRequest::Unbounded))
        );
        assert_eq!(config.verifier.get_default_timeout(), Duration::from_secs(30));
    }

    /// TOML configurations carry a bounded initial request
    #[test]
    fn test_bounded_demand_toml_loading() {
        let config = load_and_validate_config("configs/bounded-demand.toml").unwrap();

        assert_eq!(config.schedulers.get_parallelism(), 2);
        assert_eq!(config.verifier.get_initial_request(), 1);
        assert!(!config.verifier.get_check_under_requesting());
        assert_eq!(config.verifier.get_default_timeout(), Duration::from_millis(5000));
    }

    /// Loading succeeds but validation reports every bad field together
    #[test]
    fn test_invalid_json_reports_all_failures() {
        assert!(load_config("configs/invalid.json").is_ok());

        let err = load_and_validate_config("configs/invalid.json").unwrap_err();
        match &err {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {other:?}"),
        }

        let rendered = err.to_string();
        assert!(rendered.starts_with("Configuration validation failed:"));
        assert!(rendered.contains("schedulers.parallelism"));
        assert!(rendered.contains("schedulers.thread_name_prefix"));
        assert!(rendered.contains("verifier.default_timeout_ms"));
    }

    /// Missing files surface the path in the error
    #[test]
    fn test_missing_file() {
        let err = load_config("configs/does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("does-not-exist.yaml"));
    }

    /// Files are dispatched by extension, case-insensitively
    #[test]
    fn test_extension_dispatch_from_temp_file() {
        let mut file = tempfile::Builder::new().suffix(".YML").tempfile().unwrap();
        writeln!(file, "verifier:\n  initial_request: 7").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.verifier.get_initial_request(), 7);

        let mut other = tempfile::Builder::new().suffix(".conf").tempfile().unwrap();
        writeln!(other, "anything").unwrap();
        assert!(matches!(
            load_config(other.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    /// The runtime builder turns the verifier section into verification options
    #[test]
    fn test_runtime_builder_produces_options() {
        let config = load_and_validate_config("configs/default.yaml").unwrap();
        let options = RuntimeBuilder::from_config(&config).unwrap();

        assert_eq!(options.get_initial_request(), u64::MAX);
        assert!(options.get_check_under_requesting());
        assert_eq!(options.get_default_timeout(), Duration::from_secs(30));
    }

    /// The runtime builder refuses invalid configurations before touching the pools
    #[test]
    fn test_runtime_builder_rejects_invalid() {
        let config = load_config("configs/invalid.json").unwrap();
        assert!(matches!(
            RuntimeBuilder::from_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
