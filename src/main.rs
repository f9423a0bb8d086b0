// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::Duration;

use anyhow::Context;
use backflow::config::{load_and_validate_config, RuntimeBuilder};
use backflow::errors::FlowError;
use backflow::flux::Flux;
use backflow::scheduler::Schedulers;
use backflow::verifier::{StepVerifier, StepVerifierOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a small pipeline and verify it, using the optional configuration file
/// given as the first argument.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = match env::args().nth(1) {
        Some(path) => {
            let config = load_and_validate_config(&path)
                .with_context(|| format!("loading configuration from {}", path))?;
            RuntimeBuilder::from_config(&config)?
        }
        None => StepVerifierOptions::create(),
    };

    let parallel = Schedulers::parallel()?;
    let total = Flux::range(1, 10)
        .filter(|n| n % 2 == 0)
        .map(|n| n * n)
        .publish_on(parallel)
        .reduce(|a, b| a + b)
        .to_future()
        .await?;
    info!(total = ?total, "sum of even squares");

    let flaky = Flux::range(1, 3)
        .concat_with(Flux::error(FlowError::msg("transient")))
        .retry(1)
        .timeout(Duration::from_secs(1));
    let elapsed = StepVerifier::create_with_options(flaky, options.scenario_name("retry demo"))
        .expect_next_values([1, 2, 3, 1, 2, 3])
        .verify_error_message("transient")
        .await?;
    info!(elapsed = ?elapsed, "verification passed");

    Schedulers::shutdown_now();
    Ok(())
}
