//! flux-deviation
//!
//! Usage: flux-deviation [FEED...]
//!
//! Runs the configured feed scenarios (all of them, or only the named ones)
//! and exits non-zero when any feed fails.

use std::process::ExitCode;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use flux_deviation::chain::EthersConnector;
use flux_deviation::config::{AppConfig, LoggingConfig};
use flux_deviation::report::{summarize, write_csv};
use flux_deviation::scenario::{select_feeds, ScenarioRunner};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error with config file/env vars: {:#}", e);
            return ExitCode::from(2);
        }
    };

    init_tracing(&config.logging);
    info!(config = %config, "Starting flux-deviation");

    let names: Vec<String> = std::env::args().skip(1).collect();
    let scenarios = match select_feeds(&config.feeds, &names) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            error!(error = %e, "Invalid feed selection");
            return ExitCode::from(2);
        }
    };

    let connector = EthersConnector::new(config.chain.endpoint.clone(), config.chain.from_block);
    let runner = ScenarioRunner::new(connector, config.runner.max_rounds, config.runner.parallel);
    let outcomes = runner.run_all(&scenarios).await;

    if let Some(path) = &config.report.csv_path {
        if let Err(e) = write_csv(path, &outcomes) {
            error!(path = %path, error = %format!("{:#}", e), "Failed to write CSV report");
        }
    }

    println!("{}", summarize(&outcomes));

    if outcomes.iter().all(|o| o.passed()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::load()?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
