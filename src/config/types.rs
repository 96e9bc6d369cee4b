//! Configuration section types

use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Node endpoint, ws(s):// or http(s)://
    pub endpoint: String,
    /// First block scanned for submission events
    pub from_block: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Run feed scenarios concurrently
    pub parallel: bool,
    /// Upper bound on the round window of any feed
    pub max_rounds: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Write every submission check to this CSV file
    pub csv_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
    /// Filter used when RUST_LOG is unset
    pub filter: String,
}

/// One aggregator feed to check
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedConfig {
    /// Scenario name (e.g. "BTC")
    pub name: String,
    /// Aggregator contract address
    pub address: String,
    /// Number of most recent rounds to check
    pub rounds: usize,
    /// Maximum allowed deviation, in percent
    pub threshold: Decimal,
}
