//! Oracle module - aggregator round windows and submission deviation
//!
//! Fetches a window of recent rounds from a FluxAggregator, normalizes their
//! fixed-point answers and measures how far individual oracle submissions
//! land from the round aggregate.

mod client;
mod rounds;

pub use client::OracleAggregatorClient;
pub use rounds::{normalize, percent_deviation, RoundSnapshot, MAX_PRECISION};
