//! CSV export and console summary of scenario outcomes

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::info;

use crate::scenario::{ScenarioOutcome, SubmissionCheck};
use crate::types::{format_address, RoundId};

/// One submission check as a CSV row
#[derive(Debug, Clone, Serialize)]
pub struct CheckRecord {
    pub checked_at: DateTime<Utc>,
    pub feed: String,
    pub oracle: String,
    pub round: RoundId,
    pub submission: Decimal,
    pub aggregate: Decimal,
    pub deviation_pct: Decimal,
    pub threshold_pct: Decimal,
    pub within_threshold: bool,
    pub block_number: Option<u64>,
    pub tx_hash: Option<String>,
}

impl CheckRecord {
    pub fn new(feed: &str, check: &SubmissionCheck, checked_at: DateTime<Utc>) -> Self {
        Self {
            checked_at,
            feed: feed.to_string(),
            oracle: format_address(&check.oracle),
            round: check.round,
            submission: check.submission,
            aggregate: check.aggregate,
            deviation_pct: check.deviation.round_dp(8),
            threshold_pct: check.threshold,
            within_threshold: check.within_threshold,
            block_number: check.location.block_number,
            tx_hash: check.location.transaction_hash.map(|h| format!("{:#x}", h)),
        }
    }
}

/// Append every check of every completed scenario to a CSV file.
///
/// Headers are written only when the file is new or empty. Returns the number
/// of rows written.
pub fn write_csv(path: impl AsRef<Path>, outcomes: &[ScenarioOutcome]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory {}", dir.display()))?;
    }

    let file_has_data =
        path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open CSV report {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_has_data)
        .from_writer(file);

    let checked_at = Utc::now();
    let mut rows = 0;
    for outcome in outcomes {
        let Some(report) = outcome.report() else {
            continue;
        };
        for check in &report.checks {
            writer
                .serialize(CheckRecord::new(&report.feed, check, checked_at))
                .context("Failed to write check record")?;
            rows += 1;
        }
    }
    writer.flush().context("Failed to flush CSV report")?;

    info!(path = %path.display(), rows, "CSV report written");
    Ok(rows)
}

/// Per-feed summary table
pub fn summarize(outcomes: &[ScenarioOutcome]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:>7} {:>7} {:>10} {:>7} {:>14}  STATUS",
        "FEED", "ROUNDS", "CHECKS", "VIOLATIONS", "ERRORS", "MAX DEV %"
    );

    for outcome in outcomes {
        let name = &outcome.scenario.name;
        match &outcome.result {
            Ok(report) => {
                let max_dev = report
                    .max_deviation()
                    .map(|d| d.round_dp(4).to_string())
                    .unwrap_or_else(|| "-".to_string());
                let status = if report.passed() { "PASS" } else { "FAIL" };
                let _ = writeln!(
                    out,
                    "{:<10} {:>7} {:>7} {:>10} {:>7} {:>14}  {}",
                    name,
                    report.window,
                    report.checks.len(),
                    report.violation_count() + report.unverified.len(),
                    report.iteration_errors.len(),
                    max_dev,
                    status
                );
            }
            Err(e) => {
                let _ = writeln!(
                    out,
                    "{:<10} {:>7} {:>7} {:>10} {:>7} {:>14}  ERROR: {}",
                    name, "-", "-", "-", "-", "-", e
                );
            }
        }
    }

    let passed = outcomes.iter().filter(|o| o.passed()).count();
    let _ = write!(out, "{}/{} feeds passed", passed, outcomes.len());
    out
}
