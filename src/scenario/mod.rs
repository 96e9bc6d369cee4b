//! Feed scenarios - per-feed deviation checks over recent rounds
//!
//! A scenario binds one aggregator, fetches its latest round window and checks
//! every oracle submission in that window against the round aggregate.

mod runner;

pub use runner::ScenarioRunner;

use anyhow::{bail, Result};
use ethers::types::Address;
use rust_decimal::Decimal;

use crate::config::FeedConfig;
use crate::error::{EventIterationError, OracleError};
use crate::types::{format_address, LogLocation, RoundId, SubmissionEvent};

/// One feed to check
#[derive(Debug, Clone, PartialEq)]
pub struct FeedScenario {
    pub name: String,
    pub address: String,
    /// Round window size
    pub rounds: usize,
    /// Maximum allowed deviation, in percent
    pub threshold: Decimal,
}

impl From<&FeedConfig> for FeedScenario {
    fn from(feed: &FeedConfig) -> Self {
        Self {
            name: feed.name.clone(),
            address: feed.address.clone(),
            rounds: feed.rounds,
            threshold: feed.threshold,
        }
    }
}

/// Scenarios for the named feeds, in configuration order.
///
/// No names selects every feed. Names match case-insensitively.
pub fn select_feeds(feeds: &[FeedConfig], names: &[String]) -> Result<Vec<FeedScenario>> {
    if names.is_empty() {
        return Ok(feeds.iter().map(FeedScenario::from).collect());
    }

    for name in names {
        if !feeds.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
            bail!("Unknown feed '{}'", name);
        }
    }

    Ok(feeds
        .iter()
        .filter(|f| names.iter().any(|n| f.name.eq_ignore_ascii_case(n)))
        .map(FeedScenario::from)
        .collect())
}

/// Deviation check of a single submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionCheck {
    pub oracle: Address,
    pub round: RoundId,
    pub submission: Decimal,
    pub aggregate: Decimal,
    pub deviation: Decimal,
    pub threshold: Decimal,
    pub within_threshold: bool,
    pub location: LogLocation,
}

impl SubmissionCheck {
    /// Assertion message for a failed check
    pub fn describe(&self, feed: &str) -> String {
        format!(
            "Feed '{}': answer deviation of oracle '{}' at round '{}' should be less than or equal to '{}%', got '{}%'",
            feed,
            format_address(&self.oracle),
            self.round,
            self.threshold,
            self.deviation.round_dp(8).normalize()
        )
    }
}

/// Submission whose deviation could not be computed
#[derive(Debug, Clone)]
pub struct UnverifiedSubmission {
    pub event: SubmissionEvent,
    pub reason: String,
}

/// Everything a completed scenario observed
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub feed: String,
    pub precision: u8,
    /// Latest round of the checked window
    pub latest_round: Option<RoundId>,
    pub window: usize,
    pub checks: Vec<SubmissionCheck>,
    pub iteration_errors: Vec<EventIterationError>,
    pub unverified: Vec<UnverifiedSubmission>,
}

impl ScenarioReport {
    pub fn violations(&self) -> impl Iterator<Item = &SubmissionCheck> {
        self.checks.iter().filter(|c| !c.within_threshold)
    }

    pub fn violation_count(&self) -> usize {
        self.violations().count()
    }

    pub fn max_deviation(&self) -> Option<Decimal> {
        self.checks.iter().map(|c| c.deviation).max()
    }

    /// Iteration errors are tolerated; violations and unverifiable submissions are not
    pub fn passed(&self) -> bool {
        self.violation_count() == 0 && self.unverified.is_empty()
    }
}

/// Result of running one scenario
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub scenario: FeedScenario,
    pub result: Result<ScenarioReport, OracleError>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.result.as_ref().map(ScenarioReport::passed).unwrap_or(false)
    }

    pub fn report(&self) -> Option<&ScenarioReport> {
        self.result.as_ref().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn feed(name: &str) -> FeedConfig {
        FeedConfig {
            name: name.to_string(),
            address: "0x0227903281b0421666f1e9161e8828c7112b8e86".to_string(),
            rounds: 5,
            threshold: dec!(3),
        }
    }

    fn check(deviation: Decimal, within_threshold: bool) -> SubmissionCheck {
        SubmissionCheck {
            oracle: Address::zero(),
            round: 1,
            submission: dec!(1),
            aggregate: dec!(1),
            deviation,
            threshold: dec!(3),
            within_threshold,
            location: LogLocation::default(),
        }
    }

    #[test]
    fn select_all_when_no_names() {
        let feeds = vec![feed("BTC"), feed("ETH")];
        let selected = select_feeds(&feeds, &[]).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].name, "BTC");
    }

    #[test]
    fn select_by_name_keeps_config_order() {
        let feeds = vec![feed("BTC"), feed("ETH"), feed("LINK")];
        let names = vec!["link".to_string(), "BTC".to_string()];
        let selected = select_feeds(&feeds, &names).unwrap();
        let selected: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(selected, vec!["BTC", "LINK"]);
    }

    #[test]
    fn select_unknown_name_fails() {
        let feeds = vec![feed("BTC")];
        assert!(select_feeds(&feeds, &["XRP".to_string()]).is_err());
    }

    #[test]
    fn report_passes_with_only_iteration_errors() {
        let report = ScenarioReport {
            checks: vec![check(dec!(1), true)],
            iteration_errors: vec![EventIterationError::new(LogLocation::default(), "bad")],
            ..Default::default()
        };
        assert!(report.passed());
        assert_eq!(report.max_deviation(), Some(dec!(1)));
    }

    #[test]
    fn report_fails_on_violation() {
        let report = ScenarioReport {
            checks: vec![check(dec!(1), true), check(dec!(4), false)],
            ..Default::default()
        };
        assert!(!report.passed());
        assert_eq!(report.violation_count(), 1);
        assert_eq!(report.max_deviation(), Some(dec!(4)));
    }

    #[test]
    fn failed_scenario_does_not_pass() {
        let outcome = ScenarioOutcome {
            scenario: FeedScenario::from(&feed("BTC")),
            result: Err(OracleError::InvalidRoundCount),
        };
        assert!(!outcome.passed());
        assert!(outcome.report().is_none());
    }

    #[test]
    fn describe_names_oracle_and_round() {
        let message = check(dec!(4.5), false).describe("DOGE");
        assert!(message.contains("Feed 'DOGE'"));
        assert!(message.contains("round '1'"));
        assert!(message.contains("'3%'"));
        assert!(message.contains("'4.5%'"));
    }
}
