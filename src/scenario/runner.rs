//! Scenario runner - drives feed scenarios sequentially or concurrently

use futures_util::future::join_all;

use super::{FeedScenario, ScenarioOutcome, ScenarioReport, SubmissionCheck, UnverifiedSubmission};
use crate::chain::{AggregatorConnector, AggregatorContract};
use crate::error::OracleError;
use crate::oracle::OracleAggregatorClient;
use crate::types::{format_address, SubmissionEvent};

pub struct ScenarioRunner<K> {
    connector: K,
    max_rounds: usize,
    parallel: bool,
}

impl<K: AggregatorConnector> ScenarioRunner<K> {
    pub fn new(connector: K, max_rounds: usize, parallel: bool) -> Self {
        Self {
            connector,
            max_rounds,
            parallel,
        }
    }

    /// Run every scenario; one failing scenario never stops the others.
    ///
    /// Outcomes come back in the order of `scenarios`.
    pub async fn run_all(&self, scenarios: &[FeedScenario]) -> Vec<ScenarioOutcome> {
        if self.parallel {
            join_all(scenarios.iter().map(|scenario| self.run_outcome(scenario))).await
        } else {
            let mut outcomes = Vec::with_capacity(scenarios.len());
            for scenario in scenarios {
                outcomes.push(self.run_outcome(scenario).await);
            }
            outcomes
        }
    }

    async fn run_outcome(&self, scenario: &FeedScenario) -> ScenarioOutcome {
        let result = self.run(scenario).await;
        match &result {
            Ok(report) => tracing::info!(
                feed = %scenario.name,
                checks = report.checks.len(),
                violations = report.violation_count(),
                iteration_errors = report.iteration_errors.len(),
                passed = report.passed(),
                "Scenario finished"
            ),
            Err(e) => tracing::error!(feed = %scenario.name, error = %e, "Scenario aborted"),
        }

        ScenarioOutcome {
            scenario: scenario.clone(),
            result,
        }
    }

    /// Check every submission in the feed's latest round window.
    ///
    /// Connection, round fetch and filter failures abort the scenario; a
    /// malformed event is logged and skipped.
    pub async fn run(&self, scenario: &FeedScenario) -> Result<ScenarioReport, OracleError> {
        if scenario.rounds > self.max_rounds {
            return Err(OracleError::RoundCountExceeded {
                requested: scenario.rounds,
                max: self.max_rounds,
            });
        }

        let mut client = OracleAggregatorClient::connect(&self.connector, &scenario.address).await?;
        client.fetch_last_rounds(scenario.rounds).await?;
        let window = client.rounds();

        let mut report = ScenarioReport {
            feed: scenario.name.clone(),
            precision: client.precision(),
            latest_round: window.latest_round(),
            window: window.len(),
            ..Default::default()
        };

        tracing::debug!(
            feed = %scenario.name,
            latest_round = ?report.latest_round,
            window = report.window,
            "Round window fetched"
        );

        let mut submissions = client.filter_submissions().await?;
        while let Some(item) = submissions.next().await {
            match item {
                Ok(event) => check_submission(&client, scenario, event, &mut report),
                Err(e) => {
                    tracing::warn!(feed = %scenario.name, error = %e, "Iteration error");
                    report.iteration_errors.push(e);
                }
            }
        }
        submissions.close();

        Ok(report)
    }
}

fn check_submission<C: AggregatorContract>(
    client: &OracleAggregatorClient<C>,
    scenario: &FeedScenario,
    event: SubmissionEvent,
    report: &mut ScenarioReport,
) {
    let submission = client.normalize(event.submission);
    let checked = client
        .compute_deviation(submission, event.round)
        .map(|deviation| {
            let aggregate = client.rounds().aggregate(event.round).unwrap_or_default();
            (deviation, aggregate)
        });
    let (deviation, aggregate) = match checked {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(
                feed = %scenario.name,
                oracle = %format_address(&event.oracle),
                round = event.round,
                error = %e,
                "Submission could not be checked"
            );
            report.unverified.push(UnverifiedSubmission {
                event,
                reason: e.to_string(),
            });
            return;
        }
    };

    let check = SubmissionCheck {
        oracle: event.oracle,
        round: event.round,
        submission,
        aggregate,
        deviation,
        threshold: scenario.threshold,
        within_threshold: deviation <= scenario.threshold,
        location: event.location,
    };

    if check.within_threshold {
        tracing::debug!(
            feed = %scenario.name,
            oracle = %format_address(&check.oracle),
            round = check.round,
            deviation = %check.deviation,
            "Submission within threshold"
        );
    } else {
        tracing::error!(
            feed = %scenario.name,
            oracle = %format_address(&check.oracle),
            round = check.round,
            threshold = %check.threshold,
            deviation = %check.deviation,
            "{}",
            check.describe(&scenario.name)
        );
    }

    report.checks.push(check);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockAggregatorContract, SubmissionStream};
    use crate::error::EventIterationError;
    use crate::types::{LogLocation, RoundData, RoundId};
    use async_trait::async_trait;
    use ethers::types::Address;
    use rust_decimal_macros::dec;

    /// Connector that builds a fresh mock per bound address
    struct MockConnector {
        latest: RoundId,
        submissions: Vec<(RoundId, i64)>,
        malformed: usize,
    }

    #[async_trait]
    impl AggregatorConnector for MockConnector {
        type Contract = MockAggregatorContract;

        async fn connect(&self, address: &str) -> Result<Self::Contract, OracleError> {
            if address == "unreachable" {
                return Err(OracleError::Connection {
                    endpoint: "ws://test".to_string(),
                    reason: "refused".to_string(),
                });
            }

            let latest = self.latest;
            let mut items: Vec<_> = self
                .submissions
                .iter()
                .map(|(round, raw)| Ok(SubmissionEvent::new(Address::zero(), *round, *raw)))
                .collect();
            for _ in 0..self.malformed {
                items.push(Err(EventIterationError::new(LogLocation::default(), "bad log")));
            }

            let mut mock = MockAggregatorContract::new();
            mock.expect_decimals().returning(|| Ok(2));
            mock.expect_latest_round_data()
                .returning(move || Ok(RoundData::new(latest, 10_000)));
            mock.expect_get_round_data()
                .returning(|round| Ok(RoundData::new(round, 10_000)));
            mock.expect_filter_submission_received()
                .times(1)
                .return_once(move |_, _| Ok(SubmissionStream::from_items(items)));
            Ok(mock)
        }
    }

    fn scenario(name: &str, address: &str, rounds: usize) -> FeedScenario {
        FeedScenario {
            name: name.to_string(),
            address: address.to_string(),
            rounds,
            threshold: dec!(4),
        }
    }

    #[tokio::test]
    async fn flags_submissions_over_threshold() {
        let connector = MockConnector {
            latest: 10,
            submissions: vec![(10, 10_300), (9, 10_500), (8, 9_700)],
            malformed: 0,
        };
        let runner = ScenarioRunner::new(connector, 100, false);

        let report = runner.run(&scenario("ETH", "0x01", 3)).await.unwrap();
        assert_eq!(report.precision, 2);
        assert_eq!(report.latest_round, Some(10));
        assert_eq!(report.window, 3);
        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.violation_count(), 1);

        let violation = report.violations().next().unwrap();
        assert_eq!(violation.round, 9);
        assert_eq!(violation.deviation, dec!(5));
        assert_eq!(violation.aggregate, dec!(100));
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn malformed_events_are_skipped() {
        let connector = MockConnector {
            latest: 10,
            submissions: vec![(10, 10_000), (9, 10_100), (8, 9_900)],
            malformed: 1,
        };
        let runner = ScenarioRunner::new(connector, 100, false);

        let report = runner.run(&scenario("LINK", "0x01", 3)).await.unwrap();
        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.iteration_errors.len(), 1);
        assert!(report.passed());
    }

    #[tokio::test]
    async fn submission_outside_window_is_unverified() {
        let connector = MockConnector {
            latest: 10,
            submissions: vec![(10, 10_000), (2, 10_000)],
            malformed: 0,
        };
        let runner = ScenarioRunner::new(connector, 100, false);

        let report = runner.run(&scenario("BTC", "0x01", 2)).await.unwrap();
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.unverified.len(), 1);
        assert_eq!(report.unverified[0].event.round, 2);
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn round_bound_is_enforced_before_connecting() {
        let connector = MockConnector {
            latest: 10,
            submissions: vec![],
            malformed: 0,
        };
        let runner = ScenarioRunner::new(connector, 5, false);

        let err = runner.run(&scenario("BTC", "unreachable", 6)).await.unwrap_err();
        assert!(matches!(
            err,
            OracleError::RoundCountExceeded {
                requested: 6,
                max: 5
            }
        ));
    }

    #[tokio::test]
    async fn failing_scenario_does_not_stop_others() {
        for parallel in [false, true] {
            let connector = MockConnector {
                latest: 10,
                submissions: vec![(10, 10_000)],
                malformed: 0,
            };
            let runner = ScenarioRunner::new(connector, 100, parallel);
            let scenarios = vec![
                scenario("BTC", "0x01", 1),
                scenario("DOGE", "unreachable", 1),
                scenario("ETH", "0x02", 1),
            ];

            let outcomes = runner.run_all(&scenarios).await;
            let names: Vec<&str> = outcomes.iter().map(|o| o.scenario.name.as_str()).collect();
            assert_eq!(names, vec!["BTC", "DOGE", "ETH"]);
            assert!(outcomes[0].passed());
            assert!(matches!(
                outcomes[1].result,
                Err(OracleError::Connection { .. })
            ));
            assert!(outcomes[2].passed());
        }
    }
}
