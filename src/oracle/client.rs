//! Aggregator client - round window fetching, normalization and deviation checks

use ethers::types::Address;
use rust_decimal::Decimal;

use super::rounds::{normalize, RoundSnapshot, MAX_PRECISION};
use crate::chain::{AggregatorConnector, AggregatorContract, SubmissionStream};
use crate::error::OracleError;
use crate::types::{RoundId, RoundIdSet};

/// Client over one aggregator contract.
///
/// Holds the contract's precision (read once, at construction) and the most
/// recently fetched round window. Not meant to be shared between concurrent
/// tasks: each scenario builds its own client.
pub struct OracleAggregatorClient<C> {
    contract: C,
    precision: u8,
    rounds: RoundSnapshot,
}

impl<C: AggregatorContract> OracleAggregatorClient<C> {
    /// Wrap a bound contract and read its decimals.
    ///
    /// Fails if the decimals cannot be read or exceed what a `Decimal` can scale by.
    pub async fn new(contract: C) -> Result<Self, OracleError> {
        let precision = contract.decimals().await?;
        if precision > MAX_PRECISION {
            return Err(OracleError::UnsupportedPrecision(precision));
        }

        tracing::debug!(precision, "Aggregator client ready");

        Ok(Self {
            contract,
            precision,
            rounds: RoundSnapshot::default(),
        })
    }

    /// Bind the contract at `address` through `connector`, then read its decimals
    pub async fn connect<K>(connector: &K, address: &str) -> Result<Self, OracleError>
    where
        K: AggregatorConnector<Contract = C>,
    {
        let contract = connector.connect(address).await?;
        Self::new(contract).await
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// The current round window (empty until a fetch succeeds)
    pub fn rounds(&self) -> &RoundSnapshot {
        &self.rounds
    }

    /// Fetch the `count` most recent rounds, latest first, walking ids down by one.
    ///
    /// On success the previous window is replaced wholesale. On failure the
    /// window is cleared, so no deviation can be computed against partial data.
    pub async fn fetch_last_rounds(&mut self, count: usize) -> Result<&RoundSnapshot, OracleError> {
        self.rounds = RoundSnapshot::default();
        if count == 0 {
            return Err(OracleError::InvalidRoundCount);
        }

        self.rounds = self.collect_rounds(count).await?;
        Ok(&self.rounds)
    }

    async fn collect_rounds(&self, count: usize) -> Result<RoundSnapshot, OracleError> {
        let mut snapshot = RoundSnapshot::with_capacity(count);

        let latest = self.contract.latest_round_data().await?;
        snapshot.insert(latest.round_id, self.normalize(latest.answer));
        tracing::debug!(round = latest.round_id, answer = latest.answer, "Fetched latest round");

        let mut round_id = latest.round_id;
        for _ in 1..count {
            round_id = round_id.checked_sub(1).ok_or(OracleError::RoundUnderflow)?;
            let data = self.contract.get_round_data(round_id).await?;
            snapshot.insert(round_id, self.normalize(data.answer));
            tracing::debug!(round = round_id, answer = data.answer, "Fetched round");
        }

        Ok(snapshot)
    }

    /// Raw fixed-point answer as a decimal price
    pub fn normalize(&self, raw: i64) -> Decimal {
        normalize(raw, self.precision)
    }

    /// Percentage deviation of a normalized `candidate` from the aggregate of `round`
    pub fn compute_deviation(&self, candidate: Decimal, round: RoundId) -> Result<Decimal, OracleError> {
        self.rounds.deviation(candidate, round)
    }

    pub fn round_ids(&self) -> RoundIdSet {
        self.rounds.round_ids()
    }

    /// Submissions for the rounds in the current window, from any oracle
    pub async fn filter_submissions(&self) -> Result<SubmissionStream, OracleError> {
        self.filter_submissions_from(&[]).await
    }

    /// Submissions for the rounds in the current window, restricted to `oracles`
    pub async fn filter_submissions_from(
        &self,
        oracles: &[Address],
    ) -> Result<SubmissionStream, OracleError> {
        let rounds = self.round_ids();
        self.contract
            .filter_submission_received(&rounds, oracles)
            .await
    }
}
