//! Round window - normalized aggregates for a run of consecutive rounds

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::error::OracleError;
use crate::types::{RoundId, RoundIdSet};

/// Largest scale a `Decimal` can carry
pub const MAX_PRECISION: u8 = 28;

/// Divide a raw fixed-point answer by `10^precision`.
///
/// Exact: the raw value becomes the mantissa and the precision the scale.
/// `precision` must not exceed `MAX_PRECISION`, which the client enforces
/// when it reads the contract's decimals.
pub fn normalize(raw: i64, precision: u8) -> Decimal {
    Decimal::new(raw, u32::from(precision.min(MAX_PRECISION)))
}

/// Absolute percentage difference between `candidate` and `aggregate`
pub fn percent_deviation(
    candidate: Decimal,
    aggregate: Decimal,
    round: RoundId,
) -> Result<Decimal, OracleError> {
    if aggregate.is_zero() {
        return Err(OracleError::ZeroAggregate(round));
    }
    candidate
        .checked_sub(aggregate)
        .and_then(|diff| diff.checked_div(aggregate))
        .and_then(|ratio| ratio.abs().checked_mul(dec!(100)))
        .ok_or(OracleError::DeviationOverflow(round))
}

/// Immutable set of normalized round aggregates.
///
/// Produced whole by a single round fetch; a later fetch builds a new
/// snapshot instead of merging into this one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSnapshot {
    aggregates: HashMap<RoundId, Decimal>,
    latest: Option<RoundId>,
}

impl RoundSnapshot {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            aggregates: HashMap::with_capacity(capacity),
            latest: None,
        }
    }

    /// Last write wins for a repeated round id
    pub(crate) fn insert(&mut self, round: RoundId, aggregate: Decimal) {
        self.latest = Some(self.latest.map_or(round, |latest| latest.max(round)));
        self.aggregates.insert(round, aggregate);
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Highest round id in the window
    pub fn latest_round(&self) -> Option<RoundId> {
        self.latest
    }

    pub fn aggregate(&self, round: RoundId) -> Option<Decimal> {
        self.aggregates.get(&round).copied()
    }

    /// Round ids present in the window, in no particular order
    pub fn round_ids(&self) -> RoundIdSet {
        self.aggregates.keys().copied().collect()
    }

    /// Deviation of an already normalized `candidate` from the aggregate of `round`
    pub fn deviation(&self, candidate: Decimal, round: RoundId) -> Result<Decimal, OracleError> {
        let aggregate = self
            .aggregate(round)
            .ok_or(OracleError::UnknownRound(round))?;
        percent_deviation(candidate, aggregate, round)
    }
}
