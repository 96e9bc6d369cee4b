//! Core types shared by the chain binding, the round window and the scenario runner
//!
//! Round identifiers, raw round data as read from the aggregator contract,
//! and individual oracle submissions.

use ethers::types::{Address, H256};
use std::collections::HashSet;
use std::fmt;

/// Aggregation round identifier.
///
/// The `SubmissionReceived` event indexes rounds as `uint32`, so the whole
/// crate uses the same width.
pub type RoundId = u32;

/// Unordered set of round identifiers used to scope a submission filter.
pub type RoundIdSet = HashSet<RoundId>;

/// Raw aggregate for a single round, before decimal normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: RoundId,
    /// Fixed-point answer as stored by the contract
    pub answer: i64,
}

impl RoundData {
    pub fn new(round_id: RoundId, answer: i64) -> Self {
        Self { round_id, answer }
    }
}

/// Where a log was emitted on chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogLocation {
    pub block_number: Option<u64>,
    pub transaction_hash: Option<H256>,
    pub log_index: Option<u64>,
}

impl fmt::Display for LogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.block_number, self.transaction_hash) {
            (Some(block), Some(tx)) => write!(f, "block {} tx {:#x}", block, tx),
            (Some(block), None) => write!(f, "block {}", block),
            (None, Some(tx)) => write!(f, "tx {:#x}", tx),
            (None, None) => write!(f, "unknown location"),
        }
    }
}

/// One oracle's individual answer for a round (`SubmissionReceived`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEvent {
    pub oracle: Address,
    pub round: RoundId,
    /// Unnormalized answer
    pub submission: i64,
    pub location: LogLocation,
}

impl SubmissionEvent {
    pub fn new(oracle: Address, round: RoundId, submission: i64) -> Self {
        Self {
            oracle,
            round,
            submission,
            location: LogLocation::default(),
        }
    }
}

/// Full hex rendering of an address (`Display` on `Address` abbreviates it)
pub fn format_address(address: &Address) -> String {
    format!("{:#x}", address)
}
