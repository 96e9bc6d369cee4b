//! Error taxonomy for round fetching, deviation checks and submission filtering

use std::fmt;
use thiserror::Error;

use crate::types::{LogLocation, RoundId};

/// Contract read that failed, carried in `OracleError::ContractCall`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    Decimals,
    LatestRoundData,
    GetRoundData(RoundId),
    FilterSubmissionReceived,
}

impl fmt::Display for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractCall::Decimals => write!(f, "decimals()"),
            ContractCall::LatestRoundData => write!(f, "latestRoundData()"),
            ContractCall::GetRoundData(round) => write!(f, "getRoundData({})", round),
            ContractCall::FilterSubmissionReceived => write!(f, "filter SubmissionReceived"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to connect to chain node at '{endpoint}': {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("failed to bind aggregator contract at '{address}': {reason}")]
    ContractBinding { address: String, reason: String },

    #[error("contract call {call} failed: {reason}")]
    ContractCall { call: ContractCall, reason: String },

    #[error("round history exhausted: no round precedes round 0")]
    RoundUnderflow,

    #[error("round {0} is not in the fetched round window")]
    UnknownRound(RoundId),

    #[error("aggregate for round {0} is zero, deviation is undefined")]
    ZeroAggregate(RoundId),

    #[error("deviation from the round {0} aggregate is out of decimal range")]
    DeviationOverflow(RoundId),

    #[error("round count must be positive")]
    InvalidRoundCount,

    #[error("number of rounds exceeded: {max} allowed, got {requested}")]
    RoundCountExceeded { requested: usize, max: usize },

    #[error("contract precision of {0} decimals exceeds the supported maximum of 28")]
    UnsupportedPrecision(u8),
}

impl OracleError {
    pub fn contract_call(call: ContractCall, reason: impl fmt::Display) -> Self {
        OracleError::ContractCall {
            call,
            reason: reason.to_string(),
        }
    }

    /// Round id named by the error, if any
    pub fn round(&self) -> Option<RoundId> {
        match self {
            OracleError::ContractCall {
                call: ContractCall::GetRoundData(round),
                ..
            } => Some(*round),
            OracleError::UnknownRound(round)
            | OracleError::ZeroAggregate(round)
            | OracleError::DeviationOverflow(round) => Some(*round),
            _ => None,
        }
    }
}

/// A single unreadable event inside a submission stream.
///
/// Tolerated: the stream keeps going after yielding one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed SubmissionReceived event at {location}: {reason}")]
pub struct EventIterationError {
    pub location: LogLocation,
    pub reason: String,
}

impl EventIterationError {
    pub fn new(location: LogLocation, reason: impl fmt::Display) -> Self {
        Self {
            location,
            reason: reason.to_string(),
        }
    }
}
