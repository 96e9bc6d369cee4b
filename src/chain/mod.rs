//! Chain binding layer
//!
//! The aggregator contract is consumed through the `AggregatorContract` trait so
//! the round window and the scenario runner never touch RPC types directly.
//! `flux` provides the ethers-backed implementation.

mod flux;

pub use flux::{EthersAggregator, EthersConnector, Transport};

use async_trait::async_trait;
use ethers::types::Address;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;

use crate::error::{EventIterationError, OracleError};
use crate::types::{RoundData, RoundId, RoundIdSet, SubmissionEvent};

/// Item of a submission stream: a decoded event or a per-event failure
pub type SubmissionItem = Result<SubmissionEvent, EventIterationError>;

/// Read-only view of one FluxAggregator contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregatorContract: Send + Sync {
    /// Decimal places of the fixed-point answers
    async fn decimals(&self) -> Result<u8, OracleError>;

    /// Most recent round
    async fn latest_round_data(&self) -> Result<RoundData, OracleError>;

    /// A specific historical round
    async fn get_round_data(&self, round_id: RoundId) -> Result<RoundData, OracleError>;

    /// `SubmissionReceived` events for the given rounds.
    ///
    /// An empty `oracles` slice means any submitter.
    async fn filter_submission_received(
        &self,
        rounds: &RoundIdSet,
        oracles: &[Address],
    ) -> Result<SubmissionStream, OracleError>;
}

#[async_trait]
impl<T: AggregatorContract + ?Sized> AggregatorContract for Box<T> {
    async fn decimals(&self) -> Result<u8, OracleError> {
        self.as_ref().decimals().await
    }

    async fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        self.as_ref().latest_round_data().await
    }

    async fn get_round_data(&self, round_id: RoundId) -> Result<RoundData, OracleError> {
        self.as_ref().get_round_data(round_id).await
    }

    async fn filter_submission_received(
        &self,
        rounds: &RoundIdSet,
        oracles: &[Address],
    ) -> Result<SubmissionStream, OracleError> {
        self.as_ref()
            .filter_submission_received(rounds, oracles)
            .await
    }
}

/// Binds aggregator contracts by address over a fresh chain connection
#[async_trait]
pub trait AggregatorConnector: Send + Sync {
    type Contract: AggregatorContract;

    async fn connect(&self, address: &str) -> Result<Self::Contract, OracleError>;
}

/// Lazy, single-pass sequence of submission events.
///
/// Per-event decode failures come through as `Err` items and do not end the
/// sequence. The underlying resources are released by `close`, when the
/// sequence is exhausted, or on drop, whichever happens first.
pub struct SubmissionStream {
    inner: Option<BoxStream<'static, SubmissionItem>>,
    yielded: usize,
}

impl SubmissionStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = SubmissionItem> + Send + 'static,
    {
        Self {
            inner: Some(stream.boxed()),
            yielded: 0,
        }
    }

    pub fn from_items(items: Vec<SubmissionItem>) -> Self {
        Self::new(stream::iter(items))
    }

    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    /// Next event, or `None` once the sequence is exhausted or closed
    pub async fn next(&mut self) -> Option<SubmissionItem> {
        let inner = self.inner.as_mut()?;
        match inner.next().await {
            Some(item) => {
                self.yielded += 1;
                Some(item)
            }
            None => {
                self.release();
                None
            }
        }
    }

    /// Items handed out so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(yielded = self.yielded, "Submission stream released");
        }
    }
}

impl Drop for SubmissionStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubmissionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionStream")
            .field("closed", &self.is_closed())
            .field("yielded", &self.yielded)
            .finish()
    }
}
