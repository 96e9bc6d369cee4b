//! FluxAggregator binding over ethers

use async_trait::async_trait;
use ethers::abi::RawLog;
use ethers::contract::{abigen, EthEvent};
use ethers::providers::{Http, Middleware, Provider, Ws};
use ethers::types::{Address, Log, Topic, ValueOrArray, H256, I256};
use futures_util::{stream, StreamExt};
use std::sync::Arc;

use super::{AggregatorConnector, AggregatorContract, SubmissionItem, SubmissionStream};
use crate::error::{ContractCall, EventIterationError, OracleError};
use crate::types::{LogLocation, RoundData, RoundId, RoundIdSet, SubmissionEvent};

abigen!(
    FluxAggregator,
    r#"[
        function decimals() external view returns (uint8)
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
        function getRoundData(uint80 _roundId) external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
        event SubmissionReceived(int256 indexed submission, uint32 indexed round, address indexed oracle)
    ]"#
);

/// Chain node transport, chosen from the endpoint scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ws,
    Http,
}

impl Transport {
    pub fn from_endpoint(endpoint: &str) -> Result<Self, OracleError> {
        let scheme = endpoint
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();

        match scheme.as_str() {
            "ws" | "wss" => Ok(Transport::Ws),
            "http" | "https" => Ok(Transport::Http),
            _ => Err(OracleError::Connection {
                endpoint: endpoint.to_string(),
                reason: "unsupported endpoint scheme, expected ws(s):// or http(s)://".to_string(),
            }),
        }
    }
}

/// `AggregatorContract` backed by an ethers middleware
pub struct EthersAggregator<M: Middleware> {
    contract: FluxAggregator<M>,
    client: Arc<M>,
    from_block: u64,
}

impl<M: Middleware + 'static> EthersAggregator<M> {
    pub fn new(address: Address, client: Arc<M>, from_block: u64) -> Self {
        Self {
            contract: FluxAggregator::new(address, client.clone()),
            client,
            from_block,
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }
}

#[async_trait]
impl<M: Middleware + 'static> AggregatorContract for EthersAggregator<M> {
    async fn decimals(&self) -> Result<u8, OracleError> {
        self.contract
            .decimals()
            .call()
            .await
            .map_err(|e| OracleError::contract_call(ContractCall::Decimals, e))
    }

    async fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        let call = ContractCall::LatestRoundData;
        let (round_id, answer, _, _, _) = self
            .contract
            .latest_round_data()
            .call()
            .await
            .map_err(|e| OracleError::contract_call(call, e))?;

        let round_id = RoundId::try_from(round_id).map_err(|_| {
            OracleError::contract_call(call, format!("round id {} does not fit in uint32", round_id))
        })?;

        Ok(RoundData::new(round_id, answer_to_i64(answer, call)?))
    }

    async fn get_round_data(&self, round_id: RoundId) -> Result<RoundData, OracleError> {
        let call = ContractCall::GetRoundData(round_id);
        let (_, answer, _, _, _) = self
            .contract
            .get_round_data(u128::from(round_id))
            .call()
            .await
            .map_err(|e| OracleError::contract_call(call, e))?;

        Ok(RoundData::new(round_id, answer_to_i64(answer, call)?))
    }

    async fn filter_submission_received(
        &self,
        rounds: &RoundIdSet,
        oracles: &[Address],
    ) -> Result<SubmissionStream, OracleError> {
        // An empty topic list is a wildcard on the node side
        if rounds.is_empty() {
            return Ok(SubmissionStream::empty());
        }

        let mut event = self
            .contract
            .submission_received_filter()
            .from_block(self.from_block)
            .topic2(round_topic(rounds));
        if !oracles.is_empty() {
            event = event.topic3(oracle_topic(oracles));
        }

        let logs = self
            .client
            .get_logs(&event.filter)
            .await
            .map_err(|e| OracleError::contract_call(ContractCall::FilterSubmissionReceived, e))?;

        tracing::debug!(
            contract = %crate::types::format_address(&self.address()),
            rounds = rounds.len(),
            logs = logs.len(),
            "Fetched SubmissionReceived logs"
        );

        Ok(SubmissionStream::new(stream::iter(logs).map(decode_submission)))
    }
}

fn answer_to_i64(answer: I256, call: ContractCall) -> Result<i64, OracleError> {
    i64::try_from(answer)
        .map_err(|_| OracleError::contract_call(call, format!("answer {} does not fit in int64", answer)))
}

fn round_topic(rounds: &RoundIdSet) -> Topic {
    ValueOrArray::Array(
        rounds
            .iter()
            .map(|round| Some(H256::from_low_u64_be(u64::from(*round))))
            .collect(),
    )
}

fn oracle_topic(oracles: &[Address]) -> Topic {
    ValueOrArray::Array(oracles.iter().map(|oracle| Some(H256::from(*oracle))).collect())
}

fn decode_submission(log: Log) -> SubmissionItem {
    let location = LogLocation {
        block_number: log.block_number.map(|n| n.as_u64()),
        transaction_hash: log.transaction_hash,
        log_index: log.log_index.map(|i| i.low_u64()),
    };

    let raw = RawLog {
        topics: log.topics,
        data: log.data.to_vec(),
    };
    let decoded = SubmissionReceivedFilter::decode_log(&raw)
        .map_err(|e| EventIterationError::new(location, e))?;

    let submission = i64::try_from(decoded.submission).map_err(|_| {
        EventIterationError::new(
            location,
            format!("submission {} does not fit in int64", decoded.submission),
        )
    })?;

    Ok(SubmissionEvent {
        oracle: decoded.oracle,
        round: decoded.round,
        submission,
        location,
    })
}

/// Opens a new chain connection per bound contract
#[derive(Debug, Clone)]
pub struct EthersConnector {
    endpoint: String,
    from_block: u64,
}

impl EthersConnector {
    pub fn new(endpoint: impl Into<String>, from_block: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            from_block,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connection_error(&self, reason: impl std::fmt::Display) -> OracleError {
        OracleError::Connection {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl AggregatorConnector for EthersConnector {
    type Contract = Box<dyn AggregatorContract>;

    async fn connect(&self, address: &str) -> Result<Self::Contract, OracleError> {
        let contract_address = address
            .parse::<Address>()
            .map_err(|e| OracleError::ContractBinding {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        match Transport::from_endpoint(&self.endpoint)? {
            Transport::Ws => {
                let provider = Provider::<Ws>::connect(self.endpoint.as_str())
                    .await
                    .map_err(|e| self.connection_error(e))?;
                tracing::debug!(endpoint = %self.endpoint, address = %address, "Connected over WebSocket");
                Ok(Box::new(EthersAggregator::new(
                    contract_address,
                    Arc::new(provider),
                    self.from_block,
                )))
            }
            Transport::Http => {
                let provider = Provider::<Http>::try_from(self.endpoint.as_str())
                    .map_err(|e| self.connection_error(e))?;
                tracing::debug!(endpoint = %self.endpoint, address = %address, "Using HTTP provider");
                Ok(Box::new(EthersAggregator::new(
                    contract_address,
                    Arc::new(provider),
                    self.from_block,
                )))
            }
        }
    }
}
