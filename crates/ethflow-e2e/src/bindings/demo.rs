use std::sync::Arc;

use ethflow_primitives::{Address, H256, U256};
use ethflow_sdk::abi::{event_topic, function_selector, ParamType, Token};
use ethflow_sdk::{
    BoundContract, CallOpts, ChainClient, FilterOpts, SdkError, Subscription,
    TransactOpts, WatchOpts,
};
use ethflow_types::{Log, SignedTransaction};

use super::deploy_artifact;
use crate::contracts::{self, OWNER, PAID_EVENT};
use crate::E2EResult;

/// Decoded `Paid(address indexed from, uint256 amount)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidEvent {
    pub from: Address,
    pub amount: U256,
    /// Log the event was decoded from
    pub raw: Log,
}

impl PaidEvent {
    /// `None` for logs of other events or with a malformed payload
    pub fn decode(log: &Log) -> Option<Self> {
        if log.topics.len() != 2 || log.topics[0] != event_topic(PAID_EVENT) || log.data.len() != 32 {
            return None;
        }
        Some(Self {
            from: Address::from_word(log.topics[1].as_bytes()),
            amount: U256::from_big_endian(&log.data),
            raw: log.clone(),
        })
    }
}

fn from_topics(from: &[Address]) -> Vec<Vec<H256>> {
    if from.is_empty() {
        return Vec::new();
    }
    vec![from.iter().map(|a| H256::from_bytes(a.to_word())).collect()]
}

/// Binding for the Demo contract
#[derive(Debug, Clone)]
pub struct Demo {
    contract: BoundContract,
}

impl Demo {
    /// Deploy with the sender of `opts` as owner
    pub async fn deploy(
        opts: &TransactOpts,
        client: Arc<dyn ChainClient>,
    ) -> E2EResult<(Address, SignedTransaction, Self)> {
        let (address, tx) = deploy_artifact(opts, client.as_ref(), contracts::demo_bytecode()).await?;
        Ok((address, tx, Self::at(address, client)))
    }

    pub fn at(address: Address, client: Arc<dyn ChainClient>) -> Self {
        Self { contract: BoundContract::new(address, client) }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// `owner()`
    pub async fn owner(&self, opts: &CallOpts) -> Result<Address, SdkError> {
        let out = self
            .contract
            .call(opts, function_selector(OWNER), &[], &[ParamType::Address])
            .await?;
        out.into_iter()
            .next()
            .and_then(Token::into_address)
            .ok_or_else(|| SdkError::AbiDecode("owner output".to_string()))
    }

    /// Send `opts.value` to the receive function
    pub async fn receive(&self, opts: &TransactOpts) -> Result<SignedTransaction, SdkError> {
        self.contract.transfer(opts).await
    }

    /// Live `Paid` events, optionally restricted to payers in `from`
    pub async fn watch_paid(
        &self,
        opts: &WatchOpts,
        from: &[Address],
    ) -> Result<Subscription<PaidEvent>, SdkError> {
        let logs = self
            .contract
            .watch_logs(opts, event_topic(PAID_EVENT), &from_topics(from))
            .await?;
        Ok(logs.filter_map(|log| PaidEvent::decode(&log)))
    }

    /// Historical `Paid` events
    pub async fn filter_paid(&self, opts: &FilterOpts, from: &[Address]) -> Result<Vec<PaidEvent>, SdkError> {
        let logs = self
            .contract
            .filter_logs(opts, event_topic(PAID_EVENT), &from_topics(from))
            .await?;
        Ok(logs.iter().filter_map(PaidEvent::decode).collect())
    }
}
