//! `ChainClient` and its JSON-RPC implementation

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ethflow_primitives::{Address, H256, U256};
use ethflow_types::{Header, Log, Receipt, SignedTransaction};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::transport::{deserialize_response, MockTransport, Subscription, Transport};
use crate::types::{
    parse_data, parse_quantity, BlockId, CallMsg, FilterQuery, RpcHeader, RpcLog, RpcReceipt,
    RpcTransaction,
};
use crate::SdkError;

/// Chain access used by transactors, bindings and scenarios
///
/// `block: None` means the latest block.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id
    async fn chain_id(&self) -> Result<u64, SdkError>;

    /// Latest block number
    async fn block_number(&self) -> Result<u64, SdkError>;

    /// Balance at a block
    async fn balance_at(&self, address: &Address, block: Option<u64>) -> Result<U256, SdkError>;

    /// Nonce at a block
    async fn nonce_at(&self, address: &Address, block: Option<u64>) -> Result<u64, SdkError>;

    /// Next nonce including pending transactions
    async fn pending_nonce_at(&self, address: &Address) -> Result<u64, SdkError>;

    /// Code at a block
    async fn code_at(&self, address: &Address, block: Option<u64>) -> Result<Bytes, SdkError>;

    /// Suggested tip cap
    async fn suggest_gas_tip_cap(&self) -> Result<U256, SdkError>;

    /// Suggested legacy gas price (base fee plus tip)
    async fn suggest_gas_price(&self) -> Result<U256, SdkError>;

    /// Header by number; `None` if the block does not exist
    async fn header_by_number(&self, number: Option<u64>) -> Result<Option<Header>, SdkError>;

    /// Gas needed by a message against the pending state
    async fn estimate_gas(&self, msg: &CallMsg) -> Result<u64, SdkError>;

    /// Read-only call
    async fn call_contract(&self, msg: &CallMsg, block: Option<u64>) -> Result<Bytes, SdkError>;

    /// Submit; returns the hash without waiting for inclusion
    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<H256, SdkError>;

    /// Transaction and whether it is still pending
    async fn transaction_by_hash(
        &self,
        hash: &H256,
    ) -> Result<Option<(SignedTransaction, bool)>, SdkError>;

    /// Receipt once included
    async fn transaction_receipt(&self, hash: &H256) -> Result<Option<Receipt>, SdkError>;

    /// Matching historical logs
    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<Log>, SdkError>;

    /// Stream of matching logs from new blocks
    async fn subscribe_filter_logs(&self, query: &FilterQuery) -> Result<Subscription<Log>, SdkError>;
}

/// JSON-RPC client over any [`Transport`]
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    chain_id: Arc<OnceCell<u64>>,
}

impl RpcClient {
    /// Create a client with a custom transport
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self { transport: Arc::new(transport), chain_id: Arc::new(OnceCell::new()) }
    }

    /// Client over a fresh mock transport, plus a handle to configure it
    pub fn new_mock() -> (Self, MockTransport) {
        let transport = MockTransport::new();
        (Self::with_transport(transport.clone()), transport)
    }

    /// Helper method to make RPC request and deserialize
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, SdkError> {
        let value = self.transport.request_json(method, params).await?;
        deserialize_response(value)
    }

    async fn request_quantity(&self, method: &str, params: Vec<Value>) -> Result<u64, SdkError> {
        let result: String = self.request(method, params).await?;
        parse_quantity(&result)
    }

    async fn request_data(&self, method: &str, params: Vec<Value>) -> Result<Bytes, SdkError> {
        let result: String = self.request(method, params).await?;
        parse_data(&result)
    }

    fn account_params(address: &Address, block: BlockId) -> Result<Vec<Value>, SdkError> {
        Ok(vec![serde_json::to_value(address)?, serde_json::to_value(block)?])
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("chain_id", &self.chain_id.get()).finish()
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn chain_id(&self) -> Result<u64, SdkError> {
        self.chain_id
            .get_or_try_init(|| self.request_quantity("eth_chainId", vec![]))
            .await
            .copied()
    }

    async fn block_number(&self) -> Result<u64, SdkError> {
        self.request_quantity("eth_blockNumber", vec![]).await
    }

    async fn balance_at(&self, address: &Address, block: Option<u64>) -> Result<U256, SdkError> {
        self.request("eth_getBalance", Self::account_params(address, block.into())?).await
    }

    async fn nonce_at(&self, address: &Address, block: Option<u64>) -> Result<u64, SdkError> {
        self.request_quantity("eth_getTransactionCount", Self::account_params(address, block.into())?)
            .await
    }

    async fn pending_nonce_at(&self, address: &Address) -> Result<u64, SdkError> {
        self.request_quantity("eth_getTransactionCount", Self::account_params(address, BlockId::Pending)?)
            .await
    }

    async fn code_at(&self, address: &Address, block: Option<u64>) -> Result<Bytes, SdkError> {
        self.request_data("eth_getCode", Self::account_params(address, block.into())?).await
    }

    async fn suggest_gas_tip_cap(&self) -> Result<U256, SdkError> {
        self.request("eth_maxPriorityFeePerGas", vec![]).await
    }

    async fn suggest_gas_price(&self) -> Result<U256, SdkError> {
        self.request("eth_gasPrice", vec![]).await
    }

    async fn header_by_number(&self, number: Option<u64>) -> Result<Option<Header>, SdkError> {
        let block = BlockId::from(number);
        let header: Option<RpcHeader> = self
            .request("eth_getBlockByNumber", vec![serde_json::to_value(block)?, Value::Bool(false)])
            .await?;
        Ok(header.map(Header::from))
    }

    async fn estimate_gas(&self, msg: &CallMsg) -> Result<u64, SdkError> {
        self.request_quantity("eth_estimateGas", vec![serde_json::to_value(msg)?]).await
    }

    async fn call_contract(&self, msg: &CallMsg, block: Option<u64>) -> Result<Bytes, SdkError> {
        let block = BlockId::from(block);
        self.request_data("eth_call", vec![serde_json::to_value(msg)?, serde_json::to_value(block)?])
            .await
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<H256, SdkError> {
        let raw = format!("0x{}", hex::encode(tx.encode_raw()));
        let hash: H256 = self.request("eth_sendRawTransaction", vec![Value::String(raw)]).await?;
        if hash != tx.hash() {
            tracing::warn!(local = %tx.hash(), node = %hash, "node reported a different transaction hash");
        }
        tracing::debug!(%hash, nonce = tx.nonce(), "transaction submitted");
        Ok(hash)
    }

    async fn transaction_by_hash(
        &self,
        hash: &H256,
    ) -> Result<Option<(SignedTransaction, bool)>, SdkError> {
        let tx: Option<RpcTransaction> = self
            .request("eth_getTransactionByHash", vec![serde_json::to_value(hash)?])
            .await?;
        tx.map(RpcTransaction::into_signed).transpose()
    }

    async fn transaction_receipt(&self, hash: &H256) -> Result<Option<Receipt>, SdkError> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", vec![serde_json::to_value(hash)?])
            .await?;
        Ok(receipt.map(Receipt::from))
    }

    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<Log>, SdkError> {
        let logs: Vec<RpcLog> = self.request("eth_getLogs", vec![serde_json::to_value(query)?]).await?;
        Ok(logs.into_iter().map(Log::from).collect())
    }

    async fn subscribe_filter_logs(&self, query: &FilterQuery) -> Result<Subscription<Log>, SdkError> {
        let params = vec![Value::String("logs".to_string()), serde_json::to_value(query)?];
        let (id, rx) = self.transport.subscribe(params).await?;

        let transport = Arc::clone(&self.transport);
        let raw = Subscription::with_guard(rx, move || transport.unsubscribe(&id));
        Ok(raw.filter_map(|value| match serde_json::from_value::<RpcLog>(value) {
            Ok(log) => Some(Log::from(log)),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed log notification");
                None
            }
        }))
    }
}
