//! Contract deployment and invocation
//!
//! [`TransactOpts`] carries the signer and optional overrides; unset fields
//! are filled from the chain:
//!
//! - nonce: pending nonce of `from`
//! - tip cap: `suggest_gas_tip_cap`
//! - fee cap: `2 * base_fee + tip`
//! - gas: `estimate_gas`

use std::sync::Arc;

use bytes::Bytes;
use ethflow_primitives::{Address, H256, U256};
use ethflow_types::{contract_address, Log, SignedTransaction};

use crate::abi::{decode, encode, encode_function_call, ParamType, Token};
use crate::transport::Subscription;
use crate::types::{CallMsg, FilterQuery};
use crate::{ChainClient, SdkError, Signer, TxBuilder, Wallet};

/// Options for state-changing calls
#[derive(Clone)]
pub struct TransactOpts {
    /// Sender; must match the signer
    pub from: Address,
    /// Signs the transaction
    pub signer: Arc<dyn Signer>,
    /// Nonce override
    pub nonce: Option<u64>,
    /// Wei sent along
    pub value: U256,
    /// Gas limit override
    pub gas_limit: Option<u64>,
    /// Tip cap override
    pub gas_tip_cap: Option<U256>,
    /// Fee cap override
    pub gas_fee_cap: Option<U256>,
}

impl TransactOpts {
    /// Defaults for `signer`
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            from: signer.address(),
            signer,
            nonce: None,
            value: U256::zero(),
            gas_limit: None,
            gas_tip_cap: None,
            gas_fee_cap: None,
        }
    }

    /// Take ownership of a wallet
    pub fn from_wallet(wallet: Wallet) -> Self {
        Self::new(Arc::new(wallet))
    }

    /// Set the value
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = value.into();
        self
    }

    /// Set the nonce
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the gas limit
    pub fn gas_limit(mut self, gas: u64) -> Self {
        self.gas_limit = Some(gas);
        self
    }

    /// Set both fee caps
    pub fn fees(mut self, tip_cap: impl Into<U256>, fee_cap: impl Into<U256>) -> Self {
        self.gas_tip_cap = Some(tip_cap.into());
        self.gas_fee_cap = Some(fee_cap.into());
        self
    }
}

impl std::fmt::Debug for TransactOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactOpts")
            .field("from", &self.from)
            .field("nonce", &self.nonce)
            .field("value", &self.value)
            .field("gas_limit", &self.gas_limit)
            .field("gas_tip_cap", &self.gas_tip_cap)
            .field("gas_fee_cap", &self.gas_fee_cap)
            .finish_non_exhaustive()
    }
}

/// Options for read-only calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOpts {
    /// Caller seen by the contract
    pub from: Option<Address>,
    /// Block to execute against; `None` is latest
    pub block: Option<u64>,
}

impl CallOpts {
    /// Call at a historical block
    pub fn at_block(block: u64) -> Self {
        Self { block: Some(block), ..Self::default() }
    }
}

/// Range for historical log queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOpts {
    /// First block
    pub start: u64,
    /// Last block; `None` is latest
    pub end: Option<u64>,
}

/// Start point for log subscriptions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOpts {
    /// Replay matches from this block first
    pub start: Option<u64>,
}

/// Sign and submit a transaction, filling unset options from the chain
pub async fn transact(
    client: &dyn ChainClient,
    opts: &TransactOpts,
    to: Option<Address>,
    data: Bytes,
) -> Result<SignedTransaction, SdkError> {
    if opts.signer.address() != opts.from {
        return Err(SdkError::SigningFailed(format!("signer is not {}", opts.from)));
    }
    let chain_id = client.chain_id().await?;
    let nonce = match opts.nonce {
        Some(nonce) => nonce,
        None => client.pending_nonce_at(&opts.from).await?,
    };
    let tip_cap = match opts.gas_tip_cap {
        Some(tip) => tip,
        None => client.suggest_gas_tip_cap().await?,
    };
    let fee_cap = match opts.gas_fee_cap {
        Some(fee) => fee,
        None => {
            let head = client
                .header_by_number(None)
                .await?
                .ok_or_else(|| SdkError::NotFound("latest header".to_string()))?;
            head.base_fee_per_gas * U256::from(2u64) + tip_cap
        }
    };
    if tip_cap > fee_cap {
        return Err(SdkError::TipAboveFeeCap);
    }
    let gas_limit = match opts.gas_limit {
        Some(gas) => gas,
        None => {
            let msg = CallMsg {
                from: Some(opts.from),
                to,
                gas_tip_cap: Some(tip_cap),
                gas_fee_cap: Some(fee_cap),
                value: Some(opts.value),
                data: data.clone(),
                ..CallMsg::default()
            };
            client.estimate_gas(&msg).await?
        }
    };

    let mut builder = TxBuilder::new(chain_id)
        .nonce(nonce)
        .gas_limit(gas_limit)
        .max_priority_fee_per_gas(tip_cap)
        .max_fee_per_gas(fee_cap)
        .value(opts.value)
        .data(data);
    if let Some(to) = to {
        builder = builder.to(to);
    }
    let tx = builder.sign(opts.signer.as_ref())?;
    client.send_transaction(&tx).await?;
    tracing::debug!(hash = %tx.hash(), from = %opts.from, nonce, gas_limit, "transaction sent");
    Ok(tx)
}

/// Deploy `bytecode` with ABI-encoded constructor arguments
///
/// The address is derived locally from the sender and nonce, so it is known
/// before the transaction is mined.
pub async fn deploy_contract(
    opts: &TransactOpts,
    client: &dyn ChainClient,
    bytecode: &[u8],
    ctor_args: &[Token],
) -> Result<(Address, SignedTransaction), SdkError> {
    let mut init = bytecode.to_vec();
    init.extend_from_slice(&encode(ctor_args));
    let tx = transact(client, opts, None, Bytes::from(init)).await?;
    let address = contract_address(&opts.from, tx.nonce());
    tracing::info!(%address, hash = %tx.hash(), "contract deployment sent");
    Ok((address, tx))
}

/// Contract at a known address
#[derive(Clone)]
pub struct BoundContract {
    address: Address,
    client: Arc<dyn ChainClient>,
}

impl BoundContract {
    /// Bind to `address`
    pub fn new(address: Address, client: Arc<dyn ChainClient>) -> Self {
        Self { address, client }
    }

    /// Contract address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Backend
    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// Read-only call decoded as `outputs`
    ///
    /// Empty return data from an address without code is [`SdkError::NoCode`].
    pub async fn call(
        &self,
        opts: &CallOpts,
        selector: [u8; 4],
        args: &[Token],
        outputs: &[ParamType],
    ) -> Result<Vec<Token>, SdkError> {
        let msg = CallMsg {
            from: opts.from,
            to: Some(self.address),
            data: Bytes::from(encode_function_call(selector, args)),
            ..CallMsg::default()
        };
        let output = self.client.call_contract(&msg, opts.block).await?;
        if output.is_empty() && !outputs.is_empty() {
            let code = self.client.code_at(&self.address, opts.block).await?;
            if code.is_empty() {
                return Err(SdkError::NoCode(self.address));
            }
        }
        decode(outputs, &output)
    }

    /// Send `calldata` to the contract
    pub async fn transact(&self, opts: &TransactOpts, calldata: Bytes) -> Result<SignedTransaction, SdkError> {
        transact(self.client.as_ref(), opts, Some(self.address), calldata).await
    }

    /// Plain value transfer, which runs the receive function
    pub async fn transfer(&self, opts: &TransactOpts) -> Result<SignedTransaction, SdkError> {
        self.transact(opts, Bytes::new()).await
    }

    /// Filter for this contract's `topic0` events; `indexed[i]` constrains topic `i + 1`
    pub fn event_query(&self, topic0: H256, indexed: &[Vec<H256>]) -> FilterQuery {
        indexed
            .iter()
            .enumerate()
            .fold(FilterQuery::new().address(self.address).event(topic0), |query, (i, values)| {
                query.topic(i + 1, values.clone())
            })
    }

    /// Historical events
    pub async fn filter_logs(
        &self,
        opts: &FilterOpts,
        topic0: H256,
        indexed: &[Vec<H256>],
    ) -> Result<Vec<Log>, SdkError> {
        let mut query = self.event_query(topic0, indexed).from_block(opts.start);
        query.to_block = opts.end;
        self.client.filter_logs(&query).await
    }

    /// Live events, replaying from `opts.start` first when set
    pub async fn watch_logs(
        &self,
        opts: &WatchOpts,
        topic0: H256,
        indexed: &[Vec<H256>],
    ) -> Result<Subscription<Log>, SdkError> {
        let mut query = self.event_query(topic0, indexed);
        query.from_block = opts.start;
        self.client.subscribe_filter_logs(&query).await
    }
}

impl std::fmt::Debug for BoundContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundContract").field("address", &self.address).finish_non_exhaustive()
    }
}
