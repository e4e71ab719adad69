//! Receipts and logs

use bytes::Bytes;
use ethflow_primitives::{Address, H256, U256};

/// Execution outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Reverted or ran out of gas
    Failure = 0,
    /// Completed
    Success = 1,
}

impl From<bool> for TxStatus {
    fn from(success: bool) -> Self {
        if success {
            TxStatus::Success
        } else {
            TxStatus::Failure
        }
    }
}

/// Log emitted by a contract, with its position in the chain
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; topic 0 is usually the event signature
    pub topics: Vec<H256>,
    /// Non-indexed data
    pub data: Bytes,
    /// Including block number
    pub block_number: u64,
    /// Including block hash
    pub block_hash: H256,
    /// Originating transaction
    pub transaction_hash: H256,
    /// Transaction position in the block
    pub transaction_index: u64,
    /// Log position in the block
    pub log_index: u64,
    /// Set when a reorg removed the log
    pub removed: bool,
}

impl Log {
    /// A log not yet placed in a block
    pub fn new(address: Address, topics: Vec<H256>, data: Bytes) -> Self {
        Self { address, topics, data, ..Default::default() }
    }

    /// Event signature topic
    pub fn topic0(&self) -> Option<&H256> {
        self.topics.first()
    }
}

/// Inclusion record for a transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Outcome
    pub status: TxStatus,
    /// Transaction hash
    pub transaction_hash: H256,
    /// Position in the block
    pub transaction_index: u64,
    /// Including block hash
    pub block_hash: H256,
    /// Including block number
    pub block_number: u64,
    /// Sender
    pub from: Address,
    /// Recipient (`None` for creations)
    pub to: Option<Address>,
    /// Deployed contract, for creations
    pub contract_address: Option<Address>,
    /// Gas used by this transaction
    pub gas_used: u64,
    /// Gas used in the block up to and including this transaction
    pub cumulative_gas_used: u64,
    /// Price per gas paid
    pub effective_gas_price: U256,
    /// Emitted logs
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Whether execution succeeded
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }

    /// Total fee paid: `gas_used * effective_gas_price`
    pub fn fee(&self) -> U256 {
        U256::from(self.gas_used) * self.effective_gas_price
    }
}
