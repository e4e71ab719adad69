//! Blocks and the EIP-1559 base fee rule

use ethflow_crypto::keccak256;
use ethflow_primitives::{Address, H256, U256};
use rlp::RlpStream;

use crate::receipt::Receipt;
use crate::transaction::SignedTransaction;

/// Denominator bounding the per-block base fee change to 12.5%
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

/// Gas target is `gas_limit / ELASTICITY_MULTIPLIER`
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Block header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Height
    pub number: u64,
    /// Parent header hash
    pub parent_hash: H256,
    /// Fee recipient
    pub coinbase: Address,
    /// Seconds since the unix epoch
    pub timestamp: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used by included transactions
    pub gas_used: u64,
    /// Base fee per gas
    pub base_fee_per_gas: U256,
    /// Commitment to the included transaction hashes
    pub transactions_root: H256,
}

impl Header {
    /// Header hash over all fields
    pub fn hash(&self) -> H256 {
        let mut s = RlpStream::new_list(8);
        s.append(&self.parent_hash);
        s.append(&self.coinbase);
        s.append(&self.number);
        s.append(&self.timestamp);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.base_fee_per_gas);
        s.append(&self.transactions_root);
        keccak256(&s.out())
    }
}

/// Sealed block
#[derive(Clone, Debug)]
pub struct Block {
    /// Header
    pub header: Header,
    /// Cached header hash
    pub hash: H256,
    /// Included transactions, in execution order
    pub transactions: Vec<SignedTransaction>,
    /// One receipt per transaction
    pub receipts: Vec<Receipt>,
}

impl Block {
    /// Root over the hashes of `txs`
    pub fn transactions_root(txs: &[SignedTransaction]) -> H256 {
        let hashes: Vec<H256> = txs.iter().map(|tx| tx.hash()).collect();
        let mut s = RlpStream::new();
        s.append_list::<H256, H256>(&hashes);
        keccak256(&s.out())
    }

    /// Height
    pub fn number(&self) -> u64 {
        self.header.number
    }
}

/// Base fee of the child of a block with the given usage
pub fn next_base_fee(parent_base_fee: U256, parent_gas_used: u64, parent_gas_limit: u64) -> U256 {
    let target = parent_gas_limit / ELASTICITY_MULTIPLIER;
    if target == 0 || parent_gas_used == target {
        return parent_base_fee;
    }
    let denominator = U256::from(target) * U256::from(BASE_FEE_CHANGE_DENOMINATOR);
    if parent_gas_used > target {
        let delta = parent_base_fee * U256::from(parent_gas_used - target) / denominator;
        parent_base_fee + delta.max(U256::one())
    } else {
        let delta = parent_base_fee * U256::from(target - parent_gas_used) / denominator;
        parent_base_fee.saturating_sub(delta)
    }
}
