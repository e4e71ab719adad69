//! What executing code can observe: its frame, the block, the transaction, and state

use ethflow_primitives::{Address, H256, U256};

/// Frame inputs
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    /// Account whose code runs and whose storage SLOAD/SSTORE address
    pub address: Address,
    /// `CALLER`
    pub caller: Address,
    /// `CALLVALUE`, already credited to `address`
    pub value: U256,
    /// Input bytes; init code runs with none
    pub data: Vec<u8>,
    /// SSTORE and LOGn halt the frame when set
    pub is_static: bool,
}

impl CallContext {
    /// Frame allowed to write
    pub fn new(address: Address, caller: Address, value: U256, data: Vec<u8>) -> Self {
        Self { address, caller, value, data, is_static: false }
    }

    /// Valueless frame that may not write
    pub fn new_static(address: Address, caller: Address, data: Vec<u8>) -> Self {
        Self { address, caller, value: U256::zero(), data, is_static: true }
    }
}

/// Header fields of the block being built
#[derive(Clone, Debug)]
pub struct BlockContext {
    /// `NUMBER`
    pub number: u64,
    /// `TIMESTAMP`, unix seconds
    pub timestamp: u64,
    /// `GASLIMIT`
    pub gas_limit: u64,
    /// `COINBASE`
    pub coinbase: Address,
    /// `CHAINID`
    pub chain_id: u64,
    /// `BASEFEE`
    pub base_fee: U256,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            gas_limit: 30_000_000,
            coinbase: Address::ZERO,
            chain_id: 1337,
            base_fee: U256::zero(),
        }
    }
}

/// Per-transaction values
#[derive(Clone, Debug, Default)]
pub struct TxContext {
    /// Signer of the enclosing transaction
    pub origin: Address,
    /// `GASPRICE`: base fee plus the effective tip
    pub gas_price: U256,
}

/// Everything a frame runs against apart from state
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// Current frame's caller, target and value
    pub call: CallContext,
    /// Block being built or queried
    pub block: BlockContext,
    /// Enclosing transaction
    pub tx: TxContext,
}

impl Environment {
    /// Assemble from parts
    pub fn new(call: CallContext, block: BlockContext, tx: TxContext) -> Self {
        Self { call, block, tx }
    }
}

/// Committed state the interpreter reads
///
/// Writes never go through the host. They are returned in
/// [`ExecutionResult::storage_changes`](crate::ExecutionResult) for the caller to apply.
pub trait Host {
    /// Wei held by `address`
    fn balance(&self, address: &Address) -> U256;
    /// Slot value before this frame; zero when never written
    fn storage(&self, address: &Address, key: &H256) -> U256;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_frame_carries_no_value() {
        let frame = CallContext::new_static(Address::from_bytes([0xaa; 20]), Address::ZERO, vec![0x70]);
        assert!(frame.is_static);
        assert_eq!(frame.value, U256::zero());
        assert_eq!(frame.address, Address::from_bytes([0xaa; 20]));
    }

    #[test]
    fn test_default_block_matches_sim_defaults() {
        let block = BlockContext::default();
        assert_eq!((block.chain_id, block.gas_limit, block.number), (1337, 30_000_000, 0));
    }

    #[test]
    fn test_environment_parts() {
        let frame = CallContext::new(Address::ZERO, Address::from_bytes([1; 20]), U256::from(42u64), Vec::new());
        let tx = TxContext { origin: Address::from_bytes([1; 20]), gas_price: U256::from(7u64) };
        let env = Environment::new(frame, BlockContext { timestamp: 1_700_000_000, ..BlockContext::default() }, tx);
        assert_eq!(env.call.caller, env.tx.origin);
        assert_eq!(env.block.timestamp, 1_700_000_000);
        assert!(!env.call.is_static);
    }
}
