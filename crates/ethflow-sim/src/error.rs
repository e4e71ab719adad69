//! Simulated backend errors

use ethflow_primitives::{Address, U256};
use ethflow_sdk::SdkError;
use ethflow_txpool::TxPoolError;
use thiserror::Error;

/// Simulated backend errors
#[derive(Debug, Error)]
pub enum SimError {
    /// Block beyond the head
    #[error("unknown block {0}")]
    UnknownBlock(u64),

    /// Transaction signed for another chain
    #[error("invalid chain id: expected {expected}, got {got}")]
    WrongChainId {
        /// Backend chain id
        expected: u64,
        /// Transaction chain id
        got: u64,
    },

    /// Signature does not recover
    #[error("invalid sender: {0}")]
    InvalidSender(String),

    /// Balance below `gas * fee_cap + value`
    #[error("insufficient funds for gas * price + value: address {address} have {have} want {want}")]
    InsufficientFunds {
        /// Sender
        address: Address,
        /// Balance
        have: U256,
        /// Required
        want: U256,
    },

    /// Fee cap below the block base fee
    #[error("max fee per gas less than block base fee: fee cap {fee_cap}, base fee {base_fee}")]
    FeeCapTooLow {
        /// Transaction fee cap
        fee_cap: U256,
        /// Block base fee
        base_fee: U256,
    },

    /// Nonce does not match the account
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// Account nonce
        expected: u64,
        /// Transaction nonce
        got: u64,
    },

    /// Gas limit below intrinsic gas
    #[error("intrinsic gas too low: have {have}, want {want}")]
    IntrinsicGas {
        /// Gas limit
        have: u64,
        /// Intrinsic gas
        want: u64,
    },

    /// Pool admission failure
    #[error(transparent)]
    Pool(#[from] TxPoolError),

    /// Call reverted
    #[error("execution reverted")]
    Reverted(Vec<u8>),

    /// Call halted
    #[error("execution failed: {0}")]
    Halted(String),

    /// Backend was closed
    #[error("simulated backend closed")]
    Closed,
}

/// Result alias
pub type SimResult<T> = Result<T, SimError>;

impl From<SimError> for SdkError {
    fn from(e: SimError) -> Self {
        match e {
            SimError::UnknownBlock(n) => SdkError::NotFound(format!("block {n}")),
            SimError::Pool(e) => SdkError::TxPool(e),
            SimError::Reverted(data) => SdkError::Reverted(data),
            SimError::Halted(reason) => SdkError::Execution(reason),
            SimError::Closed => SdkError::Transport(SimError::Closed.to_string()),
            other => SdkError::Rejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_mapping() {
        assert!(matches!(SdkError::from(SimError::UnknownBlock(3)), SdkError::NotFound(_)));
        assert!(matches!(
            SdkError::from(SimError::Pool(TxPoolError::ReplacementUnderpriced)),
            SdkError::TxPool(TxPoolError::ReplacementUnderpriced)
        ));
        assert!(matches!(SdkError::from(SimError::Closed), SdkError::Transport(_)));
        let err = SdkError::from(SimError::WrongChainId { expected: 1337, got: 1 });
        assert!(matches!(err, SdkError::Rejected(ref m) if m.contains("chain id")));
    }
}
