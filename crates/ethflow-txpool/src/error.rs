//! Admission failures

use ethflow_primitives::H256;
use thiserror::Error;

/// Reasons a transaction is refused admission
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxPoolError {
    /// Nonce below the sender's state nonce
    #[error("nonce too low: expected at least {expected}, got {got}")]
    NonceTooLow {
        /// State nonce
        expected: u64,
        /// Transaction nonce
        got: u64,
    },

    /// Nonce too far ahead of the state nonce
    #[error("nonce gap too large: state nonce {current}, tx nonce {tx_nonce}")]
    NonceGapTooLarge {
        /// State nonce
        current: u64,
        /// Transaction nonce
        tx_nonce: u64,
    },

    /// Same hash already pooled
    #[error("already known: {0}")]
    AlreadyKnown(H256),

    /// Same-nonce replacement without a 10% bump on tip and fee cap
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,

    /// max_priority_fee_per_gas > max_fee_per_gas
    #[error("max priority fee per gas higher than max fee per gas")]
    TipAboveFeeCap,

    /// Gas limit above the block gas limit
    #[error("exceeds block gas limit: {gas_limit} > {block_limit}")]
    GasLimitExceeded {
        /// Transaction gas limit
        gas_limit: u64,
        /// Block gas limit
        block_limit: u64,
    },

    /// Gas limit below intrinsic gas
    #[error("intrinsic gas too low: have {gas_limit}, want {required}")]
    IntrinsicGasTooLow {
        /// Transaction gas limit
        gas_limit: u64,
        /// Intrinsic cost
        required: u64,
    },

    /// Pool or per-account capacity reached
    #[error("txpool is full (limit {0})")]
    PoolFull(usize),
}

/// Pool result
pub type TxPoolResult<T> = Result<T, TxPoolError>;
