//! SDK error types

use ethflow_primitives::Address;
use ethflow_txpool::TxPoolError;
use thiserror::Error;

use crate::keystore::KeystoreError;

/// SDK error type
#[derive(Debug, Error)]
pub enum SdkError {
    /// Transport/connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object from the node
    #[error("RPC error: {code} - {message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Pool admission refused by a local backend
    #[error("transaction rejected: {0}")]
    TxPool(#[from] TxPoolError),

    /// Other backend rejection (funds, sender, chain id)
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Call or estimation reverted
    #[error("execution reverted")]
    Reverted(Vec<u8>),

    /// Call or estimation halted
    #[error("execution failed: {0}")]
    Execution(String),

    /// Deadline elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Requested block or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Contract creation produced no code
    #[error("no contract code at {0}")]
    NoCode(Address),

    /// Operation needs a contract-creation transaction
    #[error("transaction is not a contract creation")]
    NotContractCreation,

    /// Keystore failure
    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    /// Invalid address format
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid private key
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Malformed transaction
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// ABI encoding error
    #[error("ABI encoding error: {0}")]
    AbiEncode(String),

    /// ABI decoding error
    #[error("ABI decoding error: {0}")]
    AbiDecode(String),

    /// Invalid hex string
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid chain ID
    #[error("Invalid chain ID: {0}")]
    InvalidChainId(String),

    /// Tip cap larger than fee cap
    #[error("max priority fee per gas higher than max fee per gas")]
    TipAboveFeeCap,
}

impl SdkError {
    /// Whether a wait or request ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, SdkError::Timeout(_))
    }
}

impl From<hex::FromHexError> for SdkError {
    fn from(e: hex::FromHexError) -> Self {
        SdkError::InvalidHex(e.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::Serialization(e.to_string())
    }
}

impl From<ethflow_crypto::CryptoError> for SdkError {
    fn from(e: ethflow_crypto::CryptoError) -> Self {
        SdkError::SigningFailed(e.to_string())
    }
}

impl From<ethflow_primitives::PrimitiveError> for SdkError {
    fn from(e: ethflow_primitives::PrimitiveError) -> Self {
        SdkError::InvalidHex(e.to_string())
    }
}

impl From<ethflow_types::TxError> for SdkError {
    fn from(e: ethflow_types::TxError) -> Self {
        SdkError::InvalidTransaction(e.to_string())
    }
}
