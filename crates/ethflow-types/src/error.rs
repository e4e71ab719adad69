//! Transaction codec errors

use ethflow_crypto::CryptoError;
use thiserror::Error;

/// Decoding or signature failure for a transaction envelope
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Empty input
    #[error("empty transaction payload")]
    Empty,

    /// Unsupported EIP-2718 type byte
    #[error("unsupported transaction type 0x{0:02x}")]
    UnsupportedType(u8),

    /// Malformed RLP body
    #[error("rlp decode error: {0}")]
    Rlp(String),

    /// Extra bytes after the RLP list
    #[error("trailing bytes after transaction body")]
    TrailingBytes,

    /// Signature could not be checked
    #[error("signature error: {0}")]
    Signature(#[from] CryptoError),
}

impl From<rlp::DecoderError> for TxError {
    fn from(err: rlp::DecoderError) -> Self {
        TxError::Rlp(err.to_string())
    }
}
