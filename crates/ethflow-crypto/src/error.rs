//! Errors from hashing, signing and recovery

use thiserror::Error;

/// secp256k1 failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key refused to sign the digest
    #[error("secp256k1 signing failed: {0}")]
    Signing(String),

    /// `r` or `s` is zero or not below the curve order
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// `s` above half the curve order (EIP-2)
    #[error("signature s value is not canonical")]
    HighS,

    /// `v` is none of 0, 1, 27 or 28
    #[error("unsupported recovery id {0}")]
    RecoveryId(u8),

    /// No public key recovers from the signature and digest
    #[error("cannot recover signer: {0}")]
    Unrecoverable(String),
}
