//! Error type shared by the primitive types

use thiserror::Error;

/// Parsing or conversion failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Input was not valid hex
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Input had the wrong byte length
    #[error("invalid {kind} length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// What was being parsed
        kind: &'static str,
        /// Required length
        expected: usize,
        /// Actual length
        got: usize,
    },

    /// Decimal amount could not be parsed
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),
}

impl From<hex::FromHexError> for PrimitiveError {
    fn from(err: hex::FromHexError) -> Self {
        PrimitiveError::InvalidHex(err.to_string())
    }
}
