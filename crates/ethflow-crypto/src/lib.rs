//! # ethflow-crypto
//!
//! Cryptographic primitives used to sign and verify transactions.
//!
//! - Keccak-256 hashing
//! - secp256k1 ECDSA signing with low-s normalization
//! - Public key recovery and address derivation
//! - EIP-55 checksum addresses

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;

pub use error::CryptoError;
pub use hash::{keccak256, to_checksum_address};
pub use signature::{
    public_key_to_address, recover_address, recover_public_key, sign, verify, PrivateKey,
    PublicKey, Signature,
};
