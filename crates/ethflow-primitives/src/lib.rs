//! # ethflow-primitives
//!
//! Fixed-size byte types and amounts shared by every ethflow crate.
//! `Address` and `H256` carry RLP and `0x`-hex serde encodings; `U256`
//! is the `primitive-types` integer, which serializes as a JSON-RPC quantity.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;
pub mod units;

pub use address::Address;
pub use error::PrimitiveError;
pub use hash::H256;
pub use units::EtherDenom;

pub use primitive_types::U256;

/// Block number
pub type BlockNumber = u64;

/// Transaction nonce
pub type Nonce = u64;

/// Gas amount
pub type Gas = u64;
