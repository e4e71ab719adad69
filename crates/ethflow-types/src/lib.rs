//! # ethflow-types
//!
//! Chain data types.
//!
//! - [`DynamicFeeTx`]: the unsigned EIP-1559 request
//! - [`SignedTransaction`]: the immutable, hashed `0x02` envelope
//! - [`Receipt`] and [`Log`]: inclusion records
//! - [`Block`]: header plus included transactions and receipts

#![warn(missing_docs)]
#![warn(clippy::all)]

mod block;
mod error;
mod receipt;
mod transaction;

pub use block::{next_base_fee, Block, Header, BASE_FEE_CHANGE_DENOMINATOR, ELASTICITY_MULTIPLIER};
pub use error::TxError;
pub use receipt::{Log, Receipt, TxStatus};
pub use transaction::{
    contract_address, intrinsic_gas, AccessListItem, DynamicFeeTx, SignedTransaction, TxType,
};
