//! # ethflow-txpool
//!
//! Nonce-ordered pool of signed EIP-1559 transactions waiting for a block.
//!
//! Each sender has a `pending` run that starts at its state nonce and has no
//! gaps, and a `queued` set of transactions stuck behind a missing nonce.
//! Filling the gap promotes the queued ones. A transaction with an
//! already-pooled nonce replaces the old one only when its tip and its fee cap
//! are both at least 10% higher.
//!
//! ```text
//! sender A  state nonce 4   pending [4, 5, 6]   queued [9]
//! sender B  state nonce 0   pending []          queued [2, 3]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod pool;

pub use error::{TxPoolError, TxPoolResult};
pub use pool::{PoolConfig, PooledTransaction, TxPool};
