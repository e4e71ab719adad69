//! # ethflow-sdk
//!
//! Client SDK for EIP-1559 chains.
//!
//! ## Features
//!
//! - **Wallet** / **KeyStore**: ephemeral keys and encrypted v3 key files
//! - **TxBuilder**: fluent construction of dynamic-fee transactions
//! - **ChainClient**: backend-agnostic chain access, with a JSON-RPC
//!   implementation over IPC or a mock transport
//! - **wait_mined** / **wait_deployed**: bounded confirmation waits
//! - **BoundContract**: calls, transactions and event subscriptions
//! - **ABI**: Solidity ABI encoding and decoding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ethflow_sdk::{ChainClient, IpcClient, TxBuilder, Wallet, wait_mined, WaitConfig};
//! use ethflow_primitives::{Address, U256};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = IpcClient::connect("/tmp/geth.ipc").await?;
//!     let wallet = Wallet::new_random();
//!
//!     let head = client.header_by_number(None).await?.ok_or("no head")?;
//!     let tip = client.suggest_gas_tip_cap().await?;
//!     let tx = TxBuilder::new(client.chain_id().await?)
//!         .nonce(client.pending_nonce_at(&wallet.address()).await?)
//!         .gas_limit(21_000)
//!         .max_priority_fee_per_gas(tip)
//!         .max_fee_per_gas(head.base_fee_per_gas * U256::from(2u64) + tip)
//!         .to(Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d")?)
//!         .value(1_000_000_000_000_000_000u64)
//!         .sign(&wallet)?;
//!
//!     let hash = client.send_transaction(&tx).await?;
//!     let receipt = wait_mined(&client, hash, &WaitConfig::default()).await?;
//!     println!("mined in block {}", receipt.block_number);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
mod client;
pub mod contract;
mod error;
#[cfg(unix)]
mod ipc;
pub mod keystore;
mod transport;
mod tx_builder;
pub mod types;
mod wait;
mod wallet;

pub use client::{ChainClient, RpcClient};
pub use contract::{deploy_contract, BoundContract, CallOpts, FilterOpts, TransactOpts, WatchOpts};
pub use error::SdkError;
#[cfg(unix)]
pub use ipc::{IpcClient, IpcConfig, IpcTransport};
pub use keystore::{Account, KeyStore, KeystoreError, ScryptParams};
pub use transport::{deserialize_response, rpc_error, MockTransport, Subscription, Transport};
pub use tx_builder::TxBuilder;
pub use types::{BlockId, CallMsg, FilterQuery};
pub use wait::{wait_deployed, wait_mined, WaitConfig};
pub use wallet::{Signer, Wallet};

// Re-export primitives for convenience
pub use ethflow_primitives::{Address, H256, U256};
pub use ethflow_types::{Block, Header, Log, Receipt, SignedTransaction};
