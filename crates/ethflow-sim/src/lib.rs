//! # ethflow-sim
//!
//! In-process chain for tests. Transactions sent through a
//! [`SimulatedClient`] wait in a pool until [`SimulatedBackend::commit`]
//! seals them into a block; every block keeps a snapshot of the state, so
//! historical queries see the chain as it was.
//!
//! ```rust
//! use ethflow_sim::{GenesisAccount, SimulatedBackend};
//! use ethflow_primitives::{Address, U256};
//!
//! let funded = Address::from_bytes([0x11; 20]);
//! let backend = SimulatedBackend::new([(funded, GenesisAccount::with_balance(U256::exp10(19)))]);
//! let client = backend.client();
//! backend.commit().unwrap();
//! # drop(client);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backend;
mod client;
mod error;
mod executor;
mod state;

pub use backend::{SimConfig, SimulatedBackend};
pub use client::SimulatedClient;
pub use error::{SimError, SimResult};
pub use state::GenesisAccount;
