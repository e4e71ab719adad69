//! # ethflow-e2e
//!
//! Contract bindings and scenario harness for the ethflow workflow.
//!
//! Every scenario is an async function over a [`ScenarioChain`], so one body
//! runs against the in-process [`SimulatedBackend`](ethflow_sim::SimulatedBackend)
//! and against a dev node reached over IPC.
//!
//! ## Usage
//!
//! ```ignore
//! cargo test -p ethflow-e2e
//! # dev node scenarios
//! ETHFLOW_IPC=./build/dev-chain/geth.ipc cargo test -p ethflow-e2e -- --ignored
//! ```

pub mod bindings;
mod config;
pub mod contracts;
mod harness;
pub mod scenarios;

pub use config::DevNodeConfig;
pub use harness::{
    assert_transfer_accounting, balances, fund, funded_sim, transfer_with_suggested_fees, Balances,
    DevNodeChain, ReceiptAssertions, ScenarioChain, SimChain, FUNDER_BALANCE, TRANSFER_GAS,
};

use ethflow_evm::AsmError;
use ethflow_primitives::H256;
use ethflow_sdk::SdkError;
use ethflow_sim::SimError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Scenario result
pub type E2EResult<T> = Result<T, E2EError>;

/// Scenario errors
#[derive(Debug, thiserror::Error)]
pub enum E2EError {
    /// Setup failed
    #[error("setup failed: {0}")]
    Setup(String),

    /// Assertion failed
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Settling did not produce a receipt
    #[error("transaction {0} not mined")]
    NotMined(H256),

    /// Client error
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// Simulated backend error
    #[error(transparent)]
    Sim(#[from] SimError),

    /// Contract assembly error
    #[error("assembly failed: {0}")]
    Asm(#[from] AsmError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Config file unreadable
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file malformed
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`)
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_test_writer()).with(filter).try_init();
}

/// Ensure `cond`, failing with `message` otherwise
pub(crate) fn ensure(cond: bool, message: impl FnOnce() -> String) -> E2EResult<()> {
    if cond {
        Ok(())
    } else {
        Err(E2EError::Assertion(message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, || unreachable!()).is_ok());
        let err = ensure(false, || "balance mismatch".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: balance mismatch");
    }
}
