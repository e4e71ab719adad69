//! Typed bindings for the artifacts in [`contracts`](crate::contracts)

mod demo;
mod payments;

pub use demo::{Demo, PaidEvent};
pub use payments::{Payment, Payments};

use ethflow_evm::AsmError;
use ethflow_primitives::Address;
use ethflow_sdk::{deploy_contract, ChainClient, TransactOpts};
use ethflow_types::SignedTransaction;

use crate::E2EResult;

/// Send the creation of an assembled artifact; nothing is sent if assembly failed
async fn deploy_artifact(
    opts: &TransactOpts,
    client: &dyn ChainClient,
    artifact: Result<Vec<u8>, AsmError>,
) -> E2EResult<(Address, SignedTransaction)> {
    let bytecode = artifact?;
    Ok(deploy_contract(opts, client, &bytecode, &[]).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{funded_sim, E2EError, ScenarioChain};

    #[tokio::test]
    async fn test_assembly_failure_is_reported_as_asm() {
        let (chain, _) = funded_sim(&[]);
        let opts = TransactOpts::new(chain.funder());
        let broken = Err(AsmError::UnknownLabel("dispatch".into()));

        let err = deploy_artifact(&opts, chain.client().as_ref(), broken).await.unwrap_err();
        assert!(matches!(err, E2EError::Asm(AsmError::UnknownLabel(ref l)) if l == "dispatch"), "{err:?}");
        assert_eq!(chain.backend().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_artifact_deploys() {
        let (chain, _) = funded_sim(&[]);
        let opts = TransactOpts::new(chain.funder());
        let (address, tx) = deploy_artifact(&opts, chain.client().as_ref(), crate::contracts::demo_bytecode())
            .await
            .unwrap();
        assert!(tx.is_contract_creation());
        let receipt = chain.settle(&tx).await.unwrap();
        assert_eq!(receipt.contract_address, Some(address));
    }
}
