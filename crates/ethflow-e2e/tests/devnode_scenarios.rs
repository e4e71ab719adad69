//! Scenarios against a local dev node
//!
//! Needs a node listening on the configured IPC socket with a funded,
//! unlockable first keystore account:
//!
//! ```text
//! ETHFLOW_IPC=./build/dev-chain/geth.ipc cargo test -p ethflow-e2e --test devnode_scenarios -- --ignored
//! ```

#![cfg(unix)]

use ethflow_e2e::{init_tracing, scenarios, DevNodeChain, DevNodeConfig};

async fn chain() -> anyhow::Result<DevNodeChain> {
    init_tracing();
    let config = DevNodeConfig::load_default()?;
    Ok(DevNodeChain::connect(&config).await?)
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn transfer() -> anyhow::Result<()> {
    scenarios::transfer(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn same_nonce_replay() -> anyhow::Result<()> {
    scenarios::same_nonce_replay(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn replacement() -> anyhow::Result<()> {
    scenarios::replacement(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn fee_cap_below_base_fee() -> anyhow::Result<()> {
    scenarios::fee_cap_below_base_fee(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn deploy_and_pay() -> anyhow::Result<()> {
    scenarios::deploy_and_pay(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn deploy_receive_watch() -> anyhow::Result<()> {
    scenarios::deploy_receive_watch(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn historical_call() -> anyhow::Result<()> {
    scenarios::historical_call(&chain().await?).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running dev node"]
async fn keystore_signing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    scenarios::keystore_signing(&chain().await?, dir.path()).await?;
    Ok(())
}
