//! Scenario harness
//!
//! A [`ScenarioChain`] hides how a transaction gets from the pool into a
//! block: the simulated backend seals on demand, a dev node is waited on.

use std::sync::Arc;

use async_trait::async_trait;
use ethflow_primitives::{units::ETHER, Address, U256};
use ethflow_sdk::{wait_mined, ChainClient, Signer, TxBuilder, WaitConfig, Wallet};
#[cfg(unix)]
use ethflow_sdk::{KeyStore, RpcClient, ScryptParams, SdkError};
use ethflow_sim::{GenesisAccount, SimulatedBackend};
use ethflow_types::{Receipt, SignedTransaction, TxStatus};

use crate::{ensure, E2EError, E2EResult};
#[cfg(unix)]
use crate::DevNodeConfig;

/// Gas for a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Genesis balance of the account that funds scenario accounts (1000 ETH)
pub const FUNDER_BALANCE: u64 = 1000;

/// A chain a scenario can drive
#[async_trait]
pub trait ScenarioChain: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Client for queries and submissions
    fn client(&self) -> Arc<dyn ChainClient>;

    /// Account with enough funds to seed scenario accounts
    fn funder(&self) -> Arc<dyn Signer>;

    /// Get `tx` included and return its receipt
    async fn settle(&self, tx: &SignedTransaction) -> E2EResult<Receipt>;

    /// Give pending transactions one chance to be included
    async fn advance(&self) -> E2EResult<()>;
}

/// [`ScenarioChain`] over a [`SimulatedBackend`]; settling seals a block
pub struct SimChain {
    backend: SimulatedBackend,
    funder: Arc<Wallet>,
}

impl SimChain {
    /// Chain with `funder` already credited in `backend`'s genesis
    pub fn new(backend: SimulatedBackend, funder: Wallet) -> Self {
        Self { backend, funder: Arc::new(funder) }
    }

    /// Underlying backend
    pub fn backend(&self) -> &SimulatedBackend {
        &self.backend
    }
}

#[async_trait]
impl ScenarioChain for SimChain {
    fn name(&self) -> &str {
        "simulated"
    }

    fn client(&self) -> Arc<dyn ChainClient> {
        Arc::new(self.backend.client())
    }

    fn funder(&self) -> Arc<dyn Signer> {
        self.funder.clone()
    }

    async fn settle(&self, tx: &SignedTransaction) -> E2EResult<Receipt> {
        let hash = tx.hash();
        if let Some(receipt) = self.backend.client().transaction_receipt(&hash).await? {
            return Ok(receipt);
        }
        self.backend.commit()?;
        self.backend
            .client()
            .transaction_receipt(&hash)
            .await?
            .ok_or(E2EError::NotMined(hash))
    }

    async fn advance(&self) -> E2EResult<()> {
        self.backend.commit()?;
        Ok(())
    }
}

/// [`ScenarioChain`] over a running dev node; settling polls for the receipt
pub struct DevNodeChain {
    client: Arc<dyn ChainClient>,
    funder: Arc<Wallet>,
    wait: WaitConfig,
}

impl DevNodeChain {
    /// Chain over an existing client
    pub fn new(client: Arc<dyn ChainClient>, funder: Wallet, wait: WaitConfig) -> Self {
        Self { client, funder: Arc::new(funder), wait }
    }

    /// Connect over IPC and unlock the first keystore account as funder
    #[cfg(unix)]
    pub async fn connect(config: &DevNodeConfig) -> E2EResult<Self> {
        let client = RpcClient::connect(&config.ipc_path).await?;
        let keystore = KeyStore::open(&config.keystore_dir, ScryptParams::standard()).map_err(SdkError::from)?;
        let account = keystore
            .accounts()
            .map_err(SdkError::from)?
            .into_iter()
            .next()
            .ok_or_else(|| E2EError::Setup(format!("no accounts in {}", config.keystore_dir.display())))?;
        let funder = keystore.unlock(&account.address, &config.passphrase).map_err(SdkError::from)?;
        tracing::info!(ipc = %config.ipc_path.display(), funder = %account.address, "connected to dev node");
        Ok(Self::new(Arc::new(client), funder, config.wait_config()))
    }
}

#[async_trait]
impl ScenarioChain for DevNodeChain {
    fn name(&self) -> &str {
        "dev-node"
    }

    fn client(&self) -> Arc<dyn ChainClient> {
        Arc::clone(&self.client)
    }

    fn funder(&self) -> Arc<dyn Signer> {
        self.funder.clone()
    }

    async fn settle(&self, tx: &SignedTransaction) -> E2EResult<Receipt> {
        Ok(wait_mined(self.client.as_ref(), tx.hash(), &self.wait).await?)
    }

    /// Wait until the node seals a block past the current head
    ///
    /// A zero-value funder self-transfer is sent so nodes that only seal on
    /// demand still produce the block.
    async fn advance(&self) -> E2EResult<()> {
        let start = self.client.block_number().await?;
        let funder = self.funder.address();
        let nudge = transfer_with_suggested_fees(self.client.as_ref(), self.funder.as_ref(), funder, U256::zero()).await?;
        let receipt = wait_mined(self.client.as_ref(), nudge.hash(), &self.wait).await?;
        ensure(receipt.block_number > start, || {
            format!("nudge mined in block {}, head was already {start}", receipt.block_number)
        })?;
        tracing::debug!(from = start, to = receipt.block_number, "dev node advanced");
        Ok(())
    }
}

/// Simulated chain with one fresh wallet per balance, plus a funder
pub fn funded_sim(balances: &[U256]) -> (SimChain, Vec<Arc<Wallet>>) {
    let funder = Wallet::new_random();
    let wallets: Vec<Arc<Wallet>> = balances.iter().map(|_| Arc::new(Wallet::new_random())).collect();

    let funds = U256::from(FUNDER_BALANCE) * U256::from(ETHER);
    let alloc = std::iter::once((funder.address(), GenesisAccount::with_balance(funds))).chain(
        wallets.iter().zip(balances).map(|(w, b)| (w.address(), GenesisAccount::with_balance(*b))),
    );
    let chain = SimChain::new(SimulatedBackend::new(alloc), funder);
    (chain, wallets)
}

/// Transfer priced like a wallet would: suggested tip, suggested gas price as fee cap
pub async fn transfer_with_suggested_fees(
    client: &dyn ChainClient,
    signer: &dyn Signer,
    to: Address,
    value: U256,
) -> E2EResult<SignedTransaction> {
    let tip = client.suggest_gas_tip_cap().await?;
    let fee_cap = client.suggest_gas_price().await?;
    let tx = TxBuilder::new(client.chain_id().await?)
        .nonce(client.pending_nonce_at(&signer.address()).await?)
        .gas_limit(TRANSFER_GAS)
        .max_priority_fee_per_gas(tip)
        .max_fee_per_gas(fee_cap)
        .to(to)
        .value(value)
        .sign(signer)?;
    client.send_transaction(&tx).await?;
    tracing::debug!(hash = %tx.hash(), %to, %value, "transfer sent");
    Ok(tx)
}

/// Credit a fresh account from the chain's funder
pub async fn fund(chain: &dyn ScenarioChain, to: Address, value: U256) -> E2EResult<Receipt> {
    let funder = chain.funder();
    let tx = transfer_with_suggested_fees(chain.client().as_ref(), funder.as_ref(), to, value).await?;
    let receipt = chain.settle(&tx).await?;
    receipt.assert_success()?;
    Ok(receipt)
}

/// Sender and receiver balances at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    /// Paying account
    pub sender: U256,
    /// Credited account
    pub receiver: U256,
}

/// Latest balances of `sender` and `receiver`
pub async fn balances(client: &dyn ChainClient, sender: Address, receiver: Address) -> E2EResult<Balances> {
    Ok(Balances {
        sender: client.balance_at(&sender, None).await?,
        receiver: client.balance_at(&receiver, None).await?,
    })
}

/// Check that exactly `value` plus the fee left the sender and `value` reached the receiver
pub fn assert_transfer_accounting(
    before: Balances,
    after: Balances,
    value: U256,
    receipt: &Receipt,
) -> E2EResult<()> {
    let spent = value + receipt.fee();
    ensure(before.sender >= spent && after.sender == before.sender - spent, || {
        format!(
            "sender balance {} after transfer, expected {} - {} - {}",
            after.sender,
            before.sender,
            value,
            receipt.fee()
        )
    })?;
    ensure(after.receiver == before.receiver + value, || {
        format!("receiver balance {}, expected {} + {}", after.receiver, before.receiver, value)
    })
}

/// Checks on a mined receipt
pub trait ReceiptAssertions {
    /// Execution succeeded
    fn assert_success(&self) -> E2EResult<&Self>;

    /// Execution failed
    fn assert_failure(&self) -> E2EResult<&Self>;

    /// Exact gas used
    fn assert_gas_used(&self, expected: u64) -> E2EResult<&Self>;

    /// Created contract address
    fn assert_contract_created(&self) -> E2EResult<Address>;
}

impl ReceiptAssertions for Receipt {
    fn assert_success(&self) -> E2EResult<&Self> {
        ensure(self.status == TxStatus::Success, || {
            format!("transaction {} failed", self.transaction_hash)
        })?;
        Ok(self)
    }

    fn assert_failure(&self) -> E2EResult<&Self> {
        ensure(self.status == TxStatus::Failure, || {
            format!("transaction {} was expected to fail", self.transaction_hash)
        })?;
        Ok(self)
    }

    fn assert_gas_used(&self, expected: u64) -> E2EResult<&Self> {
        ensure(self.gas_used == expected, || {
            format!("gas used mismatch: expected {}, got {}", expected, self.gas_used)
        })?;
        Ok(self)
    }

    fn assert_contract_created(&self) -> E2EResult<Address> {
        self.contract_address
            .ok_or_else(|| E2EError::Assertion(format!("transaction {} created no contract", self.transaction_hash)))
    }
}
