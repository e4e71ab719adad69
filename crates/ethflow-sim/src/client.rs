//! `ChainClient` over the simulated backend

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use ethflow_primitives::{units::GWEI, Address, H256, U256};
use ethflow_sdk::{CallMsg, ChainClient, FilterQuery, SdkError, Subscription};
use ethflow_types::{Header, Log, Receipt, SignedTransaction};
use parking_lot::RwLockReadGuard;
use tokio::sync::mpsc;

use crate::backend::{Chain, LogSubscriber, Shared};
use crate::error::{SimError, SimResult};
use crate::executor::execute_call;

/// Client handle for a [`SimulatedBackend`](crate::SimulatedBackend)
#[derive(Clone)]
pub struct SimulatedClient {
    shared: Arc<Shared>,
}

impl SimulatedClient {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn chain(&self) -> SimResult<RwLockReadGuard<'_, Chain>> {
        let chain = self.shared.chain.read();
        if chain.closed {
            return Err(SimError::Closed);
        }
        Ok(chain)
    }

    fn admit(&self, tx: &SignedTransaction) -> SimResult<H256> {
        let expected = self.shared.config.chain_id;
        if tx.chain_id() != expected {
            return Err(SimError::WrongChainId { expected, got: tx.chain_id() });
        }
        let sender = tx.recover_sender().map_err(|e| SimError::InvalidSender(e.to_string()))?;

        let chain = self.chain()?;
        let state = chain.state_at(None)?;
        let have = state.balance(&sender);
        let want = tx.max_cost();
        if have < want {
            return Err(SimError::InsufficientFunds { address: sender, have, want });
        }
        let hash = self.shared.pool.add(tx.clone(), sender, state.nonce(&sender))?;
        tracing::debug!(%hash, %sender, nonce = tx.nonce(), "transaction pooled");
        Ok(hash)
    }
}

impl std::fmt::Debug for SimulatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedClient").field("chain_id", &self.shared.config.chain_id).finish()
    }
}

#[async_trait]
impl ChainClient for SimulatedClient {
    async fn chain_id(&self) -> Result<u64, SdkError> {
        Ok(self.shared.config.chain_id)
    }

    async fn block_number(&self) -> Result<u64, SdkError> {
        Ok(self.chain()?.head().number)
    }

    async fn balance_at(&self, address: &Address, block: Option<u64>) -> Result<U256, SdkError> {
        Ok(self.chain()?.state_at(block)?.balance(address))
    }

    async fn nonce_at(&self, address: &Address, block: Option<u64>) -> Result<u64, SdkError> {
        Ok(self.chain()?.state_at(block)?.nonce(address))
    }

    async fn pending_nonce_at(&self, address: &Address) -> Result<u64, SdkError> {
        let chain = self.chain()?;
        let state_nonce = chain.state_at(None)?.nonce(address);
        Ok(self.shared.pool.pending_nonce(address).unwrap_or(state_nonce).max(state_nonce))
    }

    async fn code_at(&self, address: &Address, block: Option<u64>) -> Result<Bytes, SdkError> {
        Ok(self.chain()?.state_at(block)?.code(address))
    }

    async fn suggest_gas_tip_cap(&self) -> Result<U256, SdkError> {
        Ok(U256::from(GWEI))
    }

    async fn suggest_gas_price(&self) -> Result<U256, SdkError> {
        let base_fee = self.chain()?.head().base_fee_per_gas;
        Ok(base_fee + U256::from(GWEI))
    }

    async fn header_by_number(&self, number: Option<u64>) -> Result<Option<Header>, SdkError> {
        let chain = self.chain()?;
        Ok(match chain.resolve(number) {
            Ok(n) => chain.block(n).map(|b| b.header.clone()),
            Err(_) => None,
        })
    }

    async fn estimate_gas(&self, msg: &CallMsg) -> Result<u64, SdkError> {
        let chain = self.chain()?;
        let ctx = chain.pending_context(&self.shared.config);
        let outcome = execute_call(chain.state_at(None)?, msg, &ctx)?;
        Ok(outcome.gas_used)
    }

    async fn call_contract(&self, msg: &CallMsg, block: Option<u64>) -> Result<Bytes, SdkError> {
        let chain = self.chain()?;
        let number = chain.resolve(block).map_err(SdkError::from)?;
        let ctx = chain.block_context(number, self.shared.config.chain_id)?;
        let outcome = execute_call(chain.state_at(Some(number))?, msg, &ctx)?;
        Ok(outcome.output)
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<H256, SdkError> {
        self.admit(tx).map_err(|e| {
            tracing::debug!(hash = %tx.hash(), error = %e, "transaction rejected");
            SdkError::from(e)
        })
    }

    async fn transaction_by_hash(
        &self,
        hash: &H256,
    ) -> Result<Option<(SignedTransaction, bool)>, SdkError> {
        if let Some(pooled) = self.shared.pool.get(hash) {
            return Ok(Some((pooled.tx, true)));
        }
        let chain = self.chain()?;
        Ok(chain.tx_index.get(hash).and_then(|&(number, index)| {
            chain.block(number).and_then(|b| b.transactions.get(index)).map(|tx| (tx.clone(), false))
        }))
    }

    async fn transaction_receipt(&self, hash: &H256) -> Result<Option<Receipt>, SdkError> {
        let chain = self.chain()?;
        Ok(chain.tx_index.get(hash).and_then(|&(number, index)| {
            chain.block(number).and_then(|b| b.receipts.get(index)).cloned()
        }))
    }

    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<Log>, SdkError> {
        let chain = self.chain()?;
        Ok(chain.matching_logs(query).cloned().collect())
    }

    async fn subscribe_filter_logs(&self, query: &FilterQuery) -> Result<Subscription<Log>, SdkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut chain = self.shared.chain.write();
            if chain.closed {
                return Err(SimError::Closed.into());
            }
            if query.from_block.is_some() {
                for log in chain.matching_logs(query) {
                    let _ = tx.send(log.clone());
                }
            }
            let id = chain.next_subscriber;
            chain.next_subscriber += 1;
            chain.subscribers.push(LogSubscriber { id, query: query.clone(), tx });
            id
        };
        tracing::debug!(id, "log subscription registered");

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Ok(Subscription::with_guard(rx, move || {
            if let Some(shared) = shared.upgrade() {
                shared.chain.write().subscribers.retain(|sub| sub.id != id);
                tracing::debug!(id, "log subscription dropped");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenesisAccount, SimulatedBackend};
    use ethflow_sdk::{TxBuilder, Wallet};
    use ethflow_txpool::TxPoolError;

    fn transfer(wallet: &Wallet, nonce: u64, chain_id: u64) -> SignedTransaction {
        TxBuilder::new(chain_id)
            .nonce(nonce)
            .gas_limit(21_000)
            .to(Address::from_bytes([0x42; 20]))
            .value(1u64)
            .max_priority_fee_per_gas(GWEI)
            .max_fee_per_gas(10 * GWEI)
            .sign(wallet)
            .unwrap()
    }

    #[tokio::test]
    async fn test_admission_checks() {
        let wallet = Wallet::new_random();
        let poor = Wallet::new_random();
        let backend = SimulatedBackend::new([(wallet.address(), GenesisAccount::with_balance(U256::exp10(18)))]);
        let client = backend.client();

        let err = client.send_transaction(&transfer(&wallet, 0, 1)).await.unwrap_err();
        assert!(matches!(err, SdkError::Rejected(ref m) if m.contains("chain id")));

        let err = client.send_transaction(&transfer(&poor, 0, 1337)).await.unwrap_err();
        assert!(matches!(err, SdkError::Rejected(ref m) if m.contains("insufficient funds")));

        let tx = transfer(&wallet, 0, 1337);
        assert_eq!(client.send_transaction(&tx).await.unwrap(), tx.hash());
        let err = client.send_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, SdkError::TxPool(TxPoolError::AlreadyKnown(_))));
        assert_eq!(client.pending_nonce_at(&wallet.address()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_pending_then_mined() {
        let wallet = Wallet::new_random();
        let backend = SimulatedBackend::new([(wallet.address(), GenesisAccount::with_balance(U256::exp10(18)))]);
        let client = backend.client();
        let tx = transfer(&wallet, 0, 1337);
        client.send_transaction(&tx).await.unwrap();

        let (found, pending) = client.transaction_by_hash(&tx.hash()).await.unwrap().unwrap();
        assert_eq!(found, tx);
        assert!(pending);
        assert!(client.transaction_receipt(&tx.hash()).await.unwrap().is_none());

        let block_hash = backend.commit().unwrap();
        let (_, pending) = client.transaction_by_hash(&tx.hash()).await.unwrap().unwrap();
        assert!(!pending);
        let receipt = client.transaction_receipt(&tx.hash()).await.unwrap().unwrap();
        assert_eq!(receipt.block_hash, block_hash);
        assert_eq!(receipt.block_number, 1);
        assert!(receipt.is_success());
    }

    #[tokio::test]
    async fn test_unknown_block_queries() {
        let backend = SimulatedBackend::new([]);
        let client = backend.client();
        assert!(client.header_by_number(Some(5)).await.unwrap().is_none());
        let err = client.balance_at(&Address::ZERO, Some(5)).await.unwrap_err();
        assert!(matches!(err, SdkError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fee_suggestions_follow_head() {
        let backend = SimulatedBackend::new([]);
        let client = backend.client();
        assert_eq!(client.suggest_gas_tip_cap().await.unwrap(), U256::from(GWEI));
        assert_eq!(client.suggest_gas_price().await.unwrap(), U256::from(2 * GWEI));
        backend.commit().unwrap();
        assert_eq!(
            client.suggest_gas_price().await.unwrap(),
            U256::from(875_000_000u64 + GWEI)
        );
    }

    #[tokio::test]
    async fn test_subscription_guard_unregisters() {
        let backend = SimulatedBackend::new([]);
        let client = backend.client();
        let sub = client.subscribe_filter_logs(&FilterQuery::new()).await.unwrap();
        assert_eq!(client.shared.chain.read().subscribers.len(), 1);
        drop(sub);
        assert!(client.shared.chain.read().subscribers.is_empty());
    }
}
