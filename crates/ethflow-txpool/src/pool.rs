//! Transaction pool implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use ethflow_primitives::{Address, H256, U256};
use ethflow_types::{intrinsic_gas, SignedTransaction};
use parking_lot::RwLock;

use crate::error::{TxPoolError, TxPoolResult};

/// Minimum fee bump percentage for a same-nonce replacement
const PRICE_BUMP_PERCENT: u64 = 10;

/// Maximum nonce gap allowed for queued transactions
const MAX_NONCE_GAP: u64 = 64;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of transactions across all senders
    pub max_size: usize,
    /// Maximum transactions per sender
    pub max_per_account: usize,
    /// Block gas limit; larger transactions are refused
    pub block_gas_limit: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 4096, max_per_account: 64, block_gas_limit: 30_000_000 }
    }
}

/// Transaction plus the sender it was admitted under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PooledTransaction {
    /// The signed transaction
    pub tx: SignedTransaction,
    /// Recovered sender
    pub sender: Address,
    /// Envelope hash
    pub hash: H256,
}

impl PooledTransaction {
    /// Nonce
    pub fn nonce(&self) -> u64 {
        self.tx.nonce()
    }

    /// Gas limit
    pub fn gas_limit(&self) -> u64 {
        self.tx.gas_limit()
    }

    /// Tip cap
    pub fn tip_cap(&self) -> U256 {
        self.tx.max_priority_fee_per_gas()
    }

    /// Fee cap
    pub fn fee_cap(&self) -> U256 {
        self.tx.max_fee_per_gas()
    }

    fn is_outbid_by(&self, other: &SignedTransaction) -> bool {
        bumped(self.tip_cap()) <= other.max_priority_fee_per_gas()
            && bumped(self.fee_cap()) <= other.max_fee_per_gas()
    }
}

fn bumped(price: U256) -> U256 {
    price.saturating_add(price.saturating_mul(U256::from(PRICE_BUMP_PERCENT)) / 100)
}

#[derive(Default)]
struct AccountTxs {
    /// Contiguous run starting at `state_nonce`
    pending: BTreeMap<u64, PooledTransaction>,
    /// After a nonce gap
    queued: BTreeMap<u64, PooledTransaction>,
    state_nonce: u64,
}

impl AccountTxs {
    fn next_nonce(&self) -> u64 {
        self.state_nonce + self.pending.len() as u64
    }

    fn len(&self) -> usize {
        self.pending.len() + self.queued.len()
    }
}

/// Transaction pool
pub struct TxPool {
    config: PoolConfig,
    by_hash: DashMap<H256, PooledTransaction>,
    by_sender: DashMap<Address, RwLock<AccountTxs>>,
    pending_count: AtomicUsize,
    queued_count: AtomicUsize,
}

impl TxPool {
    /// Create a pool
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            by_hash: DashMap::new(),
            by_sender: DashMap::new(),
            pending_count: AtomicUsize::new(0),
            queued_count: AtomicUsize::new(0),
        }
    }

    /// Pool with default limits
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default())
    }

    /// Admit a transaction from `sender`, whose current state nonce is `state_nonce`
    pub fn add(
        &self,
        tx: SignedTransaction,
        sender: Address,
        state_nonce: u64,
    ) -> TxPoolResult<H256> {
        let hash = tx.hash();
        let result = self.try_add(tx, sender, state_nonce);
        match &result {
            Ok(_) => tracing::debug!(%hash, %sender, "transaction admitted"),
            Err(error) => tracing::debug!(%hash, %sender, %error, "transaction rejected"),
        }
        result.map(|_| hash)
    }

    fn try_add(&self, tx: SignedTransaction, sender: Address, state_nonce: u64) -> TxPoolResult<()> {
        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(TxPoolError::AlreadyKnown(hash));
        }

        if tx.max_priority_fee_per_gas() > tx.max_fee_per_gas() {
            return Err(TxPoolError::TipAboveFeeCap);
        }

        let gas_limit = tx.gas_limit();
        if gas_limit > self.config.block_gas_limit {
            return Err(TxPoolError::GasLimitExceeded {
                gas_limit,
                block_limit: self.config.block_gas_limit,
            });
        }
        let required = intrinsic_gas(tx.data(), tx.is_contract_creation());
        if gas_limit < required {
            return Err(TxPoolError::IntrinsicGasTooLow { gas_limit, required });
        }

        let nonce = tx.nonce();
        if nonce < state_nonce {
            return Err(TxPoolError::NonceTooLow { expected: state_nonce, got: nonce });
        }
        if nonce > state_nonce + MAX_NONCE_GAP {
            return Err(TxPoolError::NonceGapTooLarge { current: state_nonce, tx_nonce: nonce });
        }

        let entry = self
            .by_sender
            .entry(sender)
            .or_insert_with(|| RwLock::new(AccountTxs::default()));
        let mut account = entry.write();
        if state_nonce > account.state_nonce {
            self.advance(&mut account, state_nonce);
        }

        let replaced = match account.pending.get(&nonce).or_else(|| account.queued.get(&nonce)) {
            Some(existing) if !existing.is_outbid_by(&tx) => {
                return Err(TxPoolError::ReplacementUnderpriced);
            }
            Some(existing) => Some(existing.hash),
            None => None,
        };

        if replaced.is_none() {
            if self.len() >= self.config.max_size {
                return Err(TxPoolError::PoolFull(self.config.max_size));
            }
            if account.len() >= self.config.max_per_account {
                return Err(TxPoolError::PoolFull(self.config.max_per_account));
            }
        }

        let pooled = PooledTransaction { tx, sender, hash };
        self.by_hash.insert(hash, pooled.clone());

        if let Some(old) = replaced {
            self.by_hash.remove(&old);
            if let Some(slot) = account.pending.get_mut(&nonce) {
                *slot = pooled;
            } else {
                account.queued.insert(nonce, pooled);
            }
            return Ok(());
        }

        if nonce == account.next_nonce() {
            account.pending.insert(nonce, pooled);
            self.pending_count.fetch_add(1, Ordering::SeqCst);
            self.promote_queued(&mut account);
        } else {
            account.queued.insert(nonce, pooled);
            self.queued_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Move queued transactions into pending once the gap before them closes
    fn promote_queued(&self, account: &mut AccountTxs) {
        let mut next = account.next_nonce();
        while let Some(tx) = account.queued.remove(&next) {
            account.pending.insert(next, tx);
            self.queued_count.fetch_sub(1, Ordering::SeqCst);
            self.pending_count.fetch_add(1, Ordering::SeqCst);
            next += 1;
        }
    }

    /// Drop everything below `nonce` and rebuild the pending run from it
    fn advance(&self, account: &mut AccountTxs, nonce: u64) {
        account.state_nonce = nonce;

        let stale: Vec<u64> = account.pending.range(..nonce).map(|(n, _)| *n).collect();
        for n in stale {
            if let Some(tx) = account.pending.remove(&n) {
                self.by_hash.remove(&tx.hash);
                self.pending_count.fetch_sub(1, Ordering::SeqCst);
            }
        }
        let stale: Vec<u64> = account.queued.range(..nonce).map(|(n, _)| *n).collect();
        for n in stale {
            if let Some(tx) = account.queued.remove(&n) {
                self.by_hash.remove(&tx.hash);
                self.queued_count.fetch_sub(1, Ordering::SeqCst);
            }
        }

        // After removals pending may no longer start at nonce
        if account.pending.keys().next().is_some_and(|first| *first != nonce) {
            let demoted = std::mem::take(&mut account.pending);
            let count = demoted.len();
            account.queued.extend(demoted);
            self.pending_count.fetch_sub(count, Ordering::SeqCst);
            self.queued_count.fetch_add(count, Ordering::SeqCst);
        }
        self.promote_queued(account);
    }

    /// Pending transactions, grouped by sender and ordered by nonce within each
    pub fn pending_by_sender(&self) -> BTreeMap<Address, Vec<PooledTransaction>> {
        let mut out = BTreeMap::new();
        for entry in self.by_sender.iter() {
            let account = entry.value().read();
            if !account.pending.is_empty() {
                out.insert(*entry.key(), account.pending.values().cloned().collect());
            }
        }
        out
    }

    /// All pending transactions, per sender by nonce
    pub fn pending(&self) -> Vec<PooledTransaction> {
        self.pending_by_sender().into_values().flatten().collect()
    }

    /// Next nonce for `sender` counting its pending run, if the pool knows it
    pub fn pending_nonce(&self, sender: &Address) -> Option<u64> {
        self.by_sender.get(sender).map(|entry| entry.read().next_nonce())
    }

    /// Transaction by hash
    pub fn get(&self, hash: &H256) -> Option<PooledTransaction> {
        self.by_hash.get(hash).map(|r| r.clone())
    }

    /// Whether a hash is pooled
    pub fn contains(&self, hash: &H256) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Remove transactions that made it into a block
    pub fn remove_included(&self, hashes: &[H256]) {
        for hash in hashes {
            let Some((_, pooled)) = self.by_hash.remove(hash) else {
                continue;
            };
            if let Some(entry) = self.by_sender.get(&pooled.sender) {
                let mut account = entry.write();
                if account.pending.remove(&pooled.nonce()).is_some() {
                    self.pending_count.fetch_sub(1, Ordering::SeqCst);
                } else if account.queued.remove(&pooled.nonce()).is_some() {
                    self.queued_count.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
    }

    /// Apply post-block state nonces: stale transactions are dropped and
    /// queued ones promoted
    pub fn reset(&self, state_nonces: &HashMap<Address, u64>) {
        for (sender, nonce) in state_nonces {
            if let Some(entry) = self.by_sender.get(sender) {
                let mut account = entry.write();
                self.advance(&mut account, *nonce);
            }
        }
        self.by_sender.retain(|_, account| account.read().len() > 0);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.by_hash.clear();
        self.by_sender.clear();
        self.pending_count.store(0, Ordering::SeqCst);
        self.queued_count.store(0, Ordering::SeqCst);
    }

    /// Total transactions
    pub fn len(&self) -> usize {
        self.pending_len() + self.queued_len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending count
    pub fn pending_len(&self) -> usize {
        self.pending_count.load(Ordering::SeqCst)
    }

    /// Queued count
    pub fn queued_len(&self) -> usize {
        self.queued_count.load(Ordering::SeqCst)
    }
}
