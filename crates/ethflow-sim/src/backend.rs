//! Simulated chain: genesis, block production and per-block snapshots

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ethflow_evm::BlockContext;
use ethflow_primitives::{units::GWEI, Address, H256, U256};
use ethflow_sdk::FilterQuery;
use ethflow_txpool::{PoolConfig, PooledTransaction, TxPool};
use ethflow_types::{next_base_fee, Block, Header, Log, Receipt};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::client::SimulatedClient;
use crate::error::{SimError, SimResult};
use crate::executor::{execute_transaction, Executed};
use crate::state::{GenesisAccount, WorldState};

/// Simulated chain settings
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Chain id transactions must be signed for
    pub chain_id: u64,
    /// Gas limit of every block
    pub gas_limit: u64,
    /// Base fee of the genesis block
    pub initial_base_fee: U256,
    /// Fee recipient
    pub coinbase: Address,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            gas_limit: 30_000_000,
            initial_base_fee: U256::from(GWEI),
            coinbase: Address::ZERO,
        }
    }
}

pub(crate) struct LogSubscriber {
    pub id: u64,
    pub query: FilterQuery,
    pub tx: mpsc::UnboundedSender<Log>,
}

pub(crate) struct Chain {
    pub blocks: Vec<Block>,
    /// `states[n]` is the state after block `n`
    pub states: Vec<WorldState>,
    /// Included transaction hash to (block number, index)
    pub tx_index: HashMap<H256, (u64, usize)>,
    pub time_offset: Duration,
    pub subscribers: Vec<LogSubscriber>,
    pub next_subscriber: u64,
    pub closed: bool,
}

impl Chain {
    pub fn head(&self) -> &Header {
        // genesis is always present
        &self.blocks[self.blocks.len() - 1].header
    }

    pub fn resolve(&self, number: Option<u64>) -> SimResult<u64> {
        let head = self.head().number;
        match number {
            None => Ok(head),
            Some(n) if n <= head => Ok(n),
            Some(n) => Err(SimError::UnknownBlock(n)),
        }
    }

    pub fn state_at(&self, number: Option<u64>) -> SimResult<&WorldState> {
        let n = self.resolve(number)?;
        Ok(&self.states[n as usize])
    }

    pub fn block(&self, number: u64) -> Option<&Block> {
        self.blocks.get(number as usize)
    }

    pub fn block_context(&self, number: u64, chain_id: u64) -> SimResult<BlockContext> {
        let header = &self.block(number).ok_or(SimError::UnknownBlock(number))?.header;
        Ok(BlockContext {
            number: header.number,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            coinbase: header.coinbase,
            chain_id,
            base_fee: header.base_fee_per_gas,
        })
    }

    /// Context of the block the next commit will seal
    pub fn pending_context(&self, config: &SimConfig) -> BlockContext {
        let head = self.head();
        BlockContext {
            number: head.number + 1,
            timestamp: self.next_timestamp(),
            gas_limit: config.gas_limit,
            coinbase: config.coinbase,
            chain_id: config.chain_id,
            base_fee: next_base_fee(head.base_fee_per_gas, head.gas_used, head.gas_limit),
        }
    }

    /// Shifted wall clock, never behind the parent
    ///
    /// Blocks sealed within the same second share a timestamp, so block
    /// time tracks the clock however fast blocks are committed.
    fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        (now + self.time_offset.as_secs()).max(self.head().timestamp)
    }

    pub fn matching_logs<'a>(
        &'a self,
        query: &'a FilterQuery,
    ) -> impl Iterator<Item = &'a Log> + 'a {
        let head = self.head().number;
        let from = query.from_block.unwrap_or(0);
        let to = query.to_block.unwrap_or(head).min(head);
        self.blocks
            .iter()
            .skip(from as usize)
            .take_while(move |b| b.number() <= to)
            .flat_map(|b| b.receipts.iter())
            .flat_map(|r| r.logs.iter())
            .filter(move |log| query.matches(log))
    }

    fn deliver(&mut self, logs: &[Log]) {
        self.subscribers.retain(|sub| {
            for log in logs.iter().filter(|log| sub.query.matches(log)) {
                if sub.tx.send(log.clone()).is_err() {
                    tracing::debug!(id = sub.id, "pruning closed log subscription");
                    return false;
                }
            }
            !sub.tx.is_closed()
        });
    }
}

pub(crate) struct Shared {
    pub chain: RwLock<Chain>,
    pub pool: TxPool,
    pub config: SimConfig,
}

/// In-process chain that seals a block on each [`commit`](Self::commit)
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl SimulatedBackend {
    /// Backend with default settings and the given genesis allocation
    pub fn new(alloc: impl IntoIterator<Item = (Address, GenesisAccount)>) -> Self {
        Self::with_config(alloc, SimConfig::default())
    }

    /// Backend with custom settings
    pub fn with_config(
        alloc: impl IntoIterator<Item = (Address, GenesisAccount)>,
        config: SimConfig,
    ) -> Self {
        let state = WorldState::from_alloc(alloc);
        let header = Header {
            number: 0,
            parent_hash: H256::ZERO,
            coinbase: config.coinbase,
            timestamp: 0,
            gas_limit: config.gas_limit,
            gas_used: 0,
            base_fee_per_gas: config.initial_base_fee,
            transactions_root: Block::transactions_root(&[]),
        };
        let genesis = Block { hash: header.hash(), header, transactions: Vec::new(), receipts: Vec::new() };
        tracing::info!(chain_id = config.chain_id, hash = %genesis.hash, "simulated genesis");

        let pool = TxPool::new(PoolConfig { block_gas_limit: config.gas_limit, ..PoolConfig::default() });
        let chain = Chain {
            blocks: vec![genesis],
            states: vec![state],
            tx_index: HashMap::new(),
            time_offset: Duration::ZERO,
            subscribers: Vec::new(),
            next_subscriber: 0,
            closed: false,
        };
        Self { shared: Arc::new(Shared { chain: RwLock::new(chain), pool, config }) }
    }

    /// Client handle; clones share this backend
    pub fn client(&self) -> SimulatedClient {
        SimulatedClient::new(Arc::clone(&self.shared))
    }

    /// Settings
    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    /// Seal one block from the pending pool and return its hash
    ///
    /// Senders are interleaved by effective tip, each in nonce order.
    /// Transactions whose fee cap is below the new base fee, or whose gas
    /// limit does not fit in what is left of the block, stay pending.
    pub fn commit(&self) -> SimResult<H256> {
        let config = &self.shared.config;
        let pool = &self.shared.pool;
        let mut chain = self.shared.chain.write();
        if chain.closed {
            return Err(SimError::Closed);
        }

        let ctx = chain.pending_context(config);
        let parent_hash = chain.blocks[chain.blocks.len() - 1].hash;
        let mut state = chain.states[chain.states.len() - 1].clone();

        let mut heads: BTreeMap<Address, VecDeque<PooledTransaction>> = pool
            .pending_by_sender()
            .into_iter()
            .map(|(sender, txs)| (sender, VecDeque::from(txs)))
            .collect();
        let senders: Vec<Address> = heads.keys().copied().collect();

        let mut included: Vec<(PooledTransaction, Executed)> = Vec::new();
        let mut dropped = Vec::new();
        let mut gas_used = 0u64;
        loop {
            heads.retain(|_, txs| txs.front().is_some_and(|next| next.fee_cap() >= ctx.base_fee));
            let best = heads
                .iter()
                .filter_map(|(sender, txs)| {
                    let tip = txs.front()?.tx.effective_tip(ctx.base_fee)?;
                    Some((tip, *sender))
                })
                .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
            let Some((_, sender)) = best else {
                break;
            };
            let Some(next) = heads.get_mut(&sender).and_then(VecDeque::pop_front) else {
                break;
            };

            if gas_used + next.gas_limit() > ctx.gas_limit {
                heads.remove(&sender);
                continue;
            }
            match execute_transaction(&mut state, &next.tx, next.sender, &ctx) {
                Ok(executed) => {
                    gas_used += executed.gas_used;
                    included.push((next, executed));
                }
                Err(e) => {
                    tracing::warn!(hash = %next.hash, %sender, error = %e, "dropping invalid transaction");
                    dropped.push(next.hash);
                    heads.remove(&sender);
                }
            }
        }

        let mut transactions = Vec::with_capacity(included.len());
        let mut receipts = Vec::with_capacity(included.len());
        let mut cumulative = 0u64;
        for (index, (pooled, executed)) in included.into_iter().enumerate() {
            cumulative += executed.gas_used;
            receipts.push(Receipt {
                status: executed.success.into(),
                transaction_hash: pooled.hash,
                transaction_index: index as u64,
                block_hash: H256::ZERO,
                block_number: ctx.number,
                from: pooled.sender,
                to: pooled.tx.to(),
                contract_address: executed.contract_address,
                gas_used: executed.gas_used,
                cumulative_gas_used: cumulative,
                effective_gas_price: executed.effective_gas_price,
                logs: executed.logs,
            });
            transactions.push(pooled.tx);
        }

        let header = Header {
            number: ctx.number,
            parent_hash,
            coinbase: ctx.coinbase,
            timestamp: ctx.timestamp,
            gas_limit: ctx.gas_limit,
            gas_used: cumulative,
            base_fee_per_gas: ctx.base_fee,
            transactions_root: Block::transactions_root(&transactions),
        };
        let hash = header.hash();

        let mut log_index = 0u64;
        let mut block_logs = Vec::new();
        for receipt in &mut receipts {
            receipt.block_hash = hash;
            for log in &mut receipt.logs {
                log.block_number = ctx.number;
                log.block_hash = hash;
                log.transaction_hash = receipt.transaction_hash;
                log.transaction_index = receipt.transaction_index;
                log.log_index = log_index;
                log_index += 1;
                block_logs.push(log.clone());
            }
            chain
                .tx_index
                .insert(receipt.transaction_hash, (ctx.number, receipt.transaction_index as usize));
        }

        let mut removed: Vec<H256> = receipts.iter().map(|r| r.transaction_hash).collect();
        removed.extend(dropped);
        pool.remove_included(&removed);
        let nonces: HashMap<Address, u64> = senders.iter().map(|s| (*s, state.nonce(s))).collect();
        pool.reset(&nonces);

        tracing::info!(
            number = ctx.number,
            %hash,
            txs = transactions.len(),
            gas_used = cumulative,
            base_fee = %ctx.base_fee,
            "sealed block"
        );

        chain.blocks.push(Block { header, hash, transactions, receipts });
        chain.states.push(state);
        chain.deliver(&block_logs);
        Ok(hash)
    }

    /// Drop every pending transaction
    pub fn rollback(&self) {
        let dropped = self.shared.pool.len();
        self.shared.pool.clear();
        tracing::debug!(dropped, "rolled back pending transactions");
    }

    /// Move the clock forward for subsequent blocks
    pub fn adjust_time(&self, by: Duration) {
        let mut chain = self.shared.chain.write();
        chain.time_offset += by;
        tracing::debug!(offset = ?chain.time_offset, "adjusted simulated clock");
    }

    /// Block by number; `None` for the head
    pub fn block_by_number(&self, number: Option<u64>) -> Option<Block> {
        let chain = self.shared.chain.read();
        let n = chain.resolve(number).ok()?;
        chain.block(n).cloned()
    }

    /// Latest header
    pub fn head(&self) -> Header {
        self.shared.chain.read().head().clone()
    }

    /// Pooled transactions, pending and queued
    pub fn pending_count(&self) -> usize {
        self.shared.pool.len()
    }

    /// Stop the backend: subscriptions end and client calls fail
    pub fn close(&self) {
        let mut chain = self.shared.chain.write();
        if chain.closed {
            return;
        }
        chain.closed = true;
        chain.subscribers.clear();
        self.shared.pool.clear();
        tracing::info!("simulated backend closed");
    }
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain = self.shared.chain.read();
        f.debug_struct("SimulatedBackend")
            .field("chain_id", &self.shared.config.chain_id)
            .field("head", &chain.head().number)
            .field("closed", &chain.closed)
            .finish()
    }
}
