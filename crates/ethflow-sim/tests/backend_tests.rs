//! Simulated backend behaviour through the `ChainClient` surface

use ethflow_primitives::{units::GWEI, Address, U256};
use ethflow_sdk::{wait_mined, ChainClient, FilterQuery, TxBuilder, WaitConfig, Wallet};
use ethflow_sim::{GenesisAccount, SimulatedBackend};
use ethflow_types::Log;

fn seeded(wallet: &Wallet, balance: U256) -> SimulatedBackend {
    SimulatedBackend::new([(wallet.address(), GenesisAccount::with_balance(balance))])
}

fn transfer(nonce: u64, to: Address, value: U256) -> TxBuilder {
    TxBuilder::new(1337)
        .nonce(nonce)
        .gas_limit(21_000)
        .to(to)
        .value(value)
        .max_priority_fee_per_gas(GWEI)
        .max_fee_per_gas(3 * GWEI)
}

#[tokio::test]
async fn test_genesis_balance_before_commit() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let seed = U256::from(9u64) * U256::exp10(18);
    let backend = seeded(&wallet, seed);
    let client = backend.client();
    assert_eq!(client.balance_at(&wallet.address(), None).await?, seed);
    assert_eq!(client.block_number().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_transfer_nine_ether_seed() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let receiver = Address::from_bytes([0x0b; 20]);
    let seed = U256::from(9u64) * U256::exp10(18);
    let backend = seeded(&wallet, seed);
    let client = backend.client();

    let tx = transfer(0, receiver, U256::exp10(18)).sign(&wallet)?;
    client.send_transaction(&tx).await?;
    backend.commit()?;

    let receipt = wait_mined(&client, tx.hash(), &WaitConfig::default()).await?;
    assert_eq!(receipt.gas_used, 21_000);
    // block 1 base fee is 0.875 gwei; tip is 1 gwei, under the 3 gwei cap
    assert_eq!(receipt.effective_gas_price, U256::from(875_000_000u64 + GWEI));
    let fee = U256::from(21_000u64) * receipt.effective_gas_price;
    assert_eq!(client.balance_at(&wallet.address(), None).await?, seed - U256::exp10(18) - fee);
    assert_eq!(client.balance_at(&receiver, None).await?, U256::exp10(18));
    Ok(())
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
async fn test_quick_blocks_track_wall_clock() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let receiver = Address::from_bytes([0x0d; 20]);
    let backend = seeded(&wallet, U256::exp10(19));
    let client = backend.client();

    let before = unix_now();
    for nonce in 0..4 {
        let tx = transfer(nonce, receiver, U256::one()).sign(&wallet)?;
        client.send_transaction(&tx).await?;
        backend.commit()?;
    }
    let after = unix_now();

    assert_eq!(client.block_number().await?, 4);
    let head = client.header_by_number(None).await?.expect("head header");
    assert!(head.timestamp >= before && head.timestamp <= after);
    Ok(())
}

#[tokio::test]
async fn test_historical_state_is_kept() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let receiver = Address::from_bytes([0x0c; 20]);
    let backend = seeded(&wallet, U256::exp10(19));
    let client = backend.client();

    client.send_transaction(&transfer(0, receiver, U256::from(5u64)).sign(&wallet)?).await?;
    backend.commit()?;
    client.send_transaction(&transfer(1, receiver, U256::from(7u64)).sign(&wallet)?).await?;
    backend.commit()?;

    assert_eq!(client.balance_at(&receiver, Some(0)).await?, U256::zero());
    assert_eq!(client.balance_at(&receiver, Some(1)).await?, U256::from(5u64));
    assert_eq!(client.balance_at(&receiver, Some(2)).await?, U256::from(12u64));
    assert_eq!(client.nonce_at(&wallet.address(), Some(1)).await?, 1);
    assert_eq!(client.nonce_at(&wallet.address(), None).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_fee_cap_below_base_fee_stays_pending() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let backend = seeded(&wallet, U256::exp10(19));
    let client = backend.client();

    let tx = transfer(0, Address::from_bytes([1; 20]), U256::one())
        .max_priority_fee_per_gas(GWEI / 10)
        .max_fee_per_gas(GWEI / 2)
        .sign(&wallet)?;
    client.send_transaction(&tx).await?;
    backend.commit()?;

    assert!(client.transaction_receipt(&tx.hash()).await?.is_none());
    let (_, pending) = client.transaction_by_hash(&tx.hash()).await?.expect("still pooled");
    assert!(pending);
    assert_eq!(backend.pending_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_same_nonce_included_once() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let backend = seeded(&wallet, U256::exp10(19));
    let client = backend.client();
    let a = transfer(0, Address::from_bytes([1; 20]), U256::one()).sign(&wallet)?;
    let b = transfer(0, Address::from_bytes([2; 20]), U256::one()).sign(&wallet)?;

    client.send_transaction(&a).await?;
    // second one does not outbid the first
    assert!(client.send_transaction(&b).await.is_err());
    backend.commit()?;
    assert!(client.transaction_receipt(&a.hash()).await?.is_some());

    // replay after inclusion is refused
    assert!(client.send_transaction(&b).await.is_err());
    backend.commit()?;
    assert!(client.transaction_receipt(&b.hash()).await?.is_none());
    assert_eq!(client.nonce_at(&wallet.address(), None).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_replacement_wins() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let backend = seeded(&wallet, U256::exp10(19));
    let client = backend.client();
    let original = transfer(0, Address::from_bytes([1; 20]), U256::one()).sign(&wallet)?;
    let bumped = transfer(0, Address::from_bytes([1; 20]), U256::one())
        .max_priority_fee_per_gas(2 * GWEI)
        .max_fee_per_gas(4 * GWEI)
        .sign(&wallet)?;

    client.send_transaction(&original).await?;
    client.send_transaction(&bumped).await?;
    backend.commit()?;

    assert!(client.transaction_receipt(&original.hash()).await?.is_none());
    assert!(client.transaction_receipt(&bumped.hash()).await?.is_some());
    Ok(())
}

/// Runtime that emits `LOG1(topic = 0xaa..)` with empty data
fn log_runtime() -> Vec<u8> {
    use ethflow_evm::opcode::*;
    let mut asm = ethflow_evm::Assembler::new();
    asm.push_bytes(&[0xaa; 32]).push_u64(0).push_u64(0).op(LOG1).op(STOP);
    asm.assemble().unwrap()
}

#[tokio::test]
async fn test_log_subscription_and_filter() -> anyhow::Result<()> {
    let wallet = Wallet::new_random();
    let backend = seeded(&wallet, U256::exp10(19));
    let client = backend.client();

    let init = ethflow_evm::Assembler::new().return_runtime(&log_runtime()).assemble()?;
    let create = TxBuilder::new(1337)
        .nonce(0)
        .gas_limit(200_000)
        .data(init)
        .max_priority_fee_per_gas(GWEI)
        .max_fee_per_gas(3 * GWEI)
        .sign(&wallet)?;
    client.send_transaction(&create).await?;
    backend.commit()?;
    let receipt = client.transaction_receipt(&create.hash()).await?.expect("mined");
    let contract = receipt.contract_address.expect("creation");

    let query = FilterQuery::new().address(contract);
    let mut live = client.subscribe_filter_logs(&query).await?;

    for nonce in 1..3 {
        let poke = transfer(nonce, contract, U256::zero()).gas_limit(50_000).sign(&wallet)?;
        client.send_transaction(&poke).await?;
        backend.commit()?;
    }

    let first: Log = live.recv().await.expect("first log");
    let second: Log = live.recv().await.expect("second log");
    assert_eq!((first.block_number, second.block_number), (2, 3));
    assert_eq!(first.address, contract);
    assert!(live.try_recv().is_none());

    let history = client.filter_logs(&query.clone().from_block(3)).await?;
    assert_eq!(history, vec![second.clone()]);

    // backfill replays history before new blocks
    let mut replay = client.subscribe_filter_logs(&query.from_block(0)).await?;
    assert_eq!(replay.recv().await, Some(first));
    assert_eq!(replay.recv().await, Some(second));
    Ok(())
}

#[tokio::test]
async fn test_close_ends_subscriptions() -> anyhow::Result<()> {
    let backend = SimulatedBackend::new([]);
    let client = backend.client();
    let mut sub = client.subscribe_filter_logs(&FilterQuery::new()).await?;
    backend.close();
    assert!(sub.recv().await.is_none());
    assert!(client.chain_id().await.is_ok());
    assert!(client.balance_at(&Address::ZERO, None).await.is_err());
    Ok(())
}
