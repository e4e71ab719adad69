//! Scenario bodies shared by every backend
//!
//! Each scenario seeds its own accounts from the chain's funder, so scenarios
//! are independent of each other and of the funder's other activity.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ethflow_primitives::{units::ETHER, Address, U256};
use ethflow_sdk::{
    CallOpts, ChainClient, FilterOpts, KeyStore, ScryptParams, SdkError, Signer, TransactOpts,
    TxBuilder, Wallet, WatchOpts,
};
use ethflow_types::SignedTransaction;

use crate::bindings::{Demo, Payment, Payments};
use crate::harness::{
    assert_transfer_accounting, balances, fund, transfer_with_suggested_fees, ReceiptAssertions,
    ScenarioChain, TRANSFER_GAS,
};
use crate::{ensure, E2EError, E2EResult};

/// Deadline for an expected event to arrive
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// How far a freshly sealed block may trail the local clock
const BLOCK_CLOCK_SLACK_SECS: u64 = 2;

fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(ETHER)
}

/// New random account holding `value`
async fn fresh_account(chain: &dyn ScenarioChain, value: U256) -> E2EResult<Arc<dyn Signer>> {
    let wallet: Arc<dyn Signer> = Arc::new(Wallet::new_random());
    fund(chain, wallet.address(), value).await?;
    Ok(wallet)
}

fn random_address() -> Address {
    Wallet::new_random().address()
}

/// Block time is close to the local wall clock, allowing one second of rounding ahead
fn ensure_recent(timestamp: u64) -> E2EResult<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| E2EError::Setup(e.to_string()))?
        .as_secs();
    ensure(
        timestamp <= now + 1 && now.saturating_sub(timestamp) <= BLOCK_CLOCK_SLACK_SECS,
        || format!("block timestamp {timestamp} too far from wall clock {now}"),
    )
}

async fn is_mined(client: &dyn ChainClient, tx: &SignedTransaction) -> E2EResult<bool> {
    Ok(client.transaction_receipt(&tx.hash()).await?.is_some())
}

/// 1 ETH transfer with suggested fees; both balances move by exactly value and fee
pub async fn transfer(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: transfer");
    let client = chain.client();
    let sender = fresh_account(chain, ether(2)).await?;
    let receiver = random_address();
    let value = ether(1);

    let before = balances(client.as_ref(), sender.address(), receiver).await?;
    let tx = transfer_with_suggested_fees(client.as_ref(), sender.as_ref(), receiver, value).await?;
    let receipt = chain.settle(&tx).await?;
    receipt.assert_success()?.assert_gas_used(TRANSFER_GAS)?;

    let after = balances(client.as_ref(), sender.address(), receiver).await?;
    assert_transfer_accounting(before, after, value, &receipt)?;
    ensure(client.nonce_at(&sender.address(), None).await? == 1, || "sender nonce not advanced".into())
}

/// A second transaction reusing a nonce is rejected; only the first is ever included
pub async fn same_nonce_replay(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: same nonce replay");
    let client = chain.client();
    let sender = fresh_account(chain, ether(1)).await?;
    let chain_id = client.chain_id().await?;
    let tip = client.suggest_gas_tip_cap().await?;
    let fee_cap = client.suggest_gas_price().await?;
    let nonce = client.pending_nonce_at(&sender.address()).await?;

    let builder = TxBuilder::new(chain_id)
        .nonce(nonce)
        .gas_limit(TRANSFER_GAS)
        .max_priority_fee_per_gas(tip)
        .max_fee_per_gas(fee_cap)
        .value(1u64);
    let first = builder.clone().to(random_address()).sign(sender.as_ref())?;
    let second = builder.to(random_address()).sign(sender.as_ref())?;

    client.send_transaction(&first).await?;
    ensure(client.send_transaction(&second).await.is_err(), || {
        "same-nonce transaction without a fee bump was accepted".into()
    })?;
    chain.settle(&first).await?.assert_success()?;

    ensure(client.send_transaction(&second).await.is_err(), || "stale nonce accepted after inclusion".into())?;
    chain.advance().await?;
    ensure(!is_mined(client.as_ref(), &second).await?, || "both same-nonce transactions mined".into())?;
    ensure(client.nonce_at(&sender.address(), None).await? == nonce + 1, || "nonce advanced twice".into())
}

/// Resubmitting a nonce with both fee caps doubled evicts the original
pub async fn replacement(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: replacement");
    let client = chain.client();
    let sender = fresh_account(chain, ether(1)).await?;
    let (original_to, replacement_to) = (random_address(), random_address());
    let chain_id = client.chain_id().await?;
    let tip = client.suggest_gas_tip_cap().await?;
    let fee_cap = client.suggest_gas_price().await?;
    let nonce = client.pending_nonce_at(&sender.address()).await?;
    let value = U256::from(1_000u64);

    let builder = TxBuilder::new(chain_id).nonce(nonce).gas_limit(TRANSFER_GAS).value(value);
    let original = builder
        .clone()
        .to(original_to)
        .max_priority_fee_per_gas(tip)
        .max_fee_per_gas(fee_cap)
        .sign(sender.as_ref())?;
    let bumped = builder
        .to(replacement_to)
        .max_priority_fee_per_gas(tip * U256::from(2u64))
        .max_fee_per_gas(fee_cap * U256::from(2u64))
        .sign(sender.as_ref())?;

    client.send_transaction(&original).await?;
    client.send_transaction(&bumped).await?;
    chain.settle(&bumped).await?.assert_success()?;

    ensure(!is_mined(client.as_ref(), &original).await?, || "replaced transaction was mined".into())?;
    ensure(client.balance_at(&replacement_to, None).await? == value, || "replacement not applied".into())?;
    ensure(client.balance_at(&original_to, None).await?.is_zero(), || "original transfer applied".into())
}

/// A fee cap under the base fee stays pending until repriced
pub async fn fee_cap_below_base_fee(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: fee cap below base fee");
    let client = chain.client();
    let sender = fresh_account(chain, ether(1)).await?;
    let head = client
        .header_by_number(None)
        .await?
        .ok_or_else(|| E2EError::Setup("no head block".into()))?;
    let low_cap = (head.base_fee_per_gas / U256::from(2u64)).max(U256::one());
    let receiver = random_address();

    let underpriced = TxBuilder::new(client.chain_id().await?)
        .nonce(client.pending_nonce_at(&sender.address()).await?)
        .gas_limit(TRANSFER_GAS)
        .max_priority_fee_per_gas(low_cap)
        .max_fee_per_gas(low_cap)
        .to(receiver)
        .value(1u64)
        .sign(sender.as_ref())?;
    client.send_transaction(&underpriced).await?;
    chain.advance().await?;

    ensure(!is_mined(client.as_ref(), &underpriced).await?, || "underpriced transaction mined".into())?;
    let pending = client.transaction_by_hash(&underpriced.hash()).await?.map(|(_, pending)| pending);
    ensure(pending == Some(true), || format!("underpriced transaction not pending: {pending:?}"))?;

    // same nonce, both caps well past the replacement bump
    let tip = client.suggest_gas_tip_cap().await?.max(low_cap * U256::from(2u64));
    let repriced = TxBuilder::new(underpriced.chain_id())
        .nonce(underpriced.nonce())
        .gas_limit(TRANSFER_GAS)
        .max_priority_fee_per_gas(tip)
        .max_fee_per_gas(head.base_fee_per_gas * U256::from(2u64) + tip)
        .to(receiver)
        .value(1u64)
        .sign(sender.as_ref())?;
    client.send_transaction(&repriced).await?;
    chain.settle(&repriced).await?.assert_success()?;
    ensure(client.balance_at(&receiver, None).await? == U256::one(), || "repriced transfer not applied".into())
}

/// Deploy Payments, pay into it and read the payment back
pub async fn deploy_and_pay(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: deploy and pay");
    let client = chain.client();
    let payer = fresh_account(chain, ether(2)).await?;
    let opts = TransactOpts::new(Arc::clone(&payer));

    let (address, deploy_tx, payments) = Payments::deploy(&opts, Arc::clone(&client)).await?;
    let created = chain.settle(&deploy_tx).await?.assert_success()?.assert_contract_created()?;
    ensure(created == address, || format!("contract at {created}, expected {address}"))?;
    ensure(!client.code_at(&address, None).await?.is_empty(), || "no code at contract".into())?;

    let value = U256::from(ETHER / 10);
    let message = "thanks for all the fish, see you in the next block";
    let pay_tx = payments.pay(&opts.clone().value(value), message).await?;
    let receipt = chain.settle(&pay_tx).await?;
    receipt.assert_success()?;

    let latest = CallOpts::default();
    let held = payments.current_balance(&latest).await?;
    ensure(held == value, || format!("currentBalance {held}, expected {value}"))?;
    ensure(client.balance_at(&address, None).await? == value, || "contract balance mismatch".into())?;

    let header = client
        .header_by_number(Some(receipt.block_number))
        .await?
        .ok_or_else(|| E2EError::Setup(format!("missing block {}", receipt.block_number)))?;
    let expected = Payment {
        message: message.to_string(),
        from: payer.address(),
        amount: value,
        timestamp: U256::from(header.timestamp),
    };
    let payment = payments.get_payment(&latest, payer.address(), 0).await?;
    ensure(payment == expected, || format!("payment {payment:?}, expected {expected:?}"))?;
    ensure_recent(header.timestamp)?;

    match payments.get_payment(&latest, payer.address(), 1).await {
        Err(SdkError::Reverted(_)) | Err(SdkError::Execution(_)) => Ok(()),
        other => Err(E2EError::Assertion(format!("out-of-range payment read returned {other:?}"))),
    }
}

/// Deploy Demo, pay its receive function and observe `Paid` live and historically
pub async fn deploy_receive_watch(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: deploy, receive and watch");
    let client = chain.client();
    let owner = fresh_account(chain, ether(1)).await?;
    let payer = fresh_account(chain, ether(1)).await?;

    let (_, deploy_tx, demo) = Demo::deploy(&TransactOpts::new(Arc::clone(&owner)), Arc::clone(&client)).await?;
    chain.settle(&deploy_tx).await?.assert_success()?;
    let recorded = demo.owner(&CallOpts::default()).await?;
    ensure(recorded == owner.address(), || format!("owner {recorded}, expected {}", owner.address()))?;

    let mut paid = demo.watch_paid(&WatchOpts::default(), &[payer.address()]).await?;
    let value = U256::from(12_345u64);
    let tx = demo.receive(&TransactOpts::new(Arc::clone(&payer)).value(value)).await?;
    let receipt = chain.settle(&tx).await?;
    receipt.assert_success()?;

    let event = tokio::time::timeout(EVENT_TIMEOUT, paid.recv())
        .await
        .map_err(|_| E2EError::Assertion("no Paid event within deadline".into()))?
        .ok_or_else(|| E2EError::Assertion("Paid subscription closed".into()))?;
    ensure(event.from == payer.address() && event.amount == value, || {
        format!("unexpected event {event:?}")
    })?;
    ensure(event.raw.transaction_hash == tx.hash(), || "event from another transaction".into())?;

    let range = FilterOpts { start: receipt.block_number, end: Some(receipt.block_number) };
    let history = demo.filter_paid(&range, &[payer.address()]).await?;
    ensure(history.len() == 1 && history[0] == event, || format!("filtered {history:?}"))?;
    let others = demo.filter_paid(&range, &[owner.address()]).await?;
    ensure(others.is_empty(), || "filter matched another payer".into())
}

/// Read-only calls pinned to a block see that block's state
pub async fn historical_call(chain: &dyn ScenarioChain) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), "scenario: historical call");
    let client = chain.client();
    let payer = fresh_account(chain, ether(1)).await?;
    let opts = TransactOpts::new(Arc::clone(&payer));

    let (_, deploy_tx, payments) = Payments::deploy(&opts, Arc::clone(&client)).await?;
    let deployed_at = chain.settle(&deploy_tx).await?.assert_success()?.block_number;

    let (first, second) = (U256::from(100u64), U256::from(250u64));
    let tx = payments.pay(&opts.clone().value(first), "first").await?;
    let first_at = chain.settle(&tx).await?.assert_success()?.block_number;
    let tx = payments.pay(&opts.clone().value(second), "second").await?;
    chain.settle(&tx).await?.assert_success()?;

    let at_deploy = payments.current_balance(&CallOpts::at_block(deployed_at)).await?;
    ensure(at_deploy.is_zero(), || format!("balance {at_deploy} at deployment"))?;
    let at_first = payments.current_balance(&CallOpts::at_block(first_at)).await?;
    ensure(at_first == first, || format!("balance {at_first} at block {first_at}, expected {first}"))?;
    let latest = payments.current_balance(&CallOpts::default()).await?;
    ensure(latest == first + second, || format!("latest balance {latest}"))?;

    ensure(
        payments.get_payment(&CallOpts::at_block(first_at), payer.address(), 1).await.is_err(),
        || "second payment visible before it was made".into(),
    )?;
    let later = payments.get_payment(&CallOpts::default(), payer.address(), 1).await?;
    ensure(later.message == "second" && later.amount == second, || format!("second payment {later:?}"))
}

/// Create a key in `dir`, fund it, and sign a transfer by passphrase
pub async fn keystore_signing(chain: &dyn ScenarioChain, dir: &Path) -> E2EResult<()> {
    tracing::info!(chain = chain.name(), dir = %dir.display(), "scenario: keystore signing");
    let passphrase = "correct horse battery staple";
    let client = chain.client();
    let keystore = KeyStore::open(dir, ScryptParams::light()).map_err(SdkError::from)?;
    let account = keystore.new_account(passphrase).map_err(SdkError::from)?;
    ensure(
        keystore.accounts().map_err(SdkError::from)?.iter().any(|a| a.address == account.address),
        || "new account not listed".into(),
    )?;
    ensure(keystore.unlock(&account.address, "wrong").is_err(), || "wrong passphrase unlocked".into())?;
    fund(chain, account.address, ether(1)).await?;

    let receiver = random_address();
    let value = U256::from(ETHER / 2);
    let unsigned = TxBuilder::new(client.chain_id().await?)
        .nonce(client.pending_nonce_at(&account.address).await?)
        .gas_limit(TRANSFER_GAS)
        .max_priority_fee_per_gas(client.suggest_gas_tip_cap().await?)
        .max_fee_per_gas(client.suggest_gas_price().await?)
        .to(receiver)
        .value(value)
        .build()?;
    let signed = keystore.sign_tx_with_passphrase(&account.address, passphrase, unsigned)?;
    let sender = signed.recover_sender().map_err(|e| E2EError::Assertion(e.to_string()))?;
    ensure(sender == account.address, || format!("signature recovers to {sender}"))?;

    let before = balances(client.as_ref(), account.address, receiver).await?;
    client.send_transaction(&signed).await?;
    let receipt = chain.settle(&signed).await?;
    receipt.assert_success()?;
    let after = balances(client.as_ref(), account.address, receiver).await?;
    assert_transfer_accounting(before, after, value, &receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix_now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    #[test]
    fn test_ensure_recent_bounds() {
        let now = unix_now();
        assert!(ensure_recent(now).is_ok());
        assert!(ensure_recent(now - 1).is_ok());
        assert!(matches!(ensure_recent(now + 3), Err(E2EError::Assertion(_))));
        assert!(matches!(ensure_recent(now - 10), Err(E2EError::Assertion(_))));
        assert!(ensure_recent(0).is_err());
    }
}
