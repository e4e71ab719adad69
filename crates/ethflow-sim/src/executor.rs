//! Transaction and call execution against [`WorldState`]

use bytes::Bytes;
use ethflow_evm::gas::cost::{CODE_DEPOSIT, MAX_CODE_SIZE};
use ethflow_evm::{BlockContext, CallContext, Environment, ExecutionResult, Interpreter, TxContext};
use ethflow_primitives::{Address, U256};
use ethflow_sdk::CallMsg;
use ethflow_types::{contract_address, intrinsic_gas, Log, SignedTransaction};

use crate::error::{SimError, SimResult};
use crate::state::WorldState;

/// Result of one included transaction, before block positions are known
#[derive(Debug, Clone)]
pub(crate) struct Executed {
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: U256,
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// Outcome of a read-only call
#[derive(Debug, Clone)]
pub(crate) struct CallOutcome {
    pub output: Bytes,
    pub gas_used: u64,
}

/// Execute `tx` from `sender` on top of `state`
///
/// Errors mean the transaction is invalid for this block and `state` is
/// untouched. A failed execution is not an error: it yields a failure
/// receipt, keeps the nonce bump and charges gas.
pub(crate) fn execute_transaction(
    state: &mut WorldState,
    tx: &SignedTransaction,
    sender: Address,
    block: &BlockContext,
) -> SimResult<Executed> {
    let is_create = tx.is_contract_creation();
    let intrinsic = intrinsic_gas(tx.data(), is_create);
    if tx.gas_limit() < intrinsic {
        return Err(SimError::IntrinsicGas { have: tx.gas_limit(), want: intrinsic });
    }

    let price = tx.effective_gas_price(block.base_fee).ok_or(SimError::FeeCapTooLow {
        fee_cap: tx.max_fee_per_gas(),
        base_fee: block.base_fee,
    })?;

    let nonce = state.nonce(&sender);
    if tx.nonce() != nonce {
        return Err(SimError::NonceMismatch { expected: nonce, got: tx.nonce() });
    }

    let have = state.balance(&sender);
    let want = tx.max_cost();
    if have < want {
        return Err(SimError::InsufficientFunds { address: sender, have, want });
    }

    // Buy gas at the effective price and bump the nonce
    let gas_cost = U256::from(tx.gas_limit()) * price;
    if !state.debit(sender, gas_cost) {
        return Err(SimError::InsufficientFunds { address: sender, have, want: gas_cost });
    }
    state.increment_nonce(sender);
    let checkpoint = state.clone();

    let target = match tx.to() {
        Some(to) => to,
        None => contract_address(&sender, tx.nonce()),
    };
    if !tx.value().is_zero() {
        state.debit(sender, tx.value());
        state.credit(target, tx.value());
    }

    let frame_gas = tx.gas_limit() - intrinsic;
    let (code, input) = if is_create {
        (tx.data().to_vec(), Vec::new())
    } else {
        (state.code(&target).to_vec(), tx.data().to_vec())
    };

    let (success, frame_used, logs) = if code.is_empty() {
        (true, 0, Vec::new())
    } else {
        let env = Environment::new(
            CallContext::new(target, sender, tx.value(), input),
            block.clone(),
            TxContext { origin: sender, gas_price: price },
        );
        let result = Interpreter::new(code, frame_gas).run(&env, &*state);
        commit_frame(state, target, is_create, frame_gas, result)
    };

    if !success {
        *state = checkpoint;
    }

    let gas_used = intrinsic + frame_used;
    let refund = U256::from(tx.gas_limit() - gas_used) * price;
    state.credit(sender, refund);
    // the base fee share is burned
    let tip = price - block.base_fee;
    state.credit(block.coinbase, U256::from(gas_used) * tip);

    tracing::debug!(
        hash = %tx.hash(),
        %sender,
        success,
        gas_used,
        "transaction executed"
    );

    Ok(Executed {
        success,
        gas_used,
        effective_gas_price: price,
        contract_address: is_create.then_some(target),
        logs,
    })
}

/// Apply a finished frame. Returns `(success, frame gas used, logs)`.
fn commit_frame(
    state: &mut WorldState,
    target: Address,
    is_create: bool,
    frame_gas: u64,
    result: ExecutionResult,
) -> (bool, u64, Vec<Log>) {
    if !result.success {
        tracing::debug!(error = ?result.error, gas_used = result.gas_used, "frame failed");
        return (false, result.gas_used, Vec::new());
    }

    let mut used = result.gas_used;
    if is_create {
        let deposit = result.output.len() as u64 * CODE_DEPOSIT;
        if result.output.len() > MAX_CODE_SIZE || used + deposit > frame_gas {
            tracing::debug!(size = result.output.len(), "code deposit failed");
            return (false, frame_gas, Vec::new());
        }
        used += deposit;
        state.set_code(target, Bytes::from(result.output));
    }
    state.apply_storage(target, result.storage_changes);
    (true, used, result.logs)
}

/// Run `msg` against a copy of `state`
///
/// Gas defaults to the block gas limit. No gas is bought, so the call price
/// is zero. `gas_used` includes intrinsic gas and any code deposit.
pub(crate) fn execute_call(
    state: &WorldState,
    msg: &CallMsg,
    block: &BlockContext,
) -> SimResult<CallOutcome> {
    let mut scratch = state.clone();
    let from = msg.from.unwrap_or(Address::ZERO);
    let value = msg.value.unwrap_or_default();
    let is_create = msg.to.is_none();
    let intrinsic = intrinsic_gas(&msg.data, is_create);
    let gas = msg.gas.unwrap_or(block.gas_limit);
    if gas < intrinsic {
        return Err(SimError::IntrinsicGas { have: gas, want: intrinsic });
    }

    let target = match msg.to {
        Some(to) => to,
        None => contract_address(&from, scratch.nonce(&from)),
    };
    if !value.is_zero() {
        let have = scratch.balance(&from);
        if !scratch.debit(from, value) {
            return Err(SimError::InsufficientFunds { address: from, have, want: value });
        }
        scratch.credit(target, value);
    }

    let (code, input) = if is_create {
        (msg.data.to_vec(), Vec::new())
    } else {
        (scratch.code(&target).to_vec(), msg.data.to_vec())
    };
    if code.is_empty() {
        return Ok(CallOutcome { output: Bytes::new(), gas_used: intrinsic });
    }

    let frame_gas = gas - intrinsic;
    let env = Environment::new(
        CallContext::new(target, from, value, input),
        block.clone(),
        TxContext { origin: from, gas_price: U256::zero() },
    );
    let result = Interpreter::new(code, frame_gas).run(&env, &scratch);

    if !result.success {
        return Err(match result.error {
            Some(ethflow_evm::EvmError::Revert(data)) => SimError::Reverted(data),
            Some(other) => SimError::Halted(other.to_string()),
            None => SimError::Halted("unknown failure".to_string()),
        });
    }

    let mut gas_used = intrinsic + result.gas_used;
    if is_create {
        if result.output.len() > MAX_CODE_SIZE {
            return Err(SimError::Halted("max code size exceeded".to_string()));
        }
        gas_used += result.output.len() as u64 * CODE_DEPOSIT;
        if gas_used > gas {
            return Err(SimError::Halted("out of gas".to_string()));
        }
    }
    Ok(CallOutcome { output: Bytes::from(result.output), gas_used })
}
