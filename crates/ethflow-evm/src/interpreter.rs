//! Bytecode interpreter

use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;
use ethflow_crypto::keccak256;
use ethflow_primitives::{Address, H256, U256};
use ethflow_types::Log;

use crate::context::{Environment, Host};
use crate::error::{EvmError, EvmResult, ExecutionResult};
use crate::gas::{self, cost};
use crate::memory::Memory;
use crate::opcode::*;
use crate::stack::Stack;

/// Memory offsets and sizes past this are treated as out of gas
const MAX_MEMORY_BOUND: u64 = u32::MAX as u64;

/// Interpreter state for one frame
#[derive(Clone, Debug)]
pub struct Interpreter {
    code: Vec<u8>,
    pc: usize,
    stack: Stack,
    memory: Memory,
    gas: u64,
    jump_dests: HashSet<usize>,
    stopped: bool,
    output: Vec<u8>,
    logs: Vec<Log>,
    storage_writes: BTreeMap<H256, U256>,
    warm_slots: HashSet<H256>,
}

impl Interpreter {
    /// Create an interpreter for `code` with a gas allowance
    pub fn new(code: Vec<u8>, gas: u64) -> Self {
        let jump_dests = Self::analyze_jump_dests(&code);
        Self {
            code,
            pc: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            gas,
            jump_dests,
            stopped: false,
            output: Vec::new(),
            logs: Vec::new(),
            storage_writes: BTreeMap::new(),
            warm_slots: HashSet::new(),
        }
    }

    fn analyze_jump_dests(code: &[u8]) -> HashSet<usize> {
        let mut dests = HashSet::new();
        let mut i = 0;
        while i < code.len() {
            let op = code[i];
            if op == JUMPDEST {
                dests.insert(i);
            }
            // PUSH immediates are data, never destinations
            i += 1 + immediate_size(op);
        }
        dests
    }

    /// Gas still available
    pub fn gas_remaining(&self) -> u64 {
        self.gas
    }

    /// Execute until STOP, RETURN, REVERT, the end of code, or an error
    pub fn run(&mut self, env: &Environment, host: &dyn Host) -> ExecutionResult {
        let gas_limit = self.gas;

        while !self.stopped && self.pc < self.code.len() {
            match self.step(env, host) {
                Ok(()) => {}
                Err(EvmError::Revert(data)) => {
                    return ExecutionResult::revert(gas_limit - self.gas, data);
                }
                Err(error) => {
                    tracing::trace!(pc = self.pc, %error, "frame halted");
                    return ExecutionResult::halt(gas_limit, error);
                }
            }
        }

        ExecutionResult::success(
            gas_limit - self.gas,
            std::mem::take(&mut self.output),
            std::mem::take(&mut self.logs),
            std::mem::take(&mut self.storage_writes).into_iter().collect(),
        )
    }

    fn use_gas(&mut self, amount: u64) -> EvmResult<()> {
        if self.gas < amount {
            self.gas = 0;
            return Err(EvmError::OutOfGas);
        }
        self.gas -= amount;
        Ok(())
    }

    /// Charge for and perform memory growth; returns the range as usizes
    fn expand_memory(&mut self, offset: U256, len: U256) -> EvmResult<(usize, usize)> {
        if len.is_zero() {
            return Ok((0, 0));
        }
        if offset > U256::from(MAX_MEMORY_BOUND) || len > U256::from(MAX_MEMORY_BOUND) {
            return Err(EvmError::OutOfGas);
        }
        let (offset, len) = (offset.as_usize(), len.as_usize());
        let end = offset + len;
        self.use_gas(gas::memory_gas(self.memory.size(), end))?;
        self.memory.resize(offset, len);
        Ok((offset, len))
    }

    fn step(&mut self, env: &Environment, host: &dyn Host) -> EvmResult<()> {
        let op = self.code[self.pc];
        let static_cost = gas::static_gas(op).ok_or(EvmError::InvalidOpcode(op))?;
        self.use_gas(static_cost)?;
        self.pc += 1;

        match op {
            STOP => self.stopped = true,

            ADD => self.binary(|a, b| a.overflowing_add(b).0)?,
            MUL => self.binary(|a, b| a.overflowing_mul(b).0)?,
            SUB => self.binary(|a, b| a.overflowing_sub(b).0)?,
            DIV => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a / b })?,
            MOD => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a % b })?,
            EXP => {
                let base = self.stack.pop()?;
                let exponent = self.stack.pop()?;
                self.use_gas(gas::exp_byte_gas(exponent.bits()))?;
                self.stack.push(base.overflowing_pow(exponent).0)?;
            }

            LT => self.binary(|a, b| bool_word(a < b))?,
            GT => self.binary(|a, b| bool_word(a > b))?,
            EQ => self.binary(|a, b| bool_word(a == b))?,
            ISZERO => {
                let a = self.stack.pop()?;
                self.stack.push(bool_word(a.is_zero()))?;
            }
            AND => self.binary(|a, b| a & b)?,
            OR => self.binary(|a, b| a | b)?,
            XOR => self.binary(|a, b| a ^ b)?,
            NOT => {
                let a = self.stack.pop()?;
                self.stack.push(!a)?;
            }
            // shift amount is on top
            SHL => self.binary(|shift, value| {
                if shift >= U256::from(256) { U256::zero() } else { value << shift.as_usize() }
            })?,
            SHR => self.binary(|shift, value| {
                if shift >= U256::from(256) { U256::zero() } else { value >> shift.as_usize() }
            })?,

            KECCAK256 => {
                let offset = self.stack.pop()?;
                let len = self.stack.pop()?;
                let (offset, len) = self.expand_memory(offset, len)?;
                self.use_gas(gas::sha3_word_gas(len))?;
                let hash = keccak256(&self.memory.slice(offset, len));
                self.stack.push(hash.to_u256())?;
            }

            ADDRESS => self.stack.push(address_word(&env.call.address))?,
            CALLER => self.stack.push(address_word(&env.call.caller))?,
            CALLVALUE => self.stack.push(env.call.value)?,
            CALLDATALOAD => {
                let offset = self.stack.pop_usize()?;
                let word = padded_slice(&env.call.data, offset, 32);
                self.stack.push(U256::from_big_endian(&word))?;
            }
            CALLDATASIZE => self.stack.push_u64(env.call.data.len() as u64)?,
            CALLDATACOPY => self.copy_to_memory(&env.call.data)?,
            CODESIZE => self.stack.push_u64(self.code.len() as u64)?,
            CODECOPY => {
                let code = self.code.clone();
                self.copy_to_memory(&code)?;
            }
            GASPRICE => self.stack.push(env.tx.gas_price)?,

            COINBASE => self.stack.push(address_word(&env.block.coinbase))?,
            TIMESTAMP => self.stack.push_u64(env.block.timestamp)?,
            NUMBER => self.stack.push_u64(env.block.number)?,
            GASLIMIT => self.stack.push_u64(env.block.gas_limit)?,
            CHAINID => self.stack.push_u64(env.block.chain_id)?,
            SELFBALANCE => self.stack.push(host.balance(&env.call.address))?,
            BASEFEE => self.stack.push(env.block.base_fee)?,

            POP => {
                self.stack.pop()?;
            }
            MLOAD => {
                let offset = self.stack.pop()?;
                let (offset, _) = self.expand_memory(offset, U256::from(32))?;
                self.stack.push(self.memory.load(offset))?;
            }
            MSTORE => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                let (offset, _) = self.expand_memory(offset, U256::from(32))?;
                self.memory.store(offset, value);
            }
            MSTORE8 => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                let (offset, _) = self.expand_memory(offset, U256::one())?;
                self.memory.store8(offset, value.low_u32() as u8);
            }
            SLOAD => {
                let key = H256::from_u256(self.stack.pop()?);
                let warm = !self.warm_slots.insert(key);
                self.use_gas(if warm { cost::WARM_ACCESS } else { cost::COLD_SLOAD })?;
                let value = self.current_storage(env, host, &key);
                self.stack.push(value)?;
            }
            SSTORE => {
                if env.call.is_static {
                    return Err(EvmError::StaticCallViolation);
                }
                let key = H256::from_u256(self.stack.pop()?);
                let value = self.stack.pop()?;
                let current = self.current_storage(env, host, &key);
                let warm = !self.warm_slots.insert(key);
                self.use_gas(gas::sstore_gas(current.is_zero(), current == value, warm))?;
                self.storage_writes.insert(key, value);
            }
            JUMP => {
                let dest = self.stack.pop_usize()?;
                self.jump(dest)?;
            }
            JUMPI => {
                let dest = self.stack.pop_usize()?;
                let condition = self.stack.pop()?;
                if !condition.is_zero() {
                    self.jump(dest)?;
                }
            }
            PC => self.stack.push_u64((self.pc - 1) as u64)?,
            MSIZE => self.stack.push_u64(self.memory.size() as u64)?,
            GAS => self.stack.push_u64(self.gas)?,
            JUMPDEST => {}

            PUSH0 => self.stack.push(U256::zero())?,
            PUSH1..=PUSH32 => {
                let size = immediate_size(op);
                let bytes = padded_slice(&self.code, self.pc, size);
                self.pc += size;
                self.stack.push(U256::from_big_endian(&bytes))?;
            }
            DUP1..=DUP16 => self.stack.dup((op - DUP1 + 1) as usize)?,
            SWAP1..=SWAP16 => self.stack.swap((op - SWAP1 + 1) as usize)?,

            LOG0..=LOG4 => {
                if env.call.is_static {
                    return Err(EvmError::StaticCallViolation);
                }
                let topic_count = (op - LOG0) as usize;
                let offset = self.stack.pop()?;
                let len = self.stack.pop()?;
                let mut topics = Vec::with_capacity(topic_count);
                for _ in 0..topic_count {
                    topics.push(H256::from_u256(self.stack.pop()?));
                }
                let (offset, len) = self.expand_memory(offset, len)?;
                self.use_gas(gas::log_gas(topic_count, len))?;
                let data = Bytes::from(self.memory.slice(offset, len));
                self.logs.push(Log::new(env.call.address, topics, data));
            }

            RETURN | REVERT => {
                let offset = self.stack.pop()?;
                let len = self.stack.pop()?;
                let (offset, len) = self.expand_memory(offset, len)?;
                let data = self.memory.slice(offset, len);
                if op == REVERT {
                    return Err(EvmError::Revert(data));
                }
                self.output = data;
                self.stopped = true;
            }

            _ => return Err(EvmError::InvalidOpcode(op)),
        }

        Ok(())
    }

    fn binary(&mut self, f: impl FnOnce(U256, U256) -> U256) -> EvmResult<()> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.stack.push(f(a, b))
    }

    fn jump(&mut self, dest: usize) -> EvmResult<()> {
        if !self.jump_dests.contains(&dest) {
            return Err(EvmError::InvalidJump(dest));
        }
        self.pc = dest;
        Ok(())
    }

    /// dest, offset, len popped in that order
    fn copy_to_memory(&mut self, source: &[u8]) -> EvmResult<()> {
        let dest = self.stack.pop()?;
        let src_offset = self.stack.pop_usize()?;
        let len = self.stack.pop()?;
        let (dest, len) = self.expand_memory(dest, len)?;
        self.use_gas(gas::copy_gas(len))?;
        self.memory.set_padded(dest, source, src_offset, len);
        Ok(())
    }

    fn current_storage(&self, env: &Environment, host: &dyn Host, key: &H256) -> U256 {
        match self.storage_writes.get(key) {
            Some(value) => *value,
            None => host.storage(&env.call.address, key),
        }
    }
}

fn bool_word(value: bool) -> U256 {
    if value {
        U256::one()
    } else {
        U256::zero()
    }
}

fn address_word(address: &Address) -> U256 {
    U256::from_big_endian(&address.to_word())
}

fn padded_slice(source: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < source.len() {
        let end = offset.saturating_add(len).min(source.len());
        out[..end - offset].copy_from_slice(&source[offset..end]);
    }
    out
}
