//! Gas schedule

use crate::opcode::*;

/// Gas cost constants
pub mod cost {
    /// Zero
    pub const ZERO: u64 = 0;
    /// Jump destination marker
    pub const JUMPDEST: u64 = 1;
    /// Base tier
    pub const BASE: u64 = 2;
    /// Very-low tier
    pub const VERYLOW: u64 = 3;
    /// Low tier
    pub const LOW: u64 = 5;
    /// Mid tier
    pub const MID: u64 = 8;
    /// High tier
    pub const HIGH: u64 = 10;
    /// EXP base
    pub const EXP: u64 = 10;
    /// EXP per exponent byte
    pub const EXP_BYTE: u64 = 50;
    /// KECCAK256 base
    pub const SHA3: u64 = 30;
    /// KECCAK256 per word
    pub const SHA3_WORD: u64 = 6;
    /// Memory per word
    pub const MEMORY: u64 = 3;
    /// Copy per word
    pub const COPY: u64 = 3;
    /// First access to a storage slot in a transaction
    pub const COLD_SLOAD: u64 = 2100;
    /// Repeat access to a storage slot
    pub const WARM_ACCESS: u64 = 100;
    /// Writing a non-zero value into a zero slot
    pub const SSTORE_SET: u64 = 20000;
    /// Overwriting a non-zero slot
    pub const SSTORE_RESET: u64 = 2900;
    /// LOG base
    pub const LOG: u64 = 375;
    /// LOG per topic
    pub const LOG_TOPIC: u64 = 375;
    /// LOG per data byte
    pub const LOG_DATA: u64 = 8;
    /// Per byte of deployed runtime code
    pub const CODE_DEPOSIT: u64 = 200;
    /// Max stack depth
    pub const MAX_STACK_SIZE: usize = 1024;
    /// Max deployed code size (EIP-170)
    pub const MAX_CODE_SIZE: usize = 24576;
}

/// Static cost of an opcode; `None` if the interpreter does not implement it
pub fn static_gas(op: u8) -> Option<u64> {
    let cost = match op {
        STOP | RETURN | REVERT => cost::ZERO,
        // SLOAD, SSTORE and LOG charge dynamically
        SLOAD | SSTORE => cost::ZERO,
        LOG0..=LOG4 => cost::ZERO,

        ADDRESS | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE | COINBASE
        | TIMESTAMP | NUMBER | GASLIMIT | CHAINID | BASEFEE | POP | PC | MSIZE | GAS
        | PUSH0 => cost::BASE,

        ADD | SUB | NOT | LT | GT | EQ | ISZERO | AND | OR | XOR | SHL | SHR
        | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | CALLDATACOPY | CODECOPY => cost::VERYLOW,
        PUSH1..=PUSH32 | DUP1..=DUP16 | SWAP1..=SWAP16 => cost::VERYLOW,

        MUL | DIV | MOD | SELFBALANCE => cost::LOW,
        JUMP => cost::MID,
        JUMPI => cost::HIGH,
        JUMPDEST => cost::JUMPDEST,
        EXP => cost::EXP,
        KECCAK256 => cost::SHA3,
        _ => return None,
    };
    Some(cost)
}

/// Cost of growing memory from `current` to `new` bytes
pub fn memory_gas(current: usize, new: usize) -> u64 {
    if new <= current {
        return 0;
    }
    memory_cost(new.div_ceil(32)).saturating_sub(memory_cost(current.div_ceil(32)))
}

fn memory_cost(words: usize) -> u64 {
    let words = words as u64;
    cost::MEMORY * words + words * words / 512
}

/// CALLDATACOPY / CODECOPY per-word cost
pub fn copy_gas(len: usize) -> u64 {
    cost::COPY * len.div_ceil(32) as u64
}

/// KECCAK256 per-word cost (on top of the static base)
pub fn sha3_word_gas(len: usize) -> u64 {
    cost::SHA3_WORD * len.div_ceil(32) as u64
}

/// EXP per-byte cost (on top of the static base)
pub fn exp_byte_gas(exponent_bits: usize) -> u64 {
    cost::EXP_BYTE * exponent_bits.div_ceil(8) as u64
}

/// Full LOG cost
pub fn log_gas(topics: usize, data_len: usize) -> u64 {
    cost::LOG + cost::LOG_TOPIC * topics as u64 + cost::LOG_DATA * data_len as u64
}

/// SSTORE cost given the slot's current value and warmth
pub fn sstore_gas(current_is_zero: bool, unchanged: bool, warm: bool) -> u64 {
    let access = if warm { 0 } else { cost::COLD_SLOAD };
    let write = if unchanged {
        cost::WARM_ACCESS
    } else if current_is_zero {
        cost::SSTORE_SET
    } else {
        cost::SSTORE_RESET
    };
    access + write
}
