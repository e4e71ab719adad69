//! Contract artifacts assembled from opcodes
//!
//! No Solidity compiler is involved; each contract is written against the
//! [`Assembler`] and deployed as init code that returns its runtime.
//!
//! # Payments
//!
//! ```solidity
//! contract Payments {
//!     struct Payment { string message; address from; uint256 amount; uint256 timestamp; }
//!     mapping(address => Payment[]) payments;
//!     function pay(string calldata message) external payable;
//!     function currentBalance() external view returns (uint256);
//!     function getPayment(address from, uint256 index) external view returns (Payment memory);
//! }
//! ```
//!
//! Storage:
//!
//! - `keccak(pad(from) ++ pad(0))` holds the number of payments from `from`
//! - payment `i` occupies four slots from `keccak(length slot) + 4 * i`:
//!   message length, sender, amount, timestamp
//! - message words live at `keccak(payment base) + j`
//!
//! # Demo
//!
//! ```solidity
//! contract Demo {
//!     address public owner;
//!     event Paid(address indexed from, uint256 amount);
//!     constructor() { owner = msg.sender; }
//!     receive() external payable { emit Paid(msg.sender, msg.value); }
//! }
//! ```

use ethflow_evm::opcode::*;
use ethflow_evm::{AsmError, Assembler};
use ethflow_sdk::abi::{event_topic, function_selector};

/// `pay(string)`
pub const PAY: &str = "pay(string)";
/// `currentBalance()`
pub const CURRENT_BALANCE: &str = "currentBalance()";
/// `getPayment(address,uint256)`
pub const GET_PAYMENT: &str = "getPayment(address,uint256)";
/// `owner()`
pub const OWNER: &str = "owner()";
/// `Paid(address,uint256)`
pub const PAID_EVENT: &str = "Paid(address,uint256)";

// Payments memory: 0x00..0x40 hashing scratch, locals below OUT, output from OUT
const DATA_START: u64 = 0x80;
const MSG_LEN: u64 = 0xa0;
const BASE: u64 = 0xc0;
const DATA_BASE: u64 = 0xe0;
const INDEX: u64 = 0x100;
const WORDS: u64 = 0x120;
const OUT: u64 = 0x200;

/// Jump to `label` when the selector on the stack equals `signature`'s
fn dispatch(asm: &mut Assembler, signature: &str, label: &str) {
    asm.op(DUP1)
        .push_bytes(&function_selector(signature))
        .op(EQ)
        .push_label(label)
        .op(JUMPI);
}

/// `keccak256(memory[0..len])` onto the stack
fn hash_scratch(asm: &mut Assembler, len: u64) {
    asm.push_u64(len).push_u64(0).op(KECCAK256);
}

/// `local += 1`
fn increment(asm: &mut Assembler, local: u64) {
    asm.push_u64(1).push_u64(local).op(MLOAD).op(ADD).push_u64(local).op(MSTORE);
}

/// Payments runtime code
pub fn payments_runtime() -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new();

    asm.push_u64(4).op(CALLDATASIZE).op(LT).push_label("fail").op(JUMPI);
    asm.push_u64(0).op(CALLDATALOAD).push_u64(224).op(SHR);
    dispatch(&mut asm, PAY, "pay");
    dispatch(&mut asm, CURRENT_BALANCE, "balance");
    dispatch(&mut asm, GET_PAYMENT, "get");
    asm.label("fail").push_u64(0).push_u64(0).op(REVERT);

    // currentBalance()
    asm.label("balance")
        .op(SELFBALANCE)
        .push_u64(0)
        .op(MSTORE)
        .push_u64(32)
        .push_u64(0)
        .op(RETURN);

    // pay(string)
    asm.label("pay");
    // message offset, length and data start
    asm.push_u64(4).op(CALLDATALOAD).push_u64(4).op(ADD);
    asm.op(DUP1).op(CALLDATALOAD).push_u64(MSG_LEN).op(MSTORE);
    asm.push_u64(32).op(ADD).push_u64(DATA_START).op(MSTORE);
    // length slot of payments[msg.sender]
    asm.op(CALLER).push_u64(0).op(MSTORE);
    asm.push_u64(0).push_u64(32).op(MSTORE);
    hash_scratch(&mut asm, 64);
    // length += 1, keeping the old length as the index
    asm.op(DUP1).op(SLOAD);
    asm.op(DUP1).push_u64(1).op(ADD).op(DUP3).op(SSTORE);
    asm.op(SWAP1).push_u64(0).op(MSTORE);
    hash_scratch(&mut asm, 32);
    asm.op(SWAP1).push_u64(4).op(MUL).op(ADD).push_u64(BASE).op(MSTORE);
    // fixed fields
    asm.op(CALLER).push_u64(BASE).op(MLOAD).push_u64(1).op(ADD).op(SSTORE);
    asm.op(CALLVALUE).push_u64(BASE).op(MLOAD).push_u64(2).op(ADD).op(SSTORE);
    asm.op(TIMESTAMP).push_u64(BASE).op(MLOAD).push_u64(3).op(ADD).op(SSTORE);
    asm.push_u64(MSG_LEN).op(MLOAD).push_u64(BASE).op(MLOAD).op(SSTORE);
    // message words
    asm.push_u64(BASE).op(MLOAD).push_u64(0).op(MSTORE);
    hash_scratch(&mut asm, 32);
    asm.push_u64(DATA_BASE).op(MSTORE);
    asm.push_u64(32).push_u64(31).push_u64(MSG_LEN).op(MLOAD).op(ADD).op(DIV);
    asm.push_u64(WORDS).op(MSTORE);
    asm.push_u64(0).push_u64(INDEX).op(MSTORE);
    asm.label("pay_loop");
    asm.push_u64(WORDS).op(MLOAD).push_u64(INDEX).op(MLOAD).op(LT).op(ISZERO);
    asm.push_label("pay_done").op(JUMPI);
    asm.push_u64(INDEX).op(MLOAD).push_u64(32).op(MUL).push_u64(DATA_START).op(MLOAD).op(ADD);
    asm.op(CALLDATALOAD);
    asm.push_u64(INDEX).op(MLOAD).push_u64(DATA_BASE).op(MLOAD).op(ADD).op(SSTORE);
    increment(&mut asm, INDEX);
    asm.push_label("pay_loop").op(JUMP);
    asm.label("pay_done").op(STOP);

    // getPayment(address,uint256)
    asm.label("get");
    asm.push_u64(4).op(CALLDATALOAD).push_u64(0).op(MSTORE);
    asm.push_u64(0).push_u64(32).op(MSTORE);
    hash_scratch(&mut asm, 64);
    // index < length
    asm.op(DUP1).op(SLOAD).push_u64(36).op(CALLDATALOAD).op(LT);
    asm.push_label("in_range").op(JUMPI);
    asm.push_u64(0).push_u64(0).op(REVERT);
    asm.label("in_range");
    asm.push_u64(0).op(MSTORE);
    hash_scratch(&mut asm, 32);
    asm.push_u64(36).op(CALLDATALOAD).push_u64(4).op(MUL).op(ADD).push_u64(BASE).op(MSTORE);
    // head: tuple offset, then (string offset, from, amount, timestamp)
    asm.push_u64(0x20).push_u64(OUT).op(MSTORE);
    asm.push_u64(0x80).push_u64(OUT + 0x20).op(MSTORE);
    for (field, at) in [(1u64, OUT + 0x40), (2, OUT + 0x60), (3, OUT + 0x80)] {
        asm.push_u64(BASE).op(MLOAD).push_u64(field).op(ADD).op(SLOAD).push_u64(at).op(MSTORE);
    }
    // string length and word count
    asm.push_u64(BASE).op(MLOAD).op(SLOAD).op(DUP1).push_u64(OUT + 0xa0).op(MSTORE);
    asm.push_u64(31).op(ADD).push_u64(32).op(SWAP1).op(DIV).push_u64(WORDS).op(MSTORE);
    asm.push_u64(BASE).op(MLOAD).push_u64(0).op(MSTORE);
    hash_scratch(&mut asm, 32);
    asm.push_u64(DATA_BASE).op(MSTORE);
    asm.push_u64(0).push_u64(INDEX).op(MSTORE);
    asm.label("get_loop");
    asm.push_u64(WORDS).op(MLOAD).push_u64(INDEX).op(MLOAD).op(LT).op(ISZERO);
    asm.push_label("get_done").op(JUMPI);
    asm.push_u64(INDEX).op(MLOAD).push_u64(DATA_BASE).op(MLOAD).op(ADD).op(SLOAD);
    asm.push_u64(INDEX).op(MLOAD).push_u64(32).op(MUL).push_u64(OUT + 0xc0).op(ADD).op(MSTORE);
    increment(&mut asm, INDEX);
    asm.push_label("get_loop").op(JUMP);
    asm.label("get_done");
    asm.push_u64(WORDS).op(MLOAD).push_u64(32).op(MUL).push_u64(0xc0).op(ADD);
    asm.push_u64(OUT).op(RETURN);

    asm.assemble()
}

/// Payments init code
pub fn payments_bytecode() -> Result<Vec<u8>, AsmError> {
    let runtime = payments_runtime()?;
    Assembler::new().return_runtime(&runtime).assemble()
}

/// Demo runtime code
pub fn demo_runtime() -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new();

    asm.op(CALLDATASIZE).op(ISZERO).push_label("receive").op(JUMPI);
    asm.push_u64(0).op(CALLDATALOAD).push_u64(224).op(SHR);
    dispatch(&mut asm, OWNER, "owner");
    asm.push_u64(0).push_u64(0).op(REVERT);

    asm.label("owner")
        .push_u64(0)
        .op(SLOAD)
        .push_u64(0)
        .op(MSTORE)
        .push_u64(32)
        .push_u64(0)
        .op(RETURN);

    // emit Paid(msg.sender, msg.value)
    asm.label("receive")
        .op(CALLVALUE)
        .push_u64(0)
        .op(MSTORE)
        .op(CALLER)
        .push_bytes(event_topic(PAID_EVENT).as_bytes())
        .push_u64(32)
        .push_u64(0)
        .op(LOG2)
        .op(STOP);

    asm.assemble()
}

/// Demo init code: records the deployer as owner
pub fn demo_bytecode() -> Result<Vec<u8>, AsmError> {
    let runtime = demo_runtime()?;
    Assembler::new()
        .op(CALLER)
        .push_u64(0)
        .op(SSTORE)
        .return_runtime(&runtime)
        .assemble()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifacts_assemble() {
        let payments = payments_bytecode().unwrap();
        assert!(payments.ends_with(&payments_runtime().unwrap()));
        let demo = demo_bytecode().unwrap();
        assert!(demo.ends_with(&demo_runtime().unwrap()));
    }

    #[test]
    fn test_selectors() {
        assert_eq!(function_selector(OWNER), [0x8d, 0xa5, 0xcb, 0x5b]);
        assert_ne!(function_selector(PAY), function_selector(GET_PAYMENT));
    }
}
