//! EVM errors and execution results

use ethflow_primitives::{H256, U256};
use ethflow_types::Log;
use thiserror::Error;

/// Reason a frame halted abnormally
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// Gas ran out before the frame halted
    #[error("out of gas")]
    OutOfGas,

    /// Popped below the bottom of the stack
    #[error("stack underflow")]
    StackUnderflow,

    /// Pushed past 1024 items
    #[error("stack limit of 1024 exceeded")]
    StackOverflow,

    /// Jump to a non-JUMPDEST
    #[error("jump to {0}, which is not a JUMPDEST")]
    InvalidJump(usize),

    /// Undefined or unsupported opcode
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// SSTORE or LOG in a read-only call
    #[error("write attempted in a read-only frame")]
    StaticCallViolation,

    /// REVERT with data
    #[error("execution reverted")]
    Revert(Vec<u8>),
}

/// Step-level result inside the interpreter
pub type EvmResult<T> = Result<T, EvmError>;

/// Outcome of running one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the frame completed with STOP/RETURN
    pub success: bool,
    /// Gas consumed, including everything on a non-revert failure
    pub gas_used: u64,
    /// RETURN or REVERT data
    pub output: Vec<u8>,
    /// Logs, empty unless successful
    pub logs: Vec<Log>,
    /// Storage writes of the executing contract, empty unless successful
    pub storage_changes: Vec<(H256, U256)>,
    /// Halt reason for failures
    pub error: Option<EvmError>,
}

impl ExecutionResult {
    /// Successful completion
    pub fn success(
        gas_used: u64,
        output: Vec<u8>,
        logs: Vec<Log>,
        storage_changes: Vec<(H256, U256)>,
    ) -> Self {
        Self { success: true, gas_used, output, logs, storage_changes, error: None }
    }

    /// REVERT: unused gas is returned to the caller
    pub fn revert(gas_used: u64, output: Vec<u8>) -> Self {
        Self {
            success: false,
            gas_used,
            output: output.clone(),
            logs: Vec::new(),
            storage_changes: Vec::new(),
            error: Some(EvmError::Revert(output)),
        }
    }

    /// Exceptional halt: all gas is consumed
    pub fn halt(gas_limit: u64, error: EvmError) -> Self {
        Self {
            success: false,
            gas_used: gas_limit,
            output: Vec::new(),
            logs: Vec::new(),
            storage_changes: Vec::new(),
            error: Some(error),
        }
    }

    /// Whether the frame ended with REVERT
    pub fn is_revert(&self) -> bool {
        matches!(self.error, Some(EvmError::Revert(_)))
    }
}
