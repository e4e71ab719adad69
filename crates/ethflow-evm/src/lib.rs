//! # ethflow-evm
//!
//! EVM execution for the simulated backend.
//!
//! The interpreter runs one call frame against a read-only [`Host`]. Storage
//! writes and logs are buffered in the frame and handed back in the
//! [`ExecutionResult`]; the caller commits them only on success.
//!
//! [`Assembler`] builds bytecode from opcodes with label resolution.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod asm;
mod context;
mod error;
pub mod gas;
mod interpreter;
mod memory;
pub mod opcode;
mod stack;

pub use asm::{AsmError, Assembler};
pub use context::{BlockContext, CallContext, Environment, Host, TxContext};
pub use error::{EvmError, EvmResult, ExecutionResult};
pub use interpreter::Interpreter;
pub use memory::Memory;
pub use stack::Stack;
