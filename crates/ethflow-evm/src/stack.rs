//! Operand stack

use ethflow_primitives::U256;

use crate::error::{EvmError, EvmResult};
use crate::gas::cost::MAX_STACK_SIZE;

/// EVM stack (max 1024 words)
#[derive(Clone, Debug)]
pub struct Stack {
    data: Vec<U256>,
}

impl Stack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self { data: Vec::with_capacity(MAX_STACK_SIZE) }
    }

    /// Push a word
    pub fn push(&mut self, value: U256) -> EvmResult<()> {
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(EvmError::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    /// Push a u64 as a word
    pub fn push_u64(&mut self, value: u64) -> EvmResult<()> {
        self.push(U256::from(value))
    }

    /// Pop the top word
    pub fn pop(&mut self) -> EvmResult<U256> {
        self.data.pop().ok_or(EvmError::StackUnderflow)
    }

    /// Pop a word that must fit in usize; larger values map to `usize::MAX`
    pub fn pop_usize(&mut self) -> EvmResult<usize> {
        let value = self.pop()?;
        Ok(if value > U256::from(usize::MAX) { usize::MAX } else { value.as_usize() })
    }

    /// Peek at a depth (0 = top)
    pub fn peek(&self, depth: usize) -> EvmResult<&U256> {
        if depth >= self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        Ok(&self.data[self.data.len() - 1 - depth])
    }

    /// Swap the top with the item `depth` below it (1 = second item)
    pub fn swap(&mut self, depth: usize) -> EvmResult<()> {
        let len = self.data.len();
        if depth == 0 || depth >= len {
            return Err(EvmError::StackUnderflow);
        }
        self.data.swap(len - 1, len - 1 - depth);
        Ok(())
    }

    /// Duplicate the item at `depth` onto the top (1 = top)
    pub fn dup(&mut self, depth: usize) -> EvmResult<()> {
        if depth == 0 || depth > self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        let value = self.data[self.data.len() - depth];
        self.push(value)
    }

    /// Current depth
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
