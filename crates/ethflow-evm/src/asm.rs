//! Bytecode assembler with label resolution

use std::collections::HashMap;

use ethflow_primitives::U256;
use thiserror::Error;

use crate::opcode::{CODECOPY, DUP1, JUMPDEST, PUSH0, PUSH1, PUSH2, RETURN};

/// Assembly errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// Referenced label was never defined
    #[error("unknown label: {0}")]
    UnknownLabel(String),

    /// Label defined twice
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),

    /// PUSH immediate longer than 32 bytes
    #[error("push of {0} bytes exceeds 32")]
    PushTooLong(usize),

    /// Label offset does not fit in a PUSH2
    #[error("label {0} at offset {1} is out of PUSH2 range")]
    OffsetOutOfRange(String, usize),
}

/// Emits bytecode; forward label references are patched in [`Assembler::assemble`]
///
/// ```
/// use ethflow_evm::{opcode, Assembler};
///
/// let mut asm = Assembler::new();
/// asm.push_label("end").op(opcode::JUMP).op(opcode::INVALID).label("end").op(opcode::STOP);
/// assert_eq!(asm.assemble().unwrap(), vec![0x61, 0x00, 0x05, 0x56, 0xfe, 0x5b, 0x00]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    fixups: Vec<(usize, String)>,
    error: Option<AsmError>,
}

impl Assembler {
    /// Empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Emit a bare opcode
    pub fn op(&mut self, op: u8) -> &mut Self {
        self.code.push(op);
        self
    }

    /// Emit several bare opcodes
    pub fn ops(&mut self, ops: &[u8]) -> &mut Self {
        self.code.extend_from_slice(ops);
        self
    }

    /// Push a value with the shortest PUSHn; zero is `PUSH1 0`
    pub fn push(&mut self, value: U256) -> &mut Self {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        let start = word.iter().position(|b| *b != 0).unwrap_or(31);
        self.push_bytes(&word[start..])
    }

    /// Push a small integer
    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.push(U256::from(value))
    }

    /// Push raw big-endian bytes (1 to 32 of them)
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        match bytes.len() {
            0 => {
                self.code.push(PUSH0);
            }
            n @ 1..=32 => {
                self.code.push(PUSH1 + (n as u8 - 1));
                self.code.extend_from_slice(bytes);
            }
            n => self.fail(AsmError::PushTooLong(n)),
        }
        self
    }

    /// Push the offset of a label as a PUSH2, resolved at assembly
    pub fn push_label(&mut self, name: &str) -> &mut Self {
        self.code.push(PUSH2);
        self.fixups.push((self.code.len(), name.to_string()));
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// Emit a JUMPDEST and bind `name` to it
    pub fn label(&mut self, name: &str) -> &mut Self {
        self.mark(name);
        self.code.push(JUMPDEST);
        self
    }

    /// Bind `name` to the current offset without emitting anything
    pub fn mark(&mut self, name: &str) -> &mut Self {
        if self.labels.insert(name.to_string(), self.code.len()).is_some() {
            self.fail(AsmError::DuplicateLabel(name.to_string()));
        }
        self
    }

    /// Append raw bytes
    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Emit init code that returns `runtime` as the deployed code, then
    /// append `runtime` itself
    pub fn return_runtime(&mut self, runtime: &[u8]) -> &mut Self {
        let len = runtime.len() as u64;
        self.push_u64(len)
            .op(DUP1)
            .push_label("__runtime")
            .push_u64(0)
            .op(CODECOPY)
            .push_u64(0)
            .op(RETURN)
            .mark("__runtime")
            .append(runtime)
    }

    /// Resolve labels and return the bytecode
    pub fn assemble(&self) -> Result<Vec<u8>, AsmError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let mut code = self.code.clone();
        for (at, name) in &self.fixups {
            let offset =
                *self.labels.get(name).ok_or_else(|| AsmError::UnknownLabel(name.clone()))?;
            let offset16 = u16::try_from(offset)
                .map_err(|_| AsmError::OffsetOutOfRange(name.clone(), offset))?;
            code[*at..*at + 2].copy_from_slice(&offset16.to_be_bytes());
        }
        Ok(code)
    }

    fn fail(&mut self, error: AsmError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Environment, Host};
    use crate::interpreter::Interpreter;
    use crate::opcode::*;
    use ethflow_primitives::{Address, H256};

    struct EmptyHost;

    impl Host for EmptyHost {
        fn balance(&self, _: &Address) -> U256 {
            U256::zero()
        }

        fn storage(&self, _: &Address, _: &H256) -> U256 {
            U256::zero()
        }
    }

    #[test]
    fn test_minimal_push() {
        let mut asm = Assembler::new();
        asm.push_u64(0).push_u64(0xff).push_u64(0x100).push(U256::MAX);
        let code = asm.assemble().unwrap();
        assert_eq!(&code[..7], &[0x60, 0x00, 0x60, 0xff, 0x61, 0x01, 0x00]);
        assert_eq!(code[7], PUSH32);
        assert_eq!(code.len(), 7 + 33);
    }

    #[test]
    fn test_forward_label() {
        let mut asm = Assembler::new();
        asm.push_label("end").op(JUMP).op(INVALID).label("end").op(STOP);
        assert_eq!(asm.assemble().unwrap(), vec![0x61, 0x00, 0x05, 0x56, 0xfe, 0x5b, 0x00]);
    }

    #[test]
    fn test_unknown_and_duplicate_labels() {
        let mut asm = Assembler::new();
        asm.push_label("nowhere");
        assert_eq!(asm.assemble(), Err(AsmError::UnknownLabel("nowhere".into())));

        let mut asm = Assembler::new();
        asm.label("a").label("a");
        assert_eq!(asm.assemble(), Err(AsmError::DuplicateLabel("a".into())));
    }

    #[test]
    fn test_push_too_long() {
        let mut asm = Assembler::new();
        asm.push_bytes(&[1u8; 33]);
        assert_eq!(asm.assemble(), Err(AsmError::PushTooLong(33)));
    }

    #[test]
    fn test_return_runtime_deploys_runtime() {
        let runtime = [0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];
        let mut asm = Assembler::new();
        asm.return_runtime(&runtime);
        let init = asm.assemble().unwrap();

        let result = Interpreter::new(init, 100_000).run(&Environment::default(), &EmptyHost);
        assert!(result.success);
        assert_eq!(result.output, runtime.to_vec());
    }
}
