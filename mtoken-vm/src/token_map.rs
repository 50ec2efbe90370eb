//! Opcode token index map.
//!
//! Jump offsets are measured in opcode-index units, so the engine needs a
//! bidirectional map between token indices and byte offsets. The map is
//! built in one decoding walk over the buffer and rebuilt whenever
//! lowering replaces the code.

use mtoken_asm::{Fault, Instruction};

/// Token index ⇄ byte offset maps for one code buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenMap {
    offsets: Vec<usize>,
    byte_to_token: Vec<Option<u32>>,
}

impl TokenMap {
    /// Walk `code`, assigning sequential indices to every opcode boundary.
    ///
    /// Bytes inside operands map to no token. Fails with
    /// [`Fault::BadEncoding`] when any instruction does not decode
    /// cleanly, or when the buffer is empty.
    pub fn build(code: &[u8]) -> Result<Self, Fault> {
        if code.is_empty() {
            return Err(Fault::BadEncoding);
        }

        let mut offsets = Vec::new();
        let mut byte_to_token = vec![None; code.len()];

        let mut pc = 0;
        while pc < code.len() {
            byte_to_token[pc] = Some(offsets.len() as u32);
            offsets.push(pc);
            Instruction::skip(code, &mut pc)?;
        }

        Ok(Self {
            offsets,
            byte_to_token,
        })
    }

    /// Number of opcodes in the buffer.
    pub fn token_count(&self) -> usize {
        self.offsets.len()
    }

    /// Byte offset of token `idx`.
    pub fn offset_of(&self, idx: usize) -> Option<usize> {
        self.offsets.get(idx).copied()
    }

    /// Token index starting at byte offset `pc`, absent when `pc` lies
    /// inside an operand or past the end.
    pub fn token_at(&self, pc: usize) -> Option<usize> {
        self.byte_to_token.get(pc).copied().flatten().map(|t| t as usize)
    }

    /// Resolve a token-relative jump: `base` is the index of the opcode
    /// after the jump, `offset` the decoded signed distance. Returns the
    /// byte offset of the target opcode when it is in range.
    pub fn resolve_jump(&self, base: usize, offset: i32) -> Option<usize> {
        let target = base as i64 + i64::from(offset);
        if target < 0 || target >= self.offsets.len() as i64 {
            return None;
        }
        self.offset_of(target as usize)
    }
}
