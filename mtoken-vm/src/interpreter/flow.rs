//! Control-flow handlers: structured skips, flat jumps, calls and returns.

use mtoken_asm::encoding::decode_uvarint32;
use mtoken_asm::{Fault, Instruction, OpcodeRepr};

use super::Vm;
use crate::consts::RET_STACK_SIZE;
use crate::value::Value;

impl<H> Vm<H> {
    /// Scan forward from just inside an opening `B` to the byte offset
    /// past its matching `E`, re-decoding varints inline. The token map
    /// is deliberately not consulted, matching the dynamic-skip design.
    pub(crate) fn scan_block_end(&self, mut pc: usize) -> Result<usize, Fault> {
        let mut depth = 1i32;
        while pc < self.code.len() {
            match OpcodeRepr::from_u32(Instruction::skip(&self.code, &mut pc)?) {
                Some(OpcodeRepr::B) => depth += 1,
                Some(OpcodeRepr::E) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(pc);
                    }
                }
                _ => {}
            }
        }
        Err(Fault::PcOob)
    }

    /// `IF`: pops the condition; on false, skips the then-block and the
    /// else-block's opening `B`. On true, execution falls into the then
    /// block and [`Self::op_block_end`] skips the else block at its `E`.
    pub(crate) fn op_if(&mut self) -> Result<(), Fault> {
        self.need(1)?;
        let cond = self.pop()?.to_bool();

        let mut pc = self.pc;
        Instruction::skip(&self.code, &mut pc)?; // then-opening B
        self.pc = pc;

        if !cond {
            let past_then = self.scan_block_end(pc)?;
            let mut pc = past_then;
            Instruction::skip(&self.code, &mut pc)?; // else-opening B
            self.pc = pc;
        }
        Ok(())
    }

    /// `E`: in well-formed structured code an `E` directly followed by a
    /// `B` is exactly the then/else boundary of an `IF`, so a taken then
    /// branch skips the else block here.
    pub(crate) fn op_block_end(&mut self) -> Result<(), Fault> {
        let mut peek = self.pc;
        let Ok(op) = decode_uvarint32(&self.code, &mut peek) else {
            return Ok(());
        };
        if OpcodeRepr::from_u32(op) == Some(OpcodeRepr::B) {
            self.pc = self.scan_block_end(peek)?;
        }
        Ok(())
    }

    /// Legacy `WH`/`FR` runtime form, kept for pre-lowered buffers: pops
    /// the condition; false skips the body, true falls through into it.
    pub(crate) fn op_structured_loop(&mut self) -> Result<(), Fault> {
        self.need(1)?;
        let cond = self.pop()?.to_bool();

        let mut pc = self.pc;
        Instruction::skip(&self.code, &mut pc)?; // opening B
        self.pc = pc;

        if !cond {
            self.pc = self.scan_block_end(pc)?;
        }
        Ok(())
    }

    /// `FN` in straight-line execution skips its own body, so function
    /// definitions may precede the entry point without being entered.
    pub(crate) fn op_fn(&mut self) -> Result<(), Fault> {
        let mut pc = self.pc;
        Instruction::skip(&self.code, &mut pc)?; // opening B
        self.pc = self.scan_block_end(pc)?;
        Ok(())
    }

    /// Resolve a token-relative jump offset and move the program counter.
    pub(crate) fn jump(&mut self, offset: i32) -> Result<(), Fault> {
        let base = self.last_op_index.ok_or(Fault::PcOob)? + 1;
        self.pc = self
            .token_map
            .resolve_jump(base, offset)
            .ok_or(Fault::PcOob)?;
        Ok(())
    }

    pub(crate) fn op_jz(&mut self, offset: i32) -> Result<(), Fault> {
        self.need(1)?;
        if self.pop()?.to_int() == 0 {
            self.jump(offset)?;
        }
        Ok(())
    }

    pub(crate) fn op_jnz(&mut self, offset: i32) -> Result<(), Fault> {
        self.need(1)?;
        if self.pop()?.to_int() != 0 {
            self.jump(offset)?;
        }
        Ok(())
    }

    /// `CL` and the host `call` entry share this: save the locals frame,
    /// bind arguments, push the return address, and land on the first
    /// body opcode past the target's `FN`, arity, and opening `B`.
    ///
    /// Arguments bind top-of-stack first: the value on top becomes local
    /// 0, so callers push arguments in reverse.
    pub(crate) fn enter_function(&mut self, func_id: u32, argc: u32) -> Result<(), Fault> {
        self.need(argc as usize)?;

        if self.call_depth >= self.call_depth_limit {
            return Err(Fault::CallDepthLimit);
        }
        self.call_depth += 1;

        if self.locals_frames.len() >= RET_STACK_SIZE {
            return Err(Fault::RetStackOverflow);
        }
        let fresh = vec![Value::default(); self.locals.len()];
        self.locals_frames
            .push(std::mem::replace(&mut self.locals, fresh));

        for i in 0..argc as usize {
            self.locals[i] = self.pop()?;
        }

        if self.ret_stack.len() >= RET_STACK_SIZE {
            return Err(Fault::RetStackOverflow);
        }
        self.ret_stack.push(self.pc);

        let mut pc = func_id as usize;
        Instruction::skip(&self.code, &mut pc)?; // FN + arity
        Instruction::skip(&self.code, &mut pc)?; // opening B
        if pc >= self.code.len() {
            return Err(Fault::PcOob);
        }
        self.pc = pc;
        Ok(())
    }

    /// `RT`: restore the caller's frame and program counter, re-pushing
    /// the popped return value.
    pub(crate) fn op_ret(&mut self) -> Result<(), Fault> {
        let ret_addr = self.ret_stack.pop().ok_or(Fault::RetStackUnderflow)?;
        if ret_addr > self.code.len() {
            return Err(Fault::PcOob);
        }

        self.need(1)?;
        let ret_val = self.pop()?;

        self.locals = self
            .locals_frames
            .pop()
            .ok_or(Fault::RetStackUnderflow)?;
        self.call_depth = self.call_depth.saturating_sub(1);
        self.pc = ret_addr;
        self.push_unchecked(ret_val);
        Ok(())
    }
}
