//! Fetch-decode-dispatch loop and the host entry points.

use mtoken_asm::{Fault, Instruction};
use tracing::trace;

use super::Vm;
use crate::gas;
use crate::hooks::Hooks;
use crate::state::{DebugEval, SimResult, StepResult, TraceEntry};
use crate::value::Value;

impl<H: Hooks> Vm<H> {
    /// Execute a single instruction.
    ///
    /// Exit codes: `Continue` while runnable, `Halted` on a clean stop
    /// (including debug pauses), `Fault` otherwise.
    pub fn step(&mut self) -> StepResult {
        if !self.running {
            return self.stop_result();
        }

        if self.pc >= self.code.len() {
            return self.fault_out(Fault::PcOob);
        }

        self.steps += 1;
        if self.step_limit > 0 && self.steps > self.step_limit {
            return self.fault_out(Fault::StepLimit);
        }

        self.last_pc = Some(self.pc);
        self.last_op_index = match self.token_map.token_at(self.pc) {
            Some(index) => Some(index),
            // Every reachable pc must land on an opcode boundary.
            None => return self.fault_out(Fault::BadEncoding),
        };

        if let DebugEval::Break(breakpoint) = self.debugger.eval_state(self.pc) {
            trace!(pc = breakpoint.pc(), id = breakpoint.id(), "breakpoint pause");
            // Undo the fetch accounting; the instruction did not execute.
            self.steps -= 1;
            return self.fault_out(Fault::Breakpoint);
        }

        // Arming observed before dispatch: the pause lands after the
        // instruction that follows STEP, not after STEP itself.
        let pause_after = self.debugger.single_stepping();

        let mut pc = self.pc;
        let inst = match Instruction::decode(&self.code, &mut pc) {
            Ok(inst) => inst,
            Err(fault) => return self.fault_out(fault),
        };
        self.pc = pc;
        self.last_op = inst.op();

        let Some(repr) = inst.repr() else {
            return self.fault_out(Fault::UnknownOp);
        };

        if self.gas_limit > 0 {
            self.gas += gas::cost(repr);
            if self.gas > self.gas_limit {
                return self.fault_out(Fault::GasExhausted);
            }
        }

        if let Err(fault) = self.dispatch(inst) {
            return self.fault_out(fault);
        }

        if pause_after {
            self.debugger.set_single_stepping(false);
            self.running = false;
        }

        if !self.running {
            return self.stop_result();
        }
        StepResult::Continue
    }

    fn dispatch(&mut self, inst: Instruction) -> Result<(), Fault> {
        use Instruction::*;

        match inst {
            B | PH | DO => Ok(()),
            E => self.op_block_end(),
            IF => self.op_if(),
            WH | FR => self.op_structured_loop(),
            FN(_) => self.op_fn(),
            RT => self.op_ret(),
            CL(func_id, argc) => self.enter_function(func_id, argc),

            LIT(literal) => self.op_lit(literal),
            V(index) => self.op_local_get(index),
            LET(index) => self.op_local_set(index),
            SET(index) => self.op_global_set(index),

            LT => self.alu_binary(|a, b| i64::from(a < b)),
            GT => self.alu_binary(|a, b| i64::from(a > b)),
            LE => self.alu_binary(|a, b| i64::from(a <= b)),
            GE => self.alu_binary(|a, b| i64::from(a >= b)),
            EQ => self.op_eq(),
            NEQ => self.op_neq(),

            ADD => self.alu_binary(i64::wrapping_add),
            SUB => self.alu_binary(i64::wrapping_sub),
            MUL => self.alu_binary(i64::wrapping_mul),
            DIV => self.alu_divmod(Fault::DivByZero, i64::wrapping_div),
            MOD => self.alu_divmod(Fault::ModByZero, i64::wrapping_rem),
            AND => self.alu_binary(|a, b| a & b),
            OR => self.alu_binary(|a, b| a | b),
            XOR => self.alu_binary(|a, b| a ^ b),
            SHL => self.alu_binary(|a, b| a.wrapping_shl((b & 63) as u32)),
            SHR => self.alu_binary(|a, b| a.wrapping_shr((b & 63) as u32)),
            NEG => self.alu_unary(i64::wrapping_neg),
            NOT => self.alu_unary(|a| !a),

            LEN => self.op_len(),
            GET | GET_ALIAS | IDX => self.op_get(),
            PUT | PUT_ALIAS | STO => self.op_put(),
            SWP | SWP_ALIAS => self.op_swp(),
            DUP => self.op_dup(),
            DRP => self.op_drp(),
            ROT => self.op_rot(),
            NEWARR => self.op_newarr(),
            ALLOC => self.op_alloc(),
            FREE => self.op_free(),

            IOW(device) => self.op_iow(device),
            IOR(device) => self.op_ior(device),
            GTWAY(key) => self.op_gtway(key),
            WAIT(ms) => self.op_wait(ms),
            TRACE(level) => self.op_trace(level),

            HALT => {
                self.running = false;
                Ok(())
            }

            JMP(offset) => self.jump(offset),
            JZ(offset) => self.op_jz(offset),
            JNZ(offset) => self.op_jnz(offset),
            // Internal IR forms; same token-relative resolution.
            DWHL(offset) => self.op_jnz(offset),
            WHIL(offset) => self.op_jz(offset),

            GC => {
                self.gc();
                Ok(())
            }
            BP(id) => self.op_bp(id),
            STEP => self.op_step(),

            UNDEF(_) => Err(Fault::UnknownOp),
        }
    }

    /// Run from a cleared interpreter state until stop or fault.
    pub fn run(&mut self) -> StepResult {
        self.reset();
        self.running = true;

        while self.running && self.pc < self.code.len() {
            let result = self.step();
            if !result.should_continue() {
                return result;
            }
        }

        self.running = false;
        self.stop_result()
    }

    /// Continue a paused execution without clearing state. Clears a
    /// breakpoint pause first, so `resume` after a `Fault::Breakpoint`
    /// steps past the paused instruction.
    pub fn resume(&mut self) -> StepResult {
        if self.fault == Some(Fault::Breakpoint) {
            self.clear_fault();
        }
        if self.fault.is_some() {
            return self.stop_result();
        }
        self.running = true;

        while self.running && self.pc < self.code.len() {
            let result = self.step();
            if !result.should_continue() {
                return result;
            }
        }

        self.running = false;
        self.stop_result()
    }

    /// Run from a cleared state, recording a bounded execution trace.
    pub fn simulate(&mut self) -> SimResult {
        self.reset();
        self.running = true;

        let mut result = SimResult::default();

        while self.running && self.pc < self.code.len() {
            let prev_pc = self.pc;
            let outcome = self.step();

            result.record(TraceEntry {
                step: self.steps,
                pc: prev_pc,
                op: self.last_op,
                sp: self.sp(),
                stack_top: self.stack_top().map_or(0, Value::to_int),
            });

            if !outcome.should_continue() {
                return self.finish_sim(result);
            }
        }

        self.running = false;
        self.finish_sim(result)
    }

    fn finish_sim(&self, mut result: SimResult) -> SimResult {
        result.halted = true;
        result.fault = self.fault;
        result.steps = self.steps;
        result.sp = self.sp();
        result.result = self.stack_top().map_or(0, Value::to_int);
        result.completed = self.fault.is_none();
        result
    }

    /// Call the function whose `FN` opcode sits at byte offset `func_id`,
    /// driving execution until it returns. Arguments are pushed in
    /// reverse so `args[i]` binds to local `i`; the return value is left
    /// on top of the stack.
    pub fn call(&mut self, func_id: u32, args: &[Value]) -> StepResult {
        if self.fault.is_some() {
            return self.stop_result();
        }

        if let Err(fault) = self.need_space(args.len()) {
            return self.fault_out(fault);
        }
        for arg in args.iter().rev() {
            self.push_unchecked(arg.clone());
        }

        // Return-to-end sentinel: RT lands past the buffer and the drive
        // loop stops cleanly.
        self.pc = self.code.len();
        if let Err(fault) = self.enter_function(func_id, args.len() as u32) {
            return self.fault_out(fault);
        }
        self.running = true;

        while self.running && self.pc < self.code.len() {
            let result = self.step();
            if !result.should_continue() {
                return result;
            }
        }

        self.running = false;
        self.stop_result()
    }

    /// Execute `[start_pc, end_pc)` with the surrounding program counter
    /// saved and restored.
    pub fn exec_block(&mut self, start_pc: usize, end_pc: usize) -> StepResult {
        let saved_pc = self.pc;
        self.pc = start_pc;
        self.running = true;

        while self.running && self.pc < end_pc.min(self.code.len()) {
            let result = self.step();
            if !result.should_continue() {
                self.pc = saved_pc;
                return result;
            }
        }

        self.pc = saved_pc;
        StepResult::Continue
    }

    fn fault_out(&mut self, fault: Fault) -> StepResult {
        self.fault = Some(fault);
        self.running = false;
        StepResult::Fault(fault)
    }

    fn stop_result(&self) -> StepResult {
        match self.fault {
            Some(fault) => StepResult::Fault(fault),
            None => StepResult::Halted,
        }
    }
}
