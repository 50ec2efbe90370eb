//! [`Vm`] implementation.

use mtoken_asm::Fault;

use crate::caps::CapabilitySet;
use crate::consts::*;
use crate::heap::Heap;
use crate::hooks::NopHooks;
use crate::state::{Debugger, VmState};
use crate::token_map::TokenMap;
use crate::value::Value;

mod alu;
mod constructors;
mod debug;
mod executors;
mod flow;
mod internal;
mod io;
mod memory;

#[derive(Debug)]
/// M-Token bytecode interpreter.
///
/// A VM owns its (lowered) code buffer, value stack, call frames, heap,
/// capability set and debugger. It is single-threaded by contract:
/// invoking two entry points concurrently on one instance is a caller
/// bug, while independent instances are fully isolated.
pub struct Vm<H = NopHooks> {
    code: Vec<u8>,
    pc: usize,

    stack: Vec<Value>,
    ret_stack: Vec<usize>,

    locals: Vec<Value>,
    locals_frames: Vec<Vec<Value>>,
    globals: Vec<Value>,

    heap: Heap,
    caps: CapabilitySet,
    token_map: TokenMap,
    debugger: Debugger,
    hooks: H,

    running: bool,
    fault: Option<Fault>,
    last_pc: Option<usize>,
    last_op: u32,
    last_op_index: Option<usize>,

    steps: u64,
    step_limit: u64,
    gas: u64,
    gas_limit: u64,
    call_depth: usize,
    call_depth_limit: usize,
    stack_limit: usize,
}

impl<H> Vm<H> {
    /// The code buffer the engine executes; reflects lowering.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Current program counter (byte offset).
    pub const fn pc(&self) -> usize {
        self.pc
    }

    /// Coarse execution state.
    pub fn state(&self) -> VmState {
        if self.fault.is_some() {
            VmState::Fault
        } else if self.running {
            VmState::Running
        } else {
            VmState::Stopped
        }
    }

    /// Terminal fault, if the VM is parked on one.
    pub const fn last_fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Stack index of the top element; `-1` when the stack is empty.
    pub fn sp(&self) -> i32 {
        self.stack.len() as i32 - 1
    }

    /// Steps executed since the last `run`/`reset`.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Gas billed since the last `run`/`reset`.
    pub const fn gas(&self) -> u64 {
        self.gas
    }

    /// Current call depth.
    pub const fn call_depth(&self) -> usize {
        self.call_depth
    }

    /// Copy of the live stack, bottom first.
    pub fn stack_snapshot(&self) -> Vec<Value> {
        self.stack.clone()
    }

    /// Top of stack, if any.
    pub fn stack_top(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// A local in the active frame.
    pub fn local(&self, index: usize) -> Option<&Value> {
        self.locals.get(index)
    }

    /// A global slot.
    pub fn global(&self, index: usize) -> Option<&Value> {
        self.globals.get(index)
    }

    /// The VM-owned heap.
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Debug handler.
    pub const fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// Token index ⇄ byte offset map over the lowered code.
    pub const fn token_map(&self) -> &TokenMap {
        &self.token_map
    }

    pub(crate) fn effective_stack_limit(&self) -> usize {
        self.stack_limit.min(STACK_SIZE)
    }
}

impl<H> AsRef<H> for Vm<H> {
    fn as_ref(&self) -> &H {
        &self.hooks
    }
}

impl<H> AsMut<H> for Vm<H> {
    fn as_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}
