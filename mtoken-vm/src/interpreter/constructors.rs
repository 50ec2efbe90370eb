use tracing::debug;

use super::Vm;
use crate::caps::CapabilitySet;
use crate::consts::*;
use crate::error::VmError;
use crate::heap::Heap;
use crate::hooks::{Hooks, NopHooks};
use crate::lower;
use crate::state::Debugger;
use crate::token_map::TokenMap;
use crate::value::Value;

impl Vm<NopHooks> {
    /// Construct a VM with no host hooks.
    pub fn new(code: Vec<u8>) -> Result<Self, VmError> {
        Self::with_hooks(code, NopHooks)
    }
}

impl<H: Hooks> Vm<H> {
    /// Construct a VM from a code buffer and a hook table.
    ///
    /// Construction lowers structured loops and builds the token map; the
    /// buffer the VM executes afterwards is loop-free.
    pub fn with_hooks(code: Vec<u8>, hooks: H) -> Result<Self, VmError> {
        let code = match lower::lower(&code).map_err(VmError::Lowering)? {
            Some(lowered) => {
                debug!(
                    original_len = code.len(),
                    lowered_len = lowered.len(),
                    "structured loops lowered"
                );
                lowered
            }
            None => code,
        };

        let token_map = TokenMap::build(&code).map_err(VmError::TokenMap)?;

        Ok(Self {
            code,
            pc: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            ret_stack: Vec::with_capacity(RET_STACK_SIZE),
            locals: vec![Value::default(); LOCALS_SIZE],
            locals_frames: Vec::with_capacity(RET_STACK_SIZE),
            globals: vec![Value::default(); GLOBALS_SIZE],
            heap: Heap::new(),
            caps: CapabilitySet::new(),
            token_map,
            debugger: Debugger::default(),
            hooks,
            running: false,
            fault: None,
            last_pc: None,
            last_op: 0,
            last_op_index: None,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            gas: 0,
            gas_limit: 0,
            call_depth: 0,
            call_depth_limit: CALL_DEPTH_MAX,
            stack_limit: STACK_SIZE,
        })
    }

    /// Zero the interpreter state, preserving code, hooks, limits, the
    /// heap, breakpoints, and the token map.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.stack.clear();
        self.ret_stack.clear();
        self.locals.fill_with(Value::default);
        self.locals_frames.clear();
        self.globals.fill_with(Value::default);
        self.caps.clear();
        self.running = false;
        self.fault = None;
        self.last_pc = None;
        self.last_op = 0;
        self.last_op_index = None;
        self.steps = 0;
        self.gas = 0;
        self.call_depth = 0;
        self.debugger.clear_transient();
    }

    /// Hard step cap; 0 disables it.
    pub fn set_step_limit(&mut self, limit: u64) {
        self.step_limit = limit;
    }

    /// Metered gas budget; 0 disables billing.
    pub fn set_gas_limit(&mut self, limit: u64) {
        self.gas_limit = limit;
    }

    /// Call depth cap, clamped to `1..=CALL_DEPTH_MAX`.
    pub fn set_call_depth_limit(&mut self, limit: usize) {
        self.call_depth_limit = limit.clamp(1, CALL_DEPTH_MAX);
    }

    /// Runtime stack cap, clamped to `0..=STACK_SIZE`.
    pub fn set_stack_limit(&mut self, limit: usize) {
        self.stack_limit = limit.min(STACK_SIZE);
    }

    /// Enable or disable automatic collection after allocations.
    pub fn gc_enable(&mut self, enabled: bool) {
        self.heap.set_gc_enabled(enabled);
    }

    /// Allocations between automatic collections.
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.heap.set_gc_threshold(threshold);
    }

    /// Reserved: JIT compilation is not provided; this records nothing.
    pub fn jit_enable(&mut self, _enabled: bool) {}

    /// Reserved: JIT compilation is not provided; this records nothing.
    pub fn jit_set_threshold(&mut self, _threshold: usize) {}

    /// Reserved: JIT compilation is not provided. Always reports that the
    /// range was not compiled.
    pub fn jit_compile(&mut self, _start_pc: usize, _end_pc: usize) -> bool {
        false
    }
}
