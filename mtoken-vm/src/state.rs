//! Runtime state representation for the VM.

use mtoken_asm::Fault;

use crate::consts::MAX_TRACE;

mod debugger;

pub use debugger::{Breakpoint, DebugEval, Debugger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Coarse execution state reported to the host.
pub enum VmState {
    /// Not running; either never started or stopped cleanly.
    Stopped,
    /// Between steps of an active execution.
    Running,
    /// Parked on a fault; stepping requires a reset or an explicit clear.
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Outcome of a `step`, `run`, `call`, or `exec_block` entry.
pub enum StepResult {
    /// Execution can continue.
    Continue,
    /// Execution stopped cleanly (`HALT`, end of code, or a debug pause).
    Halted,
    /// Execution stopped on a fault.
    Fault(Fault),
}

impl StepResult {
    /// Integer exit code: 0 to continue, 1 for a clean stop, negative
    /// fault code otherwise.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Continue => 0,
            Self::Halted => 1,
            Self::Fault(fault) => fault.code(),
        }
    }

    /// Whether the VM may be stepped again without intervention.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// The fault, if this outcome carries one.
    pub const fn fault(&self) -> Option<Fault> {
        match self {
            Self::Fault(fault) => Some(*fault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One executed instruction as recorded by `simulate`.
pub struct TraceEntry {
    /// Step counter after the instruction executed.
    pub step: u64,
    /// Byte offset the instruction was fetched from.
    pub pc: usize,
    /// Raw opcode number.
    pub op: u32,
    /// Stack index of the top element after execution; `-1` when empty.
    pub sp: i32,
    /// Integer view of the top of stack after execution; 0 when empty.
    pub stack_top: i64,
}

#[derive(Debug, Clone, Default)]
/// Result of a full simulation run.
pub struct SimResult {
    /// True when execution stopped without a fault.
    pub completed: bool,
    /// True when execution stopped for any reason.
    pub halted: bool,
    /// Terminal fault, if any.
    pub fault: Option<Fault>,
    /// Steps executed.
    pub steps: u64,
    /// Integer view of the top of stack at stop; 0 when empty.
    pub result: i64,
    /// Stack index of the top element at stop; `-1` when empty.
    pub sp: i32,
    /// Execution trace, capped at [`MAX_TRACE`] entries.
    pub trace: Vec<TraceEntry>,
}

impl SimResult {
    pub(crate) fn record(&mut self, entry: TraceEntry) {
        if self.trace.len() < MAX_TRACE {
            self.trace.push(entry);
        }
    }
}
