//! M-Token VM interpreter.
//!
//! A sandboxed, gas-metered bytecode interpreter over a variable-length
//! instruction encoding. Structured loops are lowered to flat jumps at
//! load time; execution runs on a tagged-value stack with call frames,
//! heap-allocated arrays under mark-and-sweep collection, and
//! capability-guarded device I/O. A static validator and a symbolic
//! disassembler operate on the same encoding.

#![warn(missing_docs)]

pub mod caps;
pub mod consts;
pub mod disasm;
pub mod error;
pub mod gas;
pub mod heap;
pub mod hooks;
pub mod interpreter;
pub mod lower;
pub mod state;
pub mod token_map;
pub mod validator;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod builder;

pub mod prelude {
    //! Common imports for hosts embedding the VM.

    pub use mtoken_asm::{opcode_name, Fault, Instruction, OpcodeRepr};

    pub use crate::caps::CapabilitySet;
    pub use crate::disasm::disassemble;
    pub use crate::error::VmError;
    pub use crate::heap::{Heap, HeapObject};
    pub use crate::hooks::{Hooks, NopHooks};
    pub use crate::interpreter::Vm;
    pub use crate::state::{
        Breakpoint, DebugEval, Debugger, SimResult, StepResult, TraceEntry, VmState,
    };
    pub use crate::token_map::TokenMap;
    pub use crate::validator::{validate, validate_core_only, ValidatorReport};
    pub use crate::value::{HeapRef, Value};

    #[cfg(any(test, feature = "test-helpers"))]
    pub use crate::builder::{CodeBuilder, FnLabel, JumpSite};
}
