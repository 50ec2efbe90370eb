//! Load-time interpreter error implementation.
//!
//! Runtime faults never surface through `Result` — they park the VM in the
//! fault state and are reported through [`StepResult`](crate::state::StepResult)
//! exit codes. `VmError` covers the construction path only, where there is
//! no VM yet to park.

use mtoken_asm::Fault;
use thiserror::Error;

/// Errors raised while constructing a VM from a code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmError {
    /// The structured-loop lowering pass rejected the buffer.
    #[error("loop lowering failed: {0}")]
    Lowering(Fault),
    /// The opcode token map could not be built over the (lowered) buffer.
    #[error("token map construction failed: {0}")]
    TokenMap(Fault),
}

impl VmError {
    /// The underlying fault.
    pub const fn fault(&self) -> Fault {
        match self {
            Self::Lowering(fault) | Self::TokenMap(fault) => *fault,
        }
    }
}
