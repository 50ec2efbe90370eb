//! Atomic types of the M-Token VM.
//!
//! This crate holds everything about the bytecode format that does not
//! require interpreter state: the varint/zigzag codec, the numeric opcode
//! catalog, the decoded instruction representation with its operand
//! shapes, and the closed fault taxonomy shared between the engine and the
//! static validator.

#![warn(missing_docs)]

pub mod encoding;

mod fault;
mod instruction;
mod opcode;

pub use fault::Fault;
pub use instruction::Instruction;
pub use opcode::{opcode_name, OpcodeRepr};
