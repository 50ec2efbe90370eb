use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
#[non_exhaustive]
/// Fault representation for the interpreter.
///
/// Faults are terminal: a handler that raises one stops the VM and the host
/// must reset or explicitly clear the fault before stepping again. Each
/// variant has a stable discriminant; the engine reports `-(fault as i32)`
/// as its exit code.
pub enum Fault {
    /// A push would exceed the configured stack limit.
    StackOverflow = 0x01,
    /// A pop was attempted on an empty (or too shallow) stack.
    StackUnderflow = 0x02,
    /// The return-address stack is full.
    RetStackOverflow = 0x03,
    /// `RT` executed with no saved frame to return to.
    RetStackUnderflow = 0x04,
    /// A local variable index is outside `0..LOCALS_SIZE`.
    LocalsOob = 0x05,
    /// A global variable index is outside `0..GLOBALS_SIZE`.
    GlobalsOob = 0x06,
    /// The program counter left the code buffer, or a jump target fell
    /// outside the token map.
    PcOob = 0x07,
    /// Division with a zero divisor.
    DivByZero = 0x08,
    /// Modulo with a zero divisor.
    ModByZero = 0x09,
    /// The decoded opcode has no handler.
    UnknownOp = 0x0a,
    /// The step counter exceeded the configured step limit.
    StepLimit = 0x0b,
    /// Metered gas exceeded the configured gas limit.
    GasExhausted = 0x0c,
    /// A varint was truncated, unterminated, or over-wide, or the program
    /// counter landed inside an operand.
    BadEncoding = 0x0d,
    /// Device I/O without the corresponding capability bit.
    Unauthorized = 0x0e,
    /// An operand value had the wrong tag for the operation.
    TypeMismatch = 0x0f,
    /// An array access fell outside the array length.
    IndexOob = 0x10,
    /// An invalid argument, e.g. a non-positive allocation size or a
    /// capability id above 255.
    BadArg = 0x11,
    /// The heap could not satisfy an allocation.
    Oom = 0x12,
    /// An assertion opcode failed.
    AssertFailed = 0x13,
    /// A breakpoint paused execution.
    Breakpoint = 0x14,
    /// A single-step pause was reported as a fault.
    DebugStep = 0x15,
    /// A call would exceed the configured call depth limit.
    CallDepthLimit = 0x16,
}

impl Fault {
    /// Stable short identifier for diagnostics, e.g. `"STACK_OVERFLOW"`.
    pub const fn name(&self) -> &'static str {
        match self {
            Fault::StackOverflow => "STACK_OVERFLOW",
            Fault::StackUnderflow => "STACK_UNDERFLOW",
            Fault::RetStackOverflow => "RET_STACK_OVERFLOW",
            Fault::RetStackUnderflow => "RET_STACK_UNDERFLOW",
            Fault::LocalsOob => "LOCAL_OOB",
            Fault::GlobalsOob => "GLOBAL_OOB",
            Fault::PcOob => "PC_OOB",
            Fault::DivByZero => "DIV_BY_ZERO",
            Fault::ModByZero => "MOD_BY_ZERO",
            Fault::UnknownOp => "BAD_OPCODE",
            Fault::StepLimit => "STEP_LIMIT",
            Fault::GasExhausted => "GAS_LIMIT",
            Fault::BadEncoding => "BAD_VARINT",
            Fault::Unauthorized => "UNAUTHORIZED_IO",
            Fault::TypeMismatch => "TYPE_MISMATCH",
            Fault::IndexOob => "ARRAY_OOB",
            Fault::BadArg => "BAD_ARG",
            Fault::Oom => "OOM",
            Fault::AssertFailed => "ASSERT_FAILED",
            Fault::Breakpoint => "BREAKPOINT",
            Fault::DebugStep => "DEBUG_STEP",
            Fault::CallDepthLimit => "CALL_DEPTH_LIMIT",
        }
    }

    /// Negative exit code reported by the engine for this fault.
    pub const fn code(&self) -> i32 {
        -(*self as i32)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn discriminants_are_dense_and_stable() {
        let mut expected = 1u8;
        for fault in Fault::iter() {
            assert_eq!(fault as u8, expected);
            expected += 1;
        }
        assert_eq!(expected, 0x17);
    }

    #[test]
    fn names_are_unique() {
        let names: Vec<_> = Fault::iter().map(|f| f.name()).collect();
        let mut dedup = names.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(names.len(), dedup.len());
    }

    #[test]
    fn exit_codes_are_negative() {
        assert_eq!(Fault::StackOverflow.code(), -1);
        assert_eq!(Fault::CallDepthLimit.code(), -22);
    }
}
