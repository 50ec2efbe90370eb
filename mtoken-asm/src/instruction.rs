//! Decoded instruction representation.
//!
//! An instruction is an opcode varint followed by its operand-shape bytes:
//! `LIT` carries one zigzag-encoded 64-bit literal, the index class
//! (`V`/`LET`/`SET`/`GTWAY`/`WAIT`/`IOW`/`IOR`/`TRACE`/`BP`) one unsigned
//! varint, `FN` its arity, `CL` a function byte-offset and an argument
//! count, and the jump class (`JZ`/`JNZ`/`JMP`/`DWHL`/`WHIL`) one signed
//! varint offset measured in opcode-index units relative to the opcode
//! after the jump. Everything else is operand-free.

use crate::encoding::{
    decode_svarint32, decode_svarint64, decode_uvarint32, decode_uvarint64, encode_svarint32,
    encode_svarint64, encode_uvarint32,
};
use crate::{Fault, OpcodeRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
/// A fully decoded instruction: opcode plus immediate operands.
///
/// Decoding accepts any opcode number — bytes that map to no catalog entry
/// become [`Instruction::UNDEF`] with no operands, so tokenization walks
/// arbitrary buffers the same way the runtime does. The runtime faults on
/// `UNDEF`; the static validator merely steps over it.
pub enum Instruction {
    /// Block begin
    B,
    /// Block end
    E,
    /// Conditional over the following `B…E, B…E` pair
    IF,
    /// Structured while loop marker
    WH,
    /// Structured for loop marker
    FR,
    /// Function definition with arity
    FN(u32),
    /// Return
    RT,
    /// Call a function at a byte offset with an argument count
    CL(u32, u32),
    /// Placeholder
    PH,
    /// Push an integer literal
    LIT(i64),
    /// Push a local
    V(u32),
    /// Pop into a local
    LET(u32),
    /// Pop into a global
    SET(u32),
    /// Less than
    LT,
    /// Greater than
    GT,
    /// Less or equal
    LE,
    /// Greater or equal
    GE,
    /// Equal
    EQ,
    /// Add
    ADD,
    /// Subtract
    SUB,
    /// Multiply
    MUL,
    /// Divide
    DIV,
    /// Bitwise and
    AND,
    /// Bitwise or
    OR,
    /// Bitwise xor
    XOR,
    /// Shift left
    SHL,
    /// Shift right
    SHR,
    /// Array length
    LEN,
    /// Array read
    GET,
    /// Array write
    PUT,
    /// Swap top two
    SWP,
    /// Duplicate top
    DUP,
    /// Drop top
    DRP,
    /// Rotate top three
    ROT,
    /// Deprecated encoding of [`GET`](Self::GET)
    GET_ALIAS,
    /// Deprecated encoding of [`PUT`](Self::PUT)
    PUT_ALIAS,
    /// Deprecated encoding of [`SWP`](Self::SWP)
    SWP_ALIAS,
    /// Device write
    IOW(u32),
    /// Device read
    IOR(u32),
    /// Capability grant
    GTWAY(u32),
    /// Synchronous delay in milliseconds
    WAIT(u32),
    /// Clean stop
    HALT,
    /// Trace message at a level
    TRACE(u32),
    /// Unconditional jump, token-relative offset
    JMP(i32),
    /// Jump if zero
    JZ(i32),
    /// Jump if not zero
    JNZ(i32),
    /// Modulo
    MOD,
    /// Negate
    NEG,
    /// Bitwise not
    NOT,
    /// Not equal
    NEQ,
    /// Array create
    NEWARR,
    /// Legacy array read
    IDX,
    /// Legacy array write
    STO,
    /// Immediate collection
    GC,
    /// Record a breakpoint with an id
    BP(u32),
    /// Arm single-step
    STEP,
    /// Do-while marker (internal IR)
    DO,
    /// Backward conditional jump (internal IR)
    DWHL(i32),
    /// Forward conditional jump (internal IR)
    WHIL(i32),
    /// Raw allocation
    ALLOC,
    /// Release a raw allocation
    FREE,
    /// An opcode number with no catalog entry; carries the raw number
    UNDEF(u32),
}

impl Instruction {
    /// Decode one instruction at `*pc`, advancing past the opcode and its
    /// operands.
    pub fn decode(code: &[u8], pc: &mut usize) -> Result<Self, Fault> {
        use Instruction::*;

        let op = decode_uvarint32(code, pc)?;

        let repr = match OpcodeRepr::from_u32(op) {
            Some(repr) => repr,
            None => return Ok(UNDEF(op)),
        };

        Ok(match repr {
            OpcodeRepr::B => B,
            OpcodeRepr::E => E,
            OpcodeRepr::IF => IF,
            OpcodeRepr::WH => WH,
            OpcodeRepr::FR => FR,
            OpcodeRepr::FN => FN(decode_uvarint32(code, pc)?),
            OpcodeRepr::RT => RT,
            OpcodeRepr::CL => {
                let func_id = decode_uvarint32(code, pc)?;
                let argc = decode_uvarint32(code, pc)?;
                CL(func_id, argc)
            }
            OpcodeRepr::PH => PH,
            OpcodeRepr::LIT => LIT(decode_svarint64(code, pc)?),
            OpcodeRepr::V => V(decode_uvarint32(code, pc)?),
            OpcodeRepr::LET => LET(decode_uvarint32(code, pc)?),
            OpcodeRepr::SET => SET(decode_uvarint32(code, pc)?),
            OpcodeRepr::LT => LT,
            OpcodeRepr::GT => GT,
            OpcodeRepr::LE => LE,
            OpcodeRepr::GE => GE,
            OpcodeRepr::EQ => EQ,
            OpcodeRepr::ADD => ADD,
            OpcodeRepr::SUB => SUB,
            OpcodeRepr::MUL => MUL,
            OpcodeRepr::DIV => DIV,
            OpcodeRepr::AND => AND,
            OpcodeRepr::OR => OR,
            OpcodeRepr::XOR => XOR,
            OpcodeRepr::SHL => SHL,
            OpcodeRepr::SHR => SHR,
            OpcodeRepr::LEN => LEN,
            OpcodeRepr::GET => GET,
            OpcodeRepr::PUT => PUT,
            OpcodeRepr::SWP => SWP,
            OpcodeRepr::DUP => DUP,
            OpcodeRepr::DRP => DRP,
            OpcodeRepr::ROT => ROT,
            OpcodeRepr::GET_ALIAS => GET_ALIAS,
            OpcodeRepr::PUT_ALIAS => PUT_ALIAS,
            OpcodeRepr::SWP_ALIAS => SWP_ALIAS,
            OpcodeRepr::IOW => IOW(decode_uvarint32(code, pc)?),
            OpcodeRepr::IOR => IOR(decode_uvarint32(code, pc)?),
            OpcodeRepr::GTWAY => GTWAY(decode_uvarint32(code, pc)?),
            OpcodeRepr::WAIT => WAIT(decode_uvarint32(code, pc)?),
            OpcodeRepr::HALT => HALT,
            OpcodeRepr::TRACE => TRACE(decode_uvarint32(code, pc)?),
            OpcodeRepr::JMP => JMP(decode_svarint32(code, pc)?),
            OpcodeRepr::JZ => JZ(decode_svarint32(code, pc)?),
            OpcodeRepr::JNZ => JNZ(decode_svarint32(code, pc)?),
            OpcodeRepr::MOD => MOD,
            OpcodeRepr::NEG => NEG,
            OpcodeRepr::NOT => NOT,
            OpcodeRepr::NEQ => NEQ,
            OpcodeRepr::NEWARR => NEWARR,
            OpcodeRepr::IDX => IDX,
            OpcodeRepr::STO => STO,
            OpcodeRepr::GC => GC,
            OpcodeRepr::BP => BP(decode_uvarint32(code, pc)?),
            OpcodeRepr::STEP => STEP,
            OpcodeRepr::DO => DO,
            OpcodeRepr::DWHL => DWHL(decode_svarint32(code, pc)?),
            OpcodeRepr::WHIL => WHIL(decode_svarint32(code, pc)?),
            OpcodeRepr::ALLOC => ALLOC,
            OpcodeRepr::FREE => FREE,
        })
    }

    /// Skip one instruction (opcode plus operands) without materialising it.
    pub fn skip(code: &[u8], pc: &mut usize) -> Result<u32, Fault> {
        let op = decode_uvarint32(code, pc)?;
        Self::skip_operands(code, pc, op)?;
        Ok(op)
    }

    /// Advance `*pc` past the operand bytes of the already-consumed opcode
    /// `op`.
    pub fn skip_operands(code: &[u8], pc: &mut usize, op: u32) -> Result<(), Fault> {
        use OpcodeRepr::*;

        match OpcodeRepr::from_u32(op) {
            Some(LIT) => {
                decode_uvarint64(code, pc)?;
            }
            Some(V | LET | SET | GTWAY | WAIT | IOW | IOR | TRACE | BP | FN) => {
                decode_uvarint32(code, pc)?;
            }
            Some(CL) => {
                decode_uvarint32(code, pc)?;
                decode_uvarint32(code, pc)?;
            }
            Some(JZ | JNZ | JMP | DWHL | WHIL) => {
                decode_svarint32(code, pc)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Append the canonical encoding of this instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        use Instruction::*;

        encode_uvarint32(self.op(), out);

        match *self {
            LIT(n) => encode_svarint64(n, out),
            FN(n) | V(n) | LET(n) | SET(n) | IOW(n) | IOR(n) | GTWAY(n) | WAIT(n) | TRACE(n)
            | BP(n) => encode_uvarint32(n, out),
            CL(func_id, argc) => {
                encode_uvarint32(func_id, out);
                encode_uvarint32(argc, out);
            }
            JMP(off) | JZ(off) | JNZ(off) | DWHL(off) | WHIL(off) => encode_svarint32(off, out),
            _ => {}
        }
    }

    /// Raw opcode number.
    pub const fn op(&self) -> u32 {
        use Instruction::*;

        match *self {
            B => 10,
            E => 11,
            IF => 12,
            WH => 13,
            FR => 14,
            FN(_) => 15,
            RT => 16,
            CL(..) => 17,
            PH => 18,
            LIT(_) => 30,
            V(_) => 31,
            LET(_) => 32,
            SET(_) => 33,
            LT => 40,
            GT => 41,
            LE => 42,
            GE => 43,
            EQ => 44,
            ADD => 50,
            SUB => 51,
            MUL => 52,
            DIV => 53,
            AND => 54,
            OR => 55,
            XOR => 56,
            SHL => 57,
            SHR => 58,
            LEN => 60,
            GET => 61,
            PUT => 62,
            SWP => 63,
            DUP => 64,
            DRP => 65,
            ROT => 66,
            GET_ALIAS => 67,
            PUT_ALIAS => 68,
            SWP_ALIAS => 69,
            IOW(_) => 70,
            IOR(_) => 71,
            GTWAY(_) => 80,
            WAIT(_) => 81,
            HALT => 82,
            TRACE(_) => 83,
            JMP(_) => 100,
            JZ(_) => 101,
            JNZ(_) => 102,
            MOD => 110,
            NEG => 111,
            NOT => 112,
            NEQ => 113,
            NEWARR => 120,
            IDX => 121,
            STO => 122,
            GC => 130,
            BP(_) => 131,
            STEP => 132,
            DO => 140,
            DWHL(_) => 141,
            WHIL(_) => 142,
            ALLOC => 200,
            FREE => 201,
            UNDEF(op) => op,
        }
    }

    /// Catalog entry for this instruction, absent for [`UNDEF`](Self::UNDEF).
    pub fn repr(&self) -> Option<OpcodeRepr> {
        OpcodeRepr::from_u32(self.op())
    }

    /// Token-relative jump offset for the jump class, `None` otherwise.
    pub const fn jump_offset(&self) -> Option<i32> {
        use Instruction::*;

        match *self {
            JMP(off) | JZ(off) | JNZ(off) | DWHL(off) | WHIL(off) => Some(off),
            _ => None,
        }
    }

    /// Replace the offset of a jump-class instruction.
    pub fn with_jump_offset(self, off: i32) -> Self {
        use Instruction::*;

        match self {
            JMP(_) => JMP(off),
            JZ(_) => JZ(off),
            JNZ(_) => JNZ(off),
            DWHL(_) => DWHL(off),
            WHIL(_) => WHIL(off),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_consumes_exactly_the_encoding() {
        let insts = [
            Instruction::LIT(-1234567),
            Instruction::V(63),
            Instruction::CL(300, 2),
            Instruction::JZ(-5),
            Instruction::ADD,
            Instruction::HALT,
        ];

        let mut buf = Vec::new();
        for inst in &insts {
            inst.encode(&mut buf);
        }

        let mut pc = 0;
        for inst in &insts {
            assert_eq!(Instruction::decode(&buf, &mut pc), Ok(*inst));
        }
        assert_eq!(pc, buf.len());
    }

    #[test]
    fn unknown_opcodes_decode_operand_free() {
        let mut buf = Vec::new();
        encode_uvarint32(99, &mut buf);
        encode_uvarint32(7, &mut buf);

        let mut pc = 0;
        assert_eq!(Instruction::decode(&buf, &mut pc), Ok(Instruction::UNDEF(99)));
        // The trailing byte is a separate token, not an operand.
        assert_eq!(pc, 1);
    }

    #[test]
    fn skip_matches_decode() {
        let insts = [
            Instruction::FN(2),
            Instruction::B,
            Instruction::LIT(1 << 40),
            Instruction::RT,
            Instruction::E,
        ];

        let mut buf = Vec::new();
        for inst in &insts {
            inst.encode(&mut buf);
        }

        let mut skip_pc = 0;
        let mut decode_pc = 0;
        for inst in &insts {
            assert_eq!(Instruction::skip(&buf, &mut skip_pc), Ok(inst.op()));
            Instruction::decode(&buf, &mut decode_pc).unwrap();
            assert_eq!(skip_pc, decode_pc);
        }
    }

    #[test]
    fn truncated_operand_faults() {
        let mut buf = Vec::new();
        encode_uvarint32(30, &mut buf); // LIT with no literal bytes

        let mut pc = 0;
        assert_eq!(Instruction::decode(&buf, &mut pc), Err(Fault::BadEncoding));
    }
}
