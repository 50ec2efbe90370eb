use mtoken_asm::encoding::*;
use mtoken_asm::{Fault, Instruction, OpcodeRepr};

use quickcheck_macros::quickcheck;
use rstest::rstest;

#[test]
fn instruction_stream_roundtrip() {
    // Values picked to exercise multi-byte varints and negative literals.
    let instructions = vec![
        Instruction::FN(2),
        Instruction::B,
        Instruction::V(0),
        Instruction::V(63),
        Instruction::ADD,
        Instruction::RT,
        Instruction::E,
        Instruction::LIT(0),
        Instruction::LIT(-1),
        Instruction::LIT(i64::MAX),
        Instruction::LIT(i64::MIN),
        Instruction::LET(12),
        Instruction::SET(127),
        Instruction::LT,
        Instruction::GT,
        Instruction::LE,
        Instruction::GE,
        Instruction::EQ,
        Instruction::NEQ,
        Instruction::SUB,
        Instruction::MUL,
        Instruction::DIV,
        Instruction::MOD,
        Instruction::AND,
        Instruction::OR,
        Instruction::XOR,
        Instruction::SHL,
        Instruction::SHR,
        Instruction::NEG,
        Instruction::NOT,
        Instruction::LEN,
        Instruction::GET,
        Instruction::PUT,
        Instruction::SWP,
        Instruction::GET_ALIAS,
        Instruction::PUT_ALIAS,
        Instruction::SWP_ALIAS,
        Instruction::DUP,
        Instruction::DRP,
        Instruction::ROT,
        Instruction::NEWARR,
        Instruction::IDX,
        Instruction::STO,
        Instruction::ALLOC,
        Instruction::FREE,
        Instruction::CL(0x4000, 3),
        Instruction::IF,
        Instruction::WH,
        Instruction::FR,
        Instruction::PH,
        Instruction::JMP(-128),
        Instruction::JZ(300),
        Instruction::JNZ(0),
        Instruction::DO,
        Instruction::DWHL(-7),
        Instruction::WHIL(7),
        Instruction::IOW(1),
        Instruction::IOR(255),
        Instruction::GTWAY(255),
        Instruction::WAIT(1000),
        Instruction::TRACE(2),
        Instruction::GC,
        Instruction::BP(9),
        Instruction::STEP,
        Instruction::HALT,
    ];

    let mut bytes = Vec::new();
    for inst in &instructions {
        inst.encode(&mut bytes);
    }

    let mut pc = 0;
    let mut decoded = Vec::new();
    while pc < bytes.len() {
        decoded.push(Instruction::decode(&bytes, &mut pc).expect("well-formed stream"));
    }

    assert_eq!(instructions, decoded);
}

#[rstest]
#[case(0, &[0x00])]
#[case(1, &[0x01])]
#[case(127, &[0x7f])]
#[case(128, &[0x80, 0x01])]
#[case(300, &[0xac, 0x02])]
#[case(16_384, &[0x80, 0x80, 0x01])]
fn uvarint32_known_encodings(#[case] value: u32, #[case] bytes: &[u8]) {
    let mut out = Vec::new();
    encode_uvarint32(value, &mut out);
    assert_eq!(out, bytes);

    let mut pc = 0;
    assert_eq!(decode_uvarint32(bytes, &mut pc), Ok(value));
    assert_eq!(pc, bytes.len());
}

#[rstest]
#[case(0, 0)]
#[case(-1, 1)]
#[case(1, 2)]
#[case(-2, 3)]
#[case(2, 4)]
#[case(i32::MAX, u32::MAX - 1)]
#[case(i32::MIN, u32::MAX)]
fn zigzag32_known_pairs(#[case] signed: i32, #[case] unsigned: u32) {
    assert_eq!(zigzag32(signed), unsigned);
    assert_eq!(unzigzag32(unsigned), signed);
}

#[test]
fn operand_bytes_are_not_opcodes() {
    // `LIT 10` stores the byte 20 (zigzag of 10) as its operand; skipping
    // the instruction must consume it rather than expose it as opcode `B`.
    let mut bytes = Vec::new();
    Instruction::LIT(10).encode(&mut bytes);
    Instruction::HALT.encode(&mut bytes);

    let mut pc = 0;
    assert_eq!(Instruction::skip(&bytes, &mut pc), Ok(30));
    assert_eq!(Instruction::skip(&bytes, &mut pc), Ok(82));
    assert_eq!(pc, bytes.len());
}

#[test]
fn truncated_streams_fault() {
    let mut bytes = Vec::new();
    Instruction::CL(5, 2).encode(&mut bytes);
    // Drop the argc operand.
    bytes.pop();

    let mut pc = 0;
    assert_eq!(Instruction::decode(&bytes, &mut pc), Err(Fault::BadEncoding));
}

#[quickcheck]
fn uvarint32_roundtrip(n: u32) -> bool {
    let mut buf = Vec::new();
    encode_uvarint32(n, &mut buf);
    let mut pc = 0;
    decode_uvarint32(&buf, &mut pc) == Ok(n) && pc == buf.len()
}

#[quickcheck]
fn uvarint64_roundtrip(n: u64) -> bool {
    let mut buf = Vec::new();
    encode_uvarint64(n, &mut buf);
    let mut pc = 0;
    decode_uvarint64(&buf, &mut pc) == Ok(n) && pc == buf.len()
}

#[quickcheck]
fn zigzag32_roundtrip(n: i32) -> bool {
    unzigzag32(zigzag32(n)) == n
}

#[quickcheck]
fn zigzag64_roundtrip(n: i64) -> bool {
    unzigzag64(zigzag64(n)) == n
}

#[quickcheck]
fn zigzag64_inverse_on_unsigned(u: u64) -> bool {
    zigzag64(unzigzag64(u)) == u
}

#[quickcheck]
fn literal_roundtrip(n: i64) -> bool {
    let mut buf = Vec::new();
    Instruction::LIT(n).encode(&mut buf);
    let mut pc = 0;
    Instruction::decode(&buf, &mut pc) == Ok(Instruction::LIT(n))
}

#[test]
fn catalog_and_instruction_numbers_agree() {
    use strum::IntoEnumIterator;

    for repr in OpcodeRepr::iter() {
        assert_eq!(OpcodeRepr::from_u32(repr as u32), Some(repr));
    }
}
