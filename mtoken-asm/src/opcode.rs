//! Numeric opcode catalog.
//!
//! Opcodes are partitioned by range: core control/data (10–33), comparison
//! (40–44), arithmetic/bitwise (50–58), array/stack (60–69), I/O (70–71),
//! system (80–83), jump extensions (100–102), arithmetic extensions
//! (110–113), legacy arrays (120–122), debug/GC extensions (130–132),
//! internal lowering IR (140–142) and platform extensions (200–201).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[repr(u8)]
/// Byte representation of an opcode. The catalog is closed: numbers with
/// no entry here have no handler anywhere.
pub enum OpcodeRepr {
    /// Block begin marker
    B = 10,
    /// Block end marker
    E = 11,
    /// Conditional: `<cond>, IF, B, <then>, E, B, <else>, E`
    IF = 12,
    /// Structured while loop (lowered at load time)
    WH = 13,
    /// Structured for loop (lowered at load time)
    FR = 14,
    /// Function definition: `FN, <arity>, B, <body>, E`
    FN = 15,
    /// Return from a call
    RT = 16,
    /// Call: `CL, <func_id>, <argc>`
    CL = 17,
    /// Placeholder / padding
    PH = 18,

    /// Push literal: `LIT, <zigzag i64>`
    LIT = 30,
    /// Push local: `V, <index>`
    V = 31,
    /// Pop into local: `LET, <index>`
    LET = 32,
    /// Pop into global: `SET, <index>`
    SET = 33,

    /// Less than
    LT = 40,
    /// Greater than
    GT = 41,
    /// Less than or equal
    LE = 42,
    /// Greater than or equal
    GE = 43,
    /// Equal (tag-sensitive)
    EQ = 44,

    /// Addition
    ADD = 50,
    /// Subtraction
    SUB = 51,
    /// Multiplication
    MUL = 52,
    /// Division
    DIV = 53,
    /// Bitwise AND
    AND = 54,
    /// Bitwise OR
    OR = 55,
    /// Bitwise XOR
    XOR = 56,
    /// Shift left (count masked by 63)
    SHL = 57,
    /// Shift right (count masked by 63)
    SHR = 58,

    /// Array length
    LEN = 60,
    /// Array element read
    GET = 61,
    /// Array element write, pushes the array back
    PUT = 62,
    /// Swap top two
    SWP = 63,
    /// Duplicate top
    DUP = 64,
    /// Drop top
    DRP = 65,
    /// Rotate top three
    ROT = 66,
    /// Deprecated alias of [`GET`](Self::GET)
    GET_ALIAS = 67,
    /// Deprecated alias of [`PUT`](Self::PUT)
    PUT_ALIAS = 68,
    /// Deprecated alias of [`SWP`](Self::SWP)
    SWP_ALIAS = 69,

    /// Device write: `IOW, <device_id>` (value popped)
    IOW = 70,
    /// Device read: `IOR, <device_id>` (value pushed)
    IOR = 71,

    /// Capability grant: `GTWAY, <device_id>`
    GTWAY = 80,
    /// Synchronous delay: `WAIT, <ms>`
    WAIT = 81,
    /// Stop cleanly
    HALT = 82,
    /// Emit a trace message: `TRACE, <level>`
    TRACE = 83,

    /// Unconditional jump, token-relative signed offset
    JMP = 100,
    /// Jump if zero
    JZ = 101,
    /// Jump if not zero
    JNZ = 102,

    /// Modulo (truncated, sign of dividend)
    MOD = 110,
    /// Arithmetic negation
    NEG = 111,
    /// Bitwise NOT
    NOT = 112,
    /// Not equal
    NEQ = 113,

    /// Array create: size popped, elements zeroed
    NEWARR = 120,
    /// Legacy array read
    IDX = 121,
    /// Legacy array write
    STO = 122,

    /// Immediate garbage collection
    GC = 130,
    /// Record a breakpoint at this pc: `BP, <id>`
    BP = 131,
    /// Arm single-step mode
    STEP = 132,

    /// Do-while marker (internal lowering IR, not ABI)
    DO = 140,
    /// Jump back if nonzero (internal lowering IR, not ABI)
    DWHL = 141,
    /// Jump forward if zero (internal lowering IR, not ABI)
    WHIL = 142,

    /// Raw allocation: size popped, `Ref` pushed
    ALLOC = 200,
    /// Release a raw allocation
    FREE = 201,
}

impl OpcodeRepr {
    /// Resolve a decoded opcode number to its representation, if any.
    pub fn from_u32(op: u32) -> Option<Self> {
        use OpcodeRepr::*;

        Some(match op {
            10 => B,
            11 => E,
            12 => IF,
            13 => WH,
            14 => FR,
            15 => FN,
            16 => RT,
            17 => CL,
            18 => PH,
            30 => LIT,
            31 => V,
            32 => LET,
            33 => SET,
            40 => LT,
            41 => GT,
            42 => LE,
            43 => GE,
            44 => EQ,
            50 => ADD,
            51 => SUB,
            52 => MUL,
            53 => DIV,
            54 => AND,
            55 => OR,
            56 => XOR,
            57 => SHL,
            58 => SHR,
            60 => LEN,
            61 => GET,
            62 => PUT,
            63 => SWP,
            64 => DUP,
            65 => DRP,
            66 => ROT,
            67 => GET_ALIAS,
            68 => PUT_ALIAS,
            69 => SWP_ALIAS,
            70 => IOW,
            71 => IOR,
            80 => GTWAY,
            81 => WAIT,
            82 => HALT,
            83 => TRACE,
            100 => JMP,
            101 => JZ,
            102 => JNZ,
            110 => MOD,
            111 => NEG,
            112 => NOT,
            113 => NEQ,
            120 => NEWARR,
            121 => IDX,
            122 => STO,
            130 => GC,
            131 => BP,
            132 => STEP,
            140 => DO,
            141 => DWHL,
            142 => WHIL,
            200 => ALLOC,
            201 => FREE,
            _ => return None,
        })
    }

    /// Stable mnemonic; aliases print their canonical name.
    pub const fn name(&self) -> &'static str {
        use OpcodeRepr::*;

        match self {
            B => "B",
            E => "E",
            IF => "IF",
            WH => "WH",
            FR => "FR",
            FN => "FN",
            RT => "RT",
            CL => "CL",
            PH => "PH",
            LIT => "LIT",
            V => "V",
            LET => "LET",
            SET => "SET",
            LT => "LT",
            GT => "GT",
            LE => "LE",
            GE => "GE",
            EQ => "EQ",
            ADD => "ADD",
            SUB => "SUB",
            MUL => "MUL",
            DIV => "DIV",
            AND => "AND",
            OR => "OR",
            XOR => "XOR",
            SHL => "SHL",
            SHR => "SHR",
            LEN => "LEN",
            GET | GET_ALIAS => "GET",
            PUT | PUT_ALIAS => "PUT",
            SWP | SWP_ALIAS => "SWP",
            DUP => "DUP",
            DRP => "DRP",
            ROT => "ROT",
            IOW => "IOW",
            IOR => "IOR",
            GTWAY => "GTWAY",
            WAIT => "WAIT",
            HALT => "HALT",
            TRACE => "TRACE",
            JMP => "JMP",
            JZ => "JZ",
            JNZ => "JNZ",
            MOD => "MOD",
            NEG => "NEG",
            NOT => "NOT",
            NEQ => "NEQ",
            NEWARR => "NEWARR",
            IDX => "IDX",
            STO => "STO",
            GC => "GC",
            BP => "BP",
            STEP => "STEP",
            DO => "DO",
            DWHL => "DWHL",
            WHIL => "WHILE",
            ALLOC => "ALLOC",
            FREE => "FREE",
        }
    }

    /// Whether this opcode belongs to the frozen core set (numbered below
    /// 100). Extension, platform, and internal IR opcodes are not core.
    pub const fn is_core(&self) -> bool {
        (*self as u8) < 100
    }
}

/// Mnemonic for an arbitrary decoded opcode number; `"UNK"` when the number
/// maps to no catalog entry.
pub fn opcode_name(op: u32) -> &'static str {
    OpcodeRepr::from_u32(op).map_or("UNK", |repr| repr.name())
}
