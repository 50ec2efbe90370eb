//! Symbolic disassembler.
//!
//! Two passes over the same buffer: the first walks tokens to assign
//! labels (functions at `FN`, block markers at `B`, else-branch entries,
//! and jump targets resolved through the token map), the second re-walks
//! and formats each instruction with its byte offset, raw bytes,
//! mnemonic, decoded operands, and a running indent driven by `B`/`E`.

use itertools::Itertools;
use mtoken_asm::{opcode_name, Fault, Instruction, OpcodeRepr};

use crate::token_map::TokenMap;

const INDENT_MAX: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Func,
    Block,
    JumpIn,
    CallTarget,
}

#[derive(Debug, Clone)]
struct Label {
    addr: usize,
    name: String,
    kind: LabelKind,
}

struct Disasm<'a> {
    code: &'a [u8],
    map: TokenMap,
    labels: Vec<Label>,
    out: String,
    indent: usize,
}

/// Disassemble a code buffer into a human-readable listing.
pub fn disassemble(code: &[u8]) -> Result<String, Fault> {
    let map = TokenMap::build(code)?;
    let mut ctx = Disasm {
        code,
        map,
        labels: Vec::new(),
        out: String::new(),
        indent: 0,
    };

    ctx.scan_labels()?;

    ctx.out.push_str("; ============================================\n");
    ctx.out.push_str(";      M-Token Bytecode Disassembly\n");
    ctx.out.push_str("; ============================================\n");
    ctx.out.push_str(&format!("; Length: {} bytes\n", code.len()));
    ctx.out.push_str("; Tokens: All varint encoded\n");
    ctx.out.push_str("; ============================================\n\n");

    let mut pc = 0;
    while pc < code.len() {
        ctx.format_one(&mut pc)?;
    }

    ctx.out.push_str("\n; ============================================\n");
    ctx.out.push_str(";           End of Disassembly\n");
    ctx.out.push_str("; ============================================\n");

    Ok(ctx.out)
}

impl<'a> Disasm<'a> {
    fn add_label(&mut self, addr: usize, name: String, kind: LabelKind) {
        self.labels.push(Label { addr, name, kind });
    }

    fn find_label(&self, addr: usize) -> Option<&Label> {
        self.labels.iter().find(|label| label.addr == addr)
    }

    fn resolve_jump(&self, token_idx: usize, offset: i32) -> Option<usize> {
        self.map.resolve_jump(token_idx + 1, offset)
    }

    /// Token index of the `E` matching the `B` at token `b_idx`.
    fn matching_e(&self, b_idx: usize) -> Option<usize> {
        let mut depth = 0i32;
        for idx in b_idx..self.map.token_count() {
            let mut pc = self.map.offset_of(idx)?;
            match OpcodeRepr::from_u32(Instruction::skip(self.code, &mut pc).ok()?) {
                Some(OpcodeRepr::B) => depth += 1,
                Some(OpcodeRepr::E) => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                return Some(idx);
            }
        }
        None
    }

    fn scan_labels(&mut self) -> Result<(), Fault> {
        for idx in 0..self.map.token_count() {
            let start = self.map.offset_of(idx).expect("index in range");
            let mut pc = start;
            let inst = Instruction::decode(self.code, &mut pc)?;

            match inst {
                Instruction::FN(_) => {
                    self.add_label(start, format!("func_{start}"), LabelKind::Func);
                }
                Instruction::CL(func_id, _) => {
                    self.add_label(
                        func_id as usize,
                        format!("func_{func_id}"),
                        LabelKind::CallTarget,
                    );
                }
                Instruction::IF => {
                    // The else branch entry is the token after the then
                    // block's matching E.
                    if let Some(then_e) = self.matching_e(idx + 1) {
                        if let Some(else_addr) = self.map.offset_of(then_e + 1) {
                            self.add_label(else_addr, format!("else_{start}"), LabelKind::Block);
                        }
                    }
                }
                Instruction::B => {
                    self.add_label(start, format!("L{start}"), LabelKind::Block);
                }
                _ => {
                    if let Some(offset) = inst.jump_offset() {
                        if let Some(target) = self.resolve_jump(idx, offset) {
                            self.add_label(target, format!("L{target}"), LabelKind::JumpIn);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn push_indent(&mut self) {
        for _ in 0..self.indent.min(INDENT_MAX) {
            self.out.push_str("    ");
        }
    }

    fn format_one(&mut self, pc: &mut usize) -> Result<(), Fault> {
        let start = *pc;
        let token_idx = self.map.token_at(start).ok_or(Fault::BadEncoding)?;
        let inst = Instruction::decode(self.code, pc)?;
        let end = *pc;

        if let Some((kind, name)) = self.find_label(start).map(|l| (l.kind, l.name.clone())) {
            match kind {
                LabelKind::Func => {
                    self.out
                        .push_str(&format!("\n; === Function: {name} ===\n{name}:\n"));
                }
                LabelKind::Block | LabelKind::JumpIn => {
                    self.out.push_str(&format!("\n{name}:\n"));
                }
                LabelKind::CallTarget => {
                    self.out.push_str(&format!("\n; Call target: {name}\n"));
                }
            }
        }

        self.push_indent();

        let raw = self.code[start..end]
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .join(" ");
        self.out
            .push_str(&format!("{start:4}:  [{raw}]  {:<6}", opcode_name(inst.op())));

        self.format_operands(inst, token_idx);
        self.out.push('\n');
        Ok(())
    }

    fn format_operands(&mut self, inst: Instruction, token_idx: usize) {
        use Instruction::*;

        let jump_target = |this: &Self, offset: i32| match this.resolve_jump(token_idx, offset) {
            Some(target) => format!("L{target}"),
            None => "<bad>".to_string(),
        };

        let text = match inst {
            LIT(value) => format!("{value}"),
            V(index) | LET(index) | SET(index) => format!("{index}"),
            CL(func_id, argc) => format!("func_{func_id}, {argc} args"),
            FN(arity) => format!("<arity={arity}>,B<body>,E"),

            IF => "<cond>,B<then>,E,B<else>,E".to_string(),
            WH => "<cond>,WH,B<body>,E".to_string(),
            FR => "<init>,<cond>,<inc>,FR,B<body>,E".to_string(),

            JMP(offset) | JZ(offset) | JNZ(offset) | WHIL(offset) => jump_target(self, offset),
            DWHL(offset) => format!("{}, <cond>", jump_target(self, offset)),

            B => {
                self.indent += 1;
                "; block begin".to_string()
            }
            E => {
                self.indent = self.indent.saturating_sub(1);
                "; block end".to_string()
            }
            DO => "; do { body } while (NOT ABI)".to_string(),

            GTWAY(key) => format!("{key}"),
            WAIT(ms) => format!("{ms}ms"),
            IOW(device) | IOR(device) => format!("dev={device}"),
            TRACE(level) => format!("level={level}"),
            BP(id) => format!("{id}"),

            GC => "; garbage collection".to_string(),
            STEP => "; enable single-step".to_string(),

            UNDEF(op) => format!("<unknown 0x{op:02X}>"),

            _ => String::new(),
        };

        self.out.push_str(&text);
    }
}
