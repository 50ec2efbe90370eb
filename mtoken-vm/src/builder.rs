//! Bytecode assembly helpers for tests and demos.
//!
//! Jump offsets are token-relative, so the builder works in token indices
//! throughout and only computes byte offsets once, at [`CodeBuilder::build`]
//! time. Function definitions must precede the calls that reference them,
//! matching the declarative layout the format expects.

use mtoken_asm::Instruction;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Plain(Instruction),
    /// `CL` whose operand is resolved to the byte offset of a function's
    /// `FN` token at build time.
    Call { func_token: usize, argc: u32 },
    /// Jump-class instruction targeting an absolute token index.
    Jump(Instruction, usize),
}

/// Handle to an emitted `FN` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FnLabel(usize);

/// Handle to a not-yet-bound forward jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an unbound jump encodes a zero offset"]
pub struct JumpSite(usize);

/// Sequential bytecode assembler.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    insts: Vec<Pending>,
}

impl CodeBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token index the next emitted instruction will get.
    pub fn here(&self) -> usize {
        self.insts.len()
    }

    /// Emit one instruction, returning its token index.
    pub fn inst(&mut self, inst: Instruction) -> usize {
        self.insts.push(Pending::Plain(inst));
        self.insts.len() - 1
    }

    /// Emit a run of instructions.
    pub fn extend(&mut self, insts: impl IntoIterator<Item = Instruction>) {
        for inst in insts {
            self.inst(inst);
        }
    }

    /// Emit `FN <arity>` and return a label for `call`.
    pub fn function(&mut self, arity: u32) -> FnLabel {
        FnLabel(self.inst(Instruction::FN(arity)))
    }

    /// Emit `CL` targeting a previously defined function.
    pub fn call(&mut self, func: FnLabel, argc: u32) {
        self.insts.push(Pending::Call {
            func_token: func.0,
            argc,
        });
    }

    /// Emit a forward jump; bind its target later with [`Self::bind`].
    pub fn forward_jump(&mut self, inst: Instruction) -> JumpSite {
        debug_assert!(inst.jump_offset().is_some());
        self.insts.push(Pending::Jump(inst, usize::MAX));
        JumpSite(self.insts.len() - 1)
    }

    /// Point `site` at the next emitted instruction.
    pub fn bind(&mut self, site: JumpSite) {
        let target = self.insts.len();
        match &mut self.insts[site.0] {
            Pending::Jump(_, slot) => *slot = target,
            _ => unreachable!("jump site always indexes a jump"),
        }
    }

    /// Emit a jump targeting an already-known token index.
    pub fn jump_to(&mut self, inst: Instruction, target: usize) {
        debug_assert!(inst.jump_offset().is_some());
        self.insts.push(Pending::Jump(inst, target));
    }

    /// Encode the stream.
    ///
    /// Panics on a forward function reference or an unbound jump — both
    /// are harness bugs, not runtime conditions.
    pub fn build(self) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut token_offsets = Vec::with_capacity(self.insts.len());

        for (i, pending) in self.insts.iter().enumerate() {
            token_offsets.push(bytes.len());
            match *pending {
                Pending::Plain(inst) => inst.encode(&mut bytes),
                Pending::Call { func_token, argc } => {
                    assert!(
                        func_token < i,
                        "function must be defined before it is called"
                    );
                    let offset = token_offsets[func_token] as u32;
                    Instruction::CL(offset, argc).encode(&mut bytes);
                }
                Pending::Jump(inst, target) => {
                    assert!(target != usize::MAX, "unbound forward jump");
                    let rel = target as i32 - (i as i32 + 1);
                    inst.with_jump_offset(rel).encode(&mut bytes);
                }
            }
        }

        bytes
    }
}
