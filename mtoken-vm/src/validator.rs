//! Static bytecode validator.
//!
//! Produces a single first-failure report over six passes: opcode
//! decoding, operand consumption, block balance, variable index bounds, a
//! range-recursive structured pass over stack heights and capability
//! flow, and jump-target reachability. The validator runs on the same
//! (lowered) buffer the engine executes and shares its decoding.

use mtoken_asm::{Fault, Instruction};

use crate::caps::CapabilitySet;
use crate::consts::{GLOBALS_SIZE, LOCALS_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of a validation run.
pub struct ValidatorReport {
    /// True when every pass succeeded.
    pub valid: bool,
    /// Fault classifying the first failure.
    pub fault: Option<Fault>,
    /// Byte offset of the failing instruction.
    pub pc: usize,
    /// Human-readable description of the failure.
    pub msg: String,
}

impl ValidatorReport {
    fn ok() -> Self {
        Self {
            valid: true,
            fault: None,
            pc: 0,
            msg: String::new(),
        }
    }

    fn fail(fault: Fault, pc: usize, msg: &str) -> Self {
        Self {
            valid: false,
            fault: Some(fault),
            pc,
            msg: msg.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tok {
    inst: Instruction,
    start: usize,
}

/// Tokenize, enforcing the opcode and varint passes: every opcode number
/// fits in a byte and every operand sequence consumes cleanly.
fn build_tokens(code: &[u8]) -> Result<Vec<Tok>, ValidatorReport> {
    let mut toks = Vec::new();
    let mut pc = 0;

    while pc < code.len() {
        let start = pc;
        let inst = Instruction::decode(code, &mut pc)
            .map_err(|fault| ValidatorReport::fail(fault, start, "invalid instruction encoding"))?;
        if inst.repr().is_none() {
            return Err(ValidatorReport::fail(
                Fault::UnknownOp,
                start,
                "opcode has no handler",
            ));
        }
        toks.push(Tok { inst, start });
    }

    Ok(toks)
}

/// Block pass: `B`/`E` balanced and non-negative at every prefix.
fn check_blocks(toks: &[Tok], code_len: usize) -> Result<(), ValidatorReport> {
    let mut depth = 0i64;

    for tok in toks {
        match tok.inst {
            Instruction::B => depth += 1,
            Instruction::E => {
                depth -= 1;
                if depth < 0 {
                    return Err(ValidatorReport::fail(Fault::PcOob, tok.start, "unmatched E"));
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ValidatorReport::fail(Fault::PcOob, code_len, "unmatched B"));
    }
    Ok(())
}

/// Index-bounds pass: `V`/`LET` locals below [`LOCALS_SIZE`], `SET`
/// globals below [`GLOBALS_SIZE`].
fn check_indices(toks: &[Tok]) -> Result<(), ValidatorReport> {
    for tok in toks {
        match tok.inst {
            Instruction::V(index) | Instruction::LET(index) => {
                if index as usize >= LOCALS_SIZE {
                    return Err(ValidatorReport::fail(
                        Fault::LocalsOob,
                        tok.start,
                        "local index out of bounds",
                    ));
                }
            }
            Instruction::SET(index) => {
                if index as usize >= GLOBALS_SIZE {
                    return Err(ValidatorReport::fail(
                        Fault::GlobalsOob,
                        tok.start,
                        "global index out of bounds",
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn matching_e(toks: &[Tok], b_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in toks.iter().enumerate().skip(b_idx) {
        match tok.inst {
            Instruction::B => depth += 1,
            Instruction::E => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            return Some(i);
        }
    }
    None
}

/// Structured pass over `[start, end)`: fixed per-opcode stack deltas
/// with underflow detection, branch-height equality for `IF`, net-zero
/// bodies for loops, jump-target bounds, and capability flow (`GTWAY`
/// adds; `IOW`/`IOR` require the bit on every incoming path).
fn validate_range(
    toks: &[Tok],
    start: usize,
    end: usize,
    sp: &mut i64,
    caps: &mut CapabilitySet,
) -> Result<(), ValidatorReport> {
    use Instruction::*;

    let need = |sp: &i64, k: i64, tok: &Tok, what: &str| {
        if *sp < k {
            Err(ValidatorReport::fail(
                Fault::StackUnderflow,
                tok.start,
                what,
            ))
        } else {
            Ok(())
        }
    };

    let mut i = start;
    while i < end {
        let tok = &toks[i];

        match tok.inst {
            IF => {
                need(sp, 1, tok, "stack underflow at IF")?;
                *sp -= 1;

                if !matches!(toks.get(i + 1).map(|t| t.inst), Some(B)) {
                    return Err(ValidatorReport::fail(Fault::BadEncoding, tok.start, "IF missing then B"));
                }
                let then_e = matching_e(toks, i + 1).ok_or_else(|| {
                    ValidatorReport::fail(Fault::BadEncoding, tok.start, "IF missing then E")
                })?;
                if !matches!(toks.get(then_e + 1).map(|t| t.inst), Some(B)) {
                    return Err(ValidatorReport::fail(Fault::BadEncoding, tok.start, "IF missing else B"));
                }
                let else_e = matching_e(toks, then_e + 1).ok_or_else(|| {
                    ValidatorReport::fail(Fault::BadEncoding, tok.start, "IF missing else E")
                })?;

                let mut sp_then = *sp;
                let mut sp_else = *sp;
                let mut caps_then = *caps;
                let mut caps_else = *caps;
                validate_range(toks, i + 2, then_e, &mut sp_then, &mut caps_then)?;
                validate_range(toks, then_e + 2, else_e, &mut sp_else, &mut caps_else)?;

                if sp_then != sp_else {
                    return Err(ValidatorReport::fail(
                        Fault::BadArg,
                        tok.start,
                        "IF branch stack mismatch",
                    ));
                }

                caps_then.intersect(&caps_else);
                *caps = caps_then;
                *sp = sp_then;
                i = else_e;
            }

            WH | FR => {
                need(sp, 1, tok, "stack underflow at loop")?;
                *sp -= 1;

                if !matches!(toks.get(i + 1).map(|t| t.inst), Some(B)) {
                    return Err(ValidatorReport::fail(Fault::BadEncoding, tok.start, "loop missing B"));
                }
                let body_e = matching_e(toks, i + 1).ok_or_else(|| {
                    ValidatorReport::fail(Fault::BadEncoding, tok.start, "loop missing E")
                })?;

                let mut sp_body = *sp;
                let mut caps_body = *caps;
                validate_range(toks, i + 2, body_e, &mut sp_body, &mut caps_body)?;

                if sp_body != *sp {
                    return Err(ValidatorReport::fail(
                        Fault::BadArg,
                        tok.start,
                        "loop body stack effect is not zero",
                    ));
                }
                // Capabilities after the loop are the pre-loop set: the
                // body may run zero times.
                i = body_e;
            }

            JMP(_) | JZ(_) | JNZ(_) | DWHL(_) | WHIL(_) => {
                let offset = tok.inst.jump_offset().expect("jump class");
                let target = i as i64 + 1 + i64::from(offset);
                if target < 0 || target >= toks.len() as i64 {
                    return Err(ValidatorReport::fail(
                        Fault::PcOob,
                        tok.start,
                        "jump target out of bounds",
                    ));
                }
                if !matches!(tok.inst, JMP(_)) {
                    need(sp, 1, tok, "stack underflow at conditional jump")?;
                    *sp -= 1;
                }
            }

            LIT(_) | V(_) => *sp += 1,

            LEN | NEG | NOT => need(sp, 1, tok, "stack underflow at unary op")?,

            DUP => {
                need(sp, 1, tok, "stack underflow at DUP")?;
                *sp += 1;
            }
            DRP => {
                need(sp, 1, tok, "stack underflow at DRP")?;
                *sp -= 1;
            }
            SWP | SWP_ALIAS => need(sp, 2, tok, "stack underflow at SWP")?,
            ROT => need(sp, 3, tok, "stack underflow at ROT")?,

            GET | GET_ALIAS | IDX => {
                need(sp, 2, tok, "stack underflow at GET")?;
                *sp -= 1;
            }
            PUT | PUT_ALIAS | STO => {
                need(sp, 3, tok, "stack underflow at PUT")?;
                *sp -= 2;
            }
            NEWARR | ALLOC => need(sp, 1, tok, "stack underflow at allocation")?,
            FREE | LET(_) | SET(_) => {
                need(sp, 1, tok, "stack underflow at store")?;
                *sp -= 1;
            }

            ADD | SUB | MUL | DIV | AND | OR | XOR | SHL | SHR | LT | GT | LE | GE | EQ | NEQ
            | MOD => {
                need(sp, 2, tok, "stack underflow at binary op")?;
                *sp -= 1;
            }

            CL(_, argc) => {
                need(sp, i64::from(argc), tok, "stack underflow at CL")?;
                *sp -= i64::from(argc);
                *sp += 1;
            }
            RT => {
                need(sp, 1, tok, "stack underflow at RT")?;
                *sp -= 1;
            }

            GTWAY(key) => {
                if key > 255 {
                    return Err(ValidatorReport::fail(
                        Fault::BadArg,
                        tok.start,
                        "GTWAY capability id out of range",
                    ));
                }
                caps.insert(key);
            }
            IOW(device) => {
                if !caps.contains(device) {
                    return Err(ValidatorReport::fail(
                        Fault::Unauthorized,
                        tok.start,
                        "IOW without capability",
                    ));
                }
                need(sp, 1, tok, "stack underflow at IOW")?;
                *sp -= 1;
            }
            IOR(device) => {
                if !caps.contains(device) {
                    return Err(ValidatorReport::fail(
                        Fault::Unauthorized,
                        tok.start,
                        "IOR without capability",
                    ));
                }
                *sp += 1;
            }

            _ => {}
        }

        i += 1;
    }

    Ok(())
}

/// Reachability pass: BFS over the control-flow graph from token 0.
/// `HALT` and `RT` are terminal; `JMP` has one successor; conditional
/// jumps have two; everything else falls through.
fn check_reachability(toks: &[Tok]) -> Result<(), ValidatorReport> {
    use Instruction::*;

    if toks.is_empty() {
        return Ok(());
    }

    let mut reachable = vec![false; toks.len()];
    let mut queue = std::collections::VecDeque::new();
    reachable[0] = true;
    queue.push_back(0usize);

    while let Some(i) = queue.pop_front() {
        let tok = &toks[i];
        let mut enqueue = |idx: i64, reachable: &mut Vec<bool>, queue: &mut std::collections::VecDeque<usize>| {
            if idx >= 0 && (idx as usize) < toks.len() && !reachable[idx as usize] {
                reachable[idx as usize] = true;
                queue.push_back(idx as usize);
            }
        };

        match tok.inst {
            JMP(offset) => {
                let target = i as i64 + 1 + i64::from(offset);
                if target < 0 || target >= toks.len() as i64 {
                    return Err(ValidatorReport::fail(
                        Fault::PcOob,
                        tok.start,
                        "jump target out of bounds",
                    ));
                }
                enqueue(target, &mut reachable, &mut queue);
            }
            JZ(offset) | JNZ(offset) | DWHL(offset) | WHIL(offset) => {
                let target = i as i64 + 1 + i64::from(offset);
                if target < 0 || target >= toks.len() as i64 {
                    return Err(ValidatorReport::fail(
                        Fault::PcOob,
                        tok.start,
                        "jump target out of bounds",
                    ));
                }
                enqueue(target, &mut reachable, &mut queue);
                enqueue(i as i64 + 1, &mut reachable, &mut queue);
            }
            HALT | RT => {}
            _ => enqueue(i as i64 + 1, &mut reachable, &mut queue),
        }
    }

    for (i, tok) in toks.iter().enumerate() {
        if !reachable[i] {
            return Err(ValidatorReport::fail(
                Fault::BadArg,
                tok.start,
                "unreachable code",
            ));
        }
    }
    Ok(())
}

/// Validate a code buffer, reporting the first failure.
pub fn validate(code: &[u8]) -> ValidatorReport {
    if code.is_empty() {
        return ValidatorReport::fail(Fault::BadEncoding, 0, "empty code buffer");
    }

    let toks = match build_tokens(code) {
        Ok(toks) => toks,
        Err(report) => return report,
    };

    if let Err(report) = check_blocks(&toks, code.len()) {
        return report;
    }
    if let Err(report) = check_indices(&toks) {
        return report;
    }

    let mut sp = 0i64;
    let mut caps = CapabilitySet::new();
    if let Err(report) = validate_range(&toks, 0, toks.len(), &mut sp, &mut caps) {
        return report;
    }

    if let Err(report) = check_reachability(&toks) {
        return report;
    }

    ValidatorReport::ok()
}

/// Full validation, additionally rejecting every opcode outside the
/// frozen core set (numbered 100 and above).
pub fn validate_core_only(code: &[u8]) -> ValidatorReport {
    let report = validate(code);
    if !report.valid {
        return report;
    }

    let toks = match build_tokens(code) {
        Ok(toks) => toks,
        Err(report) => return report,
    };
    for tok in &toks {
        if tok.inst.op() > 99 {
            return ValidatorReport::fail(
                Fault::UnknownOp,
                tok.start,
                "non-core opcode in core-only validation",
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CodeBuilder;
    use mtoken_asm::Instruction::*;

    fn assemble(insts: &[Instruction]) -> Vec<u8> {
        let mut b = CodeBuilder::new();
        b.extend(insts.iter().copied());
        b.build()
    }

    #[test]
    fn straight_line_code_is_valid() {
        let code = assemble(&[LIT(5), LIT(3), LIT(2), MUL, ADD, HALT]);
        assert!(validate(&code).valid);
    }

    #[test]
    fn underflow_is_detected() {
        let code = assemble(&[LIT(1), ADD, HALT]);
        let report = validate(&code);
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::StackUnderflow));
    }

    #[test]
    fn unbalanced_blocks_are_detected() {
        let report = validate(&assemble(&[B, LIT(1), DRP, HALT]));
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::PcOob));

        let report = validate(&assemble(&[E, HALT]));
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::PcOob));
    }

    #[test]
    fn local_and_global_bounds() {
        let report = validate(&assemble(&[LIT(1), LET(64), HALT]));
        assert_eq!(report.fault, Some(Fault::LocalsOob));

        let report = validate(&assemble(&[LIT(1), SET(128), HALT]));
        assert_eq!(report.fault, Some(Fault::GlobalsOob));

        assert!(validate(&assemble(&[LIT(1), LET(63), LIT(1), SET(127), HALT])).valid);
    }

    #[test]
    fn if_branches_must_agree_on_stack_height() {
        // then pushes one, else pushes none.
        let code = assemble(&[
            LIT(1),
            IF,
            B,
            LIT(10),
            E,
            B,
            E,
            HALT,
        ]);
        let report = validate(&code);
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::BadArg));

        let code = assemble(&[
            LIT(1),
            IF,
            B,
            LIT(10),
            E,
            B,
            LIT(20),
            E,
            DRP,
            HALT,
        ]);
        assert!(validate(&code).valid);
    }

    #[test]
    fn loop_bodies_must_be_net_zero() {
        let code = assemble(&[LIT(1), WH, B, LIT(5), E, HALT]);
        let report = validate(&code);
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::BadArg));

        let code = assemble(&[LIT(1), WH, B, LIT(5), DRP, E, HALT]);
        assert!(validate(&code).valid);
    }

    #[test]
    fn jump_targets_are_bounds_checked() {
        let code = assemble(&[LIT(1), JZ(5), HALT]);
        let report = validate(&code);
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::PcOob));

        let code = assemble(&[LIT(1), JZ(0), HALT]);
        assert!(validate(&code).valid);
    }

    #[test]
    fn io_requires_a_capability_on_every_path() {
        let code = assemble(&[LIT(100), IOW(1), HALT]);
        let report = validate(&code);
        assert_eq!(report.fault, Some(Fault::Unauthorized));

        let code = assemble(&[GTWAY(1), LIT(100), IOW(1), HALT]);
        assert!(validate(&code).valid);

        // Granted in only one IF branch: the join drops the grant.
        let code = assemble(&[
            LIT(1),
            IF,
            B,
            GTWAY(1),
            E,
            B,
            E,
            LIT(100),
            IOW(1),
            HALT,
        ]);
        let report = validate(&code);
        assert_eq!(report.fault, Some(Fault::Unauthorized));

        // Granted in both branches: the join keeps it.
        let code = assemble(&[
            LIT(1),
            IF,
            B,
            GTWAY(1),
            E,
            B,
            GTWAY(1),
            E,
            LIT(100),
            IOW(1),
            HALT,
        ]);
        assert!(validate(&code).valid);
    }

    #[test]
    fn unreachable_code_is_rejected() {
        let mut b = CodeBuilder::new();
        b.inst(HALT);
        b.inst(LIT(1)); // dead
        let report = validate(&b.build());
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::BadArg));
        assert_eq!(report.msg, "unreachable code");
    }

    #[test]
    fn core_only_rejects_extensions() {
        let code = assemble(&[LIT(1), DRP, HALT]);
        assert!(validate_core_only(&code).valid);

        let code = assemble(&[LIT(1), JZ(0), HALT]);
        let report = validate_core_only(&code);
        assert!(!report.valid);
        assert_eq!(report.fault, Some(Fault::UnknownOp));
    }

    #[test]
    fn gtway_key_must_fit_a_device_id() {
        let code = assemble(&[GTWAY(256), HALT]);
        let report = validate(&code);
        assert_eq!(report.fault, Some(Fault::BadArg));
    }
}
