//! Structured-to-flat loop lowering.
//!
//! Runs once at construction. `WH` and `FR` loops are rewritten into
//! `JZ`/`JMP` pairs so the engine only ever sees flat jumps in loop
//! positions:
//!
//! ```text
//! L_cond:  <cond tokens>
//!          JZ  L_end
//!          <body tokens>        (outer B/E dropped)
//!          <inc tokens>         (FR only, moved from before the loop op)
//!          JMP L_cond
//! L_end:
//! ```
//!
//! The condition preceding a loop opcode is located by simulating stack
//! effects over the token stream: every slot carries the contiguous token
//! range that produced its value, and the range on top of the stack when
//! the loop opcode pops it is the condition expression. Jump offsets are
//! re-encoded in opcode-index units, with an original-to-output index map
//! bridging jumps that cross a rewrite. One pass lowers the outermost
//! loops only, so passes repeat until the stream is loop-free.

use mtoken_asm::{Fault, Instruction, OpcodeRepr};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Range {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy)]
struct LoopInfo {
    cond_start: usize,
    /// First token inside the body, past the opening `B`.
    body_start: usize,
    /// Token index of the matching `E`.
    body_end: usize,
    /// `FR` increment range, moved behind the body.
    inc: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy)]
enum OutTok {
    /// Copied verbatim.
    Plain(Instruction),
    /// Jump whose target is a token index in the original stream.
    JumpOrig(Instruction, i64),
    /// Jump whose target is a token index in the output stream.
    JumpOut(Instruction, usize),
}

/// Lower every structured loop in `code`.
///
/// Returns `None` when the buffer contains no `WH`/`FR` (lowering is the
/// identity), or the replacement buffer otherwise. Malformed streams fail
/// with [`Fault::BadEncoding`].
pub fn lower(code: &[u8]) -> Result<Option<Vec<u8>>, Fault> {
    let mut current: Option<Vec<u8>> = None;

    loop {
        let view = current.as_deref().unwrap_or(code);
        match lower_once(view)? {
            Some(next) => current = Some(next),
            None => return Ok(current),
        }
    }
}

fn tokenize(code: &[u8]) -> Result<Vec<Instruction>, Fault> {
    let mut toks = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        toks.push(Instruction::decode(code, &mut pc)?);
    }
    Ok(toks)
}

/// One lowering pass over the outermost loops. `None` means no loop was
/// found and the buffer is already flat.
fn lower_once(code: &[u8]) -> Result<Option<Vec<u8>>, Fault> {
    if code.is_empty() {
        return Err(Fault::BadEncoding);
    }

    let toks = tokenize(code)?;
    let (loops, loop_at) = discover_loops(&toks)?;

    if loops.is_empty() {
        return Ok(None);
    }

    debug!(loops = loops.len(), tokens = toks.len(), "lowering structured loops");

    // FR increments move behind the body; their original positions are
    // dropped from the normal emission path.
    let mut skip = vec![false; toks.len()];
    for info in &loops {
        if let Some((start, end)) = info.inc {
            for flag in &mut skip[start..=end] {
                *flag = true;
            }
        }
    }

    let mut out: Vec<OutTok> = Vec::new();
    let mut orig_to_out: Vec<Option<usize>> = vec![None; toks.len()];

    let mut emit = |out: &mut Vec<OutTok>, orig_to_out: &mut Vec<Option<usize>>, k: usize| {
        let inst = toks[k];
        let tok = match inst.jump_offset() {
            Some(off) => OutTok::JumpOrig(inst, k as i64 + 1 + i64::from(off)),
            None => OutTok::Plain(inst),
        };
        out.push(tok);
        orig_to_out[k] = Some(out.len() - 1);
    };

    let mut i = 0;
    while i < toks.len() {
        if let Some(loop_idx) = loop_at[i] {
            let info = loops[loop_idx];
            let cond_out = orig_to_out[info.cond_start].ok_or(Fault::BadEncoding)?;

            let jz_index = out.len();
            out.push(OutTok::JumpOut(Instruction::JZ(0), 0));

            for k in info.body_start..info.body_end {
                emit(&mut out, &mut orig_to_out, k);
            }
            if let Some((start, end)) = info.inc {
                for k in start..=end {
                    emit(&mut out, &mut orig_to_out, k);
                }
            }

            out.push(OutTok::JumpOut(Instruction::JMP(0), cond_out));
            out[jz_index] = OutTok::JumpOut(Instruction::JZ(0), out.len());

            // Resume past the matching E; the loop's B/E pair is dropped.
            i = info.body_end + 1;
            continue;
        }

        if !skip[i] {
            emit(&mut out, &mut orig_to_out, i);
        }
        i += 1;
    }

    let mut bytes = Vec::with_capacity(code.len() + 16);
    for (i, tok) in out.iter().enumerate() {
        let rel = |target_out: usize| target_out as i32 - (i as i32 + 1);
        match *tok {
            OutTok::Plain(inst) => inst.encode(&mut bytes),
            OutTok::JumpOut(inst, target) => inst.with_jump_offset(rel(target)).encode(&mut bytes),
            OutTok::JumpOrig(inst, target_orig) => {
                let target_out = usize::try_from(target_orig)
                    .ok()
                    .and_then(|t| orig_to_out.get(t).copied().flatten())
                    .ok_or(Fault::BadEncoding)?;
                inst.with_jump_offset(rel(target_out)).encode(&mut bytes);
            }
        }
    }

    Ok(Some(bytes))
}

/// Simulate stack effects token-by-token, tagging each slot with the
/// range of tokens that produced it, and capture loop shapes at every
/// `WH`/`FR`.
fn discover_loops(toks: &[Instruction]) -> Result<(Vec<LoopInfo>, Vec<Option<usize>>), Fault> {
    use Instruction::*;

    let mut loops = Vec::new();
    let mut loop_at: Vec<Option<usize>> = vec![None; toks.len()];

    let mut stack: Vec<Range> = Vec::new();

    for (i, inst) in toks.iter().enumerate() {
        let mut popped_cond: Option<Range> = None;

        match *inst {
            LIT(_) | V(_) | IOR(_) => stack.push(Range { start: i, end: i }),
            LEN | NEG | NOT => {
                stack.pop().ok_or(Fault::BadEncoding)?;
                stack.push(Range { start: i, end: i });
            }
            DUP => {
                let top = *stack.last().ok_or(Fault::BadEncoding)?;
                stack.push(top);
            }
            DRP => {
                stack.pop().ok_or(Fault::BadEncoding)?;
            }
            SWP | SWP_ALIAS => {
                let len = stack.len();
                if len < 2 {
                    return Err(Fault::BadEncoding);
                }
                stack.swap(len - 1, len - 2);
            }
            ROT => {
                let len = stack.len();
                if len < 3 {
                    return Err(Fault::BadEncoding);
                }
                let a = stack[len - 3];
                stack[len - 3] = stack[len - 2];
                stack[len - 2] = stack[len - 1];
                stack[len - 1] = a;
            }
            GET | GET_ALIAS | IDX => {
                let b = stack.pop().ok_or(Fault::BadEncoding)?;
                let a = stack.pop().ok_or(Fault::BadEncoding)?;
                stack.push(Range {
                    start: a.start.min(b.start),
                    end: i,
                });
            }
            PUT | PUT_ALIAS | STO => {
                let c = stack.pop().ok_or(Fault::BadEncoding)?;
                let b = stack.pop().ok_or(Fault::BadEncoding)?;
                let a = stack.pop().ok_or(Fault::BadEncoding)?;
                stack.push(Range {
                    start: a.start.min(b.start).min(c.start),
                    end: i,
                });
            }
            NEWARR | ALLOC => {
                let a = stack.pop().ok_or(Fault::BadEncoding)?;
                stack.push(Range { start: a.start, end: i });
            }
            FREE | LET(_) | SET(_) | IOW(_) | RT => {
                stack.pop().ok_or(Fault::BadEncoding)?;
            }
            ADD | SUB | MUL | DIV | AND | OR | XOR | SHL | SHR | LT | GT | LE | GE | EQ | NEQ
            | MOD => {
                let b = stack.pop().ok_or(Fault::BadEncoding)?;
                let a = stack.pop().ok_or(Fault::BadEncoding)?;
                stack.push(Range {
                    start: a.start.min(b.start),
                    end: i,
                });
            }
            CL(_, argc) => {
                let mut start = i;
                for _ in 0..argc {
                    let arg = stack.pop().ok_or(Fault::BadEncoding)?;
                    start = start.min(arg.start);
                }
                stack.push(Range { start, end: i });
            }
            IF | JZ(_) | JNZ(_) => {
                stack.pop().ok_or(Fault::BadEncoding)?;
            }
            WH | FR => {
                popped_cond = Some(stack.pop().ok_or(Fault::BadEncoding)?);
            }
            _ => {}
        }

        let Some(cond) = popped_cond else { continue };

        if toks.get(i + 1) != Some(&Instruction::B) {
            return Err(Fault::BadEncoding);
        }
        let body_end = matching_e(toks, i + 1).ok_or(Fault::BadEncoding)?;

        let inc = if matches!(inst, FR) && cond.end + 1 <= i - 1 {
            Some((cond.end + 1, i - 1))
        } else {
            None
        };

        loop_at[i] = Some(loops.len());
        loops.push(LoopInfo {
            cond_start: cond.start,
            body_start: i + 2,
            body_end,
            inc,
        });
    }

    Ok((loops, loop_at))
}

/// Token index of the `E` matching the `B` at `b_idx`.
fn matching_e(toks: &[Instruction], b_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, inst) in toks.iter().enumerate().skip(b_idx) {
        match inst.repr() {
            Some(OpcodeRepr::B) => depth += 1,
            Some(OpcodeRepr::E) => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(insts: &[Instruction]) -> Vec<u8> {
        let mut out = Vec::new();
        for inst in insts {
            inst.encode(&mut out);
        }
        out
    }

    fn disassemble(code: &[u8]) -> Vec<Instruction> {
        tokenize(code).unwrap()
    }

    #[test]
    fn loop_free_code_is_untouched() {
        let code = assemble(&[
            Instruction::LIT(5),
            Instruction::LIT(3),
            Instruction::ADD,
            Instruction::HALT,
        ]);
        assert_eq!(lower(&code), Ok(None));
    }

    #[test]
    fn while_loop_becomes_jz_jmp() {
        use Instruction::*;

        // sum = 0; x = 5; while (x > 0) { sum += x; x -= 1 }
        let code = assemble(&[
            LIT(5),
            LET(0),
            LIT(0),
            LET(1),
            V(0),
            LIT(0),
            GT,
            WH,
            B,
            V(1),
            V(0),
            ADD,
            LET(1),
            V(0),
            LIT(1),
            SUB,
            LET(0),
            E,
            V(1),
            HALT,
        ]);

        let lowered = lower(&code).unwrap().expect("loop present");
        let toks = disassemble(&lowered);

        assert_eq!(
            toks,
            vec![
                LIT(5),
                LET(0),
                LIT(0),
                LET(1),
                V(0),
                LIT(0),
                GT,
                JZ(9),
                V(1),
                V(0),
                ADD,
                LET(1),
                V(0),
                LIT(1),
                SUB,
                LET(0),
                JMP(-13),
                V(1),
                HALT,
            ]
        );
    }

    #[test]
    fn for_loop_moves_the_increment_behind_the_body() {
        use Instruction::*;

        // for (x = 5, sum = 0; x > 0; x -= 1) { sum += x }
        let code = assemble(&[
            LIT(5),
            LET(0),
            LIT(0),
            LET(1),
            V(0),
            LIT(0),
            GT, // cond
            V(0),
            LIT(1),
            SUB,
            LET(0), // inc
            FR,
            B,
            V(1),
            V(0),
            ADD,
            LET(1), // body
            E,
            V(1),
            HALT,
        ]);

        let lowered = lower(&code).unwrap().expect("loop present");
        let toks = disassemble(&lowered);

        assert_eq!(
            toks,
            vec![
                LIT(5),
                LET(0),
                LIT(0),
                LET(1),
                V(0),
                LIT(0),
                GT,
                JZ(9),
                V(1),
                V(0),
                ADD,
                LET(1),
                V(0),
                LIT(1),
                SUB,
                LET(0),
                JMP(-13),
                V(1),
                HALT,
            ]
        );
    }

    #[test]
    fn nested_loops_lower_to_a_flat_stream() {
        use Instruction::*;

        let code = assemble(&[
            LIT(3),
            LET(0),
            V(0),
            LIT(0),
            GT,
            WH,
            B,
            LIT(2),
            LET(1),
            V(1),
            LIT(0),
            GT,
            WH,
            B,
            V(1),
            LIT(1),
            SUB,
            LET(1),
            E,
            V(0),
            LIT(1),
            SUB,
            LET(0),
            E,
            HALT,
        ]);

        let lowered = lower(&code).unwrap().expect("loops present");
        for tok in disassemble(&lowered) {
            assert!(
                !matches!(tok, WH | FR),
                "structured loop survived lowering: {tok:?}"
            );
        }
    }

    #[test]
    fn malformed_loop_is_rejected() {
        use Instruction::*;

        // WH with no B after it.
        let code = assemble(&[LIT(1), WH, HALT]);
        assert_eq!(lower(&code), Err(Fault::BadEncoding));

        // WH with an unterminated body.
        let code = assemble(&[LIT(1), WH, B, LIT(2), DRP]);
        assert_eq!(lower(&code), Err(Fault::BadEncoding));
    }
}
