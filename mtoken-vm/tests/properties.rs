//! Property tests over generated straight-line programs.

use mtoken_asm::Instruction::{self, *};
use mtoken_vm::builder::CodeBuilder;
use mtoken_vm::lower;
use mtoken_vm::prelude::*;

use quickcheck_macros::quickcheck;

/// Map a byte seed onto a stack-balanced straight-line program.
///
/// Every choice keeps the simulated stack height non-negative, so the
/// result is always validator-clean; the interesting part is that the
/// engine agrees.
fn program_from_seed(seed: &[u8]) -> Vec<Instruction> {
    let mut height = 0i64;
    let mut insts = Vec::new();

    for &byte in seed.iter().take(200) {
        match byte % 10 {
            0 | 1 => {
                insts.push(LIT(i64::from(byte) - 128));
                height += 1;
            }
            2 if height >= 2 => {
                insts.push(ADD);
                height -= 1;
            }
            3 if height >= 2 => {
                insts.push(MUL);
                height -= 1;
            }
            4 if height >= 1 => {
                insts.push(DUP);
                height += 1;
            }
            5 if height >= 1 => {
                insts.push(DRP);
                height -= 1;
            }
            6 if height >= 2 => {
                insts.push(SWP);
            }
            7 if height >= 1 => {
                insts.push(LET(u32::from(byte) % 64));
                height -= 1;
            }
            8 => {
                insts.push(V(u32::from(byte) % 64));
                height += 1;
            }
            _ => insts.push(PH),
        }
    }

    insts.push(HALT);
    insts
}

fn assemble(insts: &[Instruction]) -> Vec<u8> {
    let mut b = CodeBuilder::new();
    b.extend(insts.iter().copied());
    b.build()
}

#[quickcheck]
fn lowering_is_identity_on_loop_free_programs(seed: Vec<u8>) -> bool {
    let code = assemble(&program_from_seed(&seed));
    lower::lower(&code) == Ok(None)
}

#[quickcheck]
fn generated_programs_validate_and_run_clean(seed: Vec<u8>) -> bool {
    let code = assemble(&program_from_seed(&seed));

    if !validate(&code).valid {
        return false;
    }

    let mut vm = Vm::new(code).unwrap();
    vm.set_step_limit(10_000);
    let result = vm.run();

    result == StepResult::Halted && vm.last_fault().is_none()
}

#[quickcheck]
fn validity_implies_no_structural_runtime_faults(seed: Vec<u8>) -> bool {
    // Looser generator: raw bytes as code. Most seeds fail validation;
    // the property only constrains the ones that pass.
    if seed.is_empty() {
        return true;
    }

    if !validate(&seed).valid {
        return true;
    }

    let Ok(mut vm) = Vm::new(seed) else {
        // Raw bytes the validator accepts can still trip the lowering
        // pass's linear stack simulation; that is a load error, not a
        // runtime fault.
        return true;
    };
    vm.set_step_limit(10_000);
    vm.run();

    // CL targets are not resolved statically, so a garbage call can
    // still fault on decoding; the structural guarantees cover opcodes,
    // stack depth, and capabilities.
    !matches!(
        vm.last_fault(),
        Some(Fault::UnknownOp | Fault::StackUnderflow | Fault::Unauthorized)
    )
}

#[quickcheck]
fn simulation_is_deterministic(seed: Vec<u8>) -> bool {
    let code = assemble(&program_from_seed(&seed));
    let mut vm = Vm::new(code).unwrap();

    let first = vm.simulate();
    let second = vm.simulate();

    first.result == second.result
        && first.steps == second.steps
        && first.fault == second.fault
        && first.trace == second.trace
}

#[quickcheck]
fn reset_is_idempotent(seed: Vec<u8>) -> bool {
    let code = assemble(&program_from_seed(&seed));
    let mut vm = Vm::new(code).unwrap();
    let _ = vm.run();

    vm.reset();
    let once = (vm.pc(), vm.sp(), vm.steps(), vm.gas(), vm.last_fault());
    vm.reset();
    let twice = (vm.pc(), vm.sp(), vm.steps(), vm.gas(), vm.last_fault());

    once == twice
}
