use mtoken_asm::Instruction::*;
use mtoken_vm::builder::CodeBuilder;
use mtoken_vm::prelude::*;

#[derive(Debug, Default)]
struct RecordingHooks {
    writes: Vec<(u8, i64)>,
    reads: Vec<u8>,
    read_value: i64,
    sleeps: Vec<i32>,
    traces: Vec<(u32, String)>,
}

impl Hooks for RecordingHooks {
    fn io_write(&mut self, device_id: u8, value: Value) {
        self.writes.push((device_id, value.to_int()));
    }

    fn io_read(&mut self, device_id: u8) -> Value {
        self.reads.push(device_id);
        Value::Int(self.read_value)
    }

    fn sleep_ms(&mut self, ms: i32) {
        self.sleeps.push(ms);
    }

    fn trace(&mut self, level: u32, msg: &str) {
        self.traces.push((level, msg.to_string()));
    }
}

fn assemble(insts: &[mtoken_asm::Instruction]) -> Vec<u8> {
    let mut b = CodeBuilder::new();
    b.extend(insts.iter().copied());
    b.build()
}

#[test]
fn io_write_without_capability_is_unauthorized() {
    let code = assemble(&[LIT(100), IOW(1), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Fault(Fault::Unauthorized));
    assert!(vm.as_ref().writes.is_empty(), "no write reached the host");
}

#[test]
fn gateway_grant_unlocks_the_device() {
    let code = assemble(&[GTWAY(1), LIT(100), IOW(1), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Halted);
    assert_eq!(vm.as_ref().writes, vec![(1, 100)]);
}

#[test]
fn grants_do_not_leak_across_devices() {
    let code = assemble(&[GTWAY(1), LIT(100), IOW(2), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Fault(Fault::Unauthorized));
}

#[test]
fn grants_are_cleared_by_reset() {
    let code = assemble(&[GTWAY(3), LIT(100), IOW(3), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Halted);
    assert_eq!(vm.as_ref().writes, vec![(3, 100)]);

    // Replay only the write, past the grant: the capability is gone.
    vm.reset();
    let after_grant = vm.token_map().offset_of(1).unwrap();
    let result = vm.exec_block(after_grant, vm.code().len());
    assert_eq!(result, StepResult::Fault(Fault::Unauthorized));
}

#[test]
fn io_read_pushes_the_host_value() {
    let code = assemble(&[GTWAY(4), IOR(4), HALT]);
    let mut vm = Vm::with_hooks(
        code,
        RecordingHooks {
            read_value: 42,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(vm.run(), StepResult::Halted);
    assert_eq!(vm.stack_top().unwrap().to_int(), 42);
    assert_eq!(vm.as_ref().reads, vec![4]);
}

#[test]
fn io_read_without_capability_is_unauthorized() {
    let code = assemble(&[IOR(4), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Fault(Fault::Unauthorized));
    assert!(vm.as_ref().reads.is_empty());
}

#[test]
fn null_hooks_read_zero() {
    let code = assemble(&[GTWAY(9), IOR(9), HALT]);
    let mut vm = Vm::new(code).unwrap();

    assert_eq!(vm.run(), StepResult::Halted);
    assert_eq!(vm.stack_top().unwrap().to_int(), 0);
}

#[test]
fn gateway_key_above_255_is_rejected() {
    let code = assemble(&[GTWAY(300), HALT]);
    let mut vm = Vm::new(code).unwrap();
    assert_eq!(vm.run(), StepResult::Fault(Fault::BadArg));
}

#[test]
fn wait_calls_the_sleep_hook() {
    let code = assemble(&[WAIT(250), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Halted);
    assert_eq!(vm.as_ref().sleeps, vec![250]);
}

#[test]
fn trace_reports_pc_and_mnemonic() {
    let code = assemble(&[LIT(1), TRACE(2), HALT]);
    let mut vm = Vm::with_hooks(code, RecordingHooks::default()).unwrap();

    assert_eq!(vm.run(), StepResult::Halted);
    let traces = &vm.as_ref().traces;
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].0, 2);
    assert!(traces[0].1.contains("TRACE(83)"));
    assert!(traces[0].1.contains("sp=0"));
}
