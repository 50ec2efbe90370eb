use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
/// A breakpoint: a code byte offset plus a host-chosen id.
pub struct Breakpoint {
    pc: usize,
    id: u32,
}

impl Breakpoint {
    /// Create a breakpoint at a byte offset.
    pub const fn new(pc: usize, id: u32) -> Self {
        Self { pc, id }
    }

    /// Byte offset the breakpoint guards.
    pub const fn pc(&self) -> usize {
        self.pc
    }

    /// Host-chosen identifier.
    pub const fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Debugger verdict for the instruction about to execute.
pub enum DebugEval {
    /// Proceed normally.
    Continue,
    /// Pause before executing; carries the breakpoint hit.
    Break(Breakpoint),
}

impl DebugEval {
    /// Whether execution should proceed.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

#[derive(Debug, Default, Clone)]
/// Per-VM breakpoint table and single-step flag.
///
/// Owned by each VM instance, so independent interpreters never share
/// debug state.
pub struct Debugger {
    breakpoints: HashMap<usize, u32>,
    single_step: bool,
    last_break: Option<usize>,
}

impl Debugger {
    /// Register (or re-register) a breakpoint; the id of any previous
    /// breakpoint at the same offset is returned.
    pub fn set_breakpoint(&mut self, pc: usize, id: u32) -> Option<u32> {
        self.breakpoints.insert(pc, id)
    }

    /// Remove the breakpoint at `pc`, returning its id.
    pub fn clear_breakpoint(&mut self, pc: usize) -> Option<u32> {
        self.breakpoints.remove(&pc)
    }

    /// Drop every breakpoint.
    pub fn clear_all_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Whether single-step mode is armed.
    pub const fn single_stepping(&self) -> bool {
        self.single_step
    }

    /// Arm or disarm single-step mode.
    pub fn set_single_stepping(&mut self, enabled: bool) {
        self.single_step = enabled;
    }

    /// Disarm single-step and forget any in-progress pause, keeping the
    /// breakpoint table. Called on `reset`.
    pub fn clear_transient(&mut self) {
        self.single_step = false;
        self.last_break = None;
    }

    /// Decide whether the instruction at `pc` may execute.
    ///
    /// The pause-resume handshake mirrors a contract debugger: the first
    /// arrival at a breakpoint pauses; the immediately following arrival
    /// at the same offset (the host resuming) continues and forgets the
    /// pause.
    pub fn eval_state(&mut self, pc: usize) -> DebugEval {
        let last = self.last_break.take();

        match self.breakpoints.get(&pc) {
            Some(&id) if last != Some(pc) => {
                self.last_break = Some(pc);
                DebugEval::Break(Breakpoint::new(pc, id))
            }
            _ => DebugEval::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_pauses_once_then_resumes() {
        let mut debugger = Debugger::default();
        debugger.set_breakpoint(4, 1);

        assert_eq!(debugger.eval_state(4), DebugEval::Break(Breakpoint::new(4, 1)));
        // The host resumes from the same offset.
        assert_eq!(debugger.eval_state(4), DebugEval::Continue);
        // A later arrival pauses again.
        assert_eq!(debugger.eval_state(4), DebugEval::Break(Breakpoint::new(4, 1)));
    }

    #[test]
    fn clearing_removes_the_pause(){
        let mut debugger = Debugger::default();
        debugger.set_breakpoint(4, 1);
        assert_eq!(debugger.clear_breakpoint(4), Some(1));
        assert_eq!(debugger.eval_state(4), DebugEval::Continue);
        assert_eq!(debugger.clear_breakpoint(4), None);
    }
}
