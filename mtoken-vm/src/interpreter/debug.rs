//! Debugging surface: breakpoints, single-stepping, fault clearing.

use mtoken_asm::Fault;

use super::Vm;

impl<H> Vm<H> {
    /// Get single-stepping mode.
    pub fn single_stepping(&self) -> bool {
        self.debugger.single_stepping()
    }

    /// Arm or disarm single-step mode. While armed, the engine pauses
    /// after each executed instruction with no fault set.
    pub fn set_single_stepping(&mut self, enabled: bool) {
        self.debugger.set_single_stepping(enabled)
    }

    /// Register a breakpoint at a byte offset. Reaching that offset
    /// pauses the engine synchronously with [`Fault::Breakpoint`] before
    /// the instruction executes; [`Self::clear_fault`] resumes past it.
    pub fn set_breakpoint(&mut self, pc: usize, id: u32) -> Option<u32> {
        self.debugger.set_breakpoint(pc, id)
    }

    /// Remove the breakpoint at `pc`, returning its id.
    pub fn clear_breakpoint(&mut self, pc: usize) -> Option<u32> {
        self.debugger.clear_breakpoint(pc)
    }

    /// Drop every breakpoint.
    pub fn clear_all_breakpoints(&mut self) {
        self.debugger.clear_all_breakpoints()
    }

    /// Clear a parked fault and mark the VM runnable again, e.g. to
    /// resume past a breakpoint pause. The interpreter state is kept
    /// as-is; use `reset` for a clean slate.
    pub fn clear_fault(&mut self) {
        self.fault = None;
        self.running = true;
    }

    /// `BP <id>`: record a breakpoint at this instruction's own offset.
    pub(crate) fn op_bp(&mut self, id: u32) -> Result<(), Fault> {
        if let Some(pc) = self.last_pc {
            self.debugger.set_breakpoint(pc, id);
        }
        Ok(())
    }

    /// `STEP`: arm single-step; the engine pauses after the next
    /// instruction executes.
    pub(crate) fn op_step(&mut self) -> Result<(), Fault> {
        self.debugger.set_single_stepping(true);
        Ok(())
    }
}
