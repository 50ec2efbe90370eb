//! Capability grants and device I/O handlers.

use mtoken_asm::{opcode_name, Fault};

use super::Vm;
use crate::hooks::Hooks;

impl<H: Hooks> Vm<H> {
    /// `GTWAY <id>`: grant a device capability for the rest of the
    /// execution. Ids above 255 are rejected.
    pub(crate) fn op_gtway(&mut self, key: u32) -> Result<(), Fault> {
        if key > 255 {
            return Err(Fault::BadArg);
        }
        self.caps.insert(key);
        Ok(())
    }

    pub(crate) fn op_wait(&mut self, ms: u32) -> Result<(), Fault> {
        self.hooks.sleep_ms(ms as i32);
        Ok(())
    }

    pub(crate) fn op_iow(&mut self, device: u32) -> Result<(), Fault> {
        self.need(1)?;
        if !self.caps.contains(device) {
            return Err(Fault::Unauthorized);
        }
        let value = self.pop()?;
        self.hooks.io_write(device as u8, value);
        Ok(())
    }

    pub(crate) fn op_ior(&mut self, device: u32) -> Result<(), Fault> {
        self.need_space(1)?;
        if !self.caps.contains(device) {
            return Err(Fault::Unauthorized);
        }
        let value = self.hooks.io_read(device as u8);
        self.push_unchecked(value);
        Ok(())
    }

    pub(crate) fn op_trace(&mut self, level: u32) -> Result<(), Fault> {
        let msg = format!(
            "Trace level {level}: pc={} op={}({}) sp={}",
            self.last_pc.map_or(-1, |pc| pc as i64),
            opcode_name(self.last_op),
            self.last_op,
            self.sp(),
        );
        self.hooks.trace(level, &msg);
        Ok(())
    }
}
