//! Arithmetic, comparison, and stack-shuffling handlers.
//!
//! Binary handlers pop `b` then `a` and push the result; everything runs
//! on the canonical `i64` view with wrapping semantics. Faults leave the
//! stack as it stood when the fault was detected.

use mtoken_asm::Fault;

use super::Vm;
use crate::value::Value;

impl<H> Vm<H> {
    pub(crate) fn alu_binary<F>(&mut self, f: F) -> Result<(), Fault>
    where
        F: FnOnce(i64, i64) -> i64,
    {
        self.need(2)?;
        let b = self.pop()?.to_int();
        let a = self.pop()?.to_int();
        self.push_unchecked(Value::Int(f(a, b)));
        Ok(())
    }

    pub(crate) fn alu_unary<F>(&mut self, f: F) -> Result<(), Fault>
    where
        F: FnOnce(i64) -> i64,
    {
        self.need(1)?;
        let a = self.pop()?.to_int();
        self.push_unchecked(Value::Int(f(a)));
        Ok(())
    }

    /// `DIV` and `MOD`: the divisor faults before the dividend is popped.
    pub(crate) fn alu_divmod<F>(&mut self, zero_fault: Fault, f: F) -> Result<(), Fault>
    where
        F: FnOnce(i64, i64) -> i64,
    {
        self.need(2)?;
        let b = self.pop()?.to_int();
        if b == 0 {
            return Err(zero_fault);
        }
        let a = self.pop()?.to_int();
        self.push_unchecked(Value::Int(f(a, b)));
        Ok(())
    }

    pub(crate) fn op_eq(&mut self) -> Result<(), Fault> {
        self.need(2)?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push_unchecked(Value::Int(i64::from(a.eq_value(&b))));
        Ok(())
    }

    pub(crate) fn op_neq(&mut self) -> Result<(), Fault> {
        self.need(2)?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push_unchecked(Value::Int(i64::from(!a.eq_value(&b))));
        Ok(())
    }

    pub(crate) fn op_dup(&mut self) -> Result<(), Fault> {
        self.need(1)?;
        self.need_space(1)?;
        let top = self.stack.last().cloned().expect("need(1) held");
        self.push_unchecked(top);
        Ok(())
    }

    pub(crate) fn op_drp(&mut self) -> Result<(), Fault> {
        self.pop().map(drop)
    }

    pub(crate) fn op_swp(&mut self) -> Result<(), Fault> {
        self.need(2)?;
        let len = self.stack.len();
        self.stack.swap(len - 1, len - 2);
        Ok(())
    }

    /// `a, b, c -> b, c, a`
    pub(crate) fn op_rot(&mut self) -> Result<(), Fault> {
        self.need(3)?;
        let len = self.stack.len();
        self.stack[len - 3..].rotate_left(1);
        Ok(())
    }

    pub(crate) fn op_lit(&mut self, literal: i64) -> Result<(), Fault> {
        self.push(Value::Int(literal))
    }

    pub(crate) fn op_local_get(&mut self, index: u32) -> Result<(), Fault> {
        self.need_space(1)?;
        let value = self
            .locals
            .get(index as usize)
            .cloned()
            .ok_or(Fault::LocalsOob)?;
        self.push_unchecked(value);
        Ok(())
    }

    pub(crate) fn op_local_set(&mut self, index: u32) -> Result<(), Fault> {
        self.need(1)?;
        if index as usize >= self.locals.len() {
            return Err(Fault::LocalsOob);
        }
        let value = self.pop()?;
        self.locals[index as usize] = value;
        Ok(())
    }

    pub(crate) fn op_global_set(&mut self, index: u32) -> Result<(), Fault> {
        self.need(1)?;
        if index as usize >= self.globals.len() {
            return Err(Fault::GlobalsOob);
        }
        let value = self.pop()?;
        self.globals[index as usize] = value;
        Ok(())
    }
}
