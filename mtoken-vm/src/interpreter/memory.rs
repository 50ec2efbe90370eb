//! Array, allocation, and collection handlers.

use mtoken_asm::Fault;

use super::Vm;
use crate::consts::{ALLOC_MAX_BYTES, ARRAY_MAX_LEN};
use crate::hooks::Hooks;
use crate::value::{HeapRef, Value};

impl<H> Vm<H> {
    fn pop_array_ref(&mut self) -> Result<HeapRef, Fault> {
        match self.pop()? {
            Value::Array(r) if self.heap.contains(r) => Ok(r),
            _ => Err(Fault::TypeMismatch),
        }
    }

    pub(crate) fn op_len(&mut self) -> Result<(), Fault> {
        self.need(1)?;
        let r = self.pop_array_ref()?;
        let len = self.heap.array(r).ok_or(Fault::TypeMismatch)?.len();
        self.push_unchecked(Value::Int(len as i64));
        Ok(())
    }

    pub(crate) fn op_get(&mut self) -> Result<(), Fault> {
        self.need(2)?;
        let index = self.pop()?.to_int();
        let r = self.pop_array_ref()?;

        let elems = self.heap.array(r).ok_or(Fault::TypeMismatch)?;
        if index < 0 || index >= elems.len() as i64 {
            return Err(Fault::IndexOob);
        }
        let value = elems[index as usize].clone();
        self.push_unchecked(value);
        Ok(())
    }

    /// `PUT`/`STO` write in place and push the array handle back, so the
    /// mutation is visible through every copy of the handle.
    pub(crate) fn op_put(&mut self) -> Result<(), Fault> {
        self.need(3)?;
        let value = self.pop()?;
        let index = self.pop()?.to_int();
        let r = self.pop_array_ref()?;

        let elems = self.heap.array_mut(r).ok_or(Fault::TypeMismatch)?;
        if index < 0 || index >= elems.len() as i64 {
            return Err(Fault::IndexOob);
        }
        elems[index as usize] = value;
        self.push_unchecked(Value::Array(r));
        Ok(())
    }

    pub(crate) fn op_newarr(&mut self) -> Result<(), Fault>
    where
        H: Hooks,
    {
        self.need(1)?;
        let size = self.pop()?.to_int();
        if !(0..=ARRAY_MAX_LEN).contains(&size) {
            return Err(Fault::BadArg);
        }

        let r = self.heap.alloc_array(size as usize);
        self.push_unchecked(Value::Array(r));
        self.auto_gc();
        Ok(())
    }

    pub(crate) fn op_alloc(&mut self) -> Result<(), Fault>
    where
        H: Hooks,
    {
        self.need(1)?;
        let size = self.pop()?.to_int();
        if !(1..=ALLOC_MAX_BYTES).contains(&size) {
            return Err(Fault::BadArg);
        }

        let r = self.heap.alloc_bytes(size as usize);
        self.push_unchecked(Value::Ref(r));
        self.auto_gc();
        Ok(())
    }

    pub(crate) fn op_free(&mut self) -> Result<(), Fault> {
        self.need(1)?;
        match self.pop()? {
            Value::Ref(r) => {
                self.heap.free(r);
                Ok(())
            }
            _ => Err(Fault::TypeMismatch),
        }
    }

    /// Mark from the stack, the active locals, every saved frame, and the
    /// globals, then sweep. Return-stack entries are addresses, not
    /// references, and are not roots.
    pub fn gc(&mut self) -> usize
    where
        H: Hooks,
    {
        let Self {
            heap,
            stack,
            locals,
            locals_frames,
            globals,
            hooks,
            ..
        } = self;

        let roots = stack
            .iter()
            .chain(locals.iter())
            .chain(locals_frames.iter().flatten())
            .chain(globals.iter());
        let freed = heap.collect(roots);

        hooks.trace(1, "GC completed");
        freed
    }

    /// Auto-GC check point, run after each allocation while the fresh
    /// handle is already rooted on the stack.
    fn auto_gc(&mut self)
    where
        H: Hooks,
    {
        if self.heap.due_for_collection() {
            self.gc();
        }
    }
}
