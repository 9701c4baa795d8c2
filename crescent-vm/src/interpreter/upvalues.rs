//! Upvalue access, closure instantiation and vararg handlers.

use std::rc::Rc;

use crescent_asm::Instruction;

use crate::chunk::Prototype;
use crate::closure::{closed_upvalue, Closure, UpvalueRef};
use crate::error::{DecodeError, VmError};
use crate::value::Value;

use super::Interpreter;

impl Interpreter {
    pub(crate) fn op_getupval(&mut self, i: Instruction) {
        let (a, b, _) = i.abc();
        let v = self
            .current_closure()
            .and_then(|c| c.upvalue(b))
            .map(|cell| self.read_upvalue(&cell))
            .unwrap_or(Value::Nil);
        self.frame.set(a as isize, v);
    }

    pub(crate) fn op_setupval(&mut self, i: Instruction) {
        let (a, b, _) = i.abc();
        let v = self.frame.get(a as isize);
        if let Some(cell) = self.current_closure().and_then(|c| c.upvalue(b)) {
            self.write_upvalue(&cell, v);
        }
    }

    pub(crate) fn op_gettabup(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let t = self
            .current_closure()
            .and_then(|cl| cl.upvalue(b))
            .map(|cell| self.read_upvalue(&cell))
            .unwrap_or(Value::Nil);
        let key = self.rk(proto, c);
        let v = self.table_get(&t, &key)?;
        self.frame.set(a as isize, v);
        Ok(())
    }

    pub(crate) fn op_settabup(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let t = self
            .current_closure()
            .and_then(|cl| cl.upvalue(a))
            .map(|cell| self.read_upvalue(&cell))
            .unwrap_or(Value::Nil);
        let key = self.rk(proto, b);
        let value = self.rk(proto, c);
        self.table_set(&t, key, value)
    }

    /// Instantiate a closure from a nested prototype, binding each
    /// descriptor either to a (possibly fresh) open cell of the current
    /// frame or to an upvalue of the running closure.
    pub(crate) fn op_closure(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, bx) = i.abx();
        let nested = proto
            .protos
            .get(bx)
            .cloned()
            .ok_or(DecodeError::UnexpectedEof)?;
        let enclosing = self.current_closure();
        let mut upvalues: Vec<UpvalueRef> = Vec::with_capacity(nested.upvalues.len());
        for desc in &nested.upvalues {
            let cell = if desc.in_stack {
                self.frame.open_upvalue(desc.index as usize)
            } else {
                enclosing
                    .as_ref()
                    .and_then(|c| c.upvalue(desc.index as usize))
                    .unwrap_or_else(|| closed_upvalue(Value::Nil))
            };
            upvalues.push(cell);
        }
        let closure = Closure::from_proto(nested, upvalues);
        self.frame.set(a as isize, Value::Closure(Rc::new(closure)));
        Ok(())
    }

    /// Copy varargs into registers; `B = 0` spills all of them above the
    /// register file, adjusting the top.
    pub(crate) fn op_vararg(&mut self, i: Instruction) {
        let (a, b, _) = i.abc();
        let varargs = self.frame.varargs.clone();
        if b == 0 {
            self.frame.data.truncate(a);
            self.frame.data.extend(varargs);
        } else {
            for j in 0..b - 1 {
                let v = varargs.get(j).cloned().unwrap_or(Value::Nil);
                self.frame.set((a + j) as isize, v);
            }
        }
    }
}
