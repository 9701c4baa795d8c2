//! Register transfer handlers: constants and moves.

use crescent_asm::Instruction;

use crate::chunk::Prototype;
use crate::error::VmError;
use crate::value::Value;

use super::Interpreter;

impl Interpreter {
    pub(crate) fn op_move(&mut self, i: Instruction) {
        let (a, b, _) = i.abc();
        let v = self.frame.get(b as isize);
        self.frame.set(a as isize, v);
    }

    pub(crate) fn op_loadk(&mut self, proto: &Prototype, i: Instruction) {
        let (a, bx) = i.abx();
        let v = proto.constants.get(bx).cloned().unwrap_or(Value::Nil);
        self.frame.set(a as isize, v);
    }

    pub(crate) fn op_loadkx(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, _) = i.abx();
        let ax = self.fetch_extra_arg(proto)?;
        let v = proto.constants.get(ax).cloned().unwrap_or(Value::Nil);
        self.frame.set(a as isize, v);
        Ok(())
    }

    pub(crate) fn op_loadbool(&mut self, i: Instruction) {
        let (a, b, c) = i.abc();
        self.frame.set(a as isize, Value::Boolean(b != 0));
        if c != 0 {
            self.frame.pc += 1;
        }
    }

    pub(crate) fn op_loadnil(&mut self, i: Instruction) {
        let (a, b, _) = i.abc();
        for r in a..=a + b {
            self.frame.set(r as isize, Value::Nil);
        }
    }
}
