//! Table access handlers.

use crescent_asm::consts::FIELDS_PER_FLUSH;
use crescent_asm::conv::fp_byte_to_int;
use crescent_asm::Instruction;

use crate::chunk::Prototype;
use crate::error::VmError;
use crate::table::Table;
use crate::value::Value;

use super::Interpreter;

impl Interpreter {
    pub(crate) fn op_newtable(&mut self, i: Instruction) {
        let (a, b, c) = i.abc();
        let t = Table::with_capacity(fp_byte_to_int(b), fp_byte_to_int(c)).into_ref();
        self.frame.set(a as isize, Value::Table(t));
    }

    pub(crate) fn op_gettable(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let t = self.frame.get(b as isize);
        let key = self.rk(proto, c);
        let v = self.table_get(&t, &key)?;
        self.frame.set(a as isize, v);
        Ok(())
    }

    pub(crate) fn op_settable(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let t = self.frame.get(a as isize);
        let key = self.rk(proto, b);
        let value = self.rk(proto, c);
        self.table_set(&t, key, value)
    }

    pub(crate) fn op_self(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let t = self.frame.get(b as isize);
        self.frame.set(a as isize + 1, t.clone());
        let key = self.rk(proto, c);
        let v = self.table_get(&t, &key)?;
        self.frame.set(a as isize, v);
        Ok(())
    }

    /// Batch-assign a register range into the table at `R(A)`, `C` pages
    /// of `FIELDS_PER_FLUSH` indices at a time. `B = 0` flushes up to the
    /// current top and then restores the register-file top.
    pub(crate) fn op_setlist(&mut self, proto: &Prototype, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let page = if c > 0 {
            c - 1
        } else {
            self.fetch_extra_arg(proto)?
        };
        let target = self.frame.get(a as isize);
        let Value::Table(table) = target else {
            return Err(VmError::Type(format!(
                "attempt to index a {} value",
                target.type_name()
            )));
        };
        let count = if b > 0 {
            b
        } else {
            (self.frame.top() as usize).saturating_sub(a)
        };
        let mut index = (page * FIELDS_PER_FLUSH) as i64;
        for j in 1..=count {
            index += 1;
            let v = self.frame.get((a + j) as isize);
            table.borrow_mut().set(Value::Integer(index), v);
        }
        if b == 0 {
            let max = self.frame.max_registers as isize;
            self.frame.set_top(max - 1);
        }
        Ok(())
    }

    pub(crate) fn op_len(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, b, _) = i.abc();
        let v = self.frame.get(b as isize);
        let len = self.length_of(&v)?;
        self.frame.set(a as isize, len);
        Ok(())
    }

    /// Right-associative concatenation across `R(B)..R(C)`.
    pub(crate) fn op_concat(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let mut acc = self.frame.get(c as isize);
        for r in (b..c).rev() {
            let lhs = self.frame.get(r as isize);
            acc = self.concat_pair(lhs, acc)?;
        }
        self.frame.set(a as isize, acc);
        Ok(())
    }
}
