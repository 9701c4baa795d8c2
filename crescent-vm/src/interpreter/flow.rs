//! Control-flow handlers: jumps, truthiness branches, loops, calls and
//! returns.

use crescent_asm::Instruction;

use crate::chunk::Prototype;
use crate::error::VmError;
use crate::value::Value;

use super::arith::{ArithOp, CompareOp};
use super::{ExecuteState, Interpreter};

impl Interpreter {
    pub(crate) fn op_jmp(&mut self, i: Instruction) {
        let (a, sbx) = i.asbx();
        self.jump(sbx);
        if a != 0 {
            self.frame.close_upvalues_from(a - 1);
        }
    }

    fn jump(&mut self, sbx: i32) {
        self.frame.pc = (self.frame.pc as i64 + sbx as i64) as usize;
    }

    /// Comparison instructions skip the following instruction when the
    /// result disagrees with the boolean interpretation of `A`.
    pub(crate) fn op_compare(
        &mut self,
        proto: &Prototype,
        i: Instruction,
        op: CompareOp,
    ) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let lhs = self.rk(proto, b);
        let rhs = self.rk(proto, c);
        let verdict = self.compare(&lhs, &rhs, op)?;
        if verdict != (a != 0) {
            self.frame.pc += 1;
        }
        Ok(())
    }

    pub(crate) fn op_test(&mut self, i: Instruction) {
        let (a, _, c) = i.abc();
        if self.frame.get(a as isize).is_truthy() != (c != 0) {
            self.frame.pc += 1;
        }
    }

    pub(crate) fn op_testset(&mut self, i: Instruction) {
        let (a, b, c) = i.abc();
        let v = self.frame.get(b as isize);
        if v.is_truthy() == (c != 0) {
            self.frame.set(a as isize, v);
        } else {
            self.frame.pc += 1;
        }
    }

    /// `FORPREP` backs the counter off by one step and jumps to the
    /// matching `FORLOOP`.
    pub(crate) fn op_forprep(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, sbx) = i.asbx();
        let counter = self.frame.get(a as isize);
        let step = self.frame.get(a as isize + 2);
        let v = self.arith(&counter, &step, ArithOp::Sub)?;
        self.frame.set(a as isize, v);
        self.jump(sbx);
        Ok(())
    }

    /// `FORLOOP` advances the counter and, while the limit holds, copies
    /// it into the induction variable and jumps back.
    pub(crate) fn op_forloop(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, sbx) = i.asbx();
        let counter = self.frame.get(a as isize);
        let step = self.frame.get(a as isize + 2);
        let counter = self.arith(&counter, &step, ArithOp::Add)?;
        self.frame.set(a as isize, counter.clone());
        let limit = self.frame.get(a as isize + 1);
        let positive = crate::number::to_float(&step).unwrap_or(0.0) >= 0.0;
        let proceed = if positive {
            self.compare(&counter, &limit, CompareOp::Le)?
        } else {
            self.compare(&limit, &counter, CompareOp::Le)?
        };
        if proceed {
            self.jump(sbx);
            self.frame.set(a as isize + 3, counter);
        }
        Ok(())
    }

    /// Generic-for step: call the iterator with `(state, control)` and
    /// spread up to `C` results starting at `R(A+3)`.
    pub(crate) fn op_tforcall(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, _, c) = i.abc();
        let iterator = self.frame.get(a as isize);
        let args = vec![
            self.frame.get(a as isize + 1),
            self.frame.get(a as isize + 2),
        ];
        let results = self.call_value(iterator, args)?;
        for j in 0..c {
            let v = results.get(j).cloned().unwrap_or(Value::Nil);
            self.frame.set((a + 3 + j) as isize, v);
        }
        Ok(())
    }

    pub(crate) fn op_tforloop(&mut self, i: Instruction) {
        let (a, sbx) = i.asbx();
        let control = self.frame.get(a as isize + 1);
        if !control.is_nil() {
            self.frame.set(a as isize, control);
            self.jump(sbx);
        }
    }

    /// `CALL`: gather the callee and arguments from registers, run the
    /// call, and spread the results back.
    pub(crate) fn op_call(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let results = self.call_from_registers(a, b)?;
        self.place_results(a, c, results);
        Ok(())
    }

    /// `TAILCALL` behaves as a call that keeps every result; the compiler
    /// always follows it with an open `RETURN`.
    pub(crate) fn op_tailcall(&mut self, i: Instruction) -> Result<(), VmError> {
        let (a, b, _) = i.abc();
        let results = self.call_from_registers(a, b)?;
        self.place_results(a, 0, results);
        Ok(())
    }

    pub(crate) fn op_return(&mut self, i: Instruction) -> ExecuteState {
        let (a, b, _) = i.abc();
        let results: Vec<Value> = if b > 0 {
            (0..b - 1).map(|j| self.frame.get((a + j) as isize)).collect()
        } else {
            (a as isize..=self.frame.top())
                .map(|r| self.frame.get(r))
                .collect()
        };
        ExecuteState::Return(results)
    }

    fn call_from_registers(&mut self, a: usize, b: usize) -> Result<Vec<Value>, VmError> {
        let callee = self.frame.get(a as isize);
        let args: Vec<Value> = if b > 0 {
            (1..b).map(|j| self.frame.get((a + j) as isize)).collect()
        } else {
            (a as isize + 1..=self.frame.top())
                .map(|r| self.frame.get(r))
                .collect()
        };
        self.call_value(callee, args)
    }

    /// Spread call results from `R(A)`: `C >= 1` forces exactly `C - 1`
    /// values and restores the register-file top, `C = 0` leaves all
    /// results as the new top.
    fn place_results(&mut self, a: usize, c: usize, results: Vec<Value>) {
        if c == 0 {
            self.frame.data.truncate(a);
            self.frame.data.extend(results);
        } else {
            let max = self.frame.max_registers;
            if max > 0 && self.frame.data.len() != max {
                self.frame.data.resize(max, Value::Nil);
            }
            for j in 0..c - 1 {
                let v = results.get(j).cloned().unwrap_or(Value::Nil);
                self.frame.set((a + j) as isize, v);
            }
        }
    }
}
