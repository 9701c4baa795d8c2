//! The instruction dispatch loop.

use crescent_asm::{constant_index, is_constant, Instruction, Opcode};
use tracing::{debug, trace};

use crate::chunk::Prototype;
use crate::closure::ClosureKind;
use crate::error::{DecodeError, VmError};
use crate::value::Value;

use super::arith::{ArithOp, CompareOp};
use super::{ExecuteState, Interpreter};

impl Interpreter {
    /// Run the current frame to its `RETURN` (or past the end of its
    /// code), yielding the returned values.
    pub(crate) fn run(&mut self) -> Result<Vec<Value>, VmError> {
        loop {
            match self.step()? {
                ExecuteState::Proceed => (),
                ExecuteState::Return(results) => return Ok(results),
            }
        }
    }

    /// Resolve an RK operand against the register file or constant pool.
    pub(crate) fn rk(&self, proto: &Prototype, x: usize) -> Value {
        if is_constant(x) {
            proto
                .constants
                .get(constant_index(x))
                .cloned()
                .unwrap_or(Value::Nil)
        } else {
            self.frame.get(x as isize)
        }
    }

    /// Consume the `EXTRAARG` instruction following the current one.
    pub(crate) fn fetch_extra_arg(&mut self, proto: &Prototype) -> Result<usize, VmError> {
        let extra = proto
            .code
            .get(self.frame.pc)
            .copied()
            .ok_or(DecodeError::UnexpectedEof)?;
        self.frame.pc += 1;
        Ok(extra.ax())
    }

    /// Fetch, decode and execute one instruction of the current frame.
    fn step(&mut self) -> Result<ExecuteState, VmError> {
        let Some(closure) = self.current_closure() else {
            return Ok(ExecuteState::Return(Vec::new()));
        };
        let proto = match &closure.kind {
            ClosureKind::Lua(proto) => proto.clone(),
            ClosureKind::Host(_) => return Ok(ExecuteState::Return(Vec::new())),
        };
        let Some(&instruction) = proto.code.get(self.frame.pc) else {
            return Ok(ExecuteState::Return(Vec::new()));
        };
        let pc = self.frame.pc;
        self.frame.pc += 1;
        let op = instruction
            .opcode()
            .map_err(|byte| VmError::from(DecodeError::UnknownOpcode(byte)))?;
        trace!(pc, op = %op, "dispatch");
        if self.is_debug() {
            debug!("OP: {op}");
        }

        match op {
            Opcode::Move => self.op_move(instruction),
            Opcode::LoadK => self.op_loadk(&proto, instruction),
            Opcode::LoadKx => self.op_loadkx(&proto, instruction)?,
            Opcode::LoadBool => self.op_loadbool(instruction),
            Opcode::LoadNil => self.op_loadnil(instruction),

            Opcode::GetUpval => self.op_getupval(instruction),
            Opcode::GetTabUp => self.op_gettabup(&proto, instruction)?,
            Opcode::GetTable => self.op_gettable(&proto, instruction)?,
            Opcode::SetTabUp => self.op_settabup(&proto, instruction)?,
            Opcode::SetUpval => self.op_setupval(instruction),
            Opcode::SetTable => self.op_settable(&proto, instruction)?,
            Opcode::NewTable => self.op_newtable(instruction),
            Opcode::Self_ => self.op_self(&proto, instruction)?,

            Opcode::Add => self.op_arith(&proto, instruction, ArithOp::Add)?,
            Opcode::Sub => self.op_arith(&proto, instruction, ArithOp::Sub)?,
            Opcode::Mul => self.op_arith(&proto, instruction, ArithOp::Mul)?,
            Opcode::Mod => self.op_arith(&proto, instruction, ArithOp::Mod)?,
            Opcode::Pow => self.op_arith(&proto, instruction, ArithOp::Pow)?,
            Opcode::Div => self.op_arith(&proto, instruction, ArithOp::Div)?,
            Opcode::IDiv => self.op_arith(&proto, instruction, ArithOp::IDiv)?,
            Opcode::BAnd => self.op_arith(&proto, instruction, ArithOp::BAnd)?,
            Opcode::BOr => self.op_arith(&proto, instruction, ArithOp::BOr)?,
            Opcode::BXor => self.op_arith(&proto, instruction, ArithOp::BXor)?,
            Opcode::Shl => self.op_arith(&proto, instruction, ArithOp::Shl)?,
            Opcode::Shr => self.op_arith(&proto, instruction, ArithOp::Shr)?,
            Opcode::Unm => self.op_unary_arith(instruction, ArithOp::Unm)?,
            Opcode::BNot => self.op_unary_arith(instruction, ArithOp::BNot)?,
            Opcode::Not => self.op_not(instruction),
            Opcode::Len => self.op_len(instruction)?,
            Opcode::Concat => self.op_concat(instruction)?,

            Opcode::Jmp => self.op_jmp(instruction),
            Opcode::Eq => self.op_compare(&proto, instruction, CompareOp::Eq)?,
            Opcode::Lt => self.op_compare(&proto, instruction, CompareOp::Lt)?,
            Opcode::Le => self.op_compare(&proto, instruction, CompareOp::Le)?,
            Opcode::Test => self.op_test(instruction),
            Opcode::TestSet => self.op_testset(instruction),

            Opcode::Call => self.op_call(instruction)?,
            Opcode::TailCall => self.op_tailcall(instruction)?,
            Opcode::Return => return Ok(self.op_return(instruction)),

            Opcode::ForLoop => self.op_forloop(instruction)?,
            Opcode::ForPrep => self.op_forprep(instruction)?,
            Opcode::TForCall => self.op_tforcall(instruction)?,
            Opcode::TForLoop => self.op_tforloop(instruction),

            Opcode::SetList => self.op_setlist(&proto, instruction)?,
            Opcode::Closure => self.op_closure(&proto, instruction)?,
            Opcode::Vararg => self.op_vararg(instruction),

            // consumed by the preceding instruction
            Opcode::ExtraArg => (),
        }

        Ok(ExecuteState::Proceed)
    }

    fn op_arith(
        &mut self,
        proto: &Prototype,
        i: Instruction,
        op: ArithOp,
    ) -> Result<(), VmError> {
        let (a, b, c) = i.abc();
        let lhs = self.rk(proto, b);
        let rhs = self.rk(proto, c);
        let v = self.arith(&lhs, &rhs, op)?;
        self.frame.set(a as isize, v);
        Ok(())
    }

    fn op_unary_arith(&mut self, i: Instruction, op: ArithOp) -> Result<(), VmError> {
        let (a, b, _) = i.abc();
        let operand = self.frame.get(b as isize);
        let v = self.arith(&operand, &operand, op)?;
        self.frame.set(a as isize, v);
        Ok(())
    }

    fn op_not(&mut self, i: Instruction) {
        let (a, b, _) = i.abc();
        let v = Value::Boolean(!self.frame.get(b as isize).is_truthy());
        self.frame.set(a as isize, v);
    }
}
