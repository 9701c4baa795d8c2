//! Call transitions, chunk loading and the protected-call boundary.

use std::rc::Rc;

use tracing::debug;

use crate::chunk::{self, Prototype};
use crate::closure::{closed_upvalue, Closure, ClosureKind, HostFn};
use crate::error::VmError;
use crate::frame::Frame;
use crate::value::Value;

use super::Interpreter;

/// Outcome of a protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The call completed and its results are on the stack.
    Ok,
    /// A runtime fault unwound to this boundary; the fault value is on
    /// the stack.
    RuntimeError,
}

impl Interpreter {
    /// Decode a binary chunk and push the resulting main closure, with
    /// its first upvalue bound to the globals table.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        let proto = chunk::decode(bytes)?;
        self.load_prototype(Rc::new(proto));
        Ok(())
    }

    /// Wrap a prototype as a main closure and push it. The first upvalue,
    /// when declared, is the environment and receives the globals table.
    pub fn load_prototype(&mut self, proto: Rc<Prototype>) {
        let mut upvalues = Vec::with_capacity(proto.upvalues.len());
        if !proto.upvalues.is_empty() {
            upvalues.push(closed_upvalue(Value::Table(self.globals())));
            for _ in 1..proto.upvalues.len() {
                upvalues.push(closed_upvalue(Value::Nil));
            }
        }
        debug!(source = %proto.source, "main closure");
        let closure = Closure::from_proto(proto, upvalues);
        self.push(Value::Closure(Rc::new(closure)));
    }

    /// Call the value at `-(nargs+1)` with the `nargs` values above it.
    ///
    /// With `nresults >= 0` exactly that many results are pushed back,
    /// truncated or padded with nil; `-1` pushes them all.
    pub fn call(&mut self, nargs: usize, nresults: isize) -> Result<(), VmError> {
        let mut args = Vec::with_capacity(nargs);
        for _ in 0..nargs {
            args.push(self.pop_value());
        }
        args.reverse();
        let callee = self.pop_value();
        let mut results = self.call_value(callee, args)?;
        if nresults >= 0 {
            results.resize(nresults as usize, Value::Nil);
        }
        for v in results {
            self.push(v);
        }
        Ok(())
    }

    /// Protected call: faults raised at any depth below this boundary
    /// unwind here, leaving the fault value on the stack.
    ///
    /// A non-zero `msgh` is reserved for a message handler; until one is
    /// supported the fault is re-raised unchanged.
    pub fn pcall(
        &mut self,
        nargs: usize,
        nresults: isize,
        msgh: isize,
    ) -> Result<CallStatus, VmError> {
        let base = self.top_index() - nargs as isize - 1;
        match self.call(nargs, nresults) {
            Ok(()) => Ok(CallStatus::Ok),
            Err(fault) if msgh == 0 => {
                let value = fault.fault_value();
                // `base` may be -1 on an otherwise empty frame, which
                // set_top would read as top-relative
                self.current_frame_mut().data.truncate((base + 1).max(0) as usize);
                self.push(value);
                Ok(CallStatus::RuntimeError)
            }
            Err(fault) => Err(fault),
        }
    }

    /// Pop the top value and turn it into a raisable fault. Host
    /// functions return the result as their error.
    pub fn error(&mut self) -> VmError {
        VmError::User(self.pop_value())
    }

    /// Invoke a callable value with materialised arguments, returning all
    /// its results. Non-closures divert through `__call` with the original
    /// target spliced in as the first argument.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, VmError> {
        match callee {
            Value::Closure(c) => match c.kind.clone() {
                ClosureKind::Lua(proto) => self.call_lua(c, proto, args),
                ClosureKind::Host(f) => self.call_host(c, f, args),
            },
            other => {
                let handler = self.metafield(&other, "__call");
                if let Value::Closure(_) = handler {
                    let mut spliced = Vec::with_capacity(args.len() + 1);
                    spliced.push(other);
                    spliced.extend(args);
                    self.call_value(handler, spliced)
                } else {
                    Err(VmError::Type(format!(
                        "attempt to call a {} value",
                        other.type_name()
                    )))
                }
            }
        }
    }

    /// Enter a scripted closure: fresh frame, parameters copied in and
    /// padded, the rest stashed as varargs when the prototype accepts
    /// them, then the dispatch loop until its return.
    fn call_lua(
        &mut self,
        closure: Rc<Closure>,
        proto: Rc<Prototype>,
        mut args: Vec<Value>,
    ) -> Result<Vec<Value>, VmError> {
        let nparams = proto.num_params as usize;
        let varargs = if proto.is_vararg && args.len() > nparams {
            args.split_off(nparams)
        } else {
            Vec::new()
        };
        args.resize(nparams, Value::Nil);
        args.resize(proto.max_stack_size as usize, Value::Nil);

        let mut frame = Frame::new(self.next_frame_id(), Some(closure));
        frame.data = args;
        frame.max_registers = proto.max_stack_size as usize;
        frame.varargs = varargs;
        debug!(source = %proto.source, params = nparams, "call");

        self.push_frame(frame);
        let outcome = self.run();
        self.pop_frame();
        outcome
    }

    /// Invoke a host callback in its own frame; its return value counts
    /// the results left on top.
    fn call_host(
        &mut self,
        closure: Rc<Closure>,
        f: HostFn,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, VmError> {
        let mut frame = Frame::new(self.next_frame_id(), Some(closure));
        frame.data = args;
        self.push_frame(frame);
        let outcome = f(self).map(|n| {
            let data = &mut self.frame.data;
            let split = data.len().saturating_sub(n);
            data.split_off(split)
        });
        self.pop_frame();
        outcome
    }
}
