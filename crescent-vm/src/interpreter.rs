//! Execution engine: registry, frame linkage and the dispatch machinery.

use std::rc::Rc;

use crate::closure::{Upvalue, UpvalueRef};
use crate::consts::RIDX_GLOBALS;
use crate::frame::Frame;
use crate::table::{Table, TableRef};
use crate::value::Value;

mod api;
mod arith;
mod call;
mod executors;
mod flow;
mod load;
mod metatable;
mod table_ops;
mod upvalues;

pub use call::CallStatus;

/// Resulting state of a single instruction dispatch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExecuteState {
    /// Continue with the next instruction.
    Proceed,
    /// The current frame returned these values.
    Return(Vec<Value>),
}

/// The virtual machine execution state.
///
/// Holds the registry (with the globals table pre-installed), the chain of
/// activation frames, and a debug flag that surfaces dispatched opcode
/// names through `tracing`.
pub struct Interpreter {
    registry: TableRef,
    frame: Box<Frame>,
    next_frame_id: u64,
    debug: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Fresh engine with an empty globals table and a root frame.
    pub fn new() -> Self {
        let globals = Table::new().into_ref();
        let registry = Table::new().into_ref();
        registry
            .borrow_mut()
            .set(Value::Integer(RIDX_GLOBALS), Value::Table(globals));
        Self {
            registry,
            frame: Box::new(Frame::new(0, None)),
            next_frame_id: 1,
            debug: false,
        }
    }

    /// Toggle per-instruction opcode logging.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Whether per-instruction logging is on.
    pub const fn is_debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn globals(&self) -> TableRef {
        match self.registry.borrow().get(&Value::Integer(RIDX_GLOBALS)) {
            Value::Table(t) => t,
            _ => unreachable!(),
        }
    }

    pub(crate) fn next_frame_id(&mut self) -> u64 {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        id
    }

    /// Link a fresh frame ahead of the current one.
    pub(crate) fn push_frame(&mut self, frame: Frame) {
        let prev = std::mem::replace(&mut self.frame, Box::new(frame));
        self.frame.prev = Some(prev);
    }

    /// Unlink the current frame, closing its remaining open upvalues
    /// first so surviving closures keep seeing valid slots.
    pub(crate) fn pop_frame(&mut self) {
        self.frame.close_upvalues_from(0);
        if let Some(prev) = self.frame.prev.take() {
            self.frame = prev;
        }
    }

    pub(crate) fn current_frame(&self) -> &Frame {
        &self.frame
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    /// Read a register of the frame identified by `id`, walking the call
    /// chain from the current frame.
    fn frame_slot(&self, id: u64, index: usize) -> Value {
        let mut frame = Some(self.frame.as_ref());
        while let Some(f) = frame {
            if f.id == id {
                return f.data.get(index).cloned().unwrap_or(Value::Nil);
            }
            frame = f.prev.as_deref();
        }
        Value::Nil
    }

    fn set_frame_slot(&mut self, id: u64, index: usize, value: Value) {
        let mut frame = Some(self.frame.as_mut());
        while let Some(f) = frame {
            if f.id == id {
                if index < f.data.len() {
                    f.data[index] = value;
                }
                return;
            }
            frame = f.prev.as_deref_mut();
        }
    }

    /// Read through an upvalue cell, following an open cell to its
    /// backing register.
    pub(crate) fn read_upvalue(&self, cell: &UpvalueRef) -> Value {
        let target = match &*cell.borrow() {
            Upvalue::Closed(v) => return v.clone(),
            Upvalue::Open { frame, index } => (*frame, *index),
        };
        self.frame_slot(target.0, target.1)
    }

    /// Write through an upvalue cell.
    pub(crate) fn write_upvalue(&mut self, cell: &UpvalueRef, value: Value) {
        let target = match &*cell.borrow() {
            Upvalue::Closed(_) => None,
            Upvalue::Open { frame, index } => Some((*frame, *index)),
        };
        match target {
            Some((frame, index)) => self.set_frame_slot(frame, index, value),
            None => *cell.borrow_mut() = Upvalue::Closed(value),
        }
    }

    /// The closure owning the current frame.
    pub(crate) fn current_closure(&self) -> Option<Rc<crate::closure::Closure>> {
        self.frame.closure.clone()
    }
}
