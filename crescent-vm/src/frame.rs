//! Activation records: register file, indexing conventions and open
//! upvalue tracking.
//!
//! Pseudo-indices (the registry and closure upvalues) are resolved by the
//! engine before an index reaches a frame; everything here is either a
//! non-negative register index or a negative top-relative offset.

use std::collections::HashMap;
use std::rc::Rc;

use crate::closure::{Closure, Upvalue, UpvalueRef};
use crate::value::Value;

/// The activation record of one in-progress call.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    /// Identity used by open upvalue cells to name their backing frame.
    pub(crate) id: u64,
    /// Registers and scratch slots; the logical top is the last element.
    pub(crate) data: Vec<Value>,
    /// The closure being executed; the root frame has none.
    pub(crate) closure: Option<Rc<Closure>>,
    /// Register count the running prototype was compiled against; zero for
    /// host and root frames, which grow freely.
    pub(crate) max_registers: usize,
    /// Extra arguments beyond the declared parameters.
    pub(crate) varargs: Vec<Value>,
    /// Next instruction to fetch.
    pub(crate) pc: usize,
    /// Open upvalue cells keyed by the register they alias.
    pub(crate) open_upvalues: HashMap<usize, UpvalueRef>,
    /// Enclosing frame in the call chain.
    pub(crate) prev: Option<Box<Frame>>,
}

impl Frame {
    pub(crate) fn new(id: u64, closure: Option<Rc<Closure>>) -> Self {
        Self {
            id,
            closure,
            ..Self::default()
        }
    }

    /// Index of the topmost slot, `-1` when empty.
    pub(crate) fn top(&self) -> isize {
        self.data.len() as isize - 1
    }

    /// Resolve a possibly negative index against the current top.
    pub(crate) fn abs_index(&self, idx: isize) -> isize {
        if idx < 0 {
            self.top() + idx + 1
        } else {
            idx
        }
    }

    /// Read a slot; anything outside `0..=top` reads as nil.
    pub(crate) fn get(&self, idx: isize) -> Value {
        let idx = self.abs_index(idx);
        if idx < 0 {
            return Value::Nil;
        }
        self.data.get(idx as usize).cloned().unwrap_or(Value::Nil)
    }

    /// Write a slot; writes outside `0..=top` are dropped.
    pub(crate) fn set(&mut self, idx: isize, v: Value) {
        let idx = self.abs_index(idx);
        if (0..self.data.len() as isize).contains(&idx) {
            self.data[idx as usize] = v;
        }
    }

    pub(crate) fn push(&mut self, v: Value) {
        self.data.push(v);
    }

    pub(crate) fn pop(&mut self) -> Value {
        self.data.pop().unwrap_or(Value::Nil)
    }

    /// Grow with nils or shrink so that `top() == idx` afterwards.
    pub(crate) fn set_top(&mut self, idx: isize) {
        let target = self.abs_index(idx);
        let len = (target + 1).max(0) as usize;
        self.data.resize(len, Value::Nil);
    }

    /// Reverse the inclusive slot range `from..=to` in place.
    pub(crate) fn reverse(&mut self, from: usize, to: usize) {
        if from < to && to < self.data.len() {
            self.data[from..=to].reverse();
        }
    }

    /// Rotate the segment between `idx` and the top by `n` positions
    /// (towards the top for positive `n`), with the classic three-reverse
    /// trick.
    pub(crate) fn rotate(&mut self, idx: isize, n: isize) {
        let top = self.top();
        let start = self.abs_index(idx);
        if start < 0 || start > top {
            return;
        }
        let m = if n >= 0 { top - n } else { start - n - 1 };
        if m < start - 1 || m > top {
            return;
        }
        self.reverse(start as usize, m as usize);
        self.reverse((m + 1) as usize, top as usize);
        self.reverse(start as usize, top as usize);
    }

    /// The open cell aliasing `index`, created and registered on first
    /// capture so later captures share it.
    pub(crate) fn open_upvalue(&mut self, index: usize) -> UpvalueRef {
        let id = self.id;
        self.open_upvalues
            .entry(index)
            .or_insert_with(|| {
                Rc::new(std::cell::RefCell::new(Upvalue::Open { frame: id, index }))
            })
            .clone()
    }

    /// Detach every open upvalue aliasing a register at or above `first`,
    /// copying the slot value into the cell.
    pub(crate) fn close_upvalues_from(&mut self, first: usize) {
        let caught: Vec<usize> = self
            .open_upvalues
            .keys()
            .copied()
            .filter(|&i| i >= first)
            .collect();
        for index in caught {
            if let Some(cell) = self.open_upvalues.remove(&index) {
                let value = self.data.get(index).cloned().unwrap_or(Value::Nil);
                *cell.borrow_mut() = Upvalue::Closed(value);
            }
        }
    }
}
