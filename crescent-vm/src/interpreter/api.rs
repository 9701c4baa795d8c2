//! Index-based host API over the engine state.
//!
//! Indices follow the usual conventions: `0..=top` address slots of the
//! current frame, negative values count back from the top, and the
//! registry pseudo-index (with upvalue indices below it) is checked before
//! anything is treated as a stack offset.

use std::rc::Rc;

use crate::closure::Closure;
use crate::consts::REGISTRY_INDEX;
use crate::error::VmError;
use crate::number;
use crate::table::Table;
use crate::value::{LuaType, Value};

use super::Interpreter;

impl Interpreter {
    /// Value at an index; out-of-range stack slots read as nil.
    pub fn value_at(&self, idx: isize) -> Value {
        if idx == REGISTRY_INDEX {
            return Value::Table(self.registry.clone());
        }
        if idx < REGISTRY_INDEX {
            let n = (REGISTRY_INDEX - idx - 1) as usize;
            return self
                .current_closure()
                .and_then(|c| c.upvalue(n))
                .map(|cell| self.read_upvalue(&cell))
                .unwrap_or(Value::Nil);
        }
        self.current_frame().get(idx)
    }

    pub(crate) fn set_value_at(&mut self, idx: isize, v: Value) {
        if idx == REGISTRY_INDEX {
            return;
        }
        if idx < REGISTRY_INDEX {
            let n = (REGISTRY_INDEX - idx - 1) as usize;
            if let Some(cell) = self.current_closure().and_then(|c| c.upvalue(n)) {
                self.write_upvalue(&cell, v);
            }
            return;
        }
        self.current_frame_mut().set(idx, v);
    }

    /// Logical type at an index; slots past the top report `None`.
    pub fn type_at(&self, idx: isize) -> LuaType {
        if idx <= REGISTRY_INDEX {
            return self.value_at(idx).type_of();
        }
        let frame = self.current_frame();
        let abs = frame.abs_index(idx);
        if abs < 0 || abs > frame.top() {
            LuaType::None
        } else {
            frame.get(abs).type_of()
        }
    }

    /// Type name of the value at an index.
    pub fn type_name_at(&self, idx: isize) -> &'static str {
        self.type_at(idx).name()
    }

    // -- stack shape

    /// Index of the topmost slot; `-1` when the frame is empty.
    pub fn top_index(&self) -> isize {
        self.current_frame().top()
    }

    /// Resolve a relative index to an absolute one.
    pub fn abs_index(&self, idx: isize) -> isize {
        self.current_frame().abs_index(idx)
    }

    /// Grow with nils or shrink so the top lands on `idx`.
    pub fn set_top(&mut self, idx: isize) {
        self.current_frame_mut().set_top(idx);
    }

    /// Push any value.
    pub fn push(&mut self, v: Value) {
        self.current_frame_mut().push(v);
    }

    /// Push nil.
    pub fn push_nil(&mut self) {
        self.push(Value::Nil);
    }

    /// Push a boolean.
    pub fn push_boolean(&mut self, b: bool) {
        self.push(Value::Boolean(b));
    }

    /// Push an integer.
    pub fn push_integer(&mut self, i: i64) {
        self.push(Value::Integer(i));
    }

    /// Push a float.
    pub fn push_number(&mut self, n: f64) {
        self.push(Value::Float(n));
    }

    /// Push a string.
    pub fn push_string(&mut self, s: &str) {
        self.push(Value::from(s));
    }

    /// Push a copy of the value at `idx`.
    pub fn push_value(&mut self, idx: isize) {
        let v = self.value_at(idx);
        self.push(v);
    }

    /// Push a host function with no upvalues.
    pub fn push_host_fn<F>(&mut self, f: F)
    where
        F: Fn(&mut Interpreter) -> Result<usize, VmError> + 'static,
    {
        let closure = Closure::from_host(Rc::new(f), Vec::new());
        self.push(Value::Closure(Rc::new(closure)));
    }

    /// Pop and return the top value.
    pub fn pop_value(&mut self) -> Value {
        self.current_frame_mut().pop()
    }

    /// Pop `n` values.
    pub fn pop(&mut self, n: usize) {
        for _ in 0..n {
            self.pop_value();
        }
    }

    /// Copy the value at `from` into the slot at `to`.
    pub fn copy(&mut self, from: isize, to: isize) {
        let v = self.value_at(from);
        self.set_value_at(to, v);
    }

    /// Pop the top value into the slot at `idx`.
    pub fn replace(&mut self, idx: isize) {
        let v = self.pop_value();
        self.set_value_at(idx, v);
    }

    /// Move the top value down to `idx`, shifting the segment up.
    pub fn insert(&mut self, idx: isize) {
        self.rotate(idx, 1);
    }

    /// Remove the value at `idx`, shifting the segment down.
    pub fn remove(&mut self, idx: isize) {
        self.rotate(idx, -1);
        self.pop(1);
    }

    /// Rotate the segment between `idx` and the top by `n` positions.
    pub fn rotate(&mut self, idx: isize, n: isize) {
        self.current_frame_mut().rotate(idx, n);
    }

    // -- type probes

    /// Whether `idx` addresses a slot past the top.
    pub fn is_none(&self, idx: isize) -> bool {
        self.type_at(idx) == LuaType::None
    }

    /// Whether the value at `idx` is nil.
    pub fn is_nil(&self, idx: isize) -> bool {
        self.type_at(idx) == LuaType::Nil
    }

    /// Whether `idx` is past the top or nil.
    pub fn is_none_or_nil(&self, idx: isize) -> bool {
        self.type_at(idx).tag() <= LuaType::Nil.tag()
    }

    /// Whether the value at `idx` is a boolean.
    pub fn is_boolean(&self, idx: isize) -> bool {
        self.type_at(idx) == LuaType::Boolean
    }

    /// Whether the value at `idx` is a string or a number.
    pub fn is_string(&self, idx: isize) -> bool {
        matches!(self.type_at(idx), LuaType::String | LuaType::Number)
    }

    /// Whether the value at `idx` converts to a number.
    pub fn is_number(&self, idx: isize) -> bool {
        self.to_number_x(idx).is_some()
    }

    /// Whether the value at `idx` is an exact integer.
    pub fn is_integer(&self, idx: isize) -> bool {
        matches!(self.value_at(idx), Value::Integer(_))
    }

    /// Whether the value at `idx` is a table.
    pub fn is_table(&self, idx: isize) -> bool {
        self.type_at(idx) == LuaType::Table
    }

    /// Whether the value at `idx` is callable without metamethods.
    pub fn is_function(&self, idx: isize) -> bool {
        self.type_at(idx) == LuaType::Function
    }

    // -- coercions

    /// Boolean interpretation of the value at `idx`.
    pub fn to_boolean(&self, idx: isize) -> bool {
        self.value_at(idx).is_truthy()
    }

    /// Integer coercion of the value at `idx`.
    pub fn to_integer_x(&self, idx: isize) -> Option<i64> {
        number::to_integer(&self.value_at(idx))
    }

    /// Integer coercion defaulting to zero.
    pub fn to_integer(&self, idx: isize) -> i64 {
        self.to_integer_x(idx).unwrap_or(0)
    }

    /// Float coercion of the value at `idx`.
    pub fn to_number_x(&self, idx: isize) -> Option<f64> {
        number::to_float(&self.value_at(idx))
    }

    /// Float coercion defaulting to zero.
    pub fn to_number(&self, idx: isize) -> f64 {
        self.to_number_x(idx).unwrap_or(0.0)
    }

    /// String form of the value at `idx`. Numbers are converted in place
    /// so subsequent reads observe the string.
    pub fn to_string_x(&mut self, idx: isize) -> Option<String> {
        match self.value_at(idx) {
            Value::String(s) => Some(String::from_utf8_lossy(&s).into_owned()),
            v @ (Value::Integer(_) | Value::Float(_)) => {
                let s = v.to_string();
                self.set_value_at(idx, Value::from(s.as_str()));
                Some(s)
            }
            _ => None,
        }
    }

    /// String form defaulting to empty.
    pub fn to_string(&mut self, idx: isize) -> String {
        self.to_string_x(idx).unwrap_or_default()
    }

    // -- tables

    /// Create a table with capacity hints and push it.
    pub fn create_table(&mut self, narr: usize, nrec: usize) {
        let t = Table::with_capacity(narr, nrec).into_ref();
        self.push(Value::Table(t));
    }

    /// Create an empty table and push it.
    pub fn new_table(&mut self) {
        self.create_table(0, 0);
    }

    /// Pop a key and push `t[key]`, honouring `__index`.
    pub fn get_table(&mut self, idx: isize) -> Result<LuaType, VmError> {
        let key = self.pop_value();
        let t = self.value_at(idx);
        let v = self.table_get(&t, &key)?;
        let ty = v.type_of();
        self.push(v);
        Ok(ty)
    }

    /// Push `t[name]`, honouring `__index`.
    pub fn get_field(&mut self, idx: isize, name: &str) -> Result<LuaType, VmError> {
        let t = self.value_at(idx);
        let v = self.table_get(&t, &Value::from(name))?;
        let ty = v.type_of();
        self.push(v);
        Ok(ty)
    }

    /// Push `t[i]`, honouring `__index`.
    pub fn get_i(&mut self, idx: isize, i: i64) -> Result<LuaType, VmError> {
        let t = self.value_at(idx);
        let v = self.table_get(&t, &Value::Integer(i))?;
        let ty = v.type_of();
        self.push(v);
        Ok(ty)
    }

    /// Pop a value and a key and perform `t[key] = value`, honouring
    /// `__newindex`.
    pub fn set_table(&mut self, idx: isize) -> Result<(), VmError> {
        let value = self.pop_value();
        let key = self.pop_value();
        let t = self.value_at(idx);
        self.table_set(&t, key, value)
    }

    /// Pop a value and perform `t[name] = value`.
    pub fn set_field(&mut self, idx: isize, name: &str) -> Result<(), VmError> {
        let value = self.pop_value();
        let t = self.value_at(idx);
        self.table_set(&t, Value::from(name), value)
    }

    /// Pop a value and perform `t[i] = value`.
    pub fn set_i(&mut self, idx: isize, i: i64) -> Result<(), VmError> {
        let value = self.pop_value();
        let t = self.value_at(idx);
        self.table_set(&t, Value::Integer(i), value)
    }

    /// Push the global `name`.
    pub fn get_global(&mut self, name: &str) -> Result<LuaType, VmError> {
        let g = Value::Table(self.globals());
        let v = self.table_get(&g, &Value::from(name))?;
        let ty = v.type_of();
        self.push(v);
        Ok(ty)
    }

    /// Pop a value into the global `name`.
    pub fn set_global(&mut self, name: &str) -> Result<(), VmError> {
        let value = self.pop_value();
        let g = Value::Table(self.globals());
        self.table_set(&g, Value::from(name), value)
    }

    /// Pop a key and push `t[key]` without consulting metamethods.
    pub fn raw_get(&mut self, idx: isize) -> LuaType {
        let key = self.pop_value();
        let v = match self.value_at(idx) {
            Value::Table(t) => t.borrow().get(&key),
            _ => Value::Nil,
        };
        let ty = v.type_of();
        self.push(v);
        ty
    }

    /// Pop a value and a key and write without consulting metamethods.
    pub fn raw_set(&mut self, idx: isize) {
        let value = self.pop_value();
        let key = self.pop_value();
        if let Value::Table(t) = self.value_at(idx) {
            t.borrow_mut().set(key, value);
        }
    }

    /// Length without metamethods: array border or byte length.
    pub fn raw_len(&self, idx: isize) -> usize {
        match self.value_at(idx) {
            Value::Table(t) => t.borrow().len(),
            Value::String(s) => s.len(),
            _ => 0,
        }
    }

    /// Raw equality of two indices.
    pub fn raw_equal(&self, a: isize, b: isize) -> bool {
        self.value_at(a) == self.value_at(b)
    }

    /// Pop an iteration cursor for the table at `idx`; push the next key
    /// and value and report `true`, or push nothing at the end.
    pub fn next(&mut self, idx: isize) -> Result<bool, VmError> {
        let key = self.pop_value();
        let t = self.value_at(idx);
        let Value::Table(t) = t else {
            return Err(VmError::Type(format!(
                "attempt to iterate a {} value",
                t.type_name()
            )));
        };
        let next_key = t.borrow_mut().next(&key)?;
        match next_key {
            Some(k) => {
                let v = t.borrow().get(&k);
                self.push(k);
                self.push(v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Push the metatable of the value at `idx`, reporting whether one
    /// exists.
    pub fn get_metatable(&mut self, idx: isize) -> bool {
        let v = self.value_at(idx);
        match self.metatable_of(&v) {
            Some(mt) => {
                self.push(Value::Table(mt));
                true
            }
            None => false,
        }
    }

    /// Pop a table (or nil) and attach it as the metatable of the value
    /// at `idx`.
    pub fn set_metatable(&mut self, idx: isize) {
        let meta = self.pop_value();
        let v = self.value_at(idx);
        match meta {
            Value::Table(mt) => self.set_metatable_of(&v, Some(mt)),
            Value::Nil => self.set_metatable_of(&v, None),
            _ => (),
        }
    }

    /// Register a host function under a global name.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Interpreter) -> Result<usize, VmError> + 'static,
    {
        let closure = Closure::from_host(Rc::new(f), Vec::new());
        self.globals()
            .borrow_mut()
            .set(Value::from(name), Value::Closure(Rc::new(closure)));
    }
}
