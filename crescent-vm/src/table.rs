//! Table representation: dense array part, hash part, metatable link and
//! the iteration snapshot.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::VmError;
use crate::number;
use crate::value::Value;

/// Shared handle to a table.
pub type TableRef = Rc<RefCell<Table>>;

/// Hashable table key.
///
/// Exact-valued float keys normalise to integers on construction; nil and
/// NaN are unrepresentable. Reference variants hash and compare by
/// identity.
#[derive(Debug, Clone)]
pub struct TableKey(Value);

impl TableKey {
    /// Normalise a value into a key. Returns `None` for nil and NaN, which
    /// tables reject.
    pub fn new(v: Value) -> Option<Self> {
        match v {
            Value::Nil => None,
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(match number::float_to_integer(f) {
                Some(i) => Self(Value::Integer(i)),
                None => Self(Value::Float(f)),
            }),
            other => Some(Self(other)),
        }
    }

    /// The key as a value.
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

// NaN keys are unrepresentable, so the reflexivity requirement holds.
impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Boolean(b) => (0u8, b).hash(state),
            Value::Integer(i) => (1u8, i).hash(state),
            Value::Float(f) => (2u8, f.to_bits()).hash(state),
            Value::String(s) => (3u8, &s[..]).hash(state),
            Value::Table(t) => (4u8, Rc::as_ptr(t)).hash(state),
            Value::Closure(c) => (5u8, Rc::as_ptr(c)).hash(state),
            Value::Nil => (6u8).hash(state),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    /// Successor of each key; `None` maps to the first key.
    next: HashMap<Option<TableKey>, TableKey>,
    last: Option<TableKey>,
}

/// A table: dense array part indexed from 1, hash part for everything
/// else, optional metatable, and iteration bookkeeping.
#[derive(Debug, Default)]
pub struct Table {
    array: Vec<Value>,
    hash: HashMap<TableKey, Value>,
    meta: Option<TableRef>,
    snapshot: Option<Snapshot>,
    dirty: bool,
}

impl Table {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table with capacity hints for the array and hash parts.
    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        Self {
            array: Vec::with_capacity(narr),
            hash: HashMap::with_capacity(nrec),
            ..Self::default()
        }
    }

    /// Wrap a table into a shared handle.
    pub fn into_ref(self) -> TableRef {
        Rc::new(RefCell::new(self))
    }

    /// Raw read. Integer keys inside the dense prefix hit the array part.
    pub fn get(&self, key: &Value) -> Value {
        let Some(key) = TableKey::new(key.clone()) else {
            return Value::Nil;
        };
        if let Value::Integer(i) = key.value() {
            if (1..=self.array.len() as i64).contains(i) {
                return self.array[(*i - 1) as usize].clone();
            }
        }
        self.hash.get(&key).cloned().unwrap_or(Value::Nil)
    }

    /// Raw write. Nil values delete; nil and NaN keys are rejected.
    pub fn set(&mut self, key: Value, value: Value) {
        self.dirty = true;
        let Some(key) = TableKey::new(key) else {
            return;
        };
        if let Value::Integer(i) = key.value() {
            self.set_int(*i, value);
        } else if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
    }

    fn set_int(&mut self, key: i64, value: Value) {
        let len = self.array.len() as i64;
        if (1..=len).contains(&key) {
            let at_tail = key == len;
            self.array[(key - 1) as usize] = value;
            if at_tail && self.array.last().is_some_and(Value::is_nil) {
                self.trim_array();
            }
        } else if key == len + 1 {
            self.hash.remove(&TableKey(Value::Integer(key)));
            if !value.is_nil() {
                self.array.push(value);
                self.drain_hash_tail();
            }
        } else if value.is_nil() {
            self.hash.remove(&TableKey(Value::Integer(key)));
        } else {
            self.hash.insert(TableKey(Value::Integer(key)), value);
        }
    }

    /// Drop trailing nils so the border stays at the last non-nil element.
    fn trim_array(&mut self) {
        while self.array.last().is_some_and(Value::is_nil) {
            self.array.pop();
        }
    }

    /// Migrate consecutive integer keys from the hash part after the dense
    /// prefix grew.
    fn drain_hash_tail(&mut self) {
        loop {
            let next = self.array.len() as i64 + 1;
            match self.hash.remove(&TableKey(Value::Integer(next))) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    /// The border: length of the array part.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Whether both parts are empty.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// The metatable, if any.
    pub fn metatable(&self) -> Option<TableRef> {
        self.meta.clone()
    }

    /// Attach or clear the metatable.
    pub fn set_metatable(&mut self, meta: Option<TableRef>) {
        self.meta = meta;
    }

    /// Whether the metatable carries a non-nil field of this name.
    pub fn has_metafield(&self, name: &str) -> bool {
        self.meta
            .as_ref()
            .is_some_and(|m| !m.borrow().get(&Value::from(name)).is_nil())
    }

    /// Step the iteration cursor: `None` starts, the last key ends.
    ///
    /// The snapshot is rebuilt on the first `next(nil)` after any write; a
    /// non-nil cursor absent from the snapshot is an error.
    pub fn next(&mut self, key: &Value) -> Result<Option<Value>, VmError> {
        if self.snapshot.is_none() || (key.is_nil() && self.dirty) {
            self.snapshot = Some(self.build_snapshot());
            self.dirty = false;
        }
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(None);
        };
        let cursor = if key.is_nil() {
            None
        } else {
            TableKey::new(key.clone())
        };
        match snapshot.next.get(&cursor) {
            Some(next) => Ok(Some(next.value().clone())),
            None if cursor.is_none() || cursor == snapshot.last => Ok(None),
            None => Err(VmError::InvalidNextKey),
        }
    }

    fn build_snapshot(&self) -> Snapshot {
        let mut next = HashMap::new();
        let mut prev: Option<TableKey> = None;
        let array_keys = self
            .array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, _)| TableKey(Value::Integer(i as i64 + 1)));
        for key in array_keys.chain(self.hash.keys().cloned()) {
            next.insert(prev, key.clone());
            prev = Some(key);
        }
        Snapshot { next, last: prev }
    }
}
