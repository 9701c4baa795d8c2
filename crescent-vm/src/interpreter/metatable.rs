//! Metatable lookup and the `__index`/`__newindex` protocols.
//!
//! Tables carry their own metatable; every other type shares a per-type
//! metatable stored in the registry under a tag-derived key.

use crate::consts::{MAX_META_DEPTH, TYPE_METATABLE_PREFIX};
use crate::error::VmError;
use crate::table::TableRef;
use crate::value::Value;

use super::Interpreter;

impl Interpreter {
    /// Metatable of a value, if any.
    pub(crate) fn metatable_of(&self, v: &Value) -> Option<TableRef> {
        if let Value::Table(t) = v {
            return t.borrow().metatable();
        }
        let key = format!("{}{}", TYPE_METATABLE_PREFIX, v.type_of().tag());
        match self.registry.borrow().get(&Value::from(key.as_str())) {
            Value::Table(mt) => Some(mt),
            _ => None,
        }
    }

    /// Attach a metatable to a value; non-tables get a per-type entry in
    /// the registry.
    pub(crate) fn set_metatable_of(&mut self, v: &Value, meta: Option<TableRef>) {
        if let Value::Table(t) = v {
            t.borrow_mut().set_metatable(meta);
            return;
        }
        let key = format!("{}{}", TYPE_METATABLE_PREFIX, v.type_of().tag());
        let entry = match meta {
            Some(mt) => Value::Table(mt),
            None => Value::Nil,
        };
        self.registry.borrow_mut().set(Value::from(key.as_str()), entry);
    }

    /// Raw read of a named metafield, nil when absent.
    pub(crate) fn metafield(&self, v: &Value, name: &str) -> Value {
        self.metatable_of(v)
            .map(|mt| mt.borrow().get(&Value::from(name)))
            .unwrap_or(Value::Nil)
    }

    /// Binary metamethod dispatch: the field is fetched from `a`'s
    /// metatable first, then `b`'s; a found handler is called with both
    /// operands for one result.
    pub(crate) fn call_binary_metamethod(
        &mut self,
        a: &Value,
        b: &Value,
        event: &str,
    ) -> Result<Option<Value>, VmError> {
        let handler = match self.metafield(a, event) {
            Value::Nil => self.metafield(b, event),
            found => found,
        };
        if handler.is_nil() {
            return Ok(None);
        }
        let results = self.call_value(handler, vec![a.clone(), b.clone()])?;
        Ok(Some(results.into_iter().next().unwrap_or(Value::Nil)))
    }

    /// Indexing with `__index` fallback. The metafield may be a handler
    /// (called as `(t, key)`) or another table to continue the lookup in.
    pub(crate) fn table_get(&mut self, t: &Value, key: &Value) -> Result<Value, VmError> {
        let mut target = t.clone();
        for _ in 0..MAX_META_DEPTH {
            if let Value::Table(tbl) = &target {
                let raw = tbl.borrow().get(key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
                match self.metafield(&target, "__index") {
                    Value::Nil => return Ok(Value::Nil),
                    handler @ Value::Closure(_) => {
                        let results = self.call_value(handler, vec![target, key.clone()])?;
                        return Ok(results.into_iter().next().unwrap_or(Value::Nil));
                    }
                    next => target = next,
                }
            } else {
                match self.metafield(&target, "__index") {
                    Value::Nil => {
                        return Err(VmError::Type(format!(
                            "attempt to index a {} value",
                            target.type_name()
                        )))
                    }
                    handler @ Value::Closure(_) => {
                        let results = self.call_value(handler, vec![target, key.clone()])?;
                        return Ok(results.into_iter().next().unwrap_or(Value::Nil));
                    }
                    next => target = next,
                }
            }
        }
        Err(VmError::Type("'__index' chain too long; possible loop".into()))
    }

    /// Assignment with `__newindex` fallback. Existing keys write raw; a
    /// handler is called as `(t, key, value)`, a table continues the
    /// assignment.
    pub(crate) fn table_set(
        &mut self,
        t: &Value,
        key: Value,
        value: Value,
    ) -> Result<(), VmError> {
        let mut target = t.clone();
        for _ in 0..MAX_META_DEPTH {
            if let Value::Table(tbl) = &target {
                let present = !tbl.borrow().get(&key).is_nil();
                if present {
                    tbl.borrow_mut().set(key, value);
                    return Ok(());
                }
                match self.metafield(&target, "__newindex") {
                    Value::Nil => {
                        tbl.borrow_mut().set(key, value);
                        return Ok(());
                    }
                    handler @ Value::Closure(_) => {
                        self.call_value(handler, vec![target, key, value])?;
                        return Ok(());
                    }
                    next => target = next,
                }
            } else {
                match self.metafield(&target, "__newindex") {
                    Value::Nil => {
                        return Err(VmError::Type(format!(
                            "attempt to index a {} value",
                            target.type_name()
                        )))
                    }
                    handler @ Value::Closure(_) => {
                        self.call_value(handler, vec![target, key, value])?;
                        return Ok(());
                    }
                    next => target = next,
                }
            }
        }
        Err(VmError::Type(
            "'__newindex' chain too long; possible loop".into(),
        ))
    }
}
