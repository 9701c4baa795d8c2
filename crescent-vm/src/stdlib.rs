//! Bootstrap library and argument-check helpers.
//!
//! The base set is deliberately small; it exercises the engine contracts
//! (iteration, protected calls, metatables, varargs) without growing into
//! a standard library.

use itertools::Itertools;

use crate::error::VmError;
use crate::interpreter::{CallStatus, Interpreter};
use crate::value::{LuaType, Value};

impl Interpreter {
    /// Install the base functions into the globals table.
    pub fn open_base(&mut self) {
        self.register("print", base_print);
        self.register("type", base_type);
        self.register("pairs", base_pairs);
        self.register("ipairs", base_ipairs);
        self.register("next", base_next);
        self.register("select", base_select);
        self.register("error", base_error);
        self.register("pcall", base_pcall);
        self.register("assert", base_assert);
        self.register("getmetatable", base_getmetatable);
        self.register("setmetatable", base_setmetatable);
    }

    // -- argument checks

    /// Fabricate a "bad argument" fault for `arg` (zero-based; reported
    /// one-based).
    pub fn arg_error(&self, arg: usize, msg: &str) -> VmError {
        VmError::Argument {
            arg: arg + 1,
            msg: msg.to_string(),
        }
    }

    /// Raise `arg_error` unless `cond` holds.
    pub fn arg_check(&self, cond: bool, arg: usize, msg: &str) -> Result<(), VmError> {
        if cond {
            Ok(())
        } else {
            Err(self.arg_error(arg, msg))
        }
    }

    /// Argument must be present (nil is fine, absence is not).
    pub fn check_any(&self, arg: usize) -> Result<(), VmError> {
        if self.is_none(arg as isize) {
            Err(self.arg_error(arg, "value expected"))
        } else {
            Ok(())
        }
    }

    /// Argument must be a string or a number (converted in place).
    pub fn check_string(&mut self, arg: usize) -> Result<String, VmError> {
        self.to_string_x(arg as isize)
            .ok_or_else(|| self.tag_error(arg, LuaType::String))
    }

    /// Argument must convert to an integer.
    pub fn check_integer(&self, arg: usize) -> Result<i64, VmError> {
        self.to_integer_x(arg as isize).ok_or_else(|| {
            if self.is_number(arg as isize) {
                self.arg_error(arg, "number has no integer representation")
            } else {
                self.tag_error(arg, LuaType::Number)
            }
        })
    }

    /// "X expected, got Y" fault, consulting `__name` for the actual
    /// type's label.
    pub fn type_error(&self, arg: usize, expected: &str) -> VmError {
        let actual = match self.metafield(&self.value_at(arg as isize), "__name") {
            Value::String(name) => String::from_utf8_lossy(&name).into_owned(),
            _ => self.type_name_at(arg as isize).to_string(),
        };
        self.arg_error(arg, &format!("{expected} expected, got {actual}"))
    }

    fn tag_error(&self, arg: usize, expected: LuaType) -> VmError {
        self.type_error(arg, expected.name())
    }
}

/// Render one argument the way `print` shows it: booleans and
/// strings/numbers by value, everything else by type name.
fn print_form(ls: &mut Interpreter, idx: isize) -> String {
    if ls.is_boolean(idx) {
        ls.value_at(idx).to_string()
    } else if ls.is_string(idx) {
        ls.to_string(idx)
    } else {
        ls.type_name_at(idx).to_string()
    }
}

fn base_print(ls: &mut Interpreter) -> Result<usize, VmError> {
    let top = ls.top_index();
    let line = (0..=top).map(|i| print_form(ls, i)).join("\t");
    println!("{line}");
    Ok(0)
}

fn base_type(ls: &mut Interpreter) -> Result<usize, VmError> {
    ls.check_any(0)?;
    let name = ls.type_name_at(0);
    ls.push_string(name);
    Ok(1)
}

fn base_next(ls: &mut Interpreter) -> Result<usize, VmError> {
    ls.arg_check(ls.is_table(0), 0, "table expected")?;
    ls.set_top(1);
    if ls.next(0)? {
        Ok(2)
    } else {
        ls.push_nil();
        Ok(1)
    }
}

fn base_pairs(ls: &mut Interpreter) -> Result<usize, VmError> {
    ls.check_any(0)?;
    ls.push_host_fn(base_next);
    ls.push_value(0);
    ls.push_nil();
    Ok(3)
}

fn ipairs_iterator(ls: &mut Interpreter) -> Result<usize, VmError> {
    let i = ls.to_integer(1) + 1;
    ls.push_integer(i);
    if ls.get_i(0, i)? == LuaType::Nil {
        Ok(1)
    } else {
        Ok(2)
    }
}

fn base_ipairs(ls: &mut Interpreter) -> Result<usize, VmError> {
    ls.check_any(0)?;
    ls.push_host_fn(ipairs_iterator);
    ls.push_value(0);
    ls.push_integer(0);
    Ok(3)
}

fn base_select(ls: &mut Interpreter) -> Result<usize, VmError> {
    let n = ls.top_index() as i64;
    if ls.type_at(0) == LuaType::String && ls.check_string(0)? == "#" {
        ls.push_integer(n);
        return Ok(1);
    }
    let mut i = ls.check_integer(0)?;
    if i < 0 {
        // count from the last vararg
        i += n + 1;
    } else if i > n {
        i = n;
    }
    ls.arg_check(1 <= i, 0, "index out of range")?;
    Ok((n - i + 1) as usize)
}

fn base_error(ls: &mut Interpreter) -> Result<usize, VmError> {
    let value = ls.value_at(0);
    Err(VmError::User(value))
}

fn base_pcall(ls: &mut Interpreter) -> Result<usize, VmError> {
    let nargs = ls.top_index().max(0) as usize;
    let status = ls.pcall(nargs, -1, 0)?;
    ls.push_boolean(status == CallStatus::Ok);
    ls.insert(0);
    Ok(ls.top_index() as usize + 1)
}

fn base_assert(ls: &mut Interpreter) -> Result<usize, VmError> {
    if ls.to_boolean(0) {
        return Ok(ls.top_index() as usize + 1);
    }
    ls.check_any(0)?;
    ls.remove(0);
    ls.push_string("assertion failed!");
    ls.set_top(0);
    base_error(ls)
}

fn base_getmetatable(ls: &mut Interpreter) -> Result<usize, VmError> {
    ls.check_any(0)?;
    let v = ls.value_at(0);
    match ls.metatable_of(&v) {
        Some(mt) => ls.push(Value::Table(mt)),
        None => ls.push_nil(),
    }
    Ok(1)
}

fn base_setmetatable(ls: &mut Interpreter) -> Result<usize, VmError> {
    ls.check_any(0)?;
    ls.arg_check(
        ls.is_table(1) || ls.is_nil(1),
        1,
        "nil or table expected",
    )?;
    let meta = match ls.value_at(1) {
        Value::Table(mt) => Some(mt),
        _ => None,
    };
    let v = ls.value_at(0);
    ls.set_metatable_of(&v, meta);
    ls.set_top(0);
    Ok(1)
}
