//! Arithmetic, comparison, length and concatenation evaluation with
//! metamethod fallback.

use crate::error::VmError;
use crate::number;
use crate::value::Value;

use super::Interpreter;

/// Arithmetic operations, in operand-table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
}

/// Comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Lt,
    Le,
}

struct Operator {
    event: &'static str,
    int_fn: Option<fn(i64, i64) -> i64>,
    float_fn: Option<fn(f64, f64) -> f64>,
}

const OPERATORS: [Operator; 14] = [
    Operator {
        event: "__add",
        int_fn: Some(|a, b| a.wrapping_add(b)),
        float_fn: Some(|a, b| a + b),
    },
    Operator {
        event: "__sub",
        int_fn: Some(|a, b| a.wrapping_sub(b)),
        float_fn: Some(|a, b| a - b),
    },
    Operator {
        event: "__mul",
        int_fn: Some(|a, b| a.wrapping_mul(b)),
        float_fn: Some(|a, b| a * b),
    },
    Operator {
        event: "__mod",
        int_fn: Some(number::mod_int),
        float_fn: Some(number::mod_float),
    },
    Operator {
        event: "__pow",
        int_fn: None,
        float_fn: Some(|a, b| a.powf(b)),
    },
    Operator {
        event: "__div",
        int_fn: None,
        float_fn: Some(|a, b| a / b),
    },
    Operator {
        event: "__idiv",
        int_fn: Some(number::floor_div_int),
        float_fn: Some(number::floor_div_float),
    },
    Operator {
        event: "__band",
        int_fn: Some(|a, b| a & b),
        float_fn: None,
    },
    Operator {
        event: "__bor",
        int_fn: Some(|a, b| a | b),
        float_fn: None,
    },
    Operator {
        event: "__bxor",
        int_fn: Some(|a, b| a ^ b),
        float_fn: None,
    },
    Operator {
        event: "__shl",
        int_fn: Some(number::shift_left),
        float_fn: None,
    },
    Operator {
        event: "__shr",
        int_fn: Some(number::shift_right),
        float_fn: None,
    },
    Operator {
        event: "__unm",
        int_fn: Some(|a, _| a.wrapping_neg()),
        float_fn: Some(|a, _| -a),
    },
    Operator {
        event: "__bnot",
        int_fn: Some(|a, _| !a),
        float_fn: None,
    },
];

impl Interpreter {
    /// Evaluate a binary arithmetic operation. Unary operations receive
    /// the operand twice.
    ///
    /// Integer-only operations coerce both operands to integers; float-only
    /// operations to floats; the rest take the integer path when both
    /// operands already are integers. Coercion failure falls back to the
    /// operator's metamethod.
    pub(crate) fn arith(&mut self, a: &Value, b: &Value, op: ArithOp) -> Result<Value, VmError> {
        let desc = &OPERATORS[op as usize];
        match (desc.int_fn, desc.float_fn) {
            (Some(int_fn), None) => {
                if let (Some(x), Some(y)) = (number::to_integer(a), number::to_integer(b)) {
                    return Ok(Value::Integer(int_fn(x, y)));
                }
            }
            (None, Some(float_fn)) => {
                if let (Some(x), Some(y)) = (number::to_float(a), number::to_float(b)) {
                    return Ok(Value::Float(float_fn(x, y)));
                }
            }
            (Some(int_fn), Some(float_fn)) => {
                if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
                    if *y == 0 && matches!(op, ArithOp::IDiv | ArithOp::Mod) {
                        let symbol = if op == ArithOp::IDiv { "//" } else { "%" };
                        return Err(VmError::Type(format!("attempt to perform 'n{symbol}0'")));
                    }
                    return Ok(Value::Integer(int_fn(*x, *y)));
                }
                if let (Some(x), Some(y)) = (number::to_float(a), number::to_float(b)) {
                    return Ok(Value::Float(float_fn(x, y)));
                }
            }
            (None, None) => {}
        }
        match self.call_binary_metamethod(a, b, desc.event)? {
            Some(result) => Ok(result),
            None => Err(arith_fault(a, b, desc)),
        }
    }

    /// Metamethod-aware equality. `__eq` is only consulted for two tables
    /// that are not already raw-equal.
    pub(crate) fn equals(&mut self, a: &Value, b: &Value) -> Result<bool, VmError> {
        if a == b {
            return Ok(true);
        }
        if let (Value::Table(_), Value::Table(_)) = (a, b) {
            if let Some(verdict) = self.call_binary_metamethod(a, b, "__eq")? {
                return Ok(verdict.is_truthy());
            }
        }
        Ok(false)
    }

    /// Metamethod-aware `<`.
    pub(crate) fn less_than(&mut self, a: &Value, b: &Value) -> Result<bool, VmError> {
        if let Some(ordering) = raw_order(a, b) {
            return Ok(ordering);
        }
        match self.call_binary_metamethod(a, b, "__lt")? {
            Some(verdict) => Ok(verdict.is_truthy()),
            None => Err(compare_fault(a, b)),
        }
    }

    /// Metamethod-aware `<=`; a missing `__le` is emulated as
    /// `not (b < a)`.
    pub(crate) fn less_equal(&mut self, a: &Value, b: &Value) -> Result<bool, VmError> {
        if let Some(ordering) = raw_order_le(a, b) {
            return Ok(ordering);
        }
        if let Some(verdict) = self.call_binary_metamethod(a, b, "__le")? {
            return Ok(verdict.is_truthy());
        }
        match self.call_binary_metamethod(b, a, "__lt")? {
            Some(verdict) => Ok(!verdict.is_truthy()),
            None => Err(compare_fault(a, b)),
        }
    }

    /// Dispatch one comparison operation.
    pub(crate) fn compare(&mut self, a: &Value, b: &Value, op: CompareOp) -> Result<bool, VmError> {
        match op {
            CompareOp::Eq => self.equals(a, b),
            CompareOp::Lt => self.less_than(a, b),
            CompareOp::Le => self.less_equal(a, b),
        }
    }

    /// The length operator: byte length for strings, the array border for
    /// tables without `__len`, otherwise the metamethod.
    pub(crate) fn length_of(&mut self, v: &Value) -> Result<Value, VmError> {
        if let Value::String(s) = v {
            return Ok(Value::Integer(s.len() as i64));
        }
        let handler = self.metafield(v, "__len");
        if !handler.is_nil() {
            let results = self.call_value(handler, vec![v.clone()])?;
            return Ok(results.into_iter().next().unwrap_or(Value::Nil));
        }
        match v {
            Value::Table(t) => Ok(Value::Integer(t.borrow().len() as i64)),
            _ => Err(VmError::Type(format!(
                "attempt to get length of a {} value",
                v.type_name()
            ))),
        }
    }

    /// One concatenation step: strings and numbers fuse, anything else
    /// goes through `__concat`.
    pub(crate) fn concat_pair(&mut self, a: Value, b: Value) -> Result<Value, VmError> {
        if concatenable(&a) && concatenable(&b) {
            let mut bytes = concat_bytes(&a);
            bytes.extend_from_slice(&concat_bytes(&b));
            return Ok(Value::String(bytes.as_slice().into()));
        }
        match self.call_binary_metamethod(&a, &b, "__concat")? {
            Some(result) => Ok(result),
            None => {
                let offender = if concatenable(&a) { &b } else { &a };
                Err(VmError::Type(format!(
                    "attempt to concatenate a {} value",
                    offender.type_name()
                )))
            }
        }
    }
}

fn concatenable(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Integer(_) | Value::Float(_))
}

fn concat_bytes(v: &Value) -> Vec<u8> {
    match v {
        Value::String(s) => s.to_vec(),
        other => other.to_string().into_bytes(),
    }
}

/// Raw `<` where both operands order: numbers and strings.
fn raw_order(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x < y),
        (Value::String(x), Value::String(y)) => Some(x < y),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            Some(as_float(a) < as_float(b))
        }
        _ => None,
    }
}

/// Raw `<=` counterpart of [`raw_order`].
fn raw_order_le(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x <= y),
        (Value::String(x), Value::String(y)) => Some(x <= y),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            Some(as_float(a) <= as_float(b))
        }
        _ => None,
    }
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn arith_fault(a: &Value, b: &Value, desc: &Operator) -> VmError {
    let bitwise = desc.float_fn.is_none();
    if bitwise {
        for v in [a, b] {
            if number::to_float(v).is_some() && number::to_integer(v).is_none() {
                return VmError::Type("number has no integer representation".into());
            }
        }
    }
    let offender = if bitwise {
        if number::to_integer(a).is_none() { a } else { b }
    } else if number::to_float(a).is_none() {
        a
    } else {
        b
    };
    let action = if bitwise {
        "perform bitwise operation on"
    } else {
        "perform arithmetic on"
    };
    VmError::Type(format!(
        "attempt to {} a {} value",
        action,
        offender.type_name()
    ))
}

fn compare_fault(a: &Value, b: &Value) -> VmError {
    VmError::Type(format!(
        "attempt to compare {} with {}",
        a.type_name(),
        b.type_name()
    ))
}
