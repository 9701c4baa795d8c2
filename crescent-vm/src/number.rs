//! Numeric coercions and arithmetic primitives.
//!
//! Conversion order matters: strings try the integer reading first and
//! only then the float reading, and a float converts to an integer only
//! when the conversion is exact.

use crate::value::Value;

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact float-to-integer conversion.
pub fn float_to_integer(f: f64) -> Option<i64> {
    (f.trunc() == f && (-TWO_POW_63..TWO_POW_63).contains(&f)).then(|| f as i64)
}

/// Parse an integer literal, decimal or `0x`-prefixed hexadecimal.
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { magnitude.wrapping_neg() } else { magnitude })
}

/// Parse a float literal.
pub fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok()
}

/// String-to-integer conversion: integer reading first, then the float
/// reading followed by the exactness rule.
pub fn string_to_integer(s: &str) -> Option<i64> {
    parse_integer(s).or_else(|| parse_float(s).and_then(float_to_integer))
}

/// Convert a value to an integer per the coercion rules.
pub fn to_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(i) => Some(*i),
        Value::Float(f) => float_to_integer(*f),
        Value::String(s) => std::str::from_utf8(s).ok().and_then(string_to_integer),
        _ => None,
    }
}

/// Convert a value to a float per the coercion rules.
pub fn to_float(v: &Value) -> Option<f64> {
    match v {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => {
            let s = std::str::from_utf8(s).ok()?;
            parse_float(s).or_else(|| parse_integer(s).map(|i| i as f64))
        }
        _ => None,
    }
}

/// Integer division truncating toward negative infinity. The divisor must
/// be non-zero.
pub fn floor_div_int(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        q - 1
    } else {
        q
    }
}

/// Float floor division.
pub fn floor_div_float(a: f64, b: f64) -> f64 {
    (a / b).floor()
}

/// Integer modulo with the sign of the divisor: `a - floor(a/b)*b`. The
/// divisor must be non-zero.
pub fn mod_int(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        r + b
    } else {
        r
    }
}

/// Float modulo with the sign of the divisor.
pub fn mod_float(a: f64, b: f64) -> f64 {
    a - (a / b).floor() * b
}

/// Logical left shift on the two's-complement representation; negative
/// counts shift right, counts of 64 or more produce zero.
pub fn shift_left(a: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((a as u64) << n) as i64
    } else {
        ((a as u64) >> -n) as i64
    }
}

/// Logical right shift; negative counts shift left.
pub fn shift_right(a: i64, n: i64) -> i64 {
    shift_left(a, n.saturating_neg())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_to_integer_requires_exactness() {
        assert_eq!(float_to_integer(2.0), Some(2));
        assert_eq!(float_to_integer(-2.0), Some(-2));
        assert_eq!(float_to_integer(2.5), None);
        assert_eq!(float_to_integer(f64::NAN), None);
        assert_eq!(float_to_integer(f64::INFINITY), None);
        assert_eq!(float_to_integer(TWO_POW_63), None);
    }

    #[test]
    fn string_conversions_try_integer_first() {
        assert_eq!(string_to_integer("42"), Some(42));
        assert_eq!(string_to_integer("  -3 "), Some(-3));
        assert_eq!(string_to_integer("0x10"), Some(16));
        assert_eq!(string_to_integer("4.0"), Some(4));
        assert_eq!(string_to_integer("4.5"), None);
        assert_eq!(string_to_integer("pear"), None);
    }

    #[test]
    fn value_coercions() {
        assert_eq!(to_integer(&Value::Float(2.0)), Some(2));
        assert_eq!(to_integer(&Value::Float(2.5)), None);
        assert_eq!(to_integer(&Value::from("0x10")), Some(16));
        assert_eq!(to_integer(&Value::Boolean(true)), None);
        assert_eq!(to_float(&Value::Integer(3)), Some(3.0));
        assert_eq!(to_float(&Value::from("1.5")), Some(1.5));
        assert_eq!(to_float(&Value::from("0x10")), Some(16.0));
        assert_eq!(to_float(&Value::Nil), None);
    }

    #[test]
    fn floor_division_truncates_toward_negative_infinity() {
        assert_eq!(floor_div_int(7, 2), 3);
        assert_eq!(floor_div_int(-7, 2), -4);
        assert_eq!(floor_div_int(7, -2), -4);
        assert_eq!(floor_div_int(-7, -2), 3);
        assert_eq!(floor_div_int(6, 2), 3);
        assert_eq!(floor_div_float(-7.0, 2.0), -4.0);
    }

    #[test]
    fn modulo_takes_the_divisor_sign() {
        assert_eq!(mod_int(7, 3), 1);
        assert_eq!(mod_int(-7, 3), 2);
        assert_eq!(mod_int(7, -3), -2);
        assert_eq!(mod_float(5.5, 2.0), 1.5);
        assert_eq!(mod_float(-5.5, 2.0), 0.5);
    }

    #[test]
    fn shifts_are_logical_and_reverse_on_negative_counts() {
        assert_eq!(shift_left(1, 4), 16);
        assert_eq!(shift_left(16, -4), 1);
        assert_eq!(shift_right(-1, 63), 1);
        assert_eq!(shift_right(1, -4), 16);
        assert_eq!(shift_left(1, 64), 0);
        assert_eq!(shift_right(1, i64::MIN), 0);
    }
}
