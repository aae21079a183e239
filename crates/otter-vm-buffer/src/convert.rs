//! Abstract-operation conversions
//!
//! ToNumber / ToBigInt / ToIndex and the fixed-width lane conversions used by
//! typed arrays, DataView and Atomics. Conversions that take `&mut Agent` may
//! run user code (`valueOf`) and must be treated as reentrancy points.

use crate::agent::Agent;
use crate::error::{VmError, VmResult};
use crate::value::{HeapRef, Value};
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

/// 2^53 - 1
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// ToPrimitive with number hint
pub fn to_primitive(agent: &mut Agent, value: &Value) -> VmResult<Value> {
    let Value::Object(heap) = value else {
        return Ok(value.clone());
    };
    let result = match heap {
        HeapRef::Object(obj) => match obj.value_of(agent) {
            Some(result) => result?,
            None => Value::string("[object Object]"),
        },
        HeapRef::Function(_) => Value::string("function"),
        _ => Value::string("[object Object]"),
    };
    if result.is_object() {
        return Err(VmError::type_error(
            "Cannot convert object to primitive value",
        ));
    }
    Ok(result)
}

/// ToNumber
pub fn to_number(agent: &mut Agent, value: &Value) -> VmResult<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(s)),
        Value::BigInt(_) => Err(VmError::type_error(
            "Cannot convert a BigInt value to a number",
        )),
        Value::Object(_) => {
            let prim = to_primitive(agent, value)?;
            to_number(agent, &prim)
        }
    }
}

/// `WhiteSpace` or `LineTerminator` as the StringNumericLiteral grammar sees them.
///
/// Unlike [`char::is_whitespace`] this includes U+FEFF and excludes U+0085.
pub fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'
            | '\u{000A}'
            | '\u{000B}'
            | '\u{000C}'
            | '\u{000D}'
            | '\u{0020}'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

fn trim_js(s: &str) -> &str {
    s.trim_matches(is_js_whitespace)
}

/// StringToNumber; returns NaN for anything that is not a numeric literal
pub fn string_to_number(s: &str) -> f64 {
    let s = trim_js(s);
    if s.is_empty() {
        return 0.0;
    }
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if has_radix_prefix(s, prefix) {
            return parse_radix(&s[2..], radix);
        }
    }
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned == "Infinity" {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    // Rust accepts "inf"/"nan"; JS does not.
    if !unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

fn has_radix_prefix(s: &str, prefix: &str) -> bool {
    s.len() > 2 && s.get(..2).is_some_and(|p| p.eq_ignore_ascii_case(prefix))
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    let mut result = 0.0f64;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => result = result * radix as f64 + d as f64,
            None => return f64::NAN,
        }
    }
    result
}

/// ToBoolean
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => !(n.is_nan() || *n == 0.0),
        Value::String(s) => !s.is_empty(),
        Value::BigInt(b) => !b.is_zero(),
        Value::Object(_) => true,
    }
}

/// ToBigInt; Numbers are rejected with a TypeError
pub fn to_bigint(agent: &mut Agent, value: &Value) -> VmResult<BigInt> {
    let prim = to_primitive(agent, value)?;
    match &prim {
        Value::BigInt(b) => Ok((**b).clone()),
        Value::Boolean(b) => Ok(BigInt::from(u8::from(*b))),
        Value::String(s) => string_to_bigint(s).ok_or_else(|| {
            VmError::syntax_error(format!("Cannot convert {} to a BigInt", s))
        }),
        Value::Undefined | Value::Null | Value::Number(_) => Err(VmError::type_error(format!(
            "Cannot convert {:?} to a BigInt",
            prim
        ))),
        Value::Object(_) => Err(VmError::internal("ToPrimitive returned an object")),
    }
}

/// StringToBigInt
pub fn string_to_bigint(s: &str) -> Option<BigInt> {
    let s = trim_js(s);
    if s.is_empty() {
        return Some(BigInt::zero());
    }
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if has_radix_prefix(s, prefix) {
            return BigInt::parse_bytes(s[2..].as_bytes(), radix);
        }
    }
    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    Some(if negative { -magnitude } else { magnitude })
}

/// ToIntegerOrInfinity on an already-converted number
#[inline]
pub fn integer_or_infinity(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 {
        0.0
    } else if n.is_infinite() {
        n
    } else {
        n.trunc()
    }
}

/// ToIntegerOrInfinity
pub fn to_integer_or_infinity(agent: &mut Agent, value: &Value) -> VmResult<f64> {
    Ok(integer_or_infinity(to_number(agent, value)?))
}

/// ToLength
pub fn to_length(agent: &mut Agent, value: &Value) -> VmResult<usize> {
    let len = to_integer_or_infinity(agent, value)?;
    Ok(len.clamp(0.0, MAX_SAFE_INTEGER) as usize)
}

/// ToIndex: `undefined` is 0; negative or above 2^53-1 is a RangeError
pub fn to_index(agent: &mut Agent, value: &Value) -> VmResult<usize> {
    if value.is_undefined() {
        return Ok(0);
    }
    let integer = to_integer_or_infinity(agent, value)?;
    if !(0.0..=MAX_SAFE_INTEGER).contains(&integer) {
        return Err(VmError::range_error("Invalid index"));
    }
    usize::try_from(integer as u64).map_err(|_| VmError::range_error("Invalid index"))
}

/// Clamp a relative index (negative counts from the end) into `[0, len]`
pub fn relative_index(relative: f64, len: usize) -> usize {
    if relative < 0.0 {
        let from_end = len as f64 + relative;
        if from_end <= 0.0 { 0 } else { from_end as usize }
    } else if relative >= len as f64 {
        len
    } else {
        relative as usize
    }
}

/// Modular conversion to the low `bits` bits (ToInt32 family core)
#[inline]
fn to_uint_bits(n: f64, bits: u32) -> u64 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = 2f64.powi(bits as i32);
    n.trunc().rem_euclid(modulus) as u64
}

/// ToInt8
#[inline]
pub fn to_int8(n: f64) -> i8 {
    to_uint_bits(n, 8) as u8 as i8
}

/// ToUint8
#[inline]
pub fn to_uint8(n: f64) -> u8 {
    to_uint_bits(n, 8) as u8
}

/// ToUint8Clamp: clamp to [0, 255], ties round to even
pub fn to_uint8_clamp(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let f = n.floor();
    let mid = f + 0.5;
    let rounded = if n < mid {
        f
    } else if n > mid || f % 2.0 != 0.0 {
        f + 1.0
    } else {
        f
    };
    rounded as u8
}

/// ToInt16
#[inline]
pub fn to_int16(n: f64) -> i16 {
    to_uint_bits(n, 16) as u16 as i16
}

/// ToUint16
#[inline]
pub fn to_uint16(n: f64) -> u16 {
    to_uint_bits(n, 16) as u16
}

/// ToInt32
#[inline]
pub fn to_int32(n: f64) -> i32 {
    to_uint_bits(n, 32) as u32 as i32
}

/// ToUint32
#[inline]
pub fn to_uint32(n: f64) -> u32 {
    to_uint_bits(n, 32) as u32
}

/// BigInt modulo 2^64, as raw bits
pub fn bigint_low_bits(b: &BigInt) -> u64 {
    let (sign, digits) = b.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    if sign == Sign::Minus {
        low.wrapping_neg()
    } else {
        low
    }
}

/// ToBigInt64
#[inline]
pub fn to_bigint64(b: &BigInt) -> i64 {
    bigint_low_bits(b) as i64
}

/// ToBigUint64
#[inline]
pub fn to_biguint64(b: &BigInt) -> u64 {
    bigint_low_bits(b)
}

/// Exact f64 value of a BigInt when it fits, for cross-type comparisons
pub fn bigint_to_f64(b: &BigInt) -> f64 {
    b.to_f64().unwrap_or(f64::NAN)
}
