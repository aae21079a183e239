//! Element types and numeric lane encoding
//!
//! Every typed-array element type, DataView accessor and Atomics lane goes
//! through [`ElementType::to_raw`] / [`ElementType::from_raw`]: a value is
//! first reduced to the raw bit pattern of its lane (held in a `u64`), then
//! laid out in memory with the requested byte order.

use crate::agent::Agent;
use crate::convert;
use crate::error::VmResult;
use crate::value::Value;
use half::f16;
use num_bigint::BigInt;

/// Byte order used by typed arrays (platform order)
pub const NATIVE_LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

/// A numeric value as stored in or read from a lane
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    /// Number lanes
    Number(f64),
    /// BigInt64 / BigUint64 lanes
    BigInt(BigInt),
}

impl Numeric {
    /// Convert to a VM value
    pub fn to_value(&self) -> Value {
        match self {
            Numeric::Number(n) => Value::number(*n),
            Numeric::BigInt(b) => Value::bigint(b.clone()),
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::BigInt(_) => None,
        }
    }

    /// Get as BigInt
    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Numeric::BigInt(b) => Some(b),
            Numeric::Number(_) => None,
        }
    }
}

impl From<Numeric> for Value {
    fn from(n: Numeric) -> Self {
        match n {
            Numeric::Number(n) => Value::number(n),
            Numeric::BigInt(b) => Value::bigint(b),
        }
    }
}

/// The element type of a typed array, DataView accessor or Atomics lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Int8Array - 8-bit signed integers
    Int8,
    /// Uint8Array - 8-bit unsigned integers
    Uint8,
    /// Uint8ClampedArray - 8-bit unsigned integers (clamped)
    Uint8Clamped,
    /// Int16Array - 16-bit signed integers
    Int16,
    /// Uint16Array - 16-bit unsigned integers
    Uint16,
    /// Int32Array - 32-bit signed integers
    Int32,
    /// Uint32Array - 32-bit unsigned integers
    Uint32,
    /// Float16Array - 16-bit floating point
    Float16,
    /// Float32Array - 32-bit floating point
    Float32,
    /// Float64Array - 64-bit floating point
    Float64,
    /// BigInt64Array - 64-bit signed integers (BigInt)
    BigInt64,
    /// BigUint64Array - 64-bit unsigned integers (BigInt)
    BigUint64,
}

impl ElementType {
    /// All element types, in constructor order
    pub const ALL: [ElementType; 12] = [
        ElementType::Int8,
        ElementType::Uint8,
        ElementType::Uint8Clamped,
        ElementType::Int16,
        ElementType::Uint16,
        ElementType::Int32,
        ElementType::Uint32,
        ElementType::Float16,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::BigInt64,
        ElementType::BigUint64,
    ];

    /// Get the byte size of each element
    pub fn element_size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 | ElementType::Uint8Clamped => 1,
            ElementType::Int16 | ElementType::Uint16 | ElementType::Float16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 | ElementType::BigInt64 | ElementType::BigUint64 => 8,
        }
    }

    /// Get the name of the TypedArray constructor for this type
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int8 => "Int8Array",
            ElementType::Uint8 => "Uint8Array",
            ElementType::Uint8Clamped => "Uint8ClampedArray",
            ElementType::Int16 => "Int16Array",
            ElementType::Uint16 => "Uint16Array",
            ElementType::Int32 => "Int32Array",
            ElementType::Uint32 => "Uint32Array",
            ElementType::Float16 => "Float16Array",
            ElementType::Float32 => "Float32Array",
            ElementType::Float64 => "Float64Array",
            ElementType::BigInt64 => "BigInt64Array",
            ElementType::BigUint64 => "BigUint64Array",
        }
    }

    /// Look up a type by constructor name (`"Int32Array"`)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Check if this is a BigInt lane
    pub fn is_bigint(self) -> bool {
        matches!(self, ElementType::BigInt64 | ElementType::BigUint64)
    }

    /// Check if this is a floating-point lane
    pub fn is_float(self) -> bool {
        matches!(
            self,
            ElementType::Float16 | ElementType::Float32 | ElementType::Float64
        )
    }

    /// Lanes usable with Atomics read-modify-write operations
    pub fn is_atomic_integer(self) -> bool {
        !self.is_float() && self != ElementType::Uint8Clamped
    }

    /// Lanes usable with `Atomics.wait` / `Atomics.notify`
    pub fn is_waitable(self) -> bool {
        matches!(self, ElementType::Int32 | ElementType::BigInt64)
    }

    /// Coerce a value for storage in this lane (may run user code)
    pub fn coerce(self, agent: &mut Agent, value: &Value) -> VmResult<Numeric> {
        if self.is_bigint() {
            Ok(Numeric::BigInt(convert::to_bigint(agent, value)?))
        } else {
            Ok(Numeric::Number(convert::to_number(agent, value)?))
        }
    }

    /// Reduce a numeric value to this lane's bit pattern
    pub fn to_raw(self, value: &Numeric) -> u64 {
        let n = match value {
            Numeric::Number(n) => *n,
            Numeric::BigInt(b) => {
                if self.is_bigint() {
                    return convert::bigint_low_bits(b);
                }
                convert::bigint_to_f64(b)
            }
        };
        match self {
            ElementType::Int8 => convert::to_int8(n) as u8 as u64,
            ElementType::Uint8 => convert::to_uint8(n) as u64,
            ElementType::Uint8Clamped => convert::to_uint8_clamp(n) as u64,
            ElementType::Int16 => convert::to_int16(n) as u16 as u64,
            ElementType::Uint16 => convert::to_uint16(n) as u64,
            ElementType::Int32 => convert::to_int32(n) as u32 as u64,
            ElementType::Uint32 => convert::to_uint32(n) as u64,
            ElementType::Float16 => f16::from_f64(n).to_bits() as u64,
            ElementType::Float32 => (n as f32).to_bits() as u64,
            ElementType::Float64 => n.to_bits(),
            ElementType::BigInt64 | ElementType::BigUint64 => {
                convert::integer_or_infinity(n) as i64 as u64
            }
        }
    }

    /// Interpret a lane bit pattern
    pub fn from_raw(self, raw: u64) -> Numeric {
        let n = match self {
            ElementType::Int8 => raw as u8 as i8 as f64,
            ElementType::Uint8 | ElementType::Uint8Clamped => raw as u8 as f64,
            ElementType::Int16 => raw as u16 as i16 as f64,
            ElementType::Uint16 => raw as u16 as f64,
            ElementType::Int32 => raw as u32 as i32 as f64,
            ElementType::Uint32 => raw as u32 as f64,
            ElementType::Float16 => f16::from_bits(raw as u16).to_f64(),
            ElementType::Float32 => f32::from_bits(raw as u32) as f64,
            ElementType::Float64 => f64::from_bits(raw),
            ElementType::BigInt64 => return Numeric::BigInt(BigInt::from(raw as i64)),
            ElementType::BigUint64 => return Numeric::BigInt(BigInt::from(raw)),
        };
        Numeric::Number(n)
    }

    /// Lay out a raw lane value in `out` (exactly `element_size` bytes)
    pub fn raw_to_bytes(self, raw: u64, little_endian: bool, out: &mut [u8]) {
        let size = self.element_size();
        let le = raw.to_le_bytes();
        if little_endian {
            out[..size].copy_from_slice(&le[..size]);
        } else {
            for (i, byte) in out[..size].iter_mut().enumerate() {
                *byte = le[size - 1 - i];
            }
        }
    }

    /// Read a raw lane value from `bytes` (exactly `element_size` bytes)
    pub fn raw_from_bytes(self, bytes: &[u8], little_endian: bool) -> u64 {
        let size = self.element_size();
        let mut scratch = [0u8; 8];
        if little_endian {
            scratch[..size].copy_from_slice(&bytes[..size]);
        } else {
            for (i, byte) in bytes[..size].iter().enumerate() {
                scratch[size - 1 - i] = *byte;
            }
        }
        u64::from_le_bytes(scratch)
    }

    /// Encode a numeric value into `out`
    pub fn encode(self, value: &Numeric, little_endian: bool, out: &mut [u8]) {
        self.raw_to_bytes(self.to_raw(value), little_endian, out);
    }

    /// Decode a numeric value from `bytes`
    pub fn decode(self, bytes: &[u8], little_endian: bool) -> Numeric {
        self.from_raw(self.raw_from_bytes(bytes, little_endian))
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
