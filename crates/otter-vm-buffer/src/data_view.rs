//! DataView implementation
//!
//! A DataView reads and writes any lane type at any byte offset of its buffer,
//! with the byte order chosen per call. The view window is re-derived from the
//! buffer on every access.

use crate::agent::Agent;
use crate::array_buffer::detached_error;
use crate::buffer::BufferRef;
use crate::convert;
use crate::element::{ElementType, Numeric};
use crate::error::{VmError, VmResult};
use crate::typed_array::ViewLength;
use crate::value::{JsObject, Value};
use half::f16;

/// A JavaScript DataView
#[derive(Debug)]
pub struct JsDataView {
    /// Associated object (own properties)
    object: JsObject,
    /// The underlying buffer
    buffer: BufferRef,
    /// Byte offset into the buffer
    byte_offset: usize,
    /// Byte length, or tracking
    length: ViewLength,
}

macro_rules! view_accessors {
    ($($get:ident, $set:ident, $kind:ident, $ty:ty, |$raw:ident| $from:expr, |$val:ident| $to:expr;)*) => {
        $(
            #[doc = concat!("Read a ", stringify!($kind), " at `byte_offset` within the view")]
            pub fn $get(&self, byte_offset: usize, little_endian: bool) -> VmResult<$ty> {
                let $raw = self.get_raw(byte_offset, ElementType::$kind, little_endian)?;
                Ok($from)
            }

            #[doc = concat!("Write a ", stringify!($kind), " at `byte_offset` within the view")]
            pub fn $set(&self, byte_offset: usize, value: $ty, little_endian: bool) -> VmResult<()> {
                let $val = value;
                self.set_raw(byte_offset, ElementType::$kind, $to, little_endian)
            }
        )*
    };
}

impl JsDataView {
    /// Create a view over `buffer`. `byte_length` of `None` means "to the end
    /// of the buffer", which tracks the buffer for resizable/growable buffers.
    pub fn new(buffer: BufferRef, byte_offset: usize, byte_length: Option<usize>) -> VmResult<Self> {
        buffer.ensure_attached()?;
        let buffer_len = buffer.byte_length();
        if byte_offset > buffer_len {
            return Err(VmError::range_error(format!(
                "Start offset {} is outside the bounds of the buffer",
                byte_offset
            )));
        }
        let length = match byte_length {
            None if !buffer.is_fixed_length() => ViewLength::Tracking,
            None => ViewLength::Fixed(buffer_len - byte_offset),
            Some(n) => {
                if byte_offset.checked_add(n).is_none_or(|end| end > buffer_len) {
                    return Err(VmError::range_error(format!(
                        "Invalid DataView length {}",
                        n
                    )));
                }
                ViewLength::Fixed(n)
            }
        };
        Ok(Self {
            object: JsObject::new(),
            buffer,
            byte_offset,
            length,
        })
    }

    /// `new DataView(buffer, byteOffset, byteLength)`
    pub fn construct(agent: &mut Agent, args: &[Value]) -> VmResult<Self> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let buffer = BufferRef::from_value(&arg(0)).ok_or_else(|| {
            VmError::type_error("First argument to DataView constructor must be an ArrayBuffer")
        })?;
        let offset = convert::to_index(agent, &arg(1))?;
        buffer.ensure_attached()?;
        if offset > buffer.byte_length() {
            return Err(VmError::range_error(format!(
                "Start offset {} is outside the bounds of the buffer",
                offset
            )));
        }
        let length_arg = arg(2);
        let byte_length = if length_arg.is_undefined() {
            None
        } else {
            Some(convert::to_index(agent, &length_arg)?)
        };
        // Coercing the length may have detached or shrunk the buffer.
        Self::new(buffer, offset, byte_length)
    }

    /// The object portion (own properties)
    pub fn object(&self) -> &JsObject {
        &self.object
    }

    /// Get the underlying buffer
    pub fn buffer(&self) -> &BufferRef {
        &self.buffer
    }

    /// Check if the length follows the buffer
    pub fn is_length_tracking(&self) -> bool {
        self.length == ViewLength::Tracking
    }

    fn view_length(&self) -> Option<usize> {
        if self.buffer.is_detached() {
            return None;
        }
        let buffer_len = self.buffer.byte_length();
        match self.length {
            ViewLength::Fixed(n) => self
                .byte_offset
                .checked_add(n)
                .is_some_and(|end| end <= buffer_len)
                .then_some(n),
            ViewLength::Tracking => {
                (self.byte_offset <= buffer_len).then(|| buffer_len - self.byte_offset)
            }
        }
    }

    /// Check if the view no longer fits in its buffer (or the buffer is detached)
    pub fn is_out_of_bounds(&self) -> bool {
        self.view_length().is_none()
    }

    /// `DataView.prototype.byteLength`: TypeError when detached or out of bounds
    pub fn byte_length(&self) -> VmResult<usize> {
        if self.buffer.is_detached() {
            return Err(detached_error());
        }
        self.view_length()
            .ok_or_else(|| VmError::type_error("DataView is out of bounds"))
    }

    /// `DataView.prototype.byteOffset`: TypeError when detached or out of bounds
    pub fn byte_offset(&self) -> VmResult<usize> {
        self.byte_length()?;
        Ok(self.byte_offset)
    }

    fn checked_index(&self, byte_index: usize, kind: ElementType) -> VmResult<usize> {
        let view_size = self.byte_length()?;
        let fits = byte_index
            .checked_add(kind.element_size())
            .is_some_and(|end| end <= view_size);
        if !fits {
            return Err(VmError::range_error(
                "Offset is outside the bounds of the DataView",
            ));
        }
        Ok(self.byte_offset + byte_index)
    }

    fn get_raw(&self, byte_index: usize, kind: ElementType, little_endian: bool) -> VmResult<u64> {
        let start = self.checked_index(byte_index, kind)?;
        let size = kind.element_size();
        let mut scratch = [0u8; 8];
        if !self.buffer.read_bytes(start, &mut scratch[..size]) {
            return Err(VmError::range_error(
                "Offset is outside the bounds of the DataView",
            ));
        }
        Ok(kind.raw_from_bytes(&scratch[..size], little_endian))
    }

    fn set_raw(&self, byte_index: usize, kind: ElementType, raw: u64, little_endian: bool) -> VmResult<()> {
        let start = self.checked_index(byte_index, kind)?;
        let size = kind.element_size();
        let mut scratch = [0u8; 8];
        kind.raw_to_bytes(raw, little_endian, &mut scratch[..size]);
        if !self.buffer.write_bytes(start, &scratch[..size]) {
            return Err(VmError::range_error(
                "Offset is outside the bounds of the DataView",
            ));
        }
        Ok(())
    }

    /// GetViewValue on already-coerced arguments
    pub fn get_value(&self, byte_index: usize, kind: ElementType, little_endian: bool) -> VmResult<Numeric> {
        Ok(kind.from_raw(self.get_raw(byte_index, kind, little_endian)?))
    }

    /// SetViewValue on already-coerced arguments
    pub fn set_value(
        &self,
        byte_index: usize,
        kind: ElementType,
        value: &Numeric,
        little_endian: bool,
    ) -> VmResult<()> {
        self.set_raw(byte_index, kind, kind.to_raw(value), little_endian)
    }

    /// GetViewValue: index, then byte order, then detach/bounds checks.
    /// A missing `littleEndian` argument means big-endian.
    pub fn get_view_value(
        &self,
        agent: &mut Agent,
        request_index: &Value,
        little_endian: &Value,
        kind: ElementType,
    ) -> VmResult<Value> {
        let index = convert::to_index(agent, request_index)?;
        let little_endian = convert::to_boolean(little_endian);
        Ok(self.get_value(index, kind, little_endian)?.to_value())
    }

    /// SetViewValue: index, then value, then byte order, then detach/bounds checks
    pub fn set_view_value(
        &self,
        agent: &mut Agent,
        request_index: &Value,
        little_endian: &Value,
        kind: ElementType,
        value: &Value,
    ) -> VmResult<()> {
        let index = convert::to_index(agent, request_index)?;
        let numeric = kind.coerce(agent, value)?;
        let little_endian = convert::to_boolean(little_endian);
        self.set_value(index, kind, &numeric, little_endian)
    }

    view_accessors! {
        get_int8, set_int8, Int8, i8, |r| r as u8 as i8, |v| v as u8 as u64;
        get_uint8, set_uint8, Uint8, u8, |r| r as u8, |v| v as u64;
        get_int16, set_int16, Int16, i16, |r| r as u16 as i16, |v| v as u16 as u64;
        get_uint16, set_uint16, Uint16, u16, |r| r as u16, |v| v as u64;
        get_int32, set_int32, Int32, i32, |r| r as u32 as i32, |v| v as u32 as u64;
        get_uint32, set_uint32, Uint32, u32, |r| r as u32, |v| v as u64;
        get_float16, set_float16, Float16, f64, |r| f16::from_bits(r as u16).to_f64(), |v| f16::from_f64(v).to_bits() as u64;
        get_float32, set_float32, Float32, f32, |r| f32::from_bits(r as u32), |v| v.to_bits() as u64;
        get_float64, set_float64, Float64, f64, |r| f64::from_bits(r), |v| v.to_bits();
        get_big_int64, set_big_int64, BigInt64, i64, |r| r as i64, |v| v as u64;
        get_big_uint64, set_big_uint64, BigUint64, u64, |r| r, |v| v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_buffer::JsArrayBuffer;
    use crate::config::BufferConfig;
    use crate::shared_buffer::JsSharedArrayBuffer;
    use std::sync::Arc;

    fn agent() -> Agent {
        Agent::new(BufferConfig::default())
    }

    fn view(agent: &Agent, len: usize) -> (Arc<JsArrayBuffer>, JsDataView) {
        let ab = Arc::new(JsArrayBuffer::new(agent, len).unwrap());
        let dv = JsDataView::new(BufferRef::Plain(ab.clone()), 0, None).unwrap();
        (ab, dv)
    }

    #[test]
    fn test_endianness() {
        let agent = agent();
        let (ab, dv) = view(&agent, 8);
        dv.set_uint16(0, 0x1234, true).unwrap();
        let mut bytes = [0u8; 2];
        ab.read_bytes(0, &mut bytes);
        assert_eq!(bytes, [0x34, 0x12]);
        assert_eq!(dv.get_uint16(0, false).unwrap(), 0x3412);

        dv.set_int32(4, -2, false).unwrap();
        assert_eq!(dv.get_int32(4, false).unwrap(), -2);
        assert_eq!(dv.get_uint32(4, true).unwrap(), 0xFEFF_FFFF);
    }

    #[test]
    fn test_missing_little_endian_is_big_endian() {
        let mut agent = agent();
        let (_ab, dv) = view(&agent, 4);
        dv.set_view_value(
            &mut agent,
            &Value::number(0.0),
            &Value::Undefined,
            ElementType::Uint16,
            &Value::number(0x0102 as f64),
        )
        .unwrap();
        assert_eq!(dv.get_uint8(0, false).unwrap(), 0x01);
        assert_eq!(dv.get_uint8(1, false).unwrap(), 0x02);
        let v = dv
            .get_view_value(&mut agent, &Value::number(0.0), &Value::boolean(true), ElementType::Uint16)
            .unwrap();
        assert_eq!(v.as_number(), Some(0x0201 as f64));
    }

    #[test]
    fn test_float_lanes() {
        let agent = agent();
        let (_ab, dv) = view(&agent, 8);
        dv.set_float16(0, 1.5, true).unwrap();
        assert_eq!(dv.get_uint16(0, true).unwrap(), 0x3E00);
        assert_eq!(dv.get_float16(0, true).unwrap(), 1.5);
        dv.set_float64(0, std::f64::consts::PI, false).unwrap();
        assert_eq!(dv.get_float64(0, false).unwrap(), std::f64::consts::PI);
        dv.set_float32(0, 0.1, true).unwrap();
        assert_eq!(dv.get_float32(0, true).unwrap(), 0.1f32);
    }

    #[test]
    fn test_bigint_lanes_exact() {
        let agent = agent();
        let (_ab, dv) = view(&agent, 8);
        dv.set_big_int64(0, i64::MIN + 1, true).unwrap();
        assert_eq!(dv.get_big_int64(0, true).unwrap(), i64::MIN + 1);
        assert_eq!(dv.get_big_uint64(0, true).unwrap(), (i64::MIN + 1) as u64);
    }

    #[test]
    fn test_out_of_range_is_range_error() {
        let agent = agent();
        let (_ab, dv) = view(&agent, 4);
        assert!(matches!(dv.get_int32(1, true), Err(VmError::RangeError(_))));
        assert!(matches!(dv.get_int8(4, true), Err(VmError::RangeError(_))));
        assert!(matches!(dv.set_float64(0, 1.0, true), Err(VmError::RangeError(_))));
        assert!(dv.get_int32(0, true).is_ok());
    }

    #[test]
    fn test_detached_after_coercion() {
        let mut agent = agent();
        let (ab, dv) = view(&agent, 8);
        let detach_target = ab.clone();
        let index = Value::object(Arc::new(crate::value::JsObject::new().with_value_of(
            move |_| {
                detach_target.detach();
                Ok(Value::number(0.0))
            },
        )));
        let err = dv
            .get_view_value(&mut agent, &index, &Value::Undefined, ElementType::Int8)
            .unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
        assert!(matches!(dv.byte_length(), Err(VmError::TypeError(_))));
        assert!(matches!(dv.byte_offset(), Err(VmError::TypeError(_))));
    }

    #[test]
    fn test_construct_checks() {
        let mut agent = agent();
        let ab = Arc::new(JsArrayBuffer::new(&agent, 8).unwrap());
        let buf = Value::array_buffer(ab.clone());

        let dv = JsDataView::construct(&mut agent, &[buf.clone(), Value::number(2.0)]).unwrap();
        assert_eq!(dv.byte_length().unwrap(), 6);
        assert_eq!(dv.byte_offset().unwrap(), 2);

        let err = JsDataView::construct(&mut agent, &[buf.clone(), Value::number(9.0)]).unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        let err = JsDataView::construct(&mut agent, &[buf.clone(), Value::number(4.0), Value::number(5.0)])
            .unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        let err = JsDataView::construct(&mut agent, &[Value::number(1.0)]).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
        ab.detach();
        let err = JsDataView::construct(&mut agent, &[buf]).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_tracking_view() {
        let agent = agent();
        let ab = Arc::new(JsArrayBuffer::new_resizable(&agent, 8, 32).unwrap());
        let dv = JsDataView::new(BufferRef::Plain(ab.clone()), 4, None).unwrap();
        assert!(dv.is_length_tracking());
        assert_eq!(dv.byte_length().unwrap(), 4);
        ab.resize(32).unwrap();
        assert_eq!(dv.byte_length().unwrap(), 28);
        dv.set_uint32(24, 7, true).unwrap();
        ab.resize(2).unwrap();
        assert!(dv.is_out_of_bounds());
        assert!(matches!(dv.get_uint8(0, true), Err(VmError::TypeError(_))));
    }

    #[test]
    fn test_shared_buffer_view() {
        let agent = agent();
        let sab = Arc::new(JsSharedArrayBuffer::new(&agent, 16).unwrap());
        let dv = JsDataView::new(BufferRef::Shared(sab.clone()), 8, Some(8)).unwrap();
        dv.set_big_uint64(0, u64::MAX - 1, false).unwrap();
        assert_eq!(dv.get_big_uint64(0, false).unwrap(), u64::MAX - 1);
        let mut bytes = [0u8; 1];
        sab.store().read_bytes(15, &mut bytes);
        assert_eq!(bytes[0], 0xFE);
    }
}
