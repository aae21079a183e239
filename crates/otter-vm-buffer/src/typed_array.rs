//! TypedArray implementation
//!
//! TypedArrays are views over an ArrayBuffer or SharedArrayBuffer. All twelve
//! element types share this one implementation, parameterized by
//! [`ElementType`].
//!
//! A view stores only its byte offset and either a fixed element count or
//! "tracking" (length follows the buffer). The element count is recomputed
//! from the buffer on every access, so a view over a resizable buffer that
//! shrank below its window simply reports itself out of bounds.

use crate::agent::Agent;
use crate::array_buffer::{JsArrayBuffer, detached_error};
use crate::buffer::BufferRef;
use crate::convert;
use crate::element::{ElementType, NATIVE_LITTLE_ENDIAN, Numeric};
use crate::error::{VmError, VmResult};
use crate::value::{HeapRef, JsObject, PropertyDescriptor, Value};
use std::sync::Arc;

/// How a view's length is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewLength {
    /// Fixed at construction (elements for typed arrays, bytes for DataView)
    Fixed(usize),
    /// Whatever remains of the buffer past the byte offset
    Tracking,
}

/// A JavaScript TypedArray
///
/// TypedArray is a view over a buffer, providing typed access to binary data.
/// It does not copy data - it references the underlying buffer.
#[derive(Debug)]
pub struct JsTypedArray {
    /// Associated object (own properties such as `constructor`)
    object: JsObject,
    /// The underlying buffer
    buffer: BufferRef,
    /// The element type
    kind: ElementType,
    /// Byte offset into the buffer
    byte_offset: usize,
    /// Element count, or tracking
    length: ViewLength,
}

impl JsTypedArray {
    /// Create a view over `buffer`. `length` of `None` means "to the end of
    /// the buffer", which tracks the buffer for resizable/growable buffers.
    pub fn new(
        buffer: BufferRef,
        kind: ElementType,
        byte_offset: usize,
        length: Option<usize>,
    ) -> VmResult<Self> {
        let elem_size = kind.element_size();
        if byte_offset % elem_size != 0 {
            return Err(VmError::range_error(format!(
                "start offset of {} should be a multiple of {}",
                kind.name(),
                elem_size
            )));
        }
        buffer.ensure_attached()?;
        let buffer_len = buffer.byte_length();

        let length = match length {
            None if !buffer.is_fixed_length() => {
                if byte_offset > buffer_len {
                    return Err(VmError::range_error(format!(
                        "Start offset {} is outside the bounds of the buffer",
                        byte_offset
                    )));
                }
                ViewLength::Tracking
            }
            None => {
                if buffer_len % elem_size != 0 {
                    return Err(VmError::range_error(format!(
                        "byte length of {} should be a multiple of {}",
                        kind.name(),
                        elem_size
                    )));
                }
                if byte_offset > buffer_len {
                    return Err(VmError::range_error(format!(
                        "Start offset {} is outside the bounds of the buffer",
                        byte_offset
                    )));
                }
                ViewLength::Fixed((buffer_len - byte_offset) / elem_size)
            }
            Some(n) => {
                let fits = n
                    .checked_mul(elem_size)
                    .and_then(|bytes| bytes.checked_add(byte_offset))
                    .is_some_and(|end| end <= buffer_len);
                if !fits {
                    return Err(VmError::range_error(format!(
                        "Invalid typed array length: {}",
                        n
                    )));
                }
                ViewLength::Fixed(n)
            }
        };

        Ok(Self {
            object: JsObject::new(),
            buffer,
            kind,
            byte_offset,
            length,
        })
    }

    /// Create a new TypedArray with its own zeroed buffer
    pub fn with_length(agent: &Agent, kind: ElementType, length: usize) -> VmResult<Self> {
        let byte_length = length
            .checked_mul(kind.element_size())
            .ok_or_else(|| VmError::range_error(format!("Invalid typed array length: {}", length)))?;
        let buffer = JsArrayBuffer::new(agent, byte_length)?;
        Self::new(BufferRef::Plain(Arc::new(buffer)), kind, 0, Some(length))
    }

    /// `new <Type>Array(...args)`: dispatch on the first argument
    pub fn construct(agent: &mut Agent, kind: ElementType, args: &[Value]) -> VmResult<Self> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let first = arg(0);
        match &first {
            Value::Object(HeapRef::TypedArray(source)) => Self::from_typed_array(agent, kind, source),
            Value::Object(HeapRef::ArrayBuffer(_)) | Value::Object(HeapRef::SharedArrayBuffer(_)) => {
                let buffer = BufferRef::from_value(&first)
                    .ok_or_else(|| VmError::internal("buffer value without a buffer"))?;
                Self::from_buffer(agent, kind, buffer, &arg(1), &arg(2))
            }
            Value::Object(HeapRef::Object(obj)) => match obj.iterator() {
                Some(iterate) => {
                    let values = iterate(agent)?;
                    Self::from_values(agent, kind, &values)
                }
                None => Self::from_array_like(agent, kind, obj),
            },
            Value::Object(_) => Self::from_array_like(agent, kind, &JsObject::new()),
            _ => {
                let length = convert::to_index(agent, &first)?;
                Self::with_length(agent, kind, length)
            }
        }
    }

    /// Copy another typed array: bytes verbatim for the same element type,
    /// element-wise conversion otherwise
    pub fn from_typed_array(agent: &Agent, kind: ElementType, source: &JsTypedArray) -> VmResult<Self> {
        let len = source.validate()?;
        if kind.is_bigint() != source.kind.is_bigint() {
            return Err(VmError::type_error(
                "Cannot mix BigInt and other types, use explicit conversions",
            ));
        }
        let target = Self::with_length(agent, kind, len)?;
        if source.kind == kind {
            let bytes = source
                .buffer
                .read_vec(source.byte_offset, len * kind.element_size())
                .ok_or_else(detached_error)?;
            target.buffer.write_bytes(0, &bytes);
        } else {
            for i in 0..len {
                if let Some(value) = source.get_element(i) {
                    target.set_element(i, &value);
                }
            }
        }
        Ok(target)
    }

    /// View over an existing buffer; coerces offset and length first, then
    /// checks detachment
    pub fn from_buffer(
        agent: &mut Agent,
        kind: ElementType,
        buffer: BufferRef,
        byte_offset: &Value,
        length: &Value,
    ) -> VmResult<Self> {
        let offset = convert::to_index(agent, byte_offset)?;
        if offset % kind.element_size() != 0 {
            return Err(VmError::range_error(format!(
                "start offset of {} should be a multiple of {}",
                kind.name(),
                kind.element_size()
            )));
        }
        let new_length = if length.is_undefined() {
            None
        } else {
            Some(convert::to_index(agent, length)?)
        };
        Self::new(buffer, kind, offset, new_length)
    }

    /// Fresh array filled from a list of values
    pub fn from_values(agent: &mut Agent, kind: ElementType, values: &[Value]) -> VmResult<Self> {
        let target = Self::with_length(agent, kind, values.len())?;
        for (i, value) in values.iter().enumerate() {
            target.set(agent, i as f64, value)?;
        }
        Ok(target)
    }

    /// Fresh array filled from an array-like object (`length` + indices)
    pub fn from_array_like(agent: &mut Agent, kind: ElementType, source: &JsObject) -> VmResult<Self> {
        let length_value = source.get(agent, "length")?;
        let len = convert::to_length(agent, &length_value)?;
        let target = Self::with_length(agent, kind, len)?;
        for i in 0..len {
            let value = source.get(agent, &i.to_string())?;
            target.set(agent, i as f64, &value)?;
        }
        Ok(target)
    }

    /// The object portion (own properties)
    pub fn object(&self) -> &JsObject {
        &self.object
    }

    /// Get the element type
    pub fn kind(&self) -> ElementType {
        self.kind
    }

    /// Get the underlying buffer
    pub fn buffer(&self) -> &BufferRef {
        &self.buffer
    }

    /// Check if the length follows the buffer
    pub fn is_length_tracking(&self) -> bool {
        self.length == ViewLength::Tracking
    }

    /// Byte offset as constructed, regardless of bounds
    pub(crate) fn view_byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Element count, or `None` if detached or out of bounds
    fn array_length(&self) -> Option<usize> {
        if self.buffer.is_detached() {
            return None;
        }
        let buffer_len = self.buffer.byte_length();
        let elem_size = self.kind.element_size();
        match self.length {
            ViewLength::Fixed(n) => {
                let end = self.byte_offset.saturating_add(n.saturating_mul(elem_size));
                (end <= buffer_len).then_some(n)
            }
            ViewLength::Tracking => {
                (self.byte_offset <= buffer_len).then(|| (buffer_len - self.byte_offset) / elem_size)
            }
        }
    }

    /// Check if the view no longer fits in its buffer (or the buffer is detached)
    pub fn is_out_of_bounds(&self) -> bool {
        self.array_length().is_none()
    }

    /// Check if the underlying buffer is detached
    pub fn is_detached(&self) -> bool {
        self.buffer.is_detached()
    }

    /// Get the number of elements (0 if out of bounds)
    pub fn length(&self) -> usize {
        self.array_length().unwrap_or(0)
    }

    /// Get the byte length of the view (0 if out of bounds)
    pub fn byte_length(&self) -> usize {
        self.length() * self.kind.element_size()
    }

    /// Get the byte offset into the buffer (0 if out of bounds)
    pub fn byte_offset(&self) -> usize {
        if self.is_out_of_bounds() {
            0
        } else {
            self.byte_offset
        }
    }

    /// ValidateTypedArray: TypeError if detached or out of bounds, else the length
    pub fn validate(&self) -> VmResult<usize> {
        if self.buffer.is_detached() {
            return Err(detached_error());
        }
        self.array_length()
            .ok_or_else(|| VmError::type_error("TypedArray is out of bounds"))
    }

    /// IsValidIntegerIndex
    pub fn is_valid_integer_index(&self, index: f64) -> bool {
        if !index.is_finite() || index.fract() != 0.0 {
            return false;
        }
        if index == 0.0 && index.is_sign_negative() {
            return false;
        }
        index >= 0.0 && index < self.length() as f64
    }

    /// Read element `index`; `None` when it does not exist
    pub fn get_element(&self, index: usize) -> Option<Numeric> {
        let len = self.array_length()?;
        if index >= len {
            return None;
        }
        let byte_index = self.byte_offset + index * self.kind.element_size();
        self.buffer
            .get_value(byte_index, self.kind, NATIVE_LITTLE_ENDIAN)
            .ok()
    }

    /// Write an already-coerced value to element `index`; false when it does not exist
    pub fn set_element(&self, index: usize, value: &Numeric) -> bool {
        let Some(len) = self.array_length() else {
            return false;
        };
        if index >= len {
            return false;
        }
        let byte_index = self.byte_offset + index * self.kind.element_size();
        self.buffer
            .set_value(byte_index, self.kind, value, NATIVE_LITTLE_ENDIAN)
            .is_ok()
    }

    /// Integer-indexed `[[Get]]`: missing (not an error) when out of range or detached
    pub fn get(&self, index: f64) -> Option<Numeric> {
        if !self.is_valid_integer_index(index) {
            return None;
        }
        self.get_element(index as usize)
    }

    /// Integer-indexed `[[Set]]`: coerce first (user code may detach or shrink
    /// the buffer), then write only if the index is still valid
    pub fn set(&self, agent: &mut Agent, index: f64, value: &Value) -> VmResult<()> {
        let numeric = self.kind.coerce(agent, value)?;
        if self.is_valid_integer_index(index) {
            self.set_element(index as usize, &numeric);
        }
        Ok(())
    }

    /// Integer-indexed `[[DefineOwnProperty]]`
    ///
    /// Elements are always writable, enumerable, non-configurable data
    /// properties; any descriptor asking for something else is rejected.
    pub fn define_own_index(
        &self,
        agent: &mut Agent,
        index: f64,
        desc: &PropertyDescriptor,
    ) -> VmResult<bool> {
        if !self.is_valid_integer_index(index) {
            return Ok(false);
        }
        if desc.configurable == Some(true)
            || desc.enumerable == Some(false)
            || desc.writable == Some(false)
            || desc.is_accessor()
        {
            return Ok(false);
        }
        if let Some(value) = &desc.value {
            self.set(agent, index, value)?;
        }
        Ok(true)
    }

    /// Property `[[Get]]` by string key; numeric keys never reach the object
    pub fn get_property(&self, agent: &mut Agent, key: &str) -> VmResult<Value> {
        match canonical_numeric_index(key) {
            Some(index) => Ok(self.get(index).map_or(Value::Undefined, |n| n.to_value())),
            None => self.object.get(agent, key),
        }
    }

    /// Property `[[Set]]` by string key
    pub fn set_property(&self, agent: &mut Agent, key: &str, value: &Value) -> VmResult<()> {
        match canonical_numeric_index(key) {
            Some(index) => self.set(agent, index, value),
            None => {
                self.object.set(key, value.clone());
                Ok(())
            }
        }
    }

    /// Property `[[HasProperty]]` by string key
    pub fn has_property(&self, key: &str) -> bool {
        match canonical_numeric_index(key) {
            Some(index) => self.is_valid_integer_index(index),
            None => self.object.has_own_property(key),
        }
    }
}

/// CanonicalNumericIndexString: the number a key denotes if the key is the
/// canonical string form of that number
pub fn canonical_numeric_index(key: &str) -> Option<f64> {
    if key == "-0" {
        return Some(-0.0);
    }
    let n = match key {
        "NaN" => f64::NAN,
        "Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            let n = convert::string_to_number(key);
            if n.is_nan() {
                return None;
            }
            n
        }
    };
    (number_to_key(n) == key).then_some(n)
}

fn number_to_key(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}
