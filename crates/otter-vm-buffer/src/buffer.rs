//! The buffer handle held by views
//!
//! Typed arrays and DataViews work over either kind of buffer. [`BufferRef`]
//! gives them one interface; every read and write goes through it, so views
//! never cache pointers into buffer memory.

use crate::array_buffer::{JsArrayBuffer, detached_error};
use crate::element::{ElementType, Numeric};
use crate::error::{VmError, VmResult};
use crate::shared_buffer::{JsSharedArrayBuffer, SharedBackingStore};
use crate::value::Value;
use std::sync::Arc;

/// An ArrayBuffer or SharedArrayBuffer
#[derive(Debug, Clone)]
pub enum BufferRef {
    /// Non-shared buffer
    Plain(Arc<JsArrayBuffer>),
    /// Shared buffer
    Shared(Arc<JsSharedArrayBuffer>),
}

impl BufferRef {
    /// Extract a buffer from a value
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(ab) = value.as_array_buffer() {
            Some(BufferRef::Plain(ab.clone()))
        } else {
            value
                .as_shared_array_buffer()
                .map(|sab| BufferRef::Shared(sab.clone()))
        }
    }

    /// The buffer as a VM value
    pub fn to_value(&self) -> Value {
        match self {
            BufferRef::Plain(ab) => Value::array_buffer(ab.clone()),
            BufferRef::Shared(sab) => Value::shared_array_buffer(sab.clone()),
        }
    }

    /// Check if shared
    pub fn is_shared(&self) -> bool {
        matches!(self, BufferRef::Shared(_))
    }

    /// Shared buffers are never detached
    pub fn is_detached(&self) -> bool {
        match self {
            BufferRef::Plain(ab) => ab.is_detached(),
            BufferRef::Shared(_) => false,
        }
    }

    /// Current byte length (0 if detached)
    pub fn byte_length(&self) -> usize {
        match self {
            BufferRef::Plain(ab) => ab.byte_length(),
            BufferRef::Shared(sab) => sab.byte_length(),
        }
    }

    /// Neither resizable nor growable
    pub fn is_fixed_length(&self) -> bool {
        match self {
            BufferRef::Plain(ab) => !ab.is_resizable(),
            BufferRef::Shared(sab) => !sab.is_growable(),
        }
    }

    /// The shared store, if shared
    pub fn shared_store(&self) -> Option<&Arc<SharedBackingStore>> {
        match self {
            BufferRef::Shared(sab) => Some(sab.store()),
            BufferRef::Plain(_) => None,
        }
    }

    /// Check whether both refer to the same bytes
    pub fn same_buffer(&self, other: &BufferRef) -> bool {
        match (self, other) {
            (BufferRef::Plain(a), BufferRef::Plain(b)) => Arc::ptr_eq(a, b),
            (BufferRef::Shared(a), BufferRef::Shared(b)) => Arc::ptr_eq(a.store(), b.store()),
            _ => false,
        }
    }

    /// Read bytes into a slice
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        match self {
            BufferRef::Plain(ab) => ab.read_bytes(offset, dest),
            BufferRef::Shared(sab) => sab.store().read_bytes(offset, dest),
        }
    }

    /// Copy out `len` bytes at `offset`
    pub fn read_vec(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.read_bytes(offset, &mut bytes).then_some(bytes)
    }

    /// Write bytes from a slice
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        match self {
            BufferRef::Plain(ab) => ab.write_bytes(offset, src),
            BufferRef::Shared(sab) => sab.store().write_bytes(offset, src),
        }
    }

    /// Overlap-aware copy within the buffer
    pub fn copy_within(&self, src: usize, dst: usize, len: usize) -> bool {
        match self {
            BufferRef::Plain(ab) => ab.copy_within(src, dst, len),
            BufferRef::Shared(sab) => sab.store().copy_within(src, dst, len),
        }
    }

    /// GetValueFromBuffer
    pub fn get_value(
        &self,
        byte_index: usize,
        kind: ElementType,
        little_endian: bool,
    ) -> VmResult<Numeric> {
        match self {
            BufferRef::Plain(ab) => ab.get_value_from_buffer(byte_index, kind, little_endian),
            BufferRef::Shared(sab) => {
                let mut scratch = [0u8; 8];
                let size = kind.element_size();
                if !sab.store().read_bytes(byte_index, &mut scratch[..size]) {
                    return Err(VmError::range_error(
                        "Offset is outside the bounds of the buffer",
                    ));
                }
                Ok(kind.decode(&scratch[..size], little_endian))
            }
        }
    }

    /// SetValueInBuffer
    pub fn set_value(
        &self,
        byte_index: usize,
        kind: ElementType,
        value: &Numeric,
        little_endian: bool,
    ) -> VmResult<()> {
        match self {
            BufferRef::Plain(ab) => ab.set_value_in_buffer(byte_index, kind, value, little_endian),
            BufferRef::Shared(sab) => {
                let mut scratch = [0u8; 8];
                let size = kind.element_size();
                kind.encode(value, little_endian, &mut scratch[..size]);
                if !sab.store().write_bytes(byte_index, &scratch[..size]) {
                    return Err(VmError::range_error(
                        "Offset is outside the bounds of the buffer",
                    ));
                }
                Ok(())
            }
        }
    }

    /// TypeError unless the buffer is attached
    pub fn ensure_attached(&self) -> VmResult<()> {
        if self.is_detached() {
            return Err(detached_error());
        }
        Ok(())
    }
}
