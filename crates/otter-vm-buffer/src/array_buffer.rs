//! ArrayBuffer implementation
//!
//! ArrayBuffer is the foundation for TypedArrays and binary data handling.
//! Unlike SharedArrayBuffer, a regular ArrayBuffer is confined to one agent;
//! it can be detached (its bytes transferred away) and, when created with a
//! `maxByteLength`, resized in place.

use crate::agent::Agent;
use crate::backing_store::BackingStore;
use crate::convert;
use crate::element::{ElementType, Numeric};
use crate::error::{VmError, VmResult};
use crate::value::{JsObject, Species, Value, species_constructor};
use parking_lot::RwLock;
use std::sync::Arc;

pub(crate) fn detached_error() -> VmError {
    VmError::type_error("ArrayBuffer is detached")
}

/// A JavaScript ArrayBuffer
#[derive(Debug)]
pub struct JsArrayBuffer {
    /// The object portion (own properties such as `constructor`)
    object: JsObject,
    /// The underlying bytes. None if detached.
    store: RwLock<Option<BackingStore>>,
    /// Maximum byte length for resizable buffers; survives detachment
    max_byte_length: Option<usize>,
}

impl JsArrayBuffer {
    /// Create a new ArrayBuffer with the specified byte length
    pub fn new(agent: &Agent, byte_length: usize) -> VmResult<Self> {
        let store = BackingStore::allocate(agent.config(), agent.memory_manager(), byte_length)?;
        Ok(Self::from_store(store))
    }

    /// Create a new resizable ArrayBuffer
    pub fn new_resizable(agent: &Agent, byte_length: usize, max_byte_length: usize) -> VmResult<Self> {
        let store = BackingStore::allocate_resizable(
            agent.config(),
            agent.memory_manager(),
            byte_length,
            max_byte_length,
        )?;
        Ok(Self::from_store(store))
    }

    /// Wrap an existing backing store (e.g. external memory)
    pub fn from_store(store: BackingStore) -> Self {
        Self {
            object: JsObject::new(),
            max_byte_length: store.max_byte_length(),
            store: RwLock::new(Some(store)),
        }
    }

    /// The object portion (own properties)
    pub fn object(&self) -> &JsObject {
        &self.object
    }

    /// Check if the buffer is detached
    pub fn is_detached(&self) -> bool {
        self.store.read().is_none()
    }

    /// Detach the buffer. Detaching twice is a no-op.
    pub fn detach(&self) {
        let old = self.store.write().take();
        if let Some(store) = old {
            tracing::trace!(byte_length = store.byte_length(), "detached ArrayBuffer");
        }
    }

    /// Get the byte length (0 if detached)
    pub fn byte_length(&self) -> usize {
        self.store.read().as_ref().map_or(0, |s| s.byte_length())
    }

    /// Get the max byte length for resizable buffers
    pub fn max_byte_length(&self) -> Option<usize> {
        self.max_byte_length
    }

    /// Check if this is a resizable buffer
    pub fn is_resizable(&self) -> bool {
        self.max_byte_length.is_some()
    }

    /// Resize the buffer (only for resizable buffers)
    pub fn resize(&self, new_byte_length: usize) -> VmResult<()> {
        let mut guard = self.store.write();
        let store = guard.as_mut().ok_or_else(detached_error)?;
        if !store.is_resizable() {
            return Err(VmError::type_error("ArrayBuffer is not resizable"));
        }
        let old = store.byte_length();
        store.resize(new_byte_length)?;
        tracing::trace!(old, new = new_byte_length, "resized ArrayBuffer");
        Ok(())
    }

    /// `transfer`: move the bytes to a new buffer of `new_byte_length`
    /// (default: current length), keeping resizability, and detach this one.
    pub fn transfer(&self, agent: &Agent, new_byte_length: Option<usize>) -> VmResult<JsArrayBuffer> {
        self.copy_and_detach(agent, new_byte_length, true)
    }

    /// `transferToFixedLength`: like [`transfer`](Self::transfer) but the
    /// result is never resizable
    pub fn transfer_to_fixed_length(
        &self,
        agent: &Agent,
        new_byte_length: Option<usize>,
    ) -> VmResult<JsArrayBuffer> {
        self.copy_and_detach(agent, new_byte_length, false)
    }

    fn copy_and_detach(
        &self,
        agent: &Agent,
        new_byte_length: Option<usize>,
        preserve_resizability: bool,
    ) -> VmResult<JsArrayBuffer> {
        let mut guard = self.store.write();
        let store = guard.as_ref().ok_or_else(detached_error)?;
        let current = store.byte_length();
        let new_len = new_byte_length.unwrap_or(current);
        let new_max = if preserve_resizability {
            self.max_byte_length
        } else {
            None
        };

        // Same size, same shape, owned bytes: hand the store over without copying.
        if new_len == current && store.is_owner() && new_max == store.max_byte_length() {
            let moved = guard.take().ok_or_else(detached_error)?;
            tracing::trace!(byte_length = new_len, "transferred ArrayBuffer without copy");
            return Ok(JsArrayBuffer::from_store(moved));
        }

        let new_buffer = match new_max {
            Some(max) => {
                if new_len > max {
                    return Err(VmError::range_error(
                        "new length exceeds maxByteLength",
                    ));
                }
                JsArrayBuffer::new_resizable(agent, new_len, max)?
            }
            None => JsArrayBuffer::new(agent, new_len)?,
        };
        let count = new_len.min(current);
        new_buffer.write_bytes(0, &store.as_slice()[..count]);
        *guard = None;
        tracing::trace!(old = current, new = new_len, "transferred ArrayBuffer");
        Ok(new_buffer)
    }

    /// `ArrayBuffer.prototype.slice`: copy `[start, end)` into a buffer made
    /// by the species constructor.
    ///
    /// Coercing the arguments and running the species constructor may run
    /// user code, so detachment is re-checked before the copy.
    pub fn slice(
        self: &Arc<Self>,
        agent: &mut Agent,
        start: &Value,
        end: &Value,
    ) -> VmResult<Arc<JsArrayBuffer>> {
        if self.is_detached() {
            return Err(detached_error());
        }
        let len = self.byte_length();
        let first = convert::relative_index(convert::to_integer_or_infinity(agent, start)?, len);
        let last = if end.is_undefined() {
            len
        } else {
            convert::relative_index(convert::to_integer_or_infinity(agent, end)?, len)
        };
        let new_len = last.saturating_sub(first);

        let new_buffer = match species_constructor(agent, &self.object)? {
            Species::Default => Arc::new(JsArrayBuffer::new(agent, new_len)?),
            Species::Custom(ctor) => {
                let created = ctor.construct(agent, &[Value::number(new_len as f64)])?;
                created.as_array_buffer().cloned().ok_or_else(|| {
                    VmError::type_error("species constructor did not return an ArrayBuffer")
                })?
            }
        };
        if new_buffer.is_detached() {
            return Err(VmError::type_error(
                "species constructor returned a detached ArrayBuffer",
            ));
        }
        if Arc::ptr_eq(&new_buffer, self) {
            return Err(VmError::type_error(
                "species constructor returned the same ArrayBuffer",
            ));
        }
        if new_buffer.byte_length() < new_len {
            return Err(VmError::type_error(
                "species constructor returned a too-small ArrayBuffer",
            ));
        }

        // User code may have detached or shrunk the source.
        let source = self.store.read();
        let store = source.as_ref().ok_or_else(detached_error)?;
        let current = store.byte_length();
        if first < current {
            let count = new_len.min(current - first);
            new_buffer.write_bytes(0, &store.as_slice()[first..first + count]);
        }
        Ok(new_buffer)
    }

    /// Read bytes into a slice
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        self.with_data(|data| match offset.checked_add(dest.len()) {
            Some(end) if end <= data.len() => {
                dest.copy_from_slice(&data[offset..end]);
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    /// Write bytes from a slice
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        self.with_data_mut(|data| match offset.checked_add(src.len()) {
            Some(end) if end <= data.len() => {
                data[offset..end].copy_from_slice(src);
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    /// Overlap-safe copy of `len` bytes from `src` to `dst`
    pub fn copy_within(&self, src: usize, dst: usize, len: usize) -> bool {
        self.with_data_mut(|data| {
            let fits = |at: usize| at.checked_add(len).is_some_and(|end| end <= data.len());
            if !fits(src) || !fits(dst) {
                return false;
            }
            data.copy_within(src..src + len, dst);
            true
        })
        .unwrap_or(false)
    }

    /// Get raw access to the data. Returns None if detached.
    pub fn with_data<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let guard = self.store.read();
        guard.as_ref().map(|s| f(s.as_slice()))
    }

    /// Get mutable raw access to the data. Returns None if detached.
    pub fn with_data_mut<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut guard = self.store.write();
        guard.as_mut().map(|s| f(s.as_mut_slice()))
    }

    /// GetValueFromBuffer: read one lane at `byte_index` with the given byte order
    pub fn get_value_from_buffer(
        &self,
        byte_index: usize,
        kind: ElementType,
        little_endian: bool,
    ) -> VmResult<Numeric> {
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(detached_error)?;
        let bytes = byte_index
            .checked_add(kind.element_size())
            .and_then(|end| store.as_slice().get(byte_index..end))
            .ok_or_else(|| VmError::range_error("Offset is outside the bounds of the buffer"))?;
        Ok(kind.decode(bytes, little_endian))
    }

    /// SetValueInBuffer: write one lane at `byte_index` with the given byte order
    pub fn set_value_in_buffer(
        &self,
        byte_index: usize,
        kind: ElementType,
        value: &Numeric,
        little_endian: bool,
    ) -> VmResult<()> {
        let mut guard = self.store.write();
        let store = guard.as_mut().ok_or_else(detached_error)?;
        let bytes = byte_index
            .checked_add(kind.element_size())
            .and_then(|end| store.as_mut_slice().get_mut(byte_index..end))
            .ok_or_else(|| VmError::range_error("Offset is outside the bounds of the buffer"))?;
        kind.encode(value, little_endian, bytes);
        Ok(())
    }
}
