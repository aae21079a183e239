//! SharedArrayBuffer implementation
//!
//! The backing memory of a SharedArrayBuffer is allocated once at its maximum
//! size, so growing never moves it: other agents may be reading and writing
//! the same bytes at any time. The memory is an array of `AtomicU64` words,
//! which makes it suitably aligned for atomic access of every lane width.
//! Ordinary (non-atomic) reads and writes go through relaxed byte accesses.

use crate::agent::Agent;
use crate::config::BufferConfig;
use crate::convert;
use crate::error::{VmError, VmResult};
use crate::memory::{MemoryManager, Reservation};
use crate::value::{JsObject, Species, Value, species_constructor};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Address-stable shared memory block
pub struct SharedBackingStore {
    /// Allocated at `max_byte_length` (rounded up to whole words)
    words: Box<[AtomicU64]>,
    byte_length: AtomicUsize,
    max_byte_length: Option<usize>,
    /// Process-unique identity, used to key waiter lists
    id: u64,
    _reservation: Reservation,
}

impl std::fmt::Debug for SharedBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBackingStore")
            .field("id", &self.id)
            .field("byte_length", &self.byte_length())
            .field("max_byte_length", &self.max_byte_length)
            .finish()
    }
}

impl SharedBackingStore {
    /// Allocate a fixed-length shared store
    pub fn allocate(
        config: &BufferConfig,
        memory: &Arc<MemoryManager>,
        byte_length: usize,
    ) -> VmResult<Arc<Self>> {
        Self::allocate_inner(config, memory, byte_length, None)
    }

    /// Allocate a growable shared store. The full `max_byte_length` is
    /// reserved up front.
    pub fn allocate_growable(
        config: &BufferConfig,
        memory: &Arc<MemoryManager>,
        byte_length: usize,
        max_byte_length: usize,
    ) -> VmResult<Arc<Self>> {
        if byte_length > max_byte_length {
            return Err(VmError::range_error(
                "byteLength exceeds maxByteLength",
            ));
        }
        Self::allocate_inner(config, memory, byte_length, Some(max_byte_length))
    }

    fn allocate_inner(
        config: &BufferConfig,
        memory: &Arc<MemoryManager>,
        byte_length: usize,
        max_byte_length: Option<usize>,
    ) -> VmResult<Arc<Self>> {
        let capacity = max_byte_length.unwrap_or(byte_length);
        if capacity > config.max_array_buffer_size {
            return Err(VmError::range_error(
                "SharedArrayBuffer allocation failed",
            ));
        }
        memory.note_allocation_pressure(capacity, config.gc_pressure_ratio);
        let reservation = Reservation::new(memory.clone(), capacity)
            .map_err(|_| VmError::range_error("SharedArrayBuffer allocation failed"))?;

        let word_count = capacity.div_ceil(8);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| VmError::range_error("SharedArrayBuffer allocation failed"))?;
        words.resize_with(word_count, || AtomicU64::new(0));

        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, byte_length, capacity, "allocated shared backing store");
        Ok(Arc::new(Self {
            words: words.into_boxed_slice(),
            byte_length: AtomicUsize::new(byte_length),
            max_byte_length,
            id,
            _reservation: reservation,
        }))
    }

    /// Process-unique store identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current byte length
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.byte_length.load(Ordering::SeqCst)
    }

    /// Maximum byte length, for growable stores
    pub fn max_byte_length(&self) -> Option<usize> {
        self.max_byte_length
    }

    /// Check if the store may grow
    pub fn is_growable(&self) -> bool {
        self.max_byte_length.is_some()
    }

    /// Shared stores are visible to every agent holding them
    pub fn is_shared(&self) -> bool {
        true
    }

    /// Bytes physically allocated
    fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    /// Grow to `new_byte_length`. Shrinking is a RangeError; the memory
    /// itself never moves.
    pub fn grow(&self, new_byte_length: usize) -> VmResult<()> {
        let Some(max) = self.max_byte_length else {
            return Err(VmError::type_error("SharedArrayBuffer is not growable"));
        };
        if new_byte_length > max {
            return Err(VmError::range_error(
                "new length exceeds maxByteLength",
            ));
        }
        self.byte_length
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (new_byte_length >= current).then_some(new_byte_length)
            })
            .map_err(|_| VmError::range_error("SharedArrayBuffer cannot shrink"))?;
        tracing::debug!(id = self.id, new_byte_length, "grew shared buffer");
        Ok(())
    }

    fn bytes(&self) -> &[AtomicU8] {
        // SAFETY: `AtomicU8` has the size and alignment of `u8`, and the words
        // are only ever accessed through atomic types.
        unsafe {
            std::slice::from_raw_parts(self.words.as_ptr() as *const AtomicU8, self.capacity())
        }
    }

    fn in_bounds(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.byte_length())
    }

    /// Read bytes into a slice
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        if !self.in_bounds(offset, dest.len()) {
            return false;
        }
        let bytes = &self.bytes()[offset..offset + dest.len()];
        for (d, cell) in dest.iter_mut().zip(bytes) {
            *d = cell.load(Ordering::Relaxed);
        }
        true
    }

    /// Write bytes from a slice
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        if !self.in_bounds(offset, src.len()) {
            return false;
        }
        let bytes = &self.bytes()[offset..offset + src.len()];
        for (cell, s) in bytes.iter().zip(src) {
            cell.store(*s, Ordering::Relaxed);
        }
        true
    }

    /// Copy `len` bytes from `src` to `dst` within the store
    pub fn copy_within(&self, src: usize, dst: usize, len: usize) -> bool {
        if !self.in_bounds(src, len) || !self.in_bounds(dst, len) {
            return false;
        }
        let bytes = self.bytes();
        if dst > src && dst < src + len {
            // Destination ahead of an overlapping source: copy backward.
            for i in (0..len).rev() {
                bytes[dst + i].store(bytes[src + i].load(Ordering::Relaxed), Ordering::Relaxed);
            }
        } else {
            for i in 0..len {
                bytes[dst + i].store(bytes[src + i].load(Ordering::Relaxed), Ordering::Relaxed);
            }
        }
        true
    }

    /// Byte cell at `byte_index`
    pub fn atomic_u8(&self, byte_index: usize) -> Option<&AtomicU8> {
        self.bytes().get(byte_index)
    }

    /// Aligned 16-bit cell at `byte_index`
    pub fn atomic_u16(&self, byte_index: usize) -> Option<&AtomicU16> {
        self.cell::<AtomicU16>(byte_index)
    }

    /// Aligned 32-bit cell at `byte_index`
    pub fn atomic_u32(&self, byte_index: usize) -> Option<&AtomicU32> {
        self.cell::<AtomicU32>(byte_index)
    }

    /// Aligned 64-bit cell at `byte_index`
    pub fn atomic_u64(&self, byte_index: usize) -> Option<&AtomicU64> {
        self.cell::<AtomicU64>(byte_index)
    }

    fn cell<T>(&self, byte_index: usize) -> Option<&T> {
        let size = std::mem::size_of::<T>();
        if byte_index % size != 0 || byte_index.checked_add(size)? > self.capacity() {
            return None;
        }
        // SAFETY: the words are 8-byte aligned, so `byte_index` being a
        // multiple of `size` (at most 8) keeps the cell aligned; the range is
        // inside the allocation and only accessed atomically.
        unsafe { Some(&*((self.words.as_ptr() as *const u8).add(byte_index) as *const T)) }
    }
}

/// A JavaScript SharedArrayBuffer
///
/// Several `JsSharedArrayBuffer` objects (one per agent) may wrap the same
/// [`SharedBackingStore`].
#[derive(Debug)]
pub struct JsSharedArrayBuffer {
    object: JsObject,
    store: Arc<SharedBackingStore>,
}

impl JsSharedArrayBuffer {
    /// Create a new fixed-length SharedArrayBuffer
    pub fn new(agent: &Agent, byte_length: usize) -> VmResult<Self> {
        let store = SharedBackingStore::allocate(agent.config(), agent.memory_manager(), byte_length)?;
        Ok(Self::from_store(store))
    }

    /// Create a new growable SharedArrayBuffer
    pub fn new_growable(agent: &Agent, byte_length: usize, max_byte_length: usize) -> VmResult<Self> {
        let store = SharedBackingStore::allocate_growable(
            agent.config(),
            agent.memory_manager(),
            byte_length,
            max_byte_length,
        )?;
        Ok(Self::from_store(store))
    }

    /// Wrap an existing store, e.g. one received from another agent
    pub fn from_store(store: Arc<SharedBackingStore>) -> Self {
        Self {
            object: JsObject::new(),
            store,
        }
    }

    /// The object portion (own properties)
    pub fn object(&self) -> &JsObject {
        &self.object
    }

    /// The shared memory block
    pub fn store(&self) -> &Arc<SharedBackingStore> {
        &self.store
    }

    /// Get the byte length of this buffer
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.store.byte_length()
    }

    /// `maxByteLength`: the byte length for non-growable buffers
    pub fn max_byte_length(&self) -> usize {
        self.store
            .max_byte_length()
            .unwrap_or_else(|| self.byte_length())
    }

    /// Check if growable
    pub fn is_growable(&self) -> bool {
        self.store.is_growable()
    }

    /// `SharedArrayBuffer.prototype.grow`
    pub fn grow(&self, new_byte_length: usize) -> VmResult<()> {
        self.store.grow(new_byte_length)
    }

    /// `SharedArrayBuffer.prototype.slice` with species construction
    pub fn slice(
        self: &Arc<Self>,
        agent: &mut Agent,
        start: &Value,
        end: &Value,
    ) -> VmResult<Arc<JsSharedArrayBuffer>> {
        let len = self.byte_length();
        let first = convert::relative_index(convert::to_integer_or_infinity(agent, start)?, len);
        let last = if end.is_undefined() {
            len
        } else {
            convert::relative_index(convert::to_integer_or_infinity(agent, end)?, len)
        };
        let new_len = last.saturating_sub(first);

        let new_buffer = match species_constructor(agent, &self.object)? {
            Species::Default => Arc::new(JsSharedArrayBuffer::new(agent, new_len)?),
            Species::Custom(ctor) => {
                let created = ctor.construct(agent, &[Value::number(new_len as f64)])?;
                created
                    .as_shared_array_buffer()
                    .cloned()
                    .ok_or_else(|| {
                        VmError::type_error("species constructor did not return a SharedArrayBuffer")
                    })?
            }
        };
        if Arc::ptr_eq(new_buffer.store(), &self.store) {
            return Err(VmError::type_error(
                "species constructor returned the same SharedArrayBuffer",
            ));
        }
        if new_buffer.byte_length() < new_len {
            return Err(VmError::type_error(
                "species constructor returned a too-small SharedArrayBuffer",
            ));
        }

        let mut bytes = vec![0u8; new_len];
        if new_len > 0 {
            self.store.read_bytes(first, &mut bytes);
            new_buffer.store.write_bytes(0, &bytes);
        }
        Ok(new_buffer)
    }
}
