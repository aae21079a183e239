//! Backing stores for non-shared ArrayBuffers
//!
//! A [`BackingStore`] either owns its bytes (zero-initialized, charged to the
//! agent's [`MemoryManager`]) or wraps memory supplied by the embedder, in
//! which case a caller-provided deleter runs exactly once when the store is
//! dropped.

use crate::config::BufferConfig;
use crate::error::{VmError, VmResult};
use crate::memory::{MemoryManager, Reservation};
use std::ptr::NonNull;
use std::sync::Arc;

/// Releases externally supplied memory: `(ptr, byte_length)`
pub type ExternalDeleter = Box<dyn FnOnce(NonNull<u8>, usize) + Send>;

enum Storage {
    Owned(Vec<u8>),
    External {
        ptr: NonNull<u8>,
        len: usize,
        deleter: Option<ExternalDeleter>,
    },
}

/// Raw bytes behind a non-shared ArrayBuffer
pub struct BackingStore {
    storage: Storage,
    /// Present only for resizable stores
    max_byte_length: Option<usize>,
    /// Accounting for owned bytes; `None` for external memory
    reservation: Option<Reservation>,
}

// SAFETY: external memory is exclusively owned by the store until the deleter
// runs in `drop`, which requires `&mut self`. Shared references only expose
// `&[u8]`, and mutation goes through `&mut self`.
unsafe impl Send for BackingStore {}
unsafe impl Sync for BackingStore {}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("byte_length", &self.byte_length())
            .field("max_byte_length", &self.max_byte_length)
            .field("is_owner", &self.is_owner())
            .finish()
    }
}

fn check_size(config: &BufferConfig, byte_length: usize) -> VmResult<()> {
    if byte_length > config.max_array_buffer_size {
        return Err(VmError::range_error("Array buffer allocation failed"));
    }
    Ok(())
}

fn zeroed(byte_length: usize) -> VmResult<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(byte_length)
        .map_err(|_| VmError::range_error("Array buffer allocation failed"))?;
    data.resize(byte_length, 0);
    Ok(data)
}

impl BackingStore {
    /// Allocate a zero-initialized fixed-length store
    pub fn allocate(
        config: &BufferConfig,
        memory: &Arc<MemoryManager>,
        byte_length: usize,
    ) -> VmResult<Self> {
        Self::allocate_inner(config, memory, byte_length, None)
    }

    /// Allocate a resizable store; bytes beyond `byte_length` are allocated lazily
    pub fn allocate_resizable(
        config: &BufferConfig,
        memory: &Arc<MemoryManager>,
        byte_length: usize,
        max_byte_length: usize,
    ) -> VmResult<Self> {
        if byte_length > max_byte_length {
            return Err(VmError::range_error(
                "byteLength exceeds maxByteLength",
            ));
        }
        check_size(config, max_byte_length)?;
        Self::allocate_inner(config, memory, byte_length, Some(max_byte_length))
    }

    fn allocate_inner(
        config: &BufferConfig,
        memory: &Arc<MemoryManager>,
        byte_length: usize,
        max_byte_length: Option<usize>,
    ) -> VmResult<Self> {
        check_size(config, byte_length)?;
        memory.note_allocation_pressure(byte_length, config.gc_pressure_ratio);
        let reservation = Reservation::new(memory.clone(), byte_length)
            .map_err(|_| VmError::range_error("Array buffer allocation failed"))?;
        let data = zeroed(byte_length)?;
        Ok(Self {
            storage: Storage::Owned(data),
            max_byte_length,
            reservation: Some(reservation),
        })
    }

    /// Wrap memory owned by the embedder. The store is not the owner:
    /// `deleter` is invoked with `(ptr, byte_length)` when the store is dropped.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `byte_length` bytes until
    /// the deleter runs, and must not be accessed through any other path in
    /// the meantime.
    pub unsafe fn from_external(ptr: NonNull<u8>, byte_length: usize, deleter: ExternalDeleter) -> Self {
        Self {
            storage: Storage::External {
                ptr,
                len: byte_length,
                deleter: Some(deleter),
            },
            max_byte_length: None,
            reservation: None,
        }
    }

    /// Current byte length
    pub fn byte_length(&self) -> usize {
        match &self.storage {
            Storage::Owned(data) => data.len(),
            Storage::External { len, .. } => *len,
        }
    }

    /// Maximum byte length, for resizable stores
    pub fn max_byte_length(&self) -> Option<usize> {
        self.max_byte_length
    }

    /// Check if the store may be resized
    pub fn is_resizable(&self) -> bool {
        self.max_byte_length.is_some()
    }

    /// Non-shared stores are confined to one agent
    pub fn is_shared(&self) -> bool {
        false
    }

    /// Whether the store allocated (and will free) its memory
    pub fn is_owner(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// The bytes
    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => data,
            // SAFETY: guaranteed valid for `len` bytes by `from_external`'s contract.
            Storage::External { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    /// The bytes, mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Owned(data) => data,
            // SAFETY: guaranteed valid and unaliased by `from_external`'s contract.
            Storage::External { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }

    /// Resize in place (reallocating if needed). New bytes are zero;
    /// bytes past the new end are discarded.
    pub fn resize(&mut self, new_byte_length: usize) -> VmResult<()> {
        let Some(max) = self.max_byte_length else {
            return Err(VmError::type_error("ArrayBuffer is not resizable"));
        };
        if new_byte_length > max {
            return Err(VmError::range_error(
                "new length exceeds maxByteLength",
            ));
        }
        let Storage::Owned(data) = &mut self.storage else {
            return Err(VmError::type_error(
                "cannot resize externally owned memory",
            ));
        };
        let old_byte_length = data.len();
        if let Some(reservation) = self.reservation.as_mut() {
            reservation
                .resize(new_byte_length)
                .map_err(|_| VmError::range_error("Array buffer allocation failed"))?;
        }
        if new_byte_length > old_byte_length
            && data.try_reserve_exact(new_byte_length - old_byte_length).is_err()
        {
            if let Some(reservation) = self.reservation.as_mut() {
                // Shrinking a booking cannot fail
                let _ = reservation.resize(old_byte_length);
            }
            return Err(VmError::range_error("Array buffer allocation failed"));
        }
        data.resize(new_byte_length, 0);
        Ok(())
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        if let Storage::External { ptr, len, deleter } = &mut self.storage {
            if let Some(deleter) = deleter.take() {
                tracing::trace!(len = *len, "releasing external backing store");
                deleter(*ptr, *len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn env() -> (BufferConfig, Arc<MemoryManager>) {
        (BufferConfig::default(), Arc::new(MemoryManager::test()))
    }

    #[test]
    fn test_allocate_zeroed_and_accounted() {
        let (config, mm) = env();
        let store = BackingStore::allocate(&config, &mm, 64).unwrap();
        assert_eq!(store.byte_length(), 64);
        assert!(store.as_slice().iter().all(|b| *b == 0));
        assert!(store.is_owner());
        assert!(!store.is_shared());
        assert_eq!(mm.allocated(), 64);
        drop(store);
        assert_eq!(mm.allocated(), 0);
    }

    #[test]
    fn test_allocation_cap() {
        let (_, mm) = env();
        let config = BufferConfig::default().with_max_array_buffer_size(16);
        let err = BackingStore::allocate(&config, &mm, 17).unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        let err = BackingStore::allocate_resizable(&config, &mm, 8, 32).unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
    }

    #[test]
    fn test_resize_zero_fills() {
        let (config, mm) = env();
        let mut store = BackingStore::allocate_resizable(&config, &mm, 4, 16).unwrap();
        store.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        store.resize(2).unwrap();
        store.resize(6).unwrap();
        assert_eq!(store.as_slice(), &[1, 2, 0, 0, 0, 0]);
        assert_eq!(mm.allocated(), 6);
        assert!(matches!(store.resize(17), Err(VmError::RangeError(_))));
    }

    #[test]
    fn test_failed_grow_keeps_accounting() {
        let mm = Arc::new(MemoryManager::new(usize::MAX));
        let config = BufferConfig::default().with_max_array_buffer_size(usize::MAX);
        let mut store = BackingStore::allocate_resizable(&config, &mm, 4, usize::MAX).unwrap();
        assert_eq!(mm.allocated(), 4);
        // Past isize::MAX the byte vector cannot grow
        let err = store.resize(isize::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        assert_eq!(store.byte_length(), 4);
        assert_eq!(mm.allocated(), 4);
    }

    #[test]
    fn test_fixed_store_not_resizable() {
        let (config, mm) = env();
        let mut store = BackingStore::allocate(&config, &mm, 4).unwrap();
        assert!(matches!(store.resize(2), Err(VmError::TypeError(_))));
    }

    #[test]
    fn test_external_deleter_runs_once() {
        static DELETED: AtomicUsize = AtomicUsize::new(0);
        let boxed: Box<[u8]> = vec![9u8, 8, 7].into_boxed_slice();
        let len = boxed.len();
        let ptr = NonNull::new(Box::into_raw(boxed) as *mut u8).unwrap();
        let store = unsafe {
            BackingStore::from_external(
                ptr,
                len,
                Box::new(|ptr, len| {
                    DELETED.fetch_add(1, Ordering::SeqCst);
                    drop(unsafe {
                        Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len))
                    });
                }),
            )
        };
        assert!(!store.is_owner());
        assert_eq!(store.as_slice(), &[9, 8, 7]);
        drop(store);
        assert_eq!(DELETED.load(Ordering::SeqCst), 1);
    }
}
