//! Memory management and accounting for buffer allocations
//!
//! Every backing-store byte is booked against an agent's [`MemoryManager`]
//! through a [`Reservation`], which gives the bytes back when it is dropped.

use crate::error::{VmError, VmResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Allocations below this size never trigger a GC request (1MB)
const MIN_GC_PRESSURE_SIZE: usize = 1024 * 1024;

/// Byte budget shared by every backing store an agent allocates
#[derive(Debug)]
pub struct MemoryManager {
    /// Bytes booked by live reservations
    allocated: AtomicUsize,
    /// Budget ceiling
    limit: usize,
    /// Bytes reported live by the embedder's last collection
    last_live_size: AtomicUsize,
    /// Set when a large buffer allocation asks the embedder to collect
    gc_requested: AtomicBool,
}

impl MemoryManager {
    /// Budget of `limit` bytes
    pub fn new(limit: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            limit,
            last_live_size: AtomicUsize::new(0),
            gc_requested: AtomicBool::new(false),
        }
    }

    /// Effectively unbounded budget for tests
    pub fn test() -> Self {
        Self::new(usize::MAX / 2)
    }

    /// Try to book `size` bytes. Returns `Err(VmError::OutOfMemory)` if limit exceeded.
    pub fn alloc(&self, size: usize) -> VmResult<()> {
        self.allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(size).filter(|total| *total <= self.limit)
            })
            .map(|_| ())
            .map_err(|in_use| {
                VmError::out_of_memory(format!(
                    "cannot book {} bytes with {} of {} in use",
                    size, in_use, self.limit
                ))
            })
    }

    /// Give back `size` booked bytes
    pub fn free(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }

    /// Bytes currently booked
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Budget ceiling
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Live bytes from the last [`on_gc_complete`](Self::on_gc_complete)
    pub fn last_live_size(&self) -> usize {
        self.last_live_size.load(Ordering::Relaxed)
    }

    /// Whether a collection request is outstanding
    pub fn should_collect_garbage(&self) -> bool {
        self.gc_requested.load(Ordering::Relaxed)
    }

    /// Ask the embedder for a collection
    pub fn request_gc(&self) {
        self.gc_requested.store(true, Ordering::Relaxed);
    }

    /// Embedder hook: a collection finished with `live_bytes` still reachable
    pub fn on_gc_complete(&self, live_bytes: usize) {
        self.last_live_size.store(live_bytes, Ordering::Relaxed);
        self.gc_requested.store(false, Ordering::Relaxed);
    }

    /// Large-allocation heuristic: request a GC pass when `size` is a big
    /// fraction of what is currently allocated.
    ///
    /// Returns true if a GC was requested.
    pub fn note_allocation_pressure(&self, size: usize, ratio: f64) -> bool {
        if size < MIN_GC_PRESSURE_SIZE {
            return false;
        }
        let in_use = self.allocated();
        if in_use > 0 && (size as f64) > (in_use as f64) * ratio {
            tracing::debug!(size, in_use, "large buffer allocation, requesting GC");
            self.request_gc();
            return true;
        }
        false
    }
}

/// Bytes booked against a [`MemoryManager`], returned on drop
#[derive(Debug)]
pub struct Reservation {
    size: usize,
    manager: Arc<MemoryManager>,
}

impl Reservation {
    /// Book `size` bytes
    pub fn new(manager: Arc<MemoryManager>, size: usize) -> VmResult<Self> {
        manager.alloc(size)?;
        Ok(Self { size, manager })
    }

    /// Currently booked bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Change the booking to `new_size`, failing without change if the limit is hit
    pub fn resize(&mut self, new_size: usize) -> VmResult<()> {
        if new_size > self.size {
            self.manager.alloc(new_size - self.size)?;
        } else {
            self.manager.free(self.size - new_size);
        }
        self.size = new_size;
        Ok(())
    }

    /// The manager this reservation is booked against
    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.manager.free(self.size);
    }
}
