//! Agent configuration
//!
//! Limits and policies that apply to every buffer an agent allocates and to
//! the Atomics operations it performs.

/// Upper bound on a single ArrayBuffer / SharedArrayBuffer allocation
pub const DEFAULT_MAX_ARRAY_BUFFER_SIZE: usize = 210_000_000;

/// Default heap limit for one agent (512 MB)
pub const DEFAULT_MAX_HEAP_SIZE: usize = 512 * 1024 * 1024;

/// How Atomics read-modify-write operations reach shared memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtomicsStrategyKind {
    /// Native atomics when every lane width is lock-free, otherwise the global lock
    #[default]
    Auto,
    /// Hardware atomic instructions
    Native,
    /// One process-wide mutex serializing every Atomics memory operation
    GlobalLock,
}

/// Configuration for creating a new [`Agent`](crate::agent::Agent).
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Maximum byte length of a single buffer (RangeError beyond it)
    pub max_array_buffer_size: usize,
    /// Maximum bytes the agent's memory manager may hand out
    pub max_heap_size: usize,
    /// Request a GC pass when one allocation exceeds this fraction of the bytes in use
    pub gc_pressure_ratio: f64,
    /// Atomics implementation to select at agent startup
    pub atomics_strategy: AtomicsStrategyKind,
    /// Whether `Atomics.wait` may block this agent's thread
    pub can_block: bool,
    /// Allow read-modify-write Atomics on non-shared buffers
    pub allow_non_shared_atomics: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_array_buffer_size: DEFAULT_MAX_ARRAY_BUFFER_SIZE,
            max_heap_size: DEFAULT_MAX_HEAP_SIZE,
            gc_pressure_ratio: 0.5,
            atomics_strategy: AtomicsStrategyKind::Auto,
            can_block: true,
            allow_non_shared_atomics: false,
        }
    }
}

impl BufferConfig {
    /// Set the per-buffer allocation cap
    pub fn with_max_array_buffer_size(mut self, size: usize) -> Self {
        self.max_array_buffer_size = size;
        self
    }

    /// Set the heap limit
    pub fn with_max_heap_size(mut self, size: usize) -> Self {
        self.max_heap_size = size;
        self
    }

    /// Set the GC pressure ratio
    pub fn with_gc_pressure_ratio(mut self, ratio: f64) -> Self {
        self.gc_pressure_ratio = ratio;
        self
    }

    /// Select the Atomics implementation
    pub fn with_atomics_strategy(mut self, strategy: AtomicsStrategyKind) -> Self {
        self.atomics_strategy = strategy;
        self
    }

    /// Allow or forbid blocking waits (main/UI agents usually forbid them)
    pub fn with_can_block(mut self, can_block: bool) -> Self {
        self.can_block = can_block;
        self
    }

    /// Permit Atomics read-modify-write on non-shared buffers
    pub fn with_non_shared_atomics(mut self, allow: bool) -> Self {
        self.allow_non_shared_atomics = allow;
        self
    }
}
