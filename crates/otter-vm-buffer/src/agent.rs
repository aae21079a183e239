//! Agent: one thread's view of the buffer subsystem
//!
//! An `Agent` owns its configuration, its memory manager, the Atomics
//! strategy chosen at startup, and the promises of its outstanding
//! `Atomics.waitAsync` calls. Agents are `Send`: one may be moved to another
//! thread, but only one thread drives it at a time (`&mut self`).
//!
//! # Usage
//!
//! ```ignore
//! let mut agent = Agent::new(BufferConfig::default());
//! let sab = JsSharedArrayBuffer::new(&agent, 1024)?;
//! // ... Atomics.waitAsync registers a promise on `agent` ...
//! agent.wait_for_jobs(Some(Duration::from_secs(1)));
//! ```

use crate::atomics::strategy::{AtomicsStrategy, strategy_for};
use crate::atomics::waiter::COMPLETIONS;
use crate::config::BufferConfig;
use crate::memory::MemoryManager;
use crate::promise::JsPromise;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

static NEXT_AGENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique agent identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(u64);

impl AgentId {
    pub(crate) fn next() -> Self {
        Self(NEXT_AGENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A per-thread execution context for buffers and Atomics
pub struct Agent {
    id: AgentId,
    config: BufferConfig,
    memory_manager: Arc<MemoryManager>,
    atomics: &'static dyn AtomicsStrategy,
    /// Promises of pending waitAsync calls, by completion token
    pending_waits: FxHashMap<u64, Arc<JsPromise>>,
    next_wait_token: u64,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("atomics", &self.atomics.name())
            .field("pending_waits", &self.pending_waits.len())
            .finish()
    }
}

impl Agent {
    /// Create a new agent with the given configuration
    pub fn new(config: BufferConfig) -> Self {
        let id = AgentId::next();
        let atomics = strategy_for(config.atomics_strategy);
        let memory_manager = Arc::new(MemoryManager::new(config.max_heap_size));
        COMPLETIONS.register(id);
        debug!(agent = id.0, strategy = atomics.name(), can_block = config.can_block, "agent created");
        Self {
            id,
            config,
            memory_manager,
            atomics,
            pending_waits: FxHashMap::default(),
            next_wait_token: 0,
        }
    }

    /// Agent identity
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Agent configuration
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Memory manager every buffer of this agent is charged to
    pub fn memory_manager(&self) -> &Arc<MemoryManager> {
        &self.memory_manager
    }

    /// Atomics strategy selected at startup
    pub fn atomics(&self) -> &'static dyn AtomicsStrategy {
        self.atomics
    }

    /// AgentCanSuspend
    pub fn can_block(&self) -> bool {
        self.config.can_block
    }

    pub(crate) fn next_wait_token(&mut self) -> u64 {
        self.next_wait_token += 1;
        self.next_wait_token
    }

    pub(crate) fn register_async_wait(&mut self, token: u64, promise: Arc<JsPromise>) {
        self.pending_waits.insert(token, promise);
    }

    /// Number of waitAsync promises not yet resolved
    pub fn pending_async_waits(&self) -> usize {
        self.pending_waits.len()
    }

    /// Resolve the promises of every finished async wait; returns how many
    /// were resolved. Promises are only ever resolved here, on the agent's
    /// own thread.
    pub fn run_jobs(&mut self) -> usize {
        let mut resolved = 0;
        for completion in COMPLETIONS.take_for(self.id) {
            if let Some(promise) = self.pending_waits.remove(&completion.token) {
                promise.resolve(Value::string(completion.result.as_str()));
                resolved += 1;
            }
        }
        if resolved > 0 {
            debug!(agent = self.id.0, resolved, "async waits resolved");
        }
        resolved
    }

    /// Block until at least one async wait finishes (or `timeout` passes),
    /// then resolve what is ready. Returns immediately when nothing is pending.
    pub fn wait_for_jobs(&mut self, timeout: Option<Duration>) -> usize {
        if !self.pending_waits.is_empty() {
            let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
            COMPLETIONS.wait_for(self.id, deadline);
        }
        self.run_jobs()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        COMPLETIONS.retire(self.id);
    }
}
