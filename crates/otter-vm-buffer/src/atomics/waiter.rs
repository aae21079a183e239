//! Waiter lists for `Atomics.wait` / `Atomics.waitAsync` / `Atomics.notify`
//!
//! A process-wide table maps each watched location, identified by
//! `(shared store id, byte index)`, to its own waiter list. Locking is two
//! level: the table's shard lock finds or creates a list, the list's mutex
//! guards its waiters. The table lock is never taken while a list lock is
//! held.
//!
//! Async waits are served by a helper thread per wait; completions go to a
//! per-agent queue that only the owning agent drains.

use crate::agent::AgentId;
use crate::error::VmResult;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Identity of a watched location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterKey {
    /// Id of the shared backing store
    pub store_id: u64,
    /// Byte index of the lane inside the store
    pub byte_index: usize,
}

/// Outcome of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken by notify
    Ok,
    /// The lane did not hold the expected value
    NotEqual,
    /// The timeout elapsed first
    TimedOut,
}

impl WaitResult {
    /// The string JavaScript observes
    pub fn as_str(self) -> &'static str {
        match self {
            WaitResult::Ok => "ok",
            WaitResult::NotEqual => "not-equal",
            WaitResult::TimedOut => "timed-out",
        }
    }
}

/// Outcome of registering an async wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncWait {
    /// Settled without waiting
    Immediate(WaitResult),
    /// A completion will be posted for the token
    Pending,
}

/// A resolved async wait, delivered to its agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Token the agent registered the promise under
    pub token: u64,
    /// How the wait ended
    pub result: WaitResult,
}

struct WaiterRecord {
    agent: AgentId,
    token: Option<u64>,
    notified: AtomicBool,
}

#[derive(Default)]
struct WaiterList {
    waiters: Mutex<VecDeque<Arc<WaiterRecord>>>,
    condvar: Condvar,
}

impl WaiterList {
    /// Block on the list until `record` is notified or `deadline` passes
    fn block(
        &self,
        waiters: &mut MutexGuard<'_, VecDeque<Arc<WaiterRecord>>>,
        record: &Arc<WaiterRecord>,
        deadline: Option<Instant>,
    ) -> WaitResult {
        loop {
            if record.notified.load(Ordering::SeqCst) {
                return WaitResult::Ok;
            }
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(waiters, deadline).timed_out() {
                        if record.notified.load(Ordering::SeqCst) {
                            return WaitResult::Ok;
                        }
                        waiters.retain(|w| !Arc::ptr_eq(w, record));
                        return WaitResult::TimedOut;
                    }
                }
                None => self.condvar.wait(waiters),
            }
        }
    }
}

/// Process-wide table of waiter lists
pub struct WaiterTable {
    lists: DashMap<WaiterKey, Arc<WaiterList>, FxBuildHasher>,
}

/// The global waiter table
pub static WAITERS: LazyLock<WaiterTable> = LazyLock::new(|| WaiterTable {
    lists: DashMap::with_hasher(FxBuildHasher),
});

impl WaiterTable {
    fn list(&self, key: WaiterKey) -> Arc<WaiterList> {
        self.lists
            .entry(key)
            .or_insert_with(|| Arc::new(WaiterList::default()))
            .clone()
    }

    /// Drop our handle and remove the list if nobody else uses it
    fn release(&self, key: WaiterKey, list: Arc<WaiterList>) {
        drop(list);
        self.lists.remove_if(&key, |_, list| {
            Arc::strong_count(list) == 1 && list.waiters.lock().is_empty()
        });
    }

    /// Number of waiters currently queued on `key`
    pub fn waiter_count(&self, key: WaiterKey) -> usize {
        self.lists
            .get(&key)
            .map_or(0, |list| list.waiters.lock().len())
    }

    /// Synchronous wait. `still_equal` runs inside the list's critical
    /// section, so a notify cannot slip in between the compare and the
    /// enqueue.
    pub fn wait(
        &self,
        key: WaiterKey,
        agent: AgentId,
        timeout: Option<Duration>,
        still_equal: impl FnOnce() -> VmResult<bool>,
    ) -> VmResult<WaitResult> {
        let list = self.list(key);
        let result = Self::wait_on(&list, key, agent, timeout, still_equal);
        self.release(key, list);
        result
    }

    fn wait_on(
        list: &WaiterList,
        key: WaiterKey,
        agent: AgentId,
        timeout: Option<Duration>,
        still_equal: impl FnOnce() -> VmResult<bool>,
    ) -> VmResult<WaitResult> {
        let mut waiters = list.waiters.lock();
        if !still_equal()? {
            return Ok(WaitResult::NotEqual);
        }
        let record = Arc::new(WaiterRecord {
            agent,
            token: None,
            notified: AtomicBool::new(false),
        });
        waiters.push_back(record.clone());
        trace!(store = key.store_id, byte_index = key.byte_index, ?agent, "waiter enqueued");

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let result = list.block(&mut waiters, &record, deadline);
        trace!(store = key.store_id, byte_index = key.byte_index, result = result.as_str(), "waiter resumed");
        Ok(result)
    }

    /// Async wait: compare and enqueue like [`wait`](Self::wait), then hand
    /// the blocking half to a helper thread that posts a [`Completion`] for
    /// `token` to `agent`.
    pub fn wait_async(
        &self,
        key: WaiterKey,
        agent: AgentId,
        token: u64,
        timeout: Option<Duration>,
        still_equal: impl FnOnce() -> VmResult<bool>,
    ) -> VmResult<AsyncWait> {
        let list = self.list(key);
        let record = {
            let mut waiters = list.waiters.lock();
            let equal = match still_equal() {
                Ok(equal) => equal,
                Err(err) => {
                    drop(waiters);
                    self.release(key, list);
                    return Err(err);
                }
            };
            if !equal {
                None
            } else if timeout == Some(Duration::ZERO) {
                Some(None)
            } else {
                let record = Arc::new(WaiterRecord {
                    agent,
                    token: Some(token),
                    notified: AtomicBool::new(false),
                });
                waiters.push_back(record.clone());
                Some(Some(record))
            }
        };
        let record = match record {
            None => {
                self.release(key, list);
                return Ok(AsyncWait::Immediate(WaitResult::NotEqual));
            }
            Some(None) => {
                self.release(key, list);
                return Ok(AsyncWait::Immediate(WaitResult::TimedOut));
            }
            Some(Some(record)) => record,
        };

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let helper_list = list.clone();
        let helper_record = record.clone();
        let spawned = std::thread::Builder::new()
            .name("otter-wait-async".into())
            .spawn(move || {
                let result = {
                    let mut waiters = helper_list.waiters.lock();
                    helper_list.block(&mut waiters, &helper_record, deadline)
                };
                trace!(store = key.store_id, byte_index = key.byte_index, token, result = result.as_str(), "async waiter resumed");
                COMPLETIONS.post(agent, Completion { token, result });
                WAITERS.release(key, helper_list);
            });

        if let Err(err) = spawned {
            warn!(%err, store = key.store_id, byte_index = key.byte_index, "failed to spawn waitAsync helper");
            let result = {
                let mut waiters = list.waiters.lock();
                if record.notified.load(Ordering::SeqCst) {
                    WaitResult::Ok
                } else {
                    waiters.retain(|w| !Arc::ptr_eq(w, &record));
                    WaitResult::TimedOut
                }
            };
            COMPLETIONS.post(agent, Completion { token, result });
        } else {
            trace!(store = key.store_id, byte_index = key.byte_index, token, "async waiter enqueued");
        }
        self.release(key, list);
        Ok(AsyncWait::Pending)
    }

    /// Wake up to `count` waiters on `key`, oldest first; returns how many woke
    pub fn notify(&self, key: WaiterKey, count: usize) -> usize {
        let Some(list) = self.lists.get(&key).map(|entry| entry.value().clone()) else {
            return 0;
        };
        let woken = {
            let mut waiters = list.waiters.lock();
            let mut woken = 0;
            while woken < count {
                let Some(record) = waiters.pop_front() else {
                    break;
                };
                record.notified.store(true, Ordering::SeqCst);
                trace!(
                    store = key.store_id,
                    byte_index = key.byte_index,
                    agent = ?record.agent,
                    is_async = record.token.is_some(),
                    "waiter notified"
                );
                woken += 1;
            }
            woken
        };
        if woken > 0 {
            list.condvar.notify_all();
        }
        self.release(key, list);
        woken
    }
}

// ============================================================================
// Completion queue
// ============================================================================

/// Per-agent queues of finished async waits
pub struct CompletionQueue {
    queues: Mutex<FxHashMap<AgentId, Vec<Completion>>>,
    ready: Condvar,
}

/// The global completion queue
pub static COMPLETIONS: LazyLock<CompletionQueue> = LazyLock::new(|| CompletionQueue {
    queues: Mutex::new(FxHashMap::default()),
    ready: Condvar::new(),
});

impl CompletionQueue {
    /// Start accepting completions for `agent`
    pub fn register(&self, agent: AgentId) {
        self.queues.lock().entry(agent).or_default();
    }

    /// Stop accepting completions for `agent` and drop any queued ones
    pub fn retire(&self, agent: AgentId) {
        self.queues.lock().remove(&agent);
    }

    /// Queue a completion; dropped if the agent is gone
    pub fn post(&self, agent: AgentId, completion: Completion) {
        let mut queues = self.queues.lock();
        match queues.get_mut(&agent) {
            Some(queue) => {
                queue.push(completion);
                drop(queues);
                self.ready.notify_all();
            }
            None => trace!(?agent, token = completion.token, "completion for retired agent dropped"),
        }
    }

    /// Take every queued completion for `agent`
    pub fn take_for(&self, agent: AgentId) -> Vec<Completion> {
        self.queues
            .lock()
            .get_mut(&agent)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Block until `agent` has a completion queued or `deadline` passes
    pub fn wait_for(&self, agent: AgentId, deadline: Option<Instant>) -> bool {
        let mut queues = self.queues.lock();
        loop {
            if queues.get(&agent).is_some_and(|q| !q.is_empty()) {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut queues, deadline).timed_out() {
                        return queues.get(&agent).is_some_and(|q| !q.is_empty());
                    }
                }
                None => self.ready.wait(&mut queues),
            }
        }
    }
}

/// Convert a wait timeout in milliseconds; `None` waits forever
pub fn timeout_from_millis(ms: f64) -> Option<Duration> {
    if ms.is_nan() {
        return None;
    }
    if ms <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}
