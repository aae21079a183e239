//! Promise returned by `Atomics.waitAsync`
//!
//! A waitAsync promise is never rejected: it settles exactly once with
//! `"ok"` or `"timed-out"`, on the thread of the agent that created it, from
//! [`Agent::run_jobs`](crate::agent::Agent::run_jobs). Only that settlement
//! and the reactions attached from Rust are modelled here.

use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Settlement state of a [`JsPromise`]
#[derive(Debug, Clone)]
pub enum PromiseState {
    /// Waiting for the agent to drain the completion
    Pending,
    /// Settled with the wait outcome
    Fulfilled(Value),
}

impl PromiseState {
    /// True once the promise has a value
    pub fn is_settled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_))
    }
}

type Reaction = Box<dyn FnOnce(Value) + Send>;

struct Inner {
    state: PromiseState,
    reactions: Vec<Reaction>,
}

/// Settle-once promise cell shared between the waiter table and script
pub struct JsPromise {
    inner: Mutex<Inner>,
}

impl fmt::Debug for JsPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.lock().state {
            PromiseState::Pending => f.write_str("Promise { <pending> }"),
            PromiseState::Fulfilled(v) => write!(f, "Promise {{ {:?} }}", v),
        }
    }
}

impl JsPromise {
    /// A fresh pending promise
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: PromiseState::Pending,
                reactions: Vec::new(),
            }),
        })
    }

    /// Fulfill with `value`; later calls are ignored.
    ///
    /// Reactions run after the lock is released so they may inspect the promise.
    pub fn resolve(&self, value: Value) {
        let reactions = {
            let mut inner = self.inner.lock();
            if inner.state.is_settled() {
                return;
            }
            inner.state = PromiseState::Fulfilled(value.clone());
            std::mem::take(&mut inner.reactions)
        };
        for reaction in reactions {
            reaction(value.clone());
        }
    }

    /// Run `reaction` with the settled value, now if already settled
    pub fn then<F>(&self, reaction: F)
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        match &inner.state {
            PromiseState::Fulfilled(value) => {
                let value = value.clone();
                drop(inner);
                reaction(value);
            }
            PromiseState::Pending => inner.reactions.push(Box::new(reaction)),
        }
    }

    /// Snapshot of the state
    pub fn state(&self) -> PromiseState {
        self.inner.lock().state.clone()
    }

    /// Not settled yet
    pub fn is_pending(&self) -> bool {
        !self.inner.lock().state.is_settled()
    }

    /// Settled
    pub fn is_fulfilled(&self) -> bool {
        self.inner.lock().state.is_settled()
    }

    /// The settled value, if any
    pub fn fulfilled_value(&self) -> Option<Value> {
        match &self.inner.lock().state {
            PromiseState::Fulfilled(v) => Some(v.clone()),
            PromiseState::Pending => None,
        }
    }
}
