//! Native operations exposed to the JavaScript layer
//!
//! Each area contributes `ops()`: named native functions taking the receiver
//! (if any) as the first argument. They coerce arguments in the order the
//! language observes, then call into the typed Rust API.

pub mod array_buffer;
pub mod atomics;
pub mod data_view;
pub mod shared_array_buffer;
pub mod typed_array;

use crate::agent::Agent;
use crate::error::{VmError, VmResult};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Native operation: `(agent, args) -> result`
pub type NativeOpFn = Arc<dyn Fn(&mut Agent, &[Value]) -> VmResult<Value> + Send + Sync>;

/// A named native operation
#[derive(Clone)]
pub struct Op {
    /// Operation name (used to register as global function)
    pub name: String,
    /// Handler function
    pub handler: NativeOpFn,
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Op").field("name", &self.name).finish()
    }
}

/// Create a native operation
pub fn op_native<F>(name: impl Into<String>, handler: F) -> Op
where
    F: Fn(&mut Agent, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
{
    Op {
        name: name.into(),
        handler: Arc::new(handler),
    }
}

/// Every operation of the buffer subsystem
pub fn all_ops() -> Vec<Op> {
    let mut ops = array_buffer::ops();
    ops.extend(shared_array_buffer::ops());
    ops.extend(typed_array::ops());
    ops.extend(data_view::ops());
    ops.extend(atomics::ops());
    ops
}

/// Operation lookup by name
pub struct OpRegistry {
    ops: FxHashMap<String, NativeOpFn>,
}

impl OpRegistry {
    /// Registry holding [`all_ops`]
    pub fn new() -> Self {
        let ops = all_ops()
            .into_iter()
            .map(|op| (op.name, op.handler))
            .collect();
        Self { ops }
    }

    /// Look up an operation
    pub fn get(&self, name: &str) -> Option<&NativeOpFn> {
        self.ops.get(name)
    }

    /// Check whether an operation is registered
    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Call an operation by name
    pub fn call(&self, agent: &mut Agent, name: &str, args: &[Value]) -> VmResult<Value> {
        let handler = self
            .ops
            .get(name)
            .ok_or_else(|| VmError::type_error(format!("{} is not a function", name)))?;
        handler(agent, args)
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Argument `i`, or undefined
#[inline]
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names_unique() {
        let ops = all_ops();
        let registry = OpRegistry::new();
        assert_eq!(registry.len(), ops.len());
        assert!(registry.contains("__ArrayBuffer_slice"));
        assert!(registry.contains("__Atomics_waitAsync"));
        assert!(registry.contains("__DataView_getFloat16"));
    }

    #[test]
    fn test_unknown_op() {
        let mut agent = Agent::default();
        let err = OpRegistry::new().call(&mut agent, "__Nope", &[]).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }
}
