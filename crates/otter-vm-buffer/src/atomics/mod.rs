//! Atomics
//!
//! Validation and argument coercion for the `Atomics` namespace, in the
//! order the language observes them. Memory access on shared stores goes
//! through the agent's [`AtomicsStrategy`]; waiting goes through the global
//! [`WaiterTable`](waiter::WaiterTable).

pub mod strategy;
pub mod waiter;

pub use strategy::{AtomicsStrategy, GlobalLockAtomics, NativeAtomics, strategy_for};
pub use waiter::{WaitResult, WaiterKey};

use crate::agent::Agent;
use crate::buffer::BufferRef;
use crate::convert;
use crate::element::{ElementType, NATIVE_LITTLE_ENDIAN, Numeric};
use crate::error::{VmError, VmResult};
use crate::promise::JsPromise;
use crate::typed_array::JsTypedArray;
use crate::value::{JsObject, Value};
use std::sync::Arc;
use waiter::{AsyncWait, WAITERS};

/// Read-modify-write operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmwOp {
    /// `Atomics.add`
    Add,
    /// `Atomics.and`
    And,
    /// `Atomics.or`
    Or,
    /// `Atomics.sub`
    Sub,
    /// `Atomics.xor`
    Xor,
    /// `Atomics.exchange`
    Exchange,
}

// ============================================================================
// Validation
// ============================================================================

/// ValidateIntegerTypedArray. With `waitable`, only Int32Array and
/// BigInt64Array pass; otherwise any integer lane except Uint8Clamped.
pub fn validate_integer_typed_array(value: &Value, waitable: bool) -> VmResult<Arc<JsTypedArray>> {
    let ta = value
        .as_typed_array()
        .ok_or_else(|| VmError::type_error("Atomics operation requires an integer TypedArray"))?;
    ta.validate()?;
    let kind = ta.kind();
    if waitable {
        if !kind.is_waitable() {
            return Err(VmError::type_error(format!(
                "{} is not an Int32Array or BigInt64Array",
                kind.name()
            )));
        }
    } else if !kind.is_atomic_integer() {
        return Err(VmError::type_error(format!(
            "{} is not an integer TypedArray usable with Atomics",
            kind.name()
        )));
    }
    Ok(ta.clone())
}

/// ValidateAtomicAccess: coerce the index and return its byte index in the buffer
fn validate_atomic_access(agent: &mut Agent, ta: &JsTypedArray, index: &Value) -> VmResult<usize> {
    let len = ta.length();
    let access = convert::to_index(agent, index)?;
    if access >= len {
        return Err(VmError::range_error("Invalid atomic access index"));
    }
    Ok(ta.view_byte_offset() + access * ta.kind().element_size())
}

/// RevalidateAtomicAccess after user code ran
fn revalidate_atomic_access(ta: &JsTypedArray, byte_index: usize) -> VmResult<()> {
    let len = ta.validate()?;
    if byte_index >= ta.view_byte_offset() + len * ta.kind().element_size() {
        return Err(VmError::range_error("Invalid atomic access index"));
    }
    Ok(())
}

fn require_shared(agent: &Agent, ta: &JsTypedArray) -> VmResult<()> {
    if !ta.buffer().is_shared() && !agent.config().allow_non_shared_atomics {
        return Err(VmError::type_error(
            "Atomics operation requires a SharedArrayBuffer",
        ));
    }
    Ok(())
}

/// Operand coercion: ToBigInt for BigInt lanes, ToIntegerOrInfinity otherwise
fn coerce_operand(agent: &mut Agent, kind: ElementType, value: &Value) -> VmResult<Numeric> {
    if kind.is_bigint() {
        Ok(Numeric::BigInt(convert::to_bigint(agent, value)?))
    } else {
        Ok(Numeric::Number(convert::to_integer_or_infinity(agent, value)?))
    }
}

// ============================================================================
// Non-shared buffers
// ============================================================================

fn local_load(buffer: &BufferRef, byte_index: usize, kind: ElementType) -> VmResult<u64> {
    Ok(kind.to_raw(&buffer.get_value(byte_index, kind, NATIVE_LITTLE_ENDIAN)?))
}

fn local_store(buffer: &BufferRef, byte_index: usize, kind: ElementType, raw: u64) -> VmResult<()> {
    buffer.set_value(byte_index, kind, &kind.from_raw(raw), NATIVE_LITTLE_ENDIAN)
}

// ============================================================================
// Operations
// ============================================================================

/// `Atomics.add/and/or/sub/xor/exchange(typedArray, index, value)`; returns
/// the previous element value
pub fn read_modify_write(
    agent: &mut Agent,
    op: RmwOp,
    target: &Value,
    index: &Value,
    value: &Value,
) -> VmResult<Value> {
    let ta = validate_integer_typed_array(target, false)?;
    require_shared(agent, &ta)?;
    let byte_index = validate_atomic_access(agent, &ta, index)?;
    let kind = ta.kind();
    let operand = coerce_operand(agent, kind, value)?;
    revalidate_atomic_access(&ta, byte_index)?;

    let old = match ta.buffer().shared_store() {
        Some(store) => agent
            .atomics()
            .read_modify_write(store, byte_index, kind, op, &operand)?,
        None => {
            let old = local_load(ta.buffer(), byte_index, kind)?;
            let new = strategy::apply_rmw(op, old, kind.to_raw(&operand), kind.element_size());
            local_store(ta.buffer(), byte_index, kind, new)?;
            old
        }
    };
    Ok(kind.from_raw(old).to_value())
}

/// `Atomics.load(typedArray, index)`
pub fn load(agent: &mut Agent, target: &Value, index: &Value) -> VmResult<Value> {
    let ta = validate_integer_typed_array(target, false)?;
    require_shared(agent, &ta)?;
    let byte_index = validate_atomic_access(agent, &ta, index)?;
    revalidate_atomic_access(&ta, byte_index)?;
    let kind = ta.kind();
    let raw = match ta.buffer().shared_store() {
        Some(store) => agent.atomics().load(store, byte_index, kind)?,
        None => local_load(ta.buffer(), byte_index, kind)?,
    };
    Ok(kind.from_raw(raw).to_value())
}

/// `Atomics.store(typedArray, index, value)`; returns the coerced value, not
/// the lane-truncated one
pub fn store(agent: &mut Agent, target: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    let ta = validate_integer_typed_array(target, false)?;
    require_shared(agent, &ta)?;
    let byte_index = validate_atomic_access(agent, &ta, index)?;
    let kind = ta.kind();
    let operand = coerce_operand(agent, kind, value)?;
    revalidate_atomic_access(&ta, byte_index)?;
    match ta.buffer().shared_store() {
        Some(store) => agent.atomics().store(store, byte_index, kind, &operand)?,
        None => ta
            .buffer()
            .set_value(byte_index, kind, &operand, NATIVE_LITTLE_ENDIAN)?,
    }
    Ok(operand.to_value())
}

/// `Atomics.compareExchange(typedArray, index, expected, replacement)`;
/// compares lane bits after coercing `expected` to the lane
pub fn compare_exchange(
    agent: &mut Agent,
    target: &Value,
    index: &Value,
    expected: &Value,
    replacement: &Value,
) -> VmResult<Value> {
    let ta = validate_integer_typed_array(target, false)?;
    require_shared(agent, &ta)?;
    let byte_index = validate_atomic_access(agent, &ta, index)?;
    let kind = ta.kind();
    let expected = coerce_operand(agent, kind, expected)?;
    let replacement = coerce_operand(agent, kind, replacement)?;
    revalidate_atomic_access(&ta, byte_index)?;

    let old = match ta.buffer().shared_store() {
        Some(store) => agent
            .atomics()
            .compare_exchange(store, byte_index, kind, &expected, &replacement)?,
        None => {
            let old = local_load(ta.buffer(), byte_index, kind)?;
            if old == kind.to_raw(&expected) {
                local_store(ta.buffer(), byte_index, kind, kind.to_raw(&replacement))?;
            }
            old
        }
    };
    Ok(kind.from_raw(old).to_value())
}

/// `Atomics.isLockFree(size)`
pub fn is_lock_free(agent: &mut Agent, size: &Value) -> VmResult<bool> {
    let n = convert::to_integer_or_infinity(agent, size)?;
    if [1.0, 2.0, 4.0, 8.0].contains(&n) {
        Ok(agent.atomics().is_lock_free(n as usize))
    } else {
        Ok(false)
    }
}

/// `Atomics.pause(iterations)`: a spin-wait hint
pub fn pause(iterations: &Value) -> VmResult<()> {
    let spins = match iterations {
        Value::Undefined => 1,
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => n.abs().min(1024.0) as u32 + 1,
        _ => {
            return Err(VmError::type_error(
                "Atomics.pause argument must be an integral Number or undefined",
            ));
        }
    };
    for _ in 0..spins {
        std::hint::spin_loop();
    }
    Ok(())
}

// ============================================================================
// Wait / notify
// ============================================================================

struct WaitRequest {
    ta: Arc<JsTypedArray>,
    key: WaiterKey,
    expected: u64,
    timeout: Option<std::time::Duration>,
}

/// Shared prefix of DoWait: validation and coercion in language order
fn prepare_wait(
    agent: &mut Agent,
    target: &Value,
    index: &Value,
    value: &Value,
    timeout: &Value,
) -> VmResult<WaitRequest> {
    let ta = validate_integer_typed_array(target, true)?;
    if !ta.buffer().is_shared() {
        return Err(VmError::type_error(
            "Atomics.wait requires a shared Int32Array or BigInt64Array",
        ));
    }
    let byte_index = validate_atomic_access(agent, &ta, index)?;
    let kind = ta.kind();
    let expected = if kind.is_bigint() {
        Numeric::BigInt(convert::to_bigint(agent, value)?)
    } else {
        Numeric::Number(convert::to_int32(convert::to_number(agent, value)?) as f64)
    };
    let q = convert::to_number(agent, timeout)?;
    let store_id = ta
        .buffer()
        .shared_store()
        .map(|store| store.id())
        .ok_or_else(|| VmError::internal("shared buffer without a shared store"))?;
    Ok(WaitRequest {
        key: WaiterKey {
            store_id,
            byte_index,
        },
        expected: kind.to_raw(&expected),
        timeout: waiter::timeout_from_millis(q),
        ta,
    })
}

/// `Atomics.wait(typedArray, index, value, timeout)`: blocks this thread
pub fn wait(
    agent: &mut Agent,
    target: &Value,
    index: &Value,
    value: &Value,
    timeout: &Value,
) -> VmResult<Value> {
    let request = prepare_wait(agent, target, index, value, timeout)?;
    if !agent.can_block() {
        return Err(VmError::type_error("Atomics.wait cannot be called in this context"));
    }
    let strategy = agent.atomics();
    let kind = request.ta.kind();
    let byte_index = request.key.byte_index;
    let result = {
        let ta = &request.ta;
        WAITERS.wait(request.key, agent.id(), request.timeout, || {
            let store = ta
                .buffer()
                .shared_store()
                .ok_or_else(|| VmError::internal("shared buffer without a shared store"))?;
            Ok(strategy.load(store, byte_index, kind)? == request.expected)
        })?
    };
    Ok(Value::string(result.as_str()))
}

/// `Atomics.waitAsync(typedArray, index, value, timeout)`: returns
/// `{ async, value }`, where `value` is a result string when `async` is false
/// and a promise for one otherwise
pub fn wait_async(
    agent: &mut Agent,
    target: &Value,
    index: &Value,
    value: &Value,
    timeout: &Value,
) -> VmResult<Value> {
    let request = prepare_wait(agent, target, index, value, timeout)?;
    let strategy = agent.atomics();
    let kind = request.ta.kind();
    let byte_index = request.key.byte_index;
    let token = agent.next_wait_token();
    let outcome = {
        let ta = &request.ta;
        WAITERS.wait_async(request.key, agent.id(), token, request.timeout, || {
            let store = ta
                .buffer()
                .shared_store()
                .ok_or_else(|| VmError::internal("shared buffer without a shared store"))?;
            Ok(strategy.load(store, byte_index, kind)? == request.expected)
        })?
    };
    let result = match outcome {
        AsyncWait::Immediate(result) => JsObject::new()
            .with_property("async", Value::boolean(false))
            .with_property("value", Value::string(result.as_str())),
        AsyncWait::Pending => {
            let promise = JsPromise::new();
            agent.register_async_wait(token, promise.clone());
            JsObject::new()
                .with_property("async", Value::boolean(true))
                .with_property("value", Value::promise(promise))
        }
    };
    Ok(Value::object(Arc::new(result)))
}

/// `Atomics.notify(typedArray, index, count)`; returns the number woken
pub fn notify(agent: &mut Agent, target: &Value, index: &Value, count: &Value) -> VmResult<Value> {
    let ta = validate_integer_typed_array(target, true)?;
    let byte_index = validate_atomic_access(agent, &ta, index)?;
    let count = if count.is_undefined() {
        usize::MAX
    } else {
        let c = convert::to_integer_or_infinity(agent, count)?.max(0.0);
        if c >= usize::MAX as f64 { usize::MAX } else { c as usize }
    };
    let Some(store) = ta.buffer().shared_store() else {
        return Ok(Value::number(0.0));
    };
    let woken = WAITERS.notify(
        WaiterKey {
            store_id: store.id(),
            byte_index,
        },
        count,
    );
    Ok(Value::number(woken as f64))
}
