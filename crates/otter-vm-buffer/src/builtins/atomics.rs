//! Atomics namespace
//!
//! Thin argument unpacking over [`crate::atomics`]; validation and coercion
//! order live there.

use super::{Op, arg, op_native};
use crate::agent::Agent;
use crate::atomics::{self, RmwOp};
use crate::error::VmResult;
use crate::value::Value;

/// Get Atomics ops for extension registration
pub fn ops() -> Vec<Op> {
    vec![
        op_native("__Atomics_add", |agent: &mut Agent, args: &[Value]| {
            rmw(agent, RmwOp::Add, args)
        }),
        op_native("__Atomics_and", |agent: &mut Agent, args: &[Value]| {
            rmw(agent, RmwOp::And, args)
        }),
        op_native("__Atomics_or", |agent: &mut Agent, args: &[Value]| {
            rmw(agent, RmwOp::Or, args)
        }),
        op_native("__Atomics_sub", |agent: &mut Agent, args: &[Value]| {
            rmw(agent, RmwOp::Sub, args)
        }),
        op_native("__Atomics_xor", |agent: &mut Agent, args: &[Value]| {
            rmw(agent, RmwOp::Xor, args)
        }),
        op_native("__Atomics_exchange", |agent: &mut Agent, args: &[Value]| {
            rmw(agent, RmwOp::Exchange, args)
        }),
        op_native("__Atomics_compareExchange", native_atomics_compare_exchange),
        op_native("__Atomics_load", native_atomics_load),
        op_native("__Atomics_store", native_atomics_store),
        op_native("__Atomics_isLockFree", native_atomics_is_lock_free),
        op_native("__Atomics_pause", native_atomics_pause),
        op_native("__Atomics_wait", native_atomics_wait),
        op_native("__Atomics_waitAsync", native_atomics_wait_async),
        op_native("__Atomics_notify", native_atomics_notify),
    ]
}

/// Args: [typedArray, index, value]
fn rmw(agent: &mut Agent, op: RmwOp, args: &[Value]) -> VmResult<Value> {
    atomics::read_modify_write(agent, op, &arg(args, 0), &arg(args, 1), &arg(args, 2))
}

/// Args: [typedArray, index, expectedValue, replacementValue]
fn native_atomics_compare_exchange(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::compare_exchange(
        agent,
        &arg(args, 0),
        &arg(args, 1),
        &arg(args, 2),
        &arg(args, 3),
    )
}

/// Args: [typedArray, index]
fn native_atomics_load(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::load(agent, &arg(args, 0), &arg(args, 1))
}

/// Args: [typedArray, index, value]
fn native_atomics_store(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::store(agent, &arg(args, 0), &arg(args, 1), &arg(args, 2))
}

/// Args: [size]
fn native_atomics_is_lock_free(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::boolean(atomics::is_lock_free(agent, &arg(args, 0))?))
}

/// Args: [iterations?]
fn native_atomics_pause(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::pause(&arg(args, 0))?;
    Ok(Value::Undefined)
}

/// Args: [typedArray, index, value, timeout?]
fn native_atomics_wait(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::wait(agent, &arg(args, 0), &arg(args, 1), &arg(args, 2), &arg(args, 3))
}

/// Args: [typedArray, index, value, timeout?]
fn native_atomics_wait_async(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::wait_async(agent, &arg(args, 0), &arg(args, 1), &arg(args, 2), &arg(args, 3))
}

/// Args: [typedArray, index, count?]
fn native_atomics_notify(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    atomics::notify(agent, &arg(args, 0), &arg(args, 1), &arg(args, 2))
}
