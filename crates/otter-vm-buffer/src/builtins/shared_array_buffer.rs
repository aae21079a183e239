//! SharedArrayBuffer built-in
//!
//! - `new SharedArrayBuffer(byteLength, options?)`
//! - `.byteLength`, `.maxByteLength`, `.growable` (getters)
//! - `.grow(newLength)`, `.slice(begin, end)`

use super::array_buffer::max_byte_length_option;
use super::{Op, arg, op_native};
use crate::agent::Agent;
use crate::convert;
use crate::error::{VmError, VmResult};
use crate::shared_buffer::JsSharedArrayBuffer;
use crate::value::Value;
use std::sync::Arc;

/// Get SharedArrayBuffer ops for extension registration
pub fn ops() -> Vec<Op> {
    vec![
        op_native("__SharedArrayBuffer_create", native_sab_create),
        op_native("__SharedArrayBuffer_byteLength", native_sab_byte_length),
        op_native("__SharedArrayBuffer_maxByteLength", native_sab_max_byte_length),
        op_native("__SharedArrayBuffer_growable", native_sab_growable),
        op_native("__SharedArrayBuffer_grow", native_sab_grow),
        op_native("__SharedArrayBuffer_slice", native_sab_slice),
    ]
}

fn this_sab(args: &[Value]) -> VmResult<Arc<JsSharedArrayBuffer>> {
    args.first()
        .and_then(|v| v.as_shared_array_buffer())
        .cloned()
        .ok_or_else(|| VmError::type_error("not a SharedArrayBuffer"))
}

/// Args: [byteLength, options?]
fn native_sab_create(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let byte_length = convert::to_index(agent, &arg(args, 0))?;
    let sab = match max_byte_length_option(agent, &arg(args, 1))? {
        Some(max) => JsSharedArrayBuffer::new_growable(agent, byte_length, max)?,
        None => JsSharedArrayBuffer::new(agent, byte_length)?,
    };
    Ok(Value::shared_array_buffer(Arc::new(sab)))
}

/// Args: [sab]
fn native_sab_byte_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_sab(args)?.byte_length() as f64))
}

/// Args: [sab]
fn native_sab_max_byte_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_sab(args)?.max_byte_length() as f64))
}

/// Args: [sab]
fn native_sab_growable(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::boolean(this_sab(args)?.is_growable()))
}

/// Args: [sab, newLength]
fn native_sab_grow(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let sab = this_sab(args)?;
    if !sab.is_growable() {
        return Err(VmError::type_error("SharedArrayBuffer is not growable"));
    }
    let new_length = convert::to_index(agent, &arg(args, 1))?;
    sab.grow(new_length)?;
    Ok(Value::Undefined)
}

/// Args: [sab, begin, end?]
fn native_sab_slice(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let sab = this_sab(args)?;
    let sliced = sab.slice(agent, &arg(args, 1), &arg(args, 2))?;
    Ok(Value::shared_array_buffer(sliced))
}
