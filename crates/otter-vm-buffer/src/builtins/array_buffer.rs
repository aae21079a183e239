//! ArrayBuffer built-in
//!
//! Provides ArrayBuffer constructor and methods:
//! - `new ArrayBuffer(byteLength, options?)`
//! - `.byteLength`, `.maxByteLength`, `.resizable`, `.detached` (getters)
//! - `.slice(begin, end)`
//! - `.transfer()`, `.transferToFixedLength(newLength)`, `.resize(newLength)`
//! - `ArrayBuffer.isView(arg)` (static)

use super::{Op, arg, op_native};
use crate::agent::Agent;
use crate::array_buffer::JsArrayBuffer;
use crate::convert;
use crate::error::{VmError, VmResult};
use crate::value::{HeapRef, Value};
use std::sync::Arc;

/// Get ArrayBuffer ops for extension registration
pub fn ops() -> Vec<Op> {
    vec![
        // Constructor
        op_native("__ArrayBuffer_create", native_array_buffer_create),
        // Prototype getters
        op_native("__ArrayBuffer_byteLength", native_array_buffer_byte_length),
        op_native(
            "__ArrayBuffer_maxByteLength",
            native_array_buffer_max_byte_length,
        ),
        op_native("__ArrayBuffer_resizable", native_array_buffer_resizable),
        op_native("__ArrayBuffer_detached", native_array_buffer_detached),
        // Prototype methods
        op_native("__ArrayBuffer_slice", native_array_buffer_slice),
        op_native("__ArrayBuffer_transfer", native_array_buffer_transfer),
        op_native(
            "__ArrayBuffer_transferToFixedLength",
            native_array_buffer_transfer_to_fixed_length,
        ),
        op_native("__ArrayBuffer_resize", native_array_buffer_resize),
        // Static methods
        op_native("__ArrayBuffer_isView", native_array_buffer_is_view),
    ]
}

fn this_array_buffer(args: &[Value]) -> VmResult<Arc<JsArrayBuffer>> {
    args.first()
        .and_then(|v| v.as_array_buffer())
        .cloned()
        .ok_or_else(|| VmError::type_error("not an ArrayBuffer"))
}

/// GetArrayBufferMaxByteLengthOption
pub(crate) fn max_byte_length_option(agent: &mut Agent, options: &Value) -> VmResult<Option<usize>> {
    let Some(obj) = options.as_object() else {
        return Ok(None);
    };
    let max = obj.get(agent, "maxByteLength")?;
    if max.is_undefined() {
        return Ok(None);
    }
    Ok(Some(convert::to_index(agent, &max)?))
}

// ============================================================================
// Constructor
// ============================================================================

/// Create a new ArrayBuffer
/// Args: [byteLength, options?]
fn native_array_buffer_create(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let byte_length = convert::to_index(agent, &arg(args, 0))?;
    let ab = match max_byte_length_option(agent, &arg(args, 1))? {
        Some(max) => JsArrayBuffer::new_resizable(agent, byte_length, max)?,
        None => JsArrayBuffer::new(agent, byte_length)?,
    };
    Ok(Value::array_buffer(Arc::new(ab)))
}

// ============================================================================
// Prototype Getters
// ============================================================================

/// Get the byteLength of an ArrayBuffer (0 when detached)
/// Args: [arrayBuffer]
fn native_array_buffer_byte_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    Ok(Value::number(ab.byte_length() as f64))
}

/// Get the maxByteLength (byteLength when not resizable, 0 when detached)
/// Args: [arrayBuffer]
fn native_array_buffer_max_byte_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    if ab.is_detached() {
        return Ok(Value::number(0.0));
    }
    let max = ab.max_byte_length().unwrap_or_else(|| ab.byte_length());
    Ok(Value::number(max as f64))
}

/// Check if the ArrayBuffer is resizable
/// Args: [arrayBuffer]
fn native_array_buffer_resizable(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    Ok(Value::boolean(ab.is_resizable()))
}

/// Check if the ArrayBuffer is detached
/// Args: [arrayBuffer]
fn native_array_buffer_detached(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    Ok(Value::boolean(ab.is_detached()))
}

// ============================================================================
// Prototype Methods
// ============================================================================

/// Slice the ArrayBuffer
/// Args: [arrayBuffer, begin, end?]
fn native_array_buffer_slice(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    let sliced = ab.slice(agent, &arg(args, 1), &arg(args, 2))?;
    Ok(Value::array_buffer(sliced))
}

fn transfer_length(agent: &mut Agent, args: &[Value]) -> VmResult<Option<usize>> {
    let new_length = arg(args, 1);
    if new_length.is_undefined() {
        Ok(None)
    } else {
        Ok(Some(convert::to_index(agent, &new_length)?))
    }
}

/// Transfer the ArrayBuffer, keeping resizability
/// Args: [arrayBuffer, newLength?]
fn native_array_buffer_transfer(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    let new_length = transfer_length(agent, args)?;
    let transferred = ab.transfer(agent, new_length)?;
    Ok(Value::array_buffer(Arc::new(transferred)))
}

/// Transfer to a fixed-length ArrayBuffer
/// Args: [arrayBuffer, newLength?]
fn native_array_buffer_transfer_to_fixed_length(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    let new_length = transfer_length(agent, args)?;
    let transferred = ab.transfer_to_fixed_length(agent, new_length)?;
    Ok(Value::array_buffer(Arc::new(transferred)))
}

/// Resize a resizable ArrayBuffer
/// Args: [arrayBuffer, newLength]
fn native_array_buffer_resize(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ab = this_array_buffer(args)?;
    if !ab.is_resizable() {
        return Err(VmError::type_error("ArrayBuffer is not resizable"));
    }
    let new_length = convert::to_index(agent, &arg(args, 1))?;
    ab.resize(new_length)?;
    Ok(Value::Undefined)
}

// ============================================================================
// Static Methods
// ============================================================================

/// ArrayBuffer.isView
/// Args: [value]
fn native_array_buffer_is_view(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let is_view = matches!(
        args.first(),
        Some(Value::Object(HeapRef::TypedArray(_))) | Some(Value::Object(HeapRef::DataView(_)))
    );
    Ok(Value::boolean(is_view))
}
