//! DataView built-in
//!
//! - `new DataView(buffer, byteOffset?, byteLength?)`
//! - `.buffer`, `.byteLength`, `.byteOffset` (getters)
//! - `get<Type>(byteOffset, littleEndian?)` / `set<Type>(byteOffset, value, littleEndian?)`

use super::{Op, arg, op_native};
use crate::agent::Agent;
use crate::data_view::JsDataView;
use crate::element::ElementType;
use crate::error::{VmError, VmResult};
use crate::value::Value;
use std::sync::Arc;

macro_rules! view_ops {
    ($($get:ident, $set:ident, $get_name:literal, $set_name:literal, $kind:ident;)*) => {
        $(
            /// Args: [dataView, byteOffset, littleEndian?]
            fn $get(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
                let dv = this_data_view(args)?;
                dv.get_view_value(agent, &arg(args, 1), &arg(args, 2), ElementType::$kind)
            }

            /// Args: [dataView, byteOffset, value, littleEndian?]
            fn $set(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
                let dv = this_data_view(args)?;
                dv.set_view_value(agent, &arg(args, 1), &arg(args, 3), ElementType::$kind, &arg(args, 2))?;
                Ok(Value::Undefined)
            }
        )*

        fn accessor_ops() -> Vec<Op> {
            vec![
                $(
                    op_native($get_name, $get),
                    op_native($set_name, $set),
                )*
            ]
        }
    };
}

view_ops! {
    native_get_int8, native_set_int8, "__DataView_getInt8", "__DataView_setInt8", Int8;
    native_get_uint8, native_set_uint8, "__DataView_getUint8", "__DataView_setUint8", Uint8;
    native_get_int16, native_set_int16, "__DataView_getInt16", "__DataView_setInt16", Int16;
    native_get_uint16, native_set_uint16, "__DataView_getUint16", "__DataView_setUint16", Uint16;
    native_get_int32, native_set_int32, "__DataView_getInt32", "__DataView_setInt32", Int32;
    native_get_uint32, native_set_uint32, "__DataView_getUint32", "__DataView_setUint32", Uint32;
    native_get_float16, native_set_float16, "__DataView_getFloat16", "__DataView_setFloat16", Float16;
    native_get_float32, native_set_float32, "__DataView_getFloat32", "__DataView_setFloat32", Float32;
    native_get_float64, native_set_float64, "__DataView_getFloat64", "__DataView_setFloat64", Float64;
    native_get_big_int64, native_set_big_int64, "__DataView_getBigInt64", "__DataView_setBigInt64", BigInt64;
    native_get_big_uint64, native_set_big_uint64, "__DataView_getBigUint64", "__DataView_setBigUint64", BigUint64;
}

/// Get DataView ops for extension registration
pub fn ops() -> Vec<Op> {
    let mut ops = vec![
        op_native("__DataView_create", native_data_view_create),
        op_native("__DataView_buffer", native_data_view_buffer),
        op_native("__DataView_byteLength", native_data_view_byte_length),
        op_native("__DataView_byteOffset", native_data_view_byte_offset),
    ];
    ops.extend(accessor_ops());
    ops
}

fn this_data_view(args: &[Value]) -> VmResult<Arc<JsDataView>> {
    args.first()
        .and_then(|v| v.as_data_view())
        .cloned()
        .ok_or_else(|| VmError::type_error("not a DataView"))
}

/// Args: [buffer, byteOffset?, byteLength?]
fn native_data_view_create(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let dv = JsDataView::construct(agent, args)?;
    Ok(Value::data_view(Arc::new(dv)))
}

/// Args: [dataView]
fn native_data_view_buffer(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(this_data_view(args)?.buffer().to_value())
}

/// Args: [dataView]
fn native_data_view_byte_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_data_view(args)?.byte_length()? as f64))
}

/// Args: [dataView]
fn native_data_view_byte_offset(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_data_view(args)?.byte_offset()? as f64))
}
