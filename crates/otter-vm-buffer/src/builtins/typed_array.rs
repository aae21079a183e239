//! TypedArray built-ins
//!
//! One set of operations serves all twelve element types. Constructor-style
//! ops take the constructor name (`"Int32Array"`) as their first argument;
//! prototype ops take the receiver.

use super::{Op, arg, op_native};
use crate::agent::Agent;
use crate::convert;
use crate::element::ElementType;
use crate::error::{VmError, VmResult};
use crate::typed_array::JsTypedArray;
use crate::value::{HeapRef, PropertyDescriptor, Value};
use std::sync::Arc;

/// Get TypedArray ops for extension registration
pub fn ops() -> Vec<Op> {
    vec![
        // Constructors
        op_native("__TypedArray_create", native_typed_array_create),
        op_native("__TypedArray_of", native_typed_array_of),
        op_native("__TypedArray_from", native_typed_array_from),
        // Getters
        op_native("__TypedArray_buffer", native_typed_array_buffer),
        op_native("__TypedArray_byteLength", native_typed_array_byte_length),
        op_native("__TypedArray_byteOffset", native_typed_array_byte_offset),
        op_native("__TypedArray_length", native_typed_array_length),
        op_native("__TypedArray_kind", native_typed_array_kind),
        // Integer-indexed element access
        op_native("__TypedArray_get", native_typed_array_get),
        op_native("__TypedArray_set", native_typed_array_set),
        op_native(
            "__TypedArray_defineProperty",
            native_typed_array_define_property,
        ),
        // Prototype methods
        op_native("__TypedArray_subarray", native_typed_array_subarray),
        op_native("__TypedArray_slice", native_typed_array_slice),
        op_native("__TypedArray_fill", native_typed_array_fill),
        op_native("__TypedArray_copyWithin", native_typed_array_copy_within),
        op_native("__TypedArray_reverse", native_typed_array_reverse),
        op_native("__TypedArray_setFrom", native_typed_array_set_from),
        op_native("__TypedArray_sort", native_typed_array_sort),
        op_native("__TypedArray_toSorted", native_typed_array_to_sorted),
        op_native("__TypedArray_indexOf", native_typed_array_index_of),
        op_native("__TypedArray_lastIndexOf", native_typed_array_last_index_of),
        op_native("__TypedArray_includes", native_typed_array_includes),
        op_native("__TypedArray_at", native_typed_array_at),
        op_native("__TypedArray_with", native_typed_array_with),
        op_native("__TypedArray_toReversed", native_typed_array_to_reversed),
        // Static
        op_native("__TypedArray_isTypedArray", native_is_typed_array),
    ]
}

fn this_typed_array(args: &[Value]) -> VmResult<Arc<JsTypedArray>> {
    args.first()
        .and_then(|v| v.as_typed_array())
        .cloned()
        .ok_or_else(|| VmError::type_error("not a TypedArray"))
}

fn element_type_arg(args: &[Value]) -> VmResult<ElementType> {
    let name = args
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| VmError::type_error("TypedArray constructor name expected"))?;
    ElementType::from_name(name)
        .ok_or_else(|| VmError::type_error(format!("{} is not a TypedArray constructor", name)))
}

fn wrap(ta: JsTypedArray) -> Value {
    Value::typed_array(Arc::new(ta))
}

// ============================================================================
// Constructors
// ============================================================================

/// `new <Type>Array(...)`
/// Args: [kindName, ...constructorArgs]
fn native_typed_array_create(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let kind = element_type_arg(args)?;
    let ta = JsTypedArray::construct(agent, kind, &args[1..])?;
    Ok(wrap(ta))
}

/// `<Type>Array.of(...items)`
/// Args: [kindName, ...items]
fn native_typed_array_of(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let kind = element_type_arg(args)?;
    let ta = JsTypedArray::from_values(agent, kind, &args[1..])?;
    Ok(wrap(ta))
}

/// `<Type>Array.from(source, mapFn?, thisArg?)`
/// Args: [kindName, source, mapFn?, thisArg?]
fn native_typed_array_from(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let kind = element_type_arg(args)?;
    let source = arg(args, 1);
    let map_fn = arg(args, 2);
    let this_arg = arg(args, 3);

    let mapper = match &map_fn {
        Value::Undefined => None,
        Value::Object(HeapRef::Function(f)) if f.is_callable() => Some(f.clone()),
        _ => return Err(VmError::type_error("TypedArray.from: mapFn is not callable")),
    };

    let mut values = collect_source(agent, &source)?;
    if let Some(f) = mapper {
        for (i, value) in values.iter_mut().enumerate() {
            let mapped = f.call(
                agent,
                &this_arg,
                &[value.clone(), Value::number(i as f64)],
            )?;
            *value = mapped;
        }
    }
    let ta = JsTypedArray::from_values(agent, kind, &values)?;
    Ok(wrap(ta))
}

fn collect_source(agent: &mut Agent, source: &Value) -> VmResult<Vec<Value>> {
    match source {
        Value::Undefined | Value::Null => Err(VmError::type_error(
            "Cannot convert undefined or null to object",
        )),
        Value::Object(HeapRef::TypedArray(ta)) => {
            let len = ta.validate()?;
            Ok((0..len)
                .map(|i| ta.get_element(i).map_or(Value::Undefined, |n| n.to_value()))
                .collect())
        }
        Value::Object(HeapRef::Object(obj)) => match obj.iterator() {
            Some(iterate) => iterate(agent),
            None => {
                let length_value = obj.get(agent, "length")?;
                let len = convert::to_length(agent, &length_value)?;
                let mut values = Vec::with_capacity(len);
                for i in 0..len {
                    values.push(obj.get(agent, &i.to_string())?);
                }
                Ok(values)
            }
        },
        Value::String(s) => Ok(s.chars().map(|c| Value::string(&c.to_string())).collect()),
        _ => Ok(Vec::new()),
    }
}

// ============================================================================
// Getters
// ============================================================================

/// Args: [typedArray]
fn native_typed_array_buffer(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(this_typed_array(args)?.buffer().to_value())
}

/// Args: [typedArray]
fn native_typed_array_byte_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_typed_array(args)?.byte_length() as f64))
}

/// Args: [typedArray]
fn native_typed_array_byte_offset(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_typed_array(args)?.byte_offset() as f64))
}

/// Args: [typedArray]
fn native_typed_array_length(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::number(this_typed_array(args)?.length() as f64))
}

/// `[Symbol.toStringTag]`; undefined for non-typed-array receivers
/// Args: [value]
fn native_typed_array_kind(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(match args.first().and_then(|v| v.as_typed_array()) {
        Some(ta) => Value::string(ta.kind().name()),
        None => Value::Undefined,
    })
}

// ============================================================================
// Element access
// ============================================================================

/// Integer-indexed `[[Get]]` by property key
/// Args: [typedArray, key]
fn native_typed_array_get(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    let key = property_key(&arg(args, 1));
    ta.get_property(agent, &key)
}

/// Integer-indexed `[[Set]]` by property key; out-of-range writes are no-ops
/// Args: [typedArray, key, value]
fn native_typed_array_set(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    let key = property_key(&arg(args, 1));
    ta.set_property(agent, &key, &arg(args, 2))?;
    Ok(Value::Undefined)
}

/// `Object.defineProperty(ta, index, desc)` for numeric keys
/// Args: [typedArray, index, descriptor]
fn native_typed_array_define_property(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    let index = convert::to_number(agent, &arg(args, 1))?;
    let desc = to_property_descriptor(agent, &arg(args, 2))?;
    Ok(Value::boolean(ta.define_own_index(agent, index, &desc)?))
}

fn property_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string(),
        Value::Number(n) if *n == 0.0 => "0".to_string(),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 => {
            format!("{}", *n as i64)
        }
        Value::Number(n) if n.is_nan() => "NaN".to_string(),
        Value::Number(n) if n.is_infinite() => {
            if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
        }
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => other.type_name().to_string(),
    }
}

fn to_property_descriptor(agent: &mut Agent, desc: &Value) -> VmResult<PropertyDescriptor> {
    let obj = desc
        .as_object()
        .ok_or_else(|| VmError::type_error("Property description must be an object"))?;
    let mut out = PropertyDescriptor::default();
    let flag = |agent: &mut Agent, key: &str| -> VmResult<Option<bool>> {
        if obj.has_own_property(key) {
            Ok(Some(convert::to_boolean(&obj.get(agent, key)?)))
        } else {
            Ok(None)
        }
    };
    out.enumerable = flag(agent, "enumerable")?;
    out.configurable = flag(agent, "configurable")?;
    out.writable = flag(agent, "writable")?;
    if obj.has_own_property("value") {
        out.value = Some(obj.get(agent, "value")?);
    }
    if obj.has_own_property("get") {
        out.get = Some(obj.get(agent, "get")?);
    }
    if obj.has_own_property("set") {
        out.set = Some(obj.get(agent, "set")?);
    }
    Ok(out)
}

// ============================================================================
// Prototype methods
// ============================================================================

/// Args: [typedArray, begin?, end?]
fn native_typed_array_subarray(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    Ok(Value::typed_array(ta.subarray(agent, &arg(args, 1), &arg(args, 2))?))
}

/// Args: [typedArray, start?, end?]
fn native_typed_array_slice(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    Ok(Value::typed_array(ta.slice(agent, &arg(args, 1), &arg(args, 2))?))
}

/// Args: [typedArray, value, start?, end?]
fn native_typed_array_fill(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    ta.fill(agent, &arg(args, 1), &arg(args, 2), &arg(args, 3))?;
    Ok(args[0].clone())
}

/// Args: [typedArray, target, start, end?]
fn native_typed_array_copy_within(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    ta.copy_within(agent, &arg(args, 1), &arg(args, 2), &arg(args, 3))?;
    Ok(args[0].clone())
}

/// Args: [typedArray]
fn native_typed_array_reverse(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    ta.reverse()?;
    Ok(args[0].clone())
}

/// `%TypedArray%.prototype.set(source, offset)`
/// Args: [typedArray, source, offset?]
fn native_typed_array_set_from(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    ta.set_from(agent, &arg(args, 1), &arg(args, 2))?;
    Ok(Value::Undefined)
}

/// Args: [typedArray, comparator?]
fn native_typed_array_sort(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    ta.sort(agent, &arg(args, 1))?;
    Ok(args[0].clone())
}

/// Args: [typedArray, comparator?]
fn native_typed_array_to_sorted(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    Ok(Value::typed_array(ta.to_sorted(agent, &arg(args, 1))?))
}

/// Args: [typedArray, searchElement, fromIndex?]
fn native_typed_array_index_of(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    let index = ta.index_of(agent, &arg(args, 1), &arg(args, 2))?;
    Ok(Value::number(index as f64))
}

/// Args: [typedArray, searchElement, fromIndex?]
fn native_typed_array_last_index_of(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    let index = ta.last_index_of(agent, &arg(args, 1), args.get(2))?;
    Ok(Value::number(index as f64))
}

/// Args: [typedArray, searchElement, fromIndex?]
fn native_typed_array_includes(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    Ok(Value::boolean(ta.includes(agent, &arg(args, 1), &arg(args, 2))?))
}

/// Args: [typedArray, index]
fn native_typed_array_at(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    ta.at(agent, &arg(args, 1))
}

/// Args: [typedArray, index, value]
fn native_typed_array_with(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    Ok(Value::typed_array(ta.with(agent, &arg(args, 1), &arg(args, 2))?))
}

/// Args: [typedArray]
fn native_typed_array_to_reversed(agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    let ta = this_typed_array(args)?;
    Ok(Value::typed_array(ta.to_reversed(agent)?))
}

/// Args: [value]
fn native_is_typed_array(_agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
    Ok(Value::boolean(
        args.first().and_then(|v| v.as_typed_array()).is_some(),
    ))
}
