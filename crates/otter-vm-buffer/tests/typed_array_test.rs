//! TypedArray integration tests

use num_bigint::BigInt;
use otter_vm_buffer::value::JsObject;
use otter_vm_buffer::{Agent, ErrorKind, OpRegistry, Value};
use std::sync::Arc;

fn n(v: f64) -> Value {
    Value::number(v)
}

fn s(v: &str) -> Value {
    Value::string(v)
}

fn array(values: Vec<Value>) -> Value {
    Value::object(Arc::new(JsObject::array(values)))
}

fn call(agent: &mut Agent, ops: &OpRegistry, name: &str, args: &[Value]) -> Value {
    ops.call(agent, name, args)
        .unwrap_or_else(|e| panic!("{} failed: {}", name, e))
}

fn call_err(agent: &mut Agent, ops: &OpRegistry, name: &str, args: &[Value]) -> ErrorKind {
    ops.call(agent, name, args)
        .expect_err("expected an error")
        .kind()
}

fn get(agent: &mut Agent, ops: &OpRegistry, ta: &Value, index: f64) -> Value {
    call(agent, ops, "__TypedArray_get", &[ta.clone(), n(index)])
}

fn numbers(agent: &mut Agent, ops: &OpRegistry, ta: &Value) -> Vec<f64> {
    let len = call(agent, ops, "__TypedArray_length", &[ta.clone()])
        .as_number()
        .unwrap_or(0.0) as usize;
    (0..len)
        .map(|i| get(agent, ops, ta, i as f64).as_number().unwrap_or(f64::NAN))
        .collect()
}

fn resizable_buffer(agent: &mut Agent, ops: &OpRegistry, len: f64, max: f64) -> Value {
    let options = Value::object(Arc::new(
        JsObject::new().with_property("maxByteLength", n(max)),
    ));
    call(agent, ops, "__ArrayBuffer_create", &[n(len), options])
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_create_from_length() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(&mut agent, &ops, "__TypedArray_create", &[s("Float64Array"), n(4.0)]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![0.0; 4]);
    let byte_length = call(&mut agent, &ops, "__TypedArray_byteLength", &[ta.clone()]);
    assert_eq!(byte_length.as_number(), Some(32.0));
    let kind = call(&mut agent, &ops, "__TypedArray_kind", &[ta]);
    assert_eq!(kind.as_str(), Some("Float64Array"));
}

#[test]
fn test_clamped_conversion() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let source = array(vec![n(300.0), n(-5.0), n(1.5), n(2.5), n(f64::NAN)]);
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_create",
        &[s("Uint8ClampedArray"), source],
    );
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![255.0, 0.0, 2.0, 2.0, 0.0]);
}

#[test]
fn test_modular_conversion() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Int8Array"), n(200.0), n(-129.0), n(1.9)],
    );
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![-56.0, 127.0, 1.0]);
}

#[test]
fn test_float16_lane() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Float16Array"), n(1.5), n(100000.0), n(-0.0)],
    );
    let values = numbers(&mut agent, &ops, &ta);
    assert_eq!(values[0], 1.5);
    assert_eq!(values[1], f64::INFINITY);
    assert!(values[2] == 0.0 && values[2].is_sign_negative());
    let byte_length = call(&mut agent, &ops, "__TypedArray_byteLength", &[ta]);
    assert_eq!(byte_length.as_number(), Some(6.0));
}

#[test]
fn test_bigint_lanes() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ab = call(&mut agent, &ops, "__ArrayBuffer_create", &[n(16.0)]);
    let signed = call(&mut agent, &ops, "__TypedArray_create", &[s("BigInt64Array"), ab.clone()]);
    let unsigned = call(&mut agent, &ops, "__TypedArray_create", &[s("BigUint64Array"), ab]);

    call(
        &mut agent,
        &ops,
        "__TypedArray_set",
        &[signed.clone(), n(0.0), Value::bigint(BigInt::from(-1))],
    );
    let read = get(&mut agent, &ops, &unsigned, 0.0);
    assert_eq!(read.as_bigint(), Some(&BigInt::from(u64::MAX)));

    // Numbers never convert to BigInt lanes
    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_set", &[signed.clone(), n(1.0), n(1.0)]),
        ErrorKind::Type
    );

    // Content types cannot mix
    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_create", &[s("Int32Array"), signed]),
        ErrorKind::Type
    );
}

#[test]
fn test_buffer_offset_validation() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ab = call(&mut agent, &ops, "__ArrayBuffer_create", &[n(8.0)]);
    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_create", &[s("Uint16Array"), ab.clone(), n(1.0)]),
        ErrorKind::Range
    );
    assert_eq!(
        call_err(
            &mut agent,
            &ops,
            "__TypedArray_create",
            &[s("Uint16Array"), ab.clone(), n(2.0), n(4.0)]
        ),
        ErrorKind::Range
    );
    let odd = call(&mut agent, &ops, "__ArrayBuffer_create", &[n(7.0)]);
    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_create", &[s("Uint16Array"), odd]),
        ErrorKind::Range
    );

    let view = call(
        &mut agent,
        &ops,
        "__TypedArray_create",
        &[s("Uint16Array"), ab, n(2.0), n(2.0)],
    );
    let offset = call(&mut agent, &ops, "__TypedArray_byteOffset", &[view.clone()]);
    assert_eq!(offset.as_number(), Some(2.0));
    let len = call(&mut agent, &ops, "__TypedArray_length", &[view]);
    assert_eq!(len.as_number(), Some(2.0));
}

#[test]
fn test_from_with_array_like() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let array_like = Value::object(Arc::new(JsObject::array_like(vec![n(4.0), n(5.0)])));
    let ta = call(&mut agent, &ops, "__TypedArray_from", &[s("Uint32Array"), array_like]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![4.0, 5.0]);

    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_from", &[s("Uint32Array"), Value::Undefined]),
        ErrorKind::Type
    );
    assert_eq!(
        call_err(
            &mut agent,
            &ops,
            "__TypedArray_from",
            &[s("Uint32Array"), array(vec![]), n(1.0)]
        ),
        ErrorKind::Type
    );
}

// ============================================================================
// Integer-indexed access
// ============================================================================

#[test]
fn test_out_of_range_access_is_silent() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(&mut agent, &ops, "__TypedArray_create", &[s("Int32Array"), n(2.0)]);

    assert!(get(&mut agent, &ops, &ta, 5.0).is_undefined());
    assert!(get(&mut agent, &ops, &ta, -1.0).is_undefined());
    call(&mut agent, &ops, "__TypedArray_set", &[ta.clone(), n(5.0), n(1.0)]);

    // Numeric-looking keys that are not valid indices never reach the object
    for key in ["-0", "1.5", "NaN", "Infinity"] {
        call(&mut agent, &ops, "__TypedArray_set", &[ta.clone(), s(key), n(9.0)]);
        let read = call(&mut agent, &ops, "__TypedArray_get", &[ta.clone(), s(key)]);
        assert!(read.is_undefined(), "key {}", key);
    }

    // Ordinary keys do
    call(&mut agent, &ops, "__TypedArray_set", &[ta.clone(), s("label"), n(9.0)]);
    let label = call(&mut agent, &ops, "__TypedArray_get", &[ta.clone(), s("label")]);
    assert_eq!(label.as_number(), Some(9.0));

    assert_eq!(numbers(&mut agent, &ops, &ta), vec![0.0, 0.0]);
}

#[test]
fn test_define_property() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(&mut agent, &ops, "__TypedArray_create", &[s("Uint8Array"), n(2.0)]);
    let desc = |props: Vec<(&str, Value)>| {
        let obj = props
            .into_iter()
            .fold(JsObject::new(), |obj, (k, v)| obj.with_property(k, v));
        Value::object(Arc::new(obj))
    };

    let ok = call(
        &mut agent,
        &ops,
        "__TypedArray_defineProperty",
        &[ta.clone(), n(0.0), desc(vec![("value", n(7.0))])],
    );
    assert_eq!(ok.as_boolean(), Some(true));
    assert_eq!(get(&mut agent, &ops, &ta, 0.0).as_number(), Some(7.0));

    // Full element descriptor: writable, enumerable, non-configurable
    let element = call(
        &mut agent,
        &ops,
        "__TypedArray_defineProperty",
        &[
            ta.clone(),
            n(0.0),
            desc(vec![
                ("value", n(5.0)),
                ("writable", Value::boolean(true)),
                ("enumerable", Value::boolean(true)),
                ("configurable", Value::boolean(false)),
            ]),
        ],
    );
    assert_eq!(element.as_boolean(), Some(true));
    assert_eq!(get(&mut agent, &ops, &ta, 0.0).as_number(), Some(5.0));

    let rejected = call(
        &mut agent,
        &ops,
        "__TypedArray_defineProperty",
        &[ta.clone(), n(1.0), desc(vec![("value", n(6.0)), ("configurable", Value::boolean(true))])],
    );
    assert_eq!(rejected.as_boolean(), Some(false));
    assert_eq!(get(&mut agent, &ops, &ta, 1.0).as_number(), Some(0.0));

    let out_of_range = call(
        &mut agent,
        &ops,
        "__TypedArray_defineProperty",
        &[ta, n(2.0), desc(vec![("value", n(1.0))])],
    );
    assert_eq!(out_of_range.as_boolean(), Some(false));
}

// ============================================================================
// Length tracking
// ============================================================================

#[test]
fn test_length_tracking_follows_resize() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ab = resizable_buffer(&mut agent, &ops, 8.0, 16.0);
    let tracking = call(&mut agent, &ops, "__TypedArray_create", &[s("Uint16Array"), ab.clone()]);
    let offset_view = call(
        &mut agent,
        &ops,
        "__TypedArray_create",
        &[s("Uint8Array"), ab.clone(), n(4.0)],
    );

    let len = call(&mut agent, &ops, "__TypedArray_length", &[tracking.clone()]);
    assert_eq!(len.as_number(), Some(4.0));

    call(&mut agent, &ops, "__ArrayBuffer_resize", &[ab.clone(), n(16.0)]);
    let len = call(&mut agent, &ops, "__TypedArray_length", &[tracking.clone()]);
    assert_eq!(len.as_number(), Some(8.0));
    let len = call(&mut agent, &ops, "__TypedArray_length", &[offset_view.clone()]);
    assert_eq!(len.as_number(), Some(12.0));

    // Shrinking below the view's offset puts it out of bounds
    call(&mut agent, &ops, "__ArrayBuffer_resize", &[ab.clone(), n(2.0)]);
    let len = call(&mut agent, &ops, "__TypedArray_length", &[offset_view.clone()]);
    assert_eq!(len.as_number(), Some(0.0));
    let offset = call(&mut agent, &ops, "__TypedArray_byteOffset", &[offset_view.clone()]);
    assert_eq!(offset.as_number(), Some(0.0));
    assert!(get(&mut agent, &ops, &offset_view, 0.0).is_undefined());
    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_fill", &[offset_view.clone(), n(1.0)]),
        ErrorKind::Type
    );

    // Growing back brings it into bounds again
    call(&mut agent, &ops, "__ArrayBuffer_resize", &[ab, n(8.0)]);
    let offset = call(&mut agent, &ops, "__TypedArray_byteOffset", &[offset_view.clone()]);
    assert_eq!(offset.as_number(), Some(4.0));
    let len = call(&mut agent, &ops, "__TypedArray_length", &[offset_view]);
    assert_eq!(len.as_number(), Some(4.0));
}

#[test]
fn test_fixed_view_goes_out_of_bounds() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ab = resizable_buffer(&mut agent, &ops, 8.0, 16.0);
    let fixed = call(
        &mut agent,
        &ops,
        "__TypedArray_create",
        &[s("Uint8Array"), ab.clone(), n(0.0), n(6.0)],
    );
    call(&mut agent, &ops, "__ArrayBuffer_resize", &[ab.clone(), n(4.0)]);
    let len = call(&mut agent, &ops, "__TypedArray_length", &[fixed.clone()]);
    assert_eq!(len.as_number(), Some(0.0));
    call(&mut agent, &ops, "__ArrayBuffer_resize", &[ab, n(6.0)]);
    let len = call(&mut agent, &ops, "__TypedArray_length", &[fixed]);
    assert_eq!(len.as_number(), Some(6.0));
}

// ============================================================================
// Methods
// ============================================================================

#[test]
fn test_subarray_shares_buffer() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Int16Array"), n(1.0), n(2.0), n(3.0), n(4.0)],
    );
    let sub = call(&mut agent, &ops, "__TypedArray_subarray", &[ta.clone(), n(1.0), n(-1.0)]);
    assert_eq!(numbers(&mut agent, &ops, &sub), vec![2.0, 3.0]);
    let offset = call(&mut agent, &ops, "__TypedArray_byteOffset", &[sub.clone()]);
    assert_eq!(offset.as_number(), Some(2.0));

    call(&mut agent, &ops, "__TypedArray_set", &[sub, n(0.0), n(20.0)]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![1.0, 20.0, 3.0, 4.0]);
}

#[test]
fn test_slice_copies() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Uint8Array"), n(1.0), n(2.0), n(3.0)],
    );
    let copy = call(&mut agent, &ops, "__TypedArray_slice", &[ta.clone(), n(-2.0)]);
    call(&mut agent, &ops, "__TypedArray_set", &[copy.clone(), n(0.0), n(9.0)]);
    assert_eq!(numbers(&mut agent, &ops, &copy), vec![9.0, 3.0]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_float_bits_survive_storage() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let bits = |values: Vec<f64>| values.into_iter().map(f64::to_bits).collect::<Vec<_>>();

    let subnormal = f64::from_bits(1);
    let expected = vec![-0.0, subnormal, f64::MIN_POSITIVE, -f64::MAX];
    let ta = call(&mut agent, &ops, "__TypedArray_create", &[s("Float64Array"), n(4.0)]);
    for (i, v) in expected.iter().enumerate() {
        call(&mut agent, &ops, "__TypedArray_set", &[ta.clone(), n(i as f64), n(*v)]);
    }

    let direct = numbers(&mut agent, &ops, &ta);
    assert_eq!(bits(direct.clone()), bits(expected.clone()));
    assert!(direct[0].is_sign_negative());

    let copy = call(&mut agent, &ops, "__TypedArray_slice", &[ta.clone()]);
    assert_eq!(bits(numbers(&mut agent, &ops, &copy)), bits(expected.clone()));

    let buffer = call(&mut agent, &ops, "__TypedArray_buffer", &[ta]);
    let rebuilt = call(&mut agent, &ops, "__TypedArray_create", &[s("Float64Array"), buffer]);
    let reread = numbers(&mut agent, &ops, &rebuilt);
    assert_eq!(bits(reread.clone()), bits(expected));
    assert!(reread[0].is_sign_negative());

    // Float32 keeps its own subnormals and the sign of zero
    let single_subnormal = f32::from_bits(1) as f64;
    let singles = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Float32Array"), n(-0.0), n(single_subnormal)],
    );
    let read = numbers(&mut agent, &ops, &singles);
    assert_eq!(bits(read.clone()), bits(vec![-0.0, single_subnormal]));
    assert!(read[0].is_sign_negative());
}

#[test]
fn test_fill_copy_within_reverse() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(&mut agent, &ops, "__TypedArray_create", &[s("Int32Array"), n(5.0)]);

    let returned = call(&mut agent, &ops, "__TypedArray_fill", &[ta.clone(), n(4.0), n(1.0), n(3.0)]);
    assert!(returned.same_object(&ta));
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![0.0, 4.0, 4.0, 0.0, 0.0]);

    call(&mut agent, &ops, "__TypedArray_copyWithin", &[ta.clone(), n(3.0), n(1.0)]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![0.0, 4.0, 4.0, 4.0, 4.0]);

    call(&mut agent, &ops, "__TypedArray_set", &[ta.clone(), n(0.0), n(1.0)]);
    call(&mut agent, &ops, "__TypedArray_reverse", &[ta.clone()]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![4.0, 4.0, 4.0, 4.0, 1.0]);
}

#[test]
fn test_set_from_sources() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let target = call(&mut agent, &ops, "__TypedArray_create", &[s("Uint8Array"), n(6.0)]);

    call(
        &mut agent,
        &ops,
        "__TypedArray_setFrom",
        &[target.clone(), array(vec![n(1.0), n(2.0), n(3.0)]), n(3.0)],
    );
    assert_eq!(numbers(&mut agent, &ops, &target), vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);

    let source = call(&mut agent, &ops, "__TypedArray_of", &[s("Float32Array"), n(7.5), n(-1.0)]);
    call(&mut agent, &ops, "__TypedArray_setFrom", &[target.clone(), source]);
    assert_eq!(numbers(&mut agent, &ops, &target), vec![7.0, 255.0, 0.0, 1.0, 2.0, 3.0]);

    assert_eq!(
        call_err(
            &mut agent,
            &ops,
            "__TypedArray_setFrom",
            &[target.clone(), array(vec![n(1.0), n(2.0)]), n(5.0)]
        ),
        ErrorKind::Range
    );
    assert_eq!(
        call_err(
            &mut agent,
            &ops,
            "__TypedArray_setFrom",
            &[target, array(vec![]), n(-1.0)]
        ),
        ErrorKind::Range
    );
}

#[test]
fn test_default_sort_order() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Float64Array"), n(3.0), n(f64::NAN), n(0.0), n(-0.0), n(-2.0)],
    );
    let sorted = call(&mut agent, &ops, "__TypedArray_toSorted", &[ta.clone()]);
    let values = numbers(&mut agent, &ops, &sorted);
    assert_eq!(values[0], -2.0);
    assert!(values[1] == 0.0 && values[1].is_sign_negative());
    assert!(values[2] == 0.0 && values[2].is_sign_positive());
    assert_eq!(values[3], 3.0);
    assert!(values[4].is_nan());

    // toSorted leaves the receiver alone
    assert_eq!(get(&mut agent, &ops, &ta, 0.0).as_number(), Some(3.0));
    call(&mut agent, &ops, "__TypedArray_sort", &[ta.clone()]);
    assert_eq!(get(&mut agent, &ops, &ta, 0.0).as_number(), Some(-2.0));

    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_sort", &[ta, n(1.0)]),
        ErrorKind::Type
    );
}

#[test]
fn test_search_family() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Float32Array"), n(1.0), n(f64::NAN), n(1.0), n(0.1)],
    );
    let index = |agent: &mut Agent, name: &str, args: &[Value]| {
        let mut full = vec![ta.clone()];
        full.extend_from_slice(args);
        call(agent, &ops, name, &full)
    };

    assert_eq!(index(&mut agent, "__TypedArray_indexOf", &[n(1.0)]).as_number(), Some(0.0));
    assert_eq!(index(&mut agent, "__TypedArray_indexOf", &[n(1.0), n(1.0)]).as_number(), Some(2.0));
    assert_eq!(index(&mut agent, "__TypedArray_lastIndexOf", &[n(1.0)]).as_number(), Some(2.0));
    assert_eq!(index(&mut agent, "__TypedArray_lastIndexOf", &[n(1.0), n(1.0)]).as_number(), Some(0.0));

    // NaN is never strictly equal, but includes uses SameValueZero
    assert_eq!(index(&mut agent, "__TypedArray_indexOf", &[n(f64::NAN)]).as_number(), Some(-1.0));
    assert_eq!(index(&mut agent, "__TypedArray_includes", &[n(f64::NAN)]).as_boolean(), Some(true));

    // 0.1 is not representable in a Float32 lane
    assert_eq!(index(&mut agent, "__TypedArray_indexOf", &[n(0.1)]).as_number(), Some(-1.0));
    assert_eq!(index(&mut agent, "__TypedArray_includes", &[s("1")]).as_boolean(), Some(false));
}

#[test]
fn test_at_with_to_reversed() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = call(
        &mut agent,
        &ops,
        "__TypedArray_of",
        &[s("Uint16Array"), n(1.0), n(2.0), n(3.0)],
    );
    let last = call(&mut agent, &ops, "__TypedArray_at", &[ta.clone(), n(-1.0)]);
    assert_eq!(last.as_number(), Some(3.0));
    let missing = call(&mut agent, &ops, "__TypedArray_at", &[ta.clone(), n(3.0)]);
    assert!(missing.is_undefined());

    let replaced = call(&mut agent, &ops, "__TypedArray_with", &[ta.clone(), n(-3.0), n(10.0)]);
    assert_eq!(numbers(&mut agent, &ops, &replaced), vec![10.0, 2.0, 3.0]);
    assert_eq!(
        call_err(&mut agent, &ops, "__TypedArray_with", &[ta.clone(), n(3.0), n(0.0)]),
        ErrorKind::Range
    );

    let reversed = call(&mut agent, &ops, "__TypedArray_toReversed", &[ta.clone()]);
    assert_eq!(numbers(&mut agent, &ops, &reversed), vec![3.0, 2.0, 1.0]);
    assert_eq!(numbers(&mut agent, &ops, &ta), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_detached_receiver() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ab = call(&mut agent, &ops, "__ArrayBuffer_create", &[n(4.0)]);
    let ta = call(&mut agent, &ops, "__TypedArray_create", &[s("Uint8Array"), ab.clone()]);
    call(&mut agent, &ops, "__ArrayBuffer_transfer", &[ab]);

    let len = call(&mut agent, &ops, "__TypedArray_byteLength", &[ta.clone()]);
    assert_eq!(len.as_number(), Some(0.0));
    for name in [
        "__TypedArray_fill",
        "__TypedArray_reverse",
        "__TypedArray_indexOf",
        "__TypedArray_slice",
        "__TypedArray_sort",
    ] {
        assert_eq!(call_err(&mut agent, &ops, name, &[ta.clone()]), ErrorKind::Type, "{}", name);
    }
    let is_ta = call(&mut agent, &ops, "__TypedArray_isTypedArray", &[ta]);
    assert_eq!(is_ta.as_boolean(), Some(true));
}

#[test]
fn test_buffer_aliasing_versus_conversion() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ints = call(
        &mut agent,
        &ops,
        "__TypedArray_create",
        &[s("Int32Array"), array(vec![n(1.0), n(2.0), n(3.0)])],
    );

    // A view over the same buffer reinterprets the bytes
    let buffer = call(&mut agent, &ops, "__TypedArray_buffer", &[ints.clone()]);
    let bytes = call(&mut agent, &ops, "__TypedArray_create", &[s("Uint8Array"), buffer]);
    let len = call(&mut agent, &ops, "__TypedArray_length", &[bytes.clone()]);
    assert_eq!(len.as_number(), Some(12.0));
    let byte_sum: f64 = numbers(&mut agent, &ops, &bytes).iter().sum();
    assert_eq!(byte_sum, 6.0);
    call(&mut agent, &ops, "__TypedArray_fill", &[bytes, n(0.0)]);
    assert_eq!(numbers(&mut agent, &ops, &ints), vec![0.0, 0.0, 0.0]);

    // Copying from another typed array converts element by element
    call(&mut agent, &ops, "__TypedArray_set", &[ints.clone(), n(1.0), n(-7.0)]);
    let doubles = call(&mut agent, &ops, "__TypedArray_create", &[s("Float64Array"), ints.clone()]);
    assert_eq!(numbers(&mut agent, &ops, &doubles), vec![0.0, -7.0, 0.0]);
    let byte_length = call(&mut agent, &ops, "__TypedArray_byteLength", &[doubles.clone()]);
    assert_eq!(byte_length.as_number(), Some(24.0));

    // and owns its own buffer
    call(&mut agent, &ops, "__TypedArray_set", &[doubles, n(0.0), n(5.0)]);
    assert_eq!(get(&mut agent, &ops, &ints, 0.0).as_number(), Some(0.0));
}
