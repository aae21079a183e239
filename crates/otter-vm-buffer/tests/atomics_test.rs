//! Atomics integration tests
//!
//! Cross-thread tests give every thread its own `Agent`; only the shared
//! buffer (and views over it) cross thread boundaries.

use num_bigint::BigInt;
use otter_vm_buffer::{
    Agent, AtomicsStrategyKind, BufferConfig, ErrorKind, OpRegistry, PromiseState, Value,
};
use std::thread;
use std::time::Duration;

fn n(v: f64) -> Value {
    Value::number(v)
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

fn shared_array(agent: &mut Agent, ops: &OpRegistry, kind: &str, byte_length: f64) -> Value {
    let sab = call(agent, ops, "__SharedArrayBuffer_create", &[n(byte_length)]);
    call(agent, ops, "__TypedArray_create", &[Value::string(kind), sab])
}

// ============================================================================
// Read-modify-write
// ============================================================================

#[test]
fn test_rmw_family() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = shared_array(&mut agent, &ops, "Int32Array", 16.0);
    let at = |agent: &mut Agent, name: &str, value: f64| {
        call(agent, &ops, name, &[ta.clone(), n(1.0), n(value)])
            .as_number()
            .unwrap_or(f64::NAN)
    };

    assert_eq!(at(&mut agent, "__Atomics_add", 12.0), 0.0);
    assert_eq!(at(&mut agent, "__Atomics_sub", 2.0), 12.0);
    assert_eq!(at(&mut agent, "__Atomics_and", 6.0), 10.0);
    assert_eq!(at(&mut agent, "__Atomics_or", 9.0), 2.0);
    assert_eq!(at(&mut agent, "__Atomics_xor", 1.0), 11.0);
    assert_eq!(at(&mut agent, "__Atomics_exchange", -5.0), 10.0);
    let loaded = call(&mut agent, &ops, "__Atomics_load", &[ta.clone(), n(1.0)]);
    assert_eq!(loaded.as_number(), Some(-5.0));

    // Wraps at the lane width
    call(&mut agent, &ops, "__Atomics_store", &[ta.clone(), n(0.0), n(i32::MAX as f64)]);
    call(&mut agent, &ops, "__Atomics_add", &[ta.clone(), n(0.0), n(1.0)]);
    let wrapped = call(&mut agent, &ops, "__Atomics_load", &[ta, n(0.0)]);
    assert_eq!(wrapped.as_number(), Some(i32::MIN as f64));
}

#[test]
fn test_compare_exchange_uses_lane_bits() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = shared_array(&mut agent, &ops, "Uint8Array", 4.0);
    call(&mut agent, &ops, "__Atomics_store", &[ta.clone(), n(0.0), n(44.0)]);

    // 300 wraps to 44 in a Uint8 lane
    let old = call(
        &mut agent,
        &ops,
        "__Atomics_compareExchange",
        &[ta.clone(), n(0.0), n(300.0), n(7.0)],
    );
    assert_eq!(old.as_number(), Some(44.0));
    let now = call(&mut agent, &ops, "__Atomics_load", &[ta.clone(), n(0.0)]);
    assert_eq!(now.as_number(), Some(7.0));

    let miss = call(
        &mut agent,
        &ops,
        "__Atomics_compareExchange",
        &[ta.clone(), n(0.0), n(8.0), n(9.0)],
    );
    assert_eq!(miss.as_number(), Some(7.0));
    let unchanged = call(&mut agent, &ops, "__Atomics_load", &[ta, n(0.0)]);
    assert_eq!(unchanged.as_number(), Some(7.0));
}

#[test]
fn test_bigint_lane() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = shared_array(&mut agent, &ops, "BigInt64Array", 16.0);
    let big = |v: i64| Value::bigint(BigInt::from(v));

    let old = call(&mut agent, &ops, "__Atomics_add", &[ta.clone(), n(1.0), big(-3)]);
    assert_eq!(old.as_bigint(), Some(&BigInt::from(0)));
    let now = call(&mut agent, &ops, "__Atomics_load", &[ta.clone(), n(1.0)]);
    assert_eq!(now.as_bigint(), Some(&BigInt::from(-3)));

    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_add", &[ta, n(0.0), n(1.0)]),
        ErrorKind::Type
    );
}

#[test]
fn test_validation_errors() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();

    let floats = shared_array(&mut agent, &ops, "Float64Array", 16.0);
    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_add", &[floats, n(0.0), n(1.0)]),
        ErrorKind::Type
    );
    let clamped = shared_array(&mut agent, &ops, "Uint8ClampedArray", 4.0);
    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_load", &[clamped, n(0.0)]),
        ErrorKind::Type
    );
    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_load", &[n(1.0), n(0.0)]),
        ErrorKind::Type
    );

    let ta = shared_array(&mut agent, &ops, "Int16Array", 8.0);
    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_load", &[ta.clone(), n(4.0)]),
        ErrorKind::Range
    );
    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_store", &[ta.clone(), n(-1.0), n(0.0)]),
        ErrorKind::Range
    );
    // notify only accepts the waitable lanes
    assert_eq!(
        call_err(&mut agent, &ops, "__Atomics_notify", &[ta, n(0.0)]),
        ErrorKind::Type
    );
}

#[test]
fn test_non_shared_buffers() {
    let ops = OpRegistry::new();

    let mut strict = Agent::default();
    let ta = call(
        &mut strict,
        &ops,
        "__TypedArray_create",
        &[Value::string("Int32Array"), n(4.0)],
    );
    assert_eq!(
        call_err(&mut strict, &ops, "__Atomics_add", &[ta.clone(), n(0.0), n(1.0)]),
        ErrorKind::Type
    );
    assert_eq!(
        call_err(&mut strict, &ops, "__Atomics_wait", &[ta.clone(), n(0.0), n(0.0), n(0.0)]),
        ErrorKind::Type
    );
    let woken = call(&mut strict, &ops, "__Atomics_notify", &[ta, n(0.0)]);
    assert_eq!(woken.as_number(), Some(0.0));

    let mut relaxed = Agent::new(BufferConfig::default().with_non_shared_atomics(true));
    let ta = call(
        &mut relaxed,
        &ops,
        "__TypedArray_create",
        &[Value::string("Int32Array"), n(4.0)],
    );
    call(&mut relaxed, &ops, "__Atomics_add", &[ta.clone(), n(2.0), n(5.0)]);
    let loaded = call(&mut relaxed, &ops, "__Atomics_load", &[ta, n(2.0)]);
    assert_eq!(loaded.as_number(), Some(5.0));
}

#[test]
fn test_is_lock_free_and_pause() {
    let ops = OpRegistry::new();
    let mut native = Agent::new(BufferConfig::default().with_atomics_strategy(AtomicsStrategyKind::Native));
    for (size, expected) in [(1.0, true), (2.0, true), (4.0, true), (3.0, false), (16.0, false)] {
        let r = call(&mut native, &ops, "__Atomics_isLockFree", &[n(size)]);
        assert_eq!(r.as_boolean(), Some(expected), "size {}", size);
    }

    let mut locked = Agent::new(
        BufferConfig::default().with_atomics_strategy(AtomicsStrategyKind::GlobalLock),
    );
    let r = call(&mut locked, &ops, "__Atomics_isLockFree", &[n(4.0)]);
    assert_eq!(r.as_boolean(), Some(false));

    call(&mut native, &ops, "__Atomics_pause", &[]);
    call(&mut native, &ops, "__Atomics_pause", &[n(100.0)]);
    assert_eq!(
        call_err(&mut native, &ops, "__Atomics_pause", &[n(1.5)]),
        ErrorKind::Type
    );
    assert_eq!(
        call_err(&mut native, &ops, "__Atomics_pause", &[Value::string("1")]),
        ErrorKind::Type
    );
}

// ============================================================================
// Concurrency
// ============================================================================

fn concurrent_adds(strategy: AtomicsStrategyKind) {
    const THREADS: usize = 2;
    const ADDS: usize = 100_000;

    let ops = OpRegistry::new();
    let mut agent = Agent::new(BufferConfig::default().with_atomics_strategy(strategy));
    let ta = shared_array(&mut agent, &ops, "Int32Array", 8.0);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ta = ta.clone();
            thread::spawn(move || {
                let ops = OpRegistry::new();
                let mut agent = Agent::new(BufferConfig::default().with_atomics_strategy(strategy));
                for _ in 0..ADDS {
                    ops.call(&mut agent, "__Atomics_add", &[ta.clone(), n(1.0), n(1.0)])
                        .expect("add");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let total = call(&mut agent, &ops, "__Atomics_load", &[ta, n(1.0)]);
    assert_eq!(total.as_number(), Some((THREADS * ADDS) as f64));
}

#[test]
fn test_concurrent_adds_native() {
    concurrent_adds(AtomicsStrategyKind::Native);
}

#[test]
fn test_concurrent_adds_global_lock() {
    concurrent_adds(AtomicsStrategyKind::GlobalLock);
}

// ============================================================================
// Wait / notify
// ============================================================================

#[test]
fn test_wait_immediate_results() {
    let mut agent = Agent::default();
    let ops = OpRegistry::new();
    let ta = shared_array(&mut agent, &ops, "Int32Array", 8.0);

    let r = call(&mut agent, &ops, "__Atomics_wait", &[ta.clone(), n(0.0), n(1.0)]);
    assert_eq!(r.as_str(), Some("not-equal"));
    let r = call(&mut agent, &ops, "__Atomics_wait", &[ta.clone(), n(0.0), n(0.0), n(0.0)]);
    assert_eq!(r.as_str(), Some("timed-out"));
    let r = call(&mut agent, &ops, "__Atomics_wait", &[ta.clone(), n(0.0), n(0.0), n(10.0)]);
    assert_eq!(r.as_str(), Some("timed-out"));

    let mut no_block = Agent::new(BufferConfig::default().with_can_block(false));
    assert_eq!(
        call_err(&mut no_block, &ops, "__Atomics_wait", &[ta, n(0.0), n(0.0), n(0.0)]),
        ErrorKind::Type
    );
}

#[test]
fn test_wait_woken_by_notify() {
    let ops = OpRegistry::new();
    let mut agent = Agent::default();
    let ta = shared_array(&mut agent, &ops, "Int32Array", 8.0);

    let waiter = {
        let ta = ta.clone();
        thread::spawn(move || {
            let ops = OpRegistry::new();
            let mut agent = Agent::default();
            ops.call(&mut agent, "__Atomics_wait", &[ta, n(1.0), n(0.0)])
                .expect("wait")
                .as_str()
                .map(str::to_string)
        })
    };

    // Keep notifying until the waiter has been enqueued and woken
    let mut woken = 0.0;
    for _ in 0..2000 {
        let r = call(&mut agent, &ops, "__Atomics_notify", &[ta.clone(), n(1.0), n(1.0)]);
        woken = r.as_number().unwrap_or(0.0);
        if woken > 0.0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(woken, 1.0);
    let result = waiter.join().expect("waiter panicked");
    assert_eq!(result.as_deref(), Some("ok"));
}

#[test]
fn test_notify_wakes_in_fifo_order_up_to_count() {
    let ops = OpRegistry::new();
    let mut agent = Agent::default();
    let ta = shared_array(&mut agent, &ops, "Int32Array", 8.0);

    // Three async waiters, enqueued in order
    let mut results = Vec::new();
    for _ in 0..3 {
        let r = call(&mut agent, &ops, "__Atomics_waitAsync", &[ta.clone(), n(0.0), n(0.0)]);
        let obj = r.as_object().expect("result object").clone();
        let promise = obj.get(&mut agent, "value").expect("value");
        results.push(promise.as_promise().expect("promise").clone());
    }

    let woken = call(&mut agent, &ops, "__Atomics_notify", &[ta.clone(), n(0.0), n(2.0)]);
    assert_eq!(woken.as_number(), Some(2.0));

    let mut resolved = 0;
    for _ in 0..200 {
        resolved += agent.wait_for_jobs(Some(Duration::from_millis(50)));
        if resolved >= 2 {
            break;
        }
    }
    assert_eq!(resolved, 2);
    assert!(results[0].is_fulfilled());
    assert!(results[1].is_fulfilled());
    assert!(results[2].is_pending());

    let woken = call(&mut agent, &ops, "__Atomics_notify", &[ta, n(0.0)]);
    assert_eq!(woken.as_number(), Some(1.0));
    while agent.pending_async_waits() > 0 {
        agent.wait_for_jobs(Some(Duration::from_millis(50)));
    }
    assert_eq!(results[2].fulfilled_value().and_then(|v| v.as_str().map(str::to_string)).as_deref(), Some("ok"));
}

#[test]
fn test_wait_async_notified_from_another_thread() {
    let ops = OpRegistry::new();
    let mut agent = Agent::default();
    let ta = shared_array(&mut agent, &ops, "Int32Array", 8.0);

    let r = call(&mut agent, &ops, "__Atomics_waitAsync", &[ta.clone(), n(0.0), n(0.0)]);
    let obj = r.as_object().expect("result object").clone();
    assert_eq!(obj.get(&mut agent, "async").expect("async").as_boolean(), Some(true));
    let promise = obj
        .get(&mut agent, "value")
        .expect("value")
        .as_promise()
        .expect("promise")
        .clone();
    assert_eq!(agent.pending_async_waits(), 1);

    let notifier = {
        let ta = ta.clone();
        thread::spawn(move || {
            let ops = OpRegistry::new();
            let mut agent = Agent::default();
            ops.call(&mut agent, "__Atomics_store", &[ta.clone(), n(0.0), n(1.0)])
                .expect("store");
            ops.call(&mut agent, "__Atomics_notify", &[ta, n(0.0), n(1.0)])
                .expect("notify")
                .as_number()
        })
    };
    assert_eq!(notifier.join().expect("notifier panicked"), Some(1.0));

    // Resolution only happens when the owning agent drains its jobs
    while agent.pending_async_waits() > 0 {
        agent.wait_for_jobs(Some(Duration::from_millis(50)));
    }
    match promise.state() {
        PromiseState::Fulfilled(value) => assert_eq!(value.as_str(), Some("ok")),
        other => panic!("unexpected promise state: {:?}", other),
    }
}

#[test]
fn test_wait_async_timeout() {
    let ops = OpRegistry::new();
    let mut agent = Agent::default();
    let ta = shared_array(&mut agent, &ops, "BigInt64Array", 8.0);
    let zero = Value::bigint(BigInt::from(0));

    let r = call(&mut agent, &ops, "__Atomics_waitAsync", &[ta.clone(), n(0.0), zero.clone(), n(0.0)]);
    let obj = r.as_object().expect("result object").clone();
    assert_eq!(obj.get(&mut agent, "async").expect("async").as_boolean(), Some(false));
    assert_eq!(obj.get(&mut agent, "value").expect("value").as_str(), Some("timed-out"));

    let r = call(&mut agent, &ops, "__Atomics_waitAsync", &[ta, n(0.0), zero, n(20.0)]);
    let obj = r.as_object().expect("result object").clone();
    let promise = obj
        .get(&mut agent, "value")
        .expect("value")
        .as_promise()
        .expect("promise")
        .clone();
    while agent.pending_async_waits() > 0 {
        agent.wait_for_jobs(Some(Duration::from_millis(100)));
    }
    assert_eq!(
        promise.fulfilled_value().and_then(|v| v.as_str().map(str::to_string)).as_deref(),
        Some("timed-out")
    );
}
