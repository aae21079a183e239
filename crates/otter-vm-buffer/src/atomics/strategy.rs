//! Memory strategies behind the Atomics read-modify-write family
//!
//! Both strategies present the same interface. [`NativeAtomics`] issues
//! sequentially consistent CPU atomics directly on the shared store;
//! [`GlobalLockAtomics`] serializes every Atomics memory operation in the
//! process behind one mutex.
//!
//! Values cross this interface as raw lane bits (`u64`, zero-extended).

use super::RmwOp;
use crate::config::AtomicsStrategyKind;
use crate::element::{ElementType, NATIVE_LITTLE_ENDIAN, Numeric};
use crate::error::{VmError, VmResult};
use crate::shared_buffer::SharedBackingStore;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;

/// Atomic access to shared backing-store memory
pub trait AtomicsStrategy: Send + Sync {
    /// Strategy name (for logs)
    fn name(&self) -> &'static str;

    /// Whether an access of `size` bytes is lock-free under this strategy
    fn is_lock_free(&self, size: usize) -> bool;

    /// Sequentially consistent load
    fn load(&self, store: &SharedBackingStore, byte_index: usize, kind: ElementType) -> VmResult<u64>;

    /// Sequentially consistent store
    fn store(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        value: &Numeric,
    ) -> VmResult<()>;

    /// Apply `op`, returning the previous lane bits
    fn read_modify_write(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        op: RmwOp,
        operand: &Numeric,
    ) -> VmResult<u64>;

    /// Replace the lane with `replacement` if its bits equal `expected`'s;
    /// returns the previous lane bits either way
    fn compare_exchange(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        expected: &Numeric,
        replacement: &Numeric,
    ) -> VmResult<u64>;
}

fn invalid_access() -> VmError {
    VmError::range_error("Invalid atomic access index")
}

/// Mask selecting the low `size` bytes
#[inline]
fn width_mask(size: usize) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// Apply a read-modify-write operator to raw lane bits
pub(crate) fn apply_rmw(op: RmwOp, old: u64, operand: u64, size: usize) -> u64 {
    let result = match op {
        RmwOp::Add => old.wrapping_add(operand),
        RmwOp::Sub => old.wrapping_sub(operand),
        RmwOp::And => old & operand,
        RmwOp::Or => old | operand,
        RmwOp::Xor => old ^ operand,
        RmwOp::Exchange => operand,
    };
    result & width_mask(size)
}

/// Run `$body` with `$cell` bound to the atomic cell of the lane width and
/// `$ty` to its integer type
macro_rules! with_cell {
    ($store:expr, $index:expr, $kind:expr, |$cell:ident: $ty:ident| $body:expr) => {
        match $kind.element_size() {
            1 => {
                #[allow(dead_code)]
                type $ty = u8;
                let $cell = $store.atomic_u8($index).ok_or_else(invalid_access)?;
                $body
            }
            2 => {
                #[allow(dead_code)]
                type $ty = u16;
                let $cell = $store.atomic_u16($index).ok_or_else(invalid_access)?;
                $body
            }
            4 => {
                #[allow(dead_code)]
                type $ty = u32;
                let $cell = $store.atomic_u32($index).ok_or_else(invalid_access)?;
                $body
            }
            _ => {
                #[allow(dead_code)]
                type $ty = u64;
                let $cell = $store.atomic_u64($index).ok_or_else(invalid_access)?;
                $body
            }
        }
    };
}

// ============================================================================
// Native
// ============================================================================

/// Hardware atomics on the store's memory
#[derive(Debug, Default)]
pub struct NativeAtomics;

impl AtomicsStrategy for NativeAtomics {
    fn name(&self) -> &'static str {
        "native"
    }

    fn is_lock_free(&self, size: usize) -> bool {
        match size {
            1 | 2 | 4 => true,
            8 => cfg!(target_has_atomic = "64"),
            _ => false,
        }
    }

    fn load(&self, store: &SharedBackingStore, byte_index: usize, kind: ElementType) -> VmResult<u64> {
        with_cell!(store, byte_index, kind, |cell: T| {
            Ok(cell.load(Ordering::SeqCst) as u64)
        })
    }

    fn store(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        value: &Numeric,
    ) -> VmResult<()> {
        let raw = kind.to_raw(value);
        with_cell!(store, byte_index, kind, |cell: T| {
            cell.store(raw as T, Ordering::SeqCst);
            Ok(())
        })
    }

    fn read_modify_write(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        op: RmwOp,
        operand: &Numeric,
    ) -> VmResult<u64> {
        // Coerce before touching memory.
        let raw = kind.to_raw(operand);
        with_cell!(store, byte_index, kind, |cell: T| {
            let v = raw as T;
            let old = match op {
                RmwOp::Add => cell.fetch_add(v, Ordering::SeqCst),
                RmwOp::Sub => cell.fetch_sub(v, Ordering::SeqCst),
                RmwOp::And => cell.fetch_and(v, Ordering::SeqCst),
                RmwOp::Or => cell.fetch_or(v, Ordering::SeqCst),
                RmwOp::Xor => cell.fetch_xor(v, Ordering::SeqCst),
                RmwOp::Exchange => cell.swap(v, Ordering::SeqCst),
            };
            Ok(old as u64)
        })
    }

    fn compare_exchange(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        expected: &Numeric,
        replacement: &Numeric,
    ) -> VmResult<u64> {
        let expected = kind.to_raw(expected);
        let replacement = kind.to_raw(replacement);
        with_cell!(store, byte_index, kind, |cell: T| {
            let old = match cell.compare_exchange(
                expected as T,
                replacement as T,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(old) | Err(old) => old,
            };
            Ok(old as u64)
        })
    }
}

// ============================================================================
// Global lock
// ============================================================================

static GLOBAL_ATOMICS_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Every Atomics memory operation takes one process-wide lock
#[derive(Debug, Default)]
pub struct GlobalLockAtomics;

impl GlobalLockAtomics {
    fn read_raw(store: &SharedBackingStore, byte_index: usize, kind: ElementType) -> VmResult<u64> {
        let size = kind.element_size();
        let mut scratch = [0u8; 8];
        if !store.read_bytes(byte_index, &mut scratch[..size]) {
            return Err(invalid_access());
        }
        Ok(kind.raw_from_bytes(&scratch[..size], NATIVE_LITTLE_ENDIAN))
    }

    fn write_raw(store: &SharedBackingStore, byte_index: usize, kind: ElementType, raw: u64) -> VmResult<()> {
        let size = kind.element_size();
        let mut scratch = [0u8; 8];
        kind.raw_to_bytes(raw, NATIVE_LITTLE_ENDIAN, &mut scratch[..size]);
        if !store.write_bytes(byte_index, &scratch[..size]) {
            return Err(invalid_access());
        }
        Ok(())
    }
}

impl AtomicsStrategy for GlobalLockAtomics {
    fn name(&self) -> &'static str {
        "global-lock"
    }

    fn is_lock_free(&self, _size: usize) -> bool {
        false
    }

    fn load(&self, store: &SharedBackingStore, byte_index: usize, kind: ElementType) -> VmResult<u64> {
        let _guard = GLOBAL_ATOMICS_LOCK.lock();
        Self::read_raw(store, byte_index, kind)
    }

    fn store(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        value: &Numeric,
    ) -> VmResult<()> {
        let _guard = GLOBAL_ATOMICS_LOCK.lock();
        Self::write_raw(store, byte_index, kind, kind.to_raw(value))
    }

    fn read_modify_write(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        op: RmwOp,
        operand: &Numeric,
    ) -> VmResult<u64> {
        let _guard = GLOBAL_ATOMICS_LOCK.lock();
        let old = Self::read_raw(store, byte_index, kind)?;
        // Coerce after the snapshot read.
        let operand = kind.to_raw(operand);
        let new = apply_rmw(op, old, operand, kind.element_size());
        Self::write_raw(store, byte_index, kind, new)?;
        Ok(old)
    }

    fn compare_exchange(
        &self,
        store: &SharedBackingStore,
        byte_index: usize,
        kind: ElementType,
        expected: &Numeric,
        replacement: &Numeric,
    ) -> VmResult<u64> {
        let _guard = GLOBAL_ATOMICS_LOCK.lock();
        let old = Self::read_raw(store, byte_index, kind)?;
        if old == kind.to_raw(expected) {
            Self::write_raw(store, byte_index, kind, kind.to_raw(replacement))?;
        }
        Ok(old)
    }
}

static NATIVE: NativeAtomics = NativeAtomics;
static GLOBAL_LOCK: GlobalLockAtomics = GlobalLockAtomics;

/// Resolve a configured strategy kind to its implementation
pub fn strategy_for(kind: AtomicsStrategyKind) -> &'static dyn AtomicsStrategy {
    match kind {
        AtomicsStrategyKind::Native => &NATIVE,
        AtomicsStrategyKind::GlobalLock => &GLOBAL_LOCK,
        AtomicsStrategyKind::Auto => {
            if cfg!(target_has_atomic = "64") {
                &NATIVE
            } else {
                &GLOBAL_LOCK
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::memory::MemoryManager;
    use std::sync::Arc;

    fn store(len: usize) -> Arc<SharedBackingStore> {
        let mm = Arc::new(MemoryManager::test());
        SharedBackingStore::allocate(&BufferConfig::default(), &mm, len).unwrap()
    }

    fn strategies() -> [&'static dyn AtomicsStrategy; 2] {
        [&NATIVE, &GLOBAL_LOCK]
    }

    #[test]
    fn test_apply_rmw_wraps_to_width() {
        assert_eq!(apply_rmw(RmwOp::Add, 0xFF, 1, 1), 0);
        assert_eq!(apply_rmw(RmwOp::Sub, 0, 1, 2), 0xFFFF);
        assert_eq!(apply_rmw(RmwOp::Xor, 0b1010, 0b0110, 4), 0b1100);
        assert_eq!(apply_rmw(RmwOp::Exchange, 5, 9, 8), 9);
    }

    #[test]
    fn test_rmw_returns_old_value() {
        for strategy in strategies() {
            let s = store(16);
            let kind = ElementType::Int32;
            strategy.store(&s, 4, kind, &Numeric::Number(10.0)).unwrap();
            let old = strategy
                .read_modify_write(&s, 4, kind, RmwOp::Add, &Numeric::Number(5.0))
                .unwrap();
            assert_eq!(kind.from_raw(old), Numeric::Number(10.0));
            let now = strategy.load(&s, 4, kind).unwrap();
            assert_eq!(kind.from_raw(now), Numeric::Number(15.0), "{}", strategy.name());
        }
    }

    #[test]
    fn test_signed_wraparound() {
        for strategy in strategies() {
            let s = store(8);
            let kind = ElementType::Int8;
            strategy.store(&s, 0, kind, &Numeric::Number(127.0)).unwrap();
            strategy
                .read_modify_write(&s, 0, kind, RmwOp::Add, &Numeric::Number(1.0))
                .unwrap();
            let now = strategy.load(&s, 0, kind).unwrap();
            assert_eq!(kind.from_raw(now), Numeric::Number(-128.0));
        }
    }

    #[test]
    fn test_compare_exchange_by_lane_bits() {
        for strategy in strategies() {
            let s = store(8);
            let kind = ElementType::Uint8;
            strategy.store(&s, 1, kind, &Numeric::Number(3.0)).unwrap();
            // 259 reduces to 3 in a Uint8 lane.
            let old = strategy
                .compare_exchange(&s, 1, kind, &Numeric::Number(259.0), &Numeric::Number(7.0))
                .unwrap();
            assert_eq!(old, 3);
            assert_eq!(strategy.load(&s, 1, kind).unwrap(), 7);
            let old = strategy
                .compare_exchange(&s, 1, kind, &Numeric::Number(3.0), &Numeric::Number(9.0))
                .unwrap();
            assert_eq!(old, 7);
            assert_eq!(strategy.load(&s, 1, kind).unwrap(), 7);
        }
    }

    #[test]
    fn test_bigint_lanes() {
        for strategy in strategies() {
            let s = store(16);
            let kind = ElementType::BigInt64;
            let big = Numeric::BigInt(num_bigint::BigInt::from(i64::MAX));
            strategy.store(&s, 8, kind, &big).unwrap();
            strategy
                .read_modify_write(&s, 8, kind, RmwOp::Add, &Numeric::BigInt(1.into()))
                .unwrap();
            let now = strategy.load(&s, 8, kind).unwrap();
            assert_eq!(kind.from_raw(now), Numeric::BigInt(num_bigint::BigInt::from(i64::MIN)));
        }
    }

    #[test]
    fn test_out_of_range_access() {
        let s = store(8);
        for strategy in strategies() {
            assert!(strategy.load(&s, 8, ElementType::Int32).is_err());
        }
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(strategy_for(AtomicsStrategyKind::GlobalLock).name(), "global-lock");
        assert_eq!(strategy_for(AtomicsStrategyKind::Native).name(), "native");
        assert!(!strategy_for(AtomicsStrategyKind::GlobalLock).is_lock_free(4));
        assert!(strategy_for(AtomicsStrategyKind::Native).is_lock_free(4));
    }
}
