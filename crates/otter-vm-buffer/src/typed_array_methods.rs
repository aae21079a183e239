//! TypedArray.prototype algorithms
//!
//! Every method here that calls back into user code (coercions, species
//! constructors, comparators) re-validates the receiver afterwards instead of
//! trusting a length captured before the call.

use crate::agent::Agent;
use crate::array_buffer::detached_error;
use crate::convert;
use crate::element::{NATIVE_LITTLE_ENDIAN, Numeric};
use crate::error::{VmError, VmResult};
use crate::typed_array::JsTypedArray;
use crate::value::{HeapRef, JsObject, Species, Value, species_constructor};
use std::cmp::Ordering;
use std::sync::Arc;

impl JsTypedArray {
    // ========================================================================
    // Species
    // ========================================================================

    /// TypedArraySpeciesCreate
    pub(crate) fn species_create(&self, agent: &mut Agent, args: &[Value]) -> VmResult<Arc<JsTypedArray>> {
        let created = match species_constructor(agent, self.object())? {
            Species::Default => Arc::new(JsTypedArray::construct(agent, self.kind(), args)?),
            Species::Custom(ctor) => {
                let value = ctor.construct(agent, args)?;
                value.as_typed_array().cloned().ok_or_else(|| {
                    VmError::type_error("species constructor did not return a TypedArray")
                })?
            }
        };
        let len = created.validate()?;
        if let [Value::Number(n)] = args {
            if (len as f64) < *n {
                return Err(VmError::type_error(
                    "species constructor returned a too-short TypedArray",
                ));
            }
        }
        if created.kind().is_bigint() != self.kind().is_bigint() {
            return Err(VmError::type_error(
                "species constructor returned a TypedArray of a different content type",
            ));
        }
        Ok(created)
    }

    // ========================================================================
    // In-place mutation
    // ========================================================================

    /// `%TypedArray%.prototype.copyWithin(target, start, end)`
    pub fn copy_within(
        &self,
        agent: &mut Agent,
        target: &Value,
        start: &Value,
        end: &Value,
    ) -> VmResult<()> {
        let len = self.validate()?;
        let to = convert::relative_index(convert::to_integer_or_infinity(agent, target)?, len);
        let from = convert::relative_index(convert::to_integer_or_infinity(agent, start)?, len);
        let last = if end.is_undefined() {
            len
        } else {
            convert::relative_index(convert::to_integer_or_infinity(agent, end)?, len)
        };
        let count = last.saturating_sub(from).min(len - to);
        if count == 0 {
            return Ok(());
        }

        // Coercions above may have shrunk or detached the buffer.
        let len = self.validate()?;
        let size = self.kind().element_size();
        let offset = self.view_byte_offset();
        let limit = offset + len * size;
        let to_byte = offset + to * size;
        let from_byte = offset + from * size;
        if to_byte >= limit || from_byte >= limit {
            return Ok(());
        }
        let count_bytes = (count * size).min(limit - from_byte).min(limit - to_byte);
        self.buffer().copy_within(from_byte, to_byte, count_bytes);
        Ok(())
    }

    /// `%TypedArray%.prototype.fill(value, start, end)`
    ///
    /// The value is coerced once, before the range arguments.
    pub fn fill(&self, agent: &mut Agent, value: &Value, start: &Value, end: &Value) -> VmResult<()> {
        let len = self.validate()?;
        let numeric = self.kind().coerce(agent, value)?;
        let first = convert::relative_index(convert::to_integer_or_infinity(agent, start)?, len);
        let last = if end.is_undefined() {
            len
        } else {
            convert::relative_index(convert::to_integer_or_infinity(agent, end)?, len)
        };

        let len = self.validate()?;
        let last = last.min(len);
        for k in first..last {
            self.set_element(k, &numeric);
        }
        Ok(())
    }

    /// `%TypedArray%.prototype.reverse()`
    pub fn reverse(&self) -> VmResult<()> {
        let len = self.validate()?;
        let size = self.kind().element_size();
        let offset = self.view_byte_offset();
        let mut bytes = self
            .buffer()
            .read_vec(offset, len * size)
            .ok_or_else(detached_error)?;
        let mut reversed = Vec::with_capacity(bytes.len());
        for chunk in bytes.chunks_exact(size).rev() {
            reversed.extend_from_slice(chunk);
        }
        bytes.copy_from_slice(&reversed);
        self.buffer().write_bytes(offset, &bytes);
        Ok(())
    }

    /// `%TypedArray%.prototype.set(source, offset)`
    pub fn set_from(&self, agent: &mut Agent, source: &Value, offset: &Value) -> VmResult<()> {
        let target_offset = convert::to_integer_or_infinity(agent, offset)?;
        if target_offset < 0.0 {
            return Err(VmError::range_error("offset is out of bounds"));
        }
        match source {
            Value::Object(HeapRef::TypedArray(src)) => self.set_from_typed_array(src, target_offset),
            _ => self.set_from_array_like(agent, source, target_offset),
        }
    }

    fn set_from_typed_array(&self, source: &JsTypedArray, target_offset: f64) -> VmResult<()> {
        let target_len = self.validate()?;
        let src_len = source.validate()?;
        if self.kind().is_bigint() != source.kind().is_bigint() {
            return Err(VmError::type_error(
                "Cannot mix BigInt and other types, use explicit conversions",
            ));
        }
        if target_offset.is_infinite() || src_len as f64 + target_offset > target_len as f64 {
            return Err(VmError::range_error("offset is out of bounds"));
        }
        let target_offset = target_offset as usize;
        let src_size = source.kind().element_size();

        // Snapshot the source first: both views may alias one buffer.
        let bytes = source
            .buffer()
            .read_vec(source.view_byte_offset(), src_len * src_size)
            .ok_or_else(detached_error)?;

        if source.kind() == self.kind() {
            let dst = self.view_byte_offset() + target_offset * src_size;
            self.buffer().write_bytes(dst, &bytes);
        } else {
            for (i, chunk) in bytes.chunks_exact(src_size).enumerate() {
                let value = source.kind().decode(chunk, NATIVE_LITTLE_ENDIAN);
                self.set_element(target_offset + i, &value);
            }
        }
        Ok(())
    }

    fn set_from_array_like(&self, agent: &mut Agent, source: &Value, target_offset: f64) -> VmResult<()> {
        let target_len = self.validate()?;
        let src = array_like_source(source)?;
        let length_value = src.get(agent, "length")?;
        let src_len = convert::to_length(agent, &length_value)?;
        if target_offset.is_infinite() || src_len as f64 + target_offset > target_len as f64 {
            return Err(VmError::range_error("offset is out of bounds"));
        }
        let target_offset = target_offset as usize;
        for k in 0..src_len {
            let value = src.get(agent, &k.to_string())?;
            self.set(agent, (target_offset + k) as f64, &value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Copies
    // ========================================================================

    /// `%TypedArray%.prototype.slice(start, end)`
    pub fn slice(&self, agent: &mut Agent, start: &Value, end: &Value) -> VmResult<Arc<JsTypedArray>> {
        let len = self.validate()?;
        let first = convert::relative_index(convert::to_integer_or_infinity(agent, start)?, len);
        let last = if end.is_undefined() {
            len
        } else {
            convert::relative_index(convert::to_integer_or_infinity(agent, end)?, len)
        };
        let count = last.saturating_sub(first);
        let result = self.species_create(agent, &[Value::number(count as f64)])?;
        if count == 0 {
            return Ok(result);
        }

        let len = self.validate()?;
        let last = last.min(len);
        if first >= last {
            return Ok(result);
        }
        if result.kind() == self.kind() {
            let size = self.kind().element_size();
            let bytes = self
                .buffer()
                .read_vec(self.view_byte_offset() + first * size, (last - first) * size)
                .ok_or_else(detached_error)?;
            result.buffer().write_bytes(result.view_byte_offset(), &bytes);
        } else {
            for (n, k) in (first..last).enumerate() {
                if let Some(value) = self.get_element(k) {
                    result.set_element(n, &value);
                }
            }
        }
        Ok(result)
    }

    /// `%TypedArray%.prototype.subarray(start, end)`: a new view on the same buffer
    pub fn subarray(&self, agent: &mut Agent, start: &Value, end: &Value) -> VmResult<Arc<JsTypedArray>> {
        let src_len = self.length();
        let begin = convert::relative_index(convert::to_integer_or_infinity(agent, start)?, src_len);
        let begin_byte_offset = self.view_byte_offset() + begin * self.kind().element_size();
        let buffer = self.buffer().to_value();

        let args = if self.is_length_tracking() && end.is_undefined() {
            vec![buffer, Value::number(begin_byte_offset as f64)]
        } else {
            let last = if end.is_undefined() {
                src_len
            } else {
                convert::relative_index(convert::to_integer_or_infinity(agent, end)?, src_len)
            };
            let new_length = last.saturating_sub(begin);
            vec![
                buffer,
                Value::number(begin_byte_offset as f64),
                Value::number(new_length as f64),
            ]
        };
        self.species_create(agent, &args)
    }

    /// `%TypedArray%.prototype.toReversed()`
    pub fn to_reversed(&self, agent: &Agent) -> VmResult<Arc<JsTypedArray>> {
        let len = self.validate()?;
        let result = JsTypedArray::with_length(agent, self.kind(), len)?;
        for k in 0..len {
            if let Some(value) = self.get_element(len - 1 - k) {
                result.set_element(k, &value);
            }
        }
        Ok(Arc::new(result))
    }

    /// `%TypedArray%.prototype.with(index, value)`
    pub fn with(&self, agent: &mut Agent, index: &Value, value: &Value) -> VmResult<Arc<JsTypedArray>> {
        let len = self.validate()?;
        let relative = convert::to_integer_or_infinity(agent, index)?;
        let actual = if relative >= 0.0 { relative } else { len as f64 + relative };
        let numeric = self.kind().coerce(agent, value)?;
        if !self.is_valid_integer_index(actual) {
            return Err(VmError::range_error("Invalid typed array index"));
        }
        let actual = actual as usize;
        let result = JsTypedArray::with_length(agent, self.kind(), len)?;
        for k in 0..len {
            if k == actual {
                result.set_element(k, &numeric);
                continue;
            }
            match self.get_element(k) {
                Some(existing) => {
                    result.set_element(k, &existing);
                }
                None => result.set(agent, k as f64, &Value::Undefined)?,
            }
        }
        Ok(Arc::new(result))
    }

    /// `%TypedArray%.prototype.at(index)`
    pub fn at(&self, agent: &mut Agent, index: &Value) -> VmResult<Value> {
        let len = self.validate()?;
        let relative = convert::to_integer_or_infinity(agent, index)?;
        let k = if relative >= 0.0 { relative } else { len as f64 + relative };
        Ok(self.get(k).map_or(Value::Undefined, |n| n.to_value()))
    }

    // ========================================================================
    // Sorting
    // ========================================================================

    /// `%TypedArray%.prototype.sort(comparator)`
    pub fn sort(&self, agent: &mut Agent, comparator: &Value) -> VmResult<()> {
        check_comparator(comparator)?;
        let len = self.validate()?;
        let values: Vec<Numeric> = (0..len).filter_map(|k| self.get_element(k)).collect();
        let sorted = sort_numerics(agent, values, comparator)?;
        for (k, value) in sorted.iter().enumerate() {
            self.set_element(k, value);
        }
        Ok(())
    }

    /// `%TypedArray%.prototype.toSorted(comparator)`
    pub fn to_sorted(&self, agent: &mut Agent, comparator: &Value) -> VmResult<Arc<JsTypedArray>> {
        check_comparator(comparator)?;
        let len = self.validate()?;
        let result = JsTypedArray::with_length(agent, self.kind(), len)?;
        let values: Vec<Numeric> = (0..len).filter_map(|k| self.get_element(k)).collect();
        let sorted = sort_numerics(agent, values, comparator)?;
        for (k, value) in sorted.iter().enumerate() {
            result.set_element(k, value);
        }
        Ok(Arc::new(result))
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// `%TypedArray%.prototype.indexOf(search, fromIndex)`; -1 when absent
    pub fn index_of(&self, agent: &mut Agent, search: &Value, from_index: &Value) -> VmResult<i64> {
        let len = self.validate()?;
        if len == 0 {
            return Ok(-1);
        }
        let n = convert::to_integer_or_infinity(agent, from_index)?;
        if n == f64::INFINITY {
            return Ok(-1);
        }
        let start = if n >= 0.0 {
            n as usize
        } else {
            (len as f64 + n).max(0.0) as usize
        };
        if start >= len {
            return Ok(-1);
        }
        let Some(target) = self.search_key(search) else {
            return Ok(-1);
        };
        if let Some(found) = self.scan_bytes(&target, start, len, false) {
            return Ok(found);
        }
        for k in start..len {
            if self.get_element(k).is_some_and(|e| strict_equals(&e, &target)) {
                return Ok(k as i64);
            }
        }
        Ok(-1)
    }

    /// `%TypedArray%.prototype.lastIndexOf(search, fromIndex)`; `from_index`
    /// is `None` when the argument was not passed at all
    pub fn last_index_of(
        &self,
        agent: &mut Agent,
        search: &Value,
        from_index: Option<&Value>,
    ) -> VmResult<i64> {
        let len = self.validate()?;
        if len == 0 {
            return Ok(-1);
        }
        let n = match from_index {
            Some(value) => convert::to_integer_or_infinity(agent, value)?,
            None => len as f64 - 1.0,
        };
        if n == f64::NEG_INFINITY {
            return Ok(-1);
        }
        let k = if n >= 0.0 {
            n.min(len as f64 - 1.0)
        } else {
            len as f64 + n
        };
        if k < 0.0 {
            return Ok(-1);
        }
        let last = k as usize;
        let Some(target) = self.search_key(search) else {
            return Ok(-1);
        };
        if let Some(found) = self.scan_bytes(&target, 0, last + 1, true) {
            return Ok(found);
        }
        for k in (0..=last).rev() {
            if self.get_element(k).is_some_and(|e| strict_equals(&e, &target)) {
                return Ok(k as i64);
            }
        }
        Ok(-1)
    }

    /// `%TypedArray%.prototype.includes(search, fromIndex)` (SameValueZero)
    pub fn includes(&self, agent: &mut Agent, search: &Value, from_index: &Value) -> VmResult<bool> {
        let len = self.validate()?;
        if len == 0 {
            return Ok(false);
        }
        let n = convert::to_integer_or_infinity(agent, from_index)?;
        if n == f64::INFINITY {
            return Ok(false);
        }
        let start = if n >= 0.0 {
            n as usize
        } else {
            (len as f64 + n).max(0.0) as usize
        };
        if start >= len {
            return Ok(false);
        }
        // Elements that vanished during coercion read as undefined.
        if search.is_undefined() {
            return Ok(self.length() < len);
        }
        let Some(target) = self.search_key(search) else {
            return Ok(false);
        };
        if let Some(found) = self.scan_bytes(&target, start, len, false) {
            return Ok(found >= 0);
        }
        Ok((start..len).any(|k| {
            self.get_element(k)
                .is_some_and(|e| same_value_zero(&e, &target))
        }))
    }

    /// The search value as a lane value, if it can ever match this array
    fn search_key(&self, search: &Value) -> Option<Numeric> {
        match search {
            Value::Number(n) if !self.kind().is_bigint() => Some(Numeric::Number(*n)),
            Value::BigInt(b) if self.kind().is_bigint() => Some(Numeric::BigInt((**b).clone())),
            _ => None,
        }
    }

    /// Byte-scanning fast path over `[start, end)`. Only taken when the search
    /// value has exactly one bit pattern in this lane; returns `None` when the
    /// fast path does not apply, otherwise the index found or -1.
    fn scan_bytes(&self, target: &Numeric, start: usize, end: usize, backwards: bool) -> Option<i64> {
        let kind = self.kind();
        if let Numeric::Number(n) = target {
            if n.is_nan() || *n == 0.0 {
                return None;
            }
        }
        let raw = kind.to_raw(target);
        if kind.from_raw(raw) != *target {
            return None;
        }
        let size = kind.element_size();
        let mut needle = [0u8; 8];
        kind.raw_to_bytes(raw, NATIVE_LITTLE_ENDIAN, &mut needle[..size]);
        let haystack = self
            .buffer()
            .read_vec(self.view_byte_offset() + start * size, (end - start) * size)?;
        let mut chunks = haystack.chunks_exact(size);
        let position = if backwards {
            chunks.rposition(|chunk| chunk == &needle[..size])
        } else {
            chunks.position(|chunk| chunk == &needle[..size])
        };
        Some(position.map_or(-1, |i| (start + i) as i64))
    }
}

/// ToObject for the `set` source; anything without indexed properties reads
/// as an empty array-like
fn array_like_source(source: &Value) -> VmResult<Arc<JsObject>> {
    match source {
        Value::Undefined | Value::Null => Err(VmError::type_error(
            "Cannot convert undefined or null to object",
        )),
        Value::Object(HeapRef::Object(obj)) => Ok(obj.clone()),
        Value::String(s) => Ok(Arc::new(JsObject::array_like(
            s.chars().map(|c| Value::string(&c.to_string())).collect(),
        ))),
        _ => Ok(Arc::new(JsObject::new())),
    }
}

fn check_comparator(comparator: &Value) -> VmResult<()> {
    match comparator {
        Value::Undefined => Ok(()),
        Value::Object(HeapRef::Function(f)) if f.is_callable() => Ok(()),
        _ => Err(VmError::type_error(
            "The comparison function must be either a function or undefined",
        )),
    }
}

fn strict_equals(a: &Numeric, b: &Numeric) -> bool {
    match (a, b) {
        (Numeric::Number(x), Numeric::Number(y)) => x == y,
        (Numeric::BigInt(x), Numeric::BigInt(y)) => x == y,
        _ => false,
    }
}

fn same_value_zero(a: &Numeric, b: &Numeric) -> bool {
    match (a, b) {
        (Numeric::Number(x), Numeric::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => strict_equals(a, b),
    }
}

/// Default TypedArray order: NaN last, -0 before +0
fn default_compare(a: &Numeric, b: &Numeric) -> Ordering {
    match (a, b) {
        (Numeric::Number(x), Numeric::Number(y)) => match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ if x < y => Ordering::Less,
            _ if x > y => Ordering::Greater,
            _ if *x == 0.0 && *y == 0.0 => {
                match (x.is_sign_negative(), y.is_sign_negative()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            }
            _ => Ordering::Equal,
        },
        (Numeric::BigInt(x), Numeric::BigInt(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn compare_with(agent: &mut Agent, comparator: &Value, a: &Numeric, b: &Numeric) -> VmResult<Ordering> {
    let Value::Object(HeapRef::Function(f)) = comparator else {
        return Ok(default_compare(a, b));
    };
    let result = f.call(agent, &Value::Undefined, &[a.to_value(), b.to_value()])?;
    let n = convert::to_number(agent, &result)?;
    Ok(if n < 0.0 {
        Ordering::Less
    } else if n > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    })
}

/// Stable merge sort that stops at the first comparator error
fn sort_numerics(agent: &mut Agent, values: Vec<Numeric>, comparator: &Value) -> VmResult<Vec<Numeric>> {
    if values.len() <= 1 {
        return Ok(values);
    }
    let mut values = values;
    let right = values.split_off(values.len() / 2);
    let left = sort_numerics(agent, values, comparator)?;
    let right = sort_numerics(agent, right, comparator)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if compare_with(agent, comparator, r, l)? == Ordering::Less {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
