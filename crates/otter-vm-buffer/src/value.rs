//! Value representation and host objects
//!
//! `Value` is a tagged sum over the primitive types and references to heap
//! objects. Heap objects are reference counted; the garbage collector that
//! owns them in the full VM is outside this crate.
//!
//! [`JsObject`] is the minimal ordinary object this crate needs from its
//! collaborators: own properties (data or getter), an optional `valueOf`
//! hook, and an optional iterator hook. Getters and hooks run arbitrary code
//! with `&mut Agent`, which is how user code gets a chance to detach or
//! resize buffers in the middle of a builtin.

use crate::agent::Agent;
use crate::array_buffer::JsArrayBuffer;
use crate::data_view::JsDataView;
use crate::error::{VmError, VmResult};
use crate::promise::JsPromise;
use crate::shared_buffer::JsSharedArrayBuffer;
use crate::typed_array::JsTypedArray;
use num_bigint::BigInt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Native callable: `(agent, this, args) -> result`
pub type NativeFn = Arc<dyn Fn(&mut Agent, &Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// Native constructor: `(agent, args) -> new object`
pub type ConstructFn = Arc<dyn Fn(&mut Agent, &[Value]) -> VmResult<Value> + Send + Sync>;

/// Getter / hook with no arguments
pub type HookFn = Arc<dyn Fn(&mut Agent) -> VmResult<Value> + Send + Sync>;

/// Iterator hook: drains the iterable into a list
pub type IteratorFn = Arc<dyn Fn(&mut Agent) -> VmResult<Vec<Value>> + Send + Sync>;

/// A JavaScript value
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Number (IEEE-754 double)
    Number(f64),
    /// String
    String(Arc<str>),
    /// BigInt
    BigInt(Arc<BigInt>),
    /// Reference to a heap object
    Object(HeapRef),
}

/// Reference to a heap object
#[derive(Clone)]
pub enum HeapRef {
    /// Ordinary object
    Object(Arc<JsObject>),
    /// Function object
    Function(Arc<JsFunction>),
    /// ArrayBuffer
    ArrayBuffer(Arc<JsArrayBuffer>),
    /// SharedArrayBuffer
    SharedArrayBuffer(Arc<JsSharedArrayBuffer>),
    /// TypedArray of any element type
    TypedArray(Arc<JsTypedArray>),
    /// DataView
    DataView(Arc<JsDataView>),
    /// Promise
    Promise(Arc<JsPromise>),
}

impl HeapRef {
    /// Identity comparison
    pub fn same(&self, other: &HeapRef) -> bool {
        match (self, other) {
            (HeapRef::Object(a), HeapRef::Object(b)) => Arc::ptr_eq(a, b),
            (HeapRef::Function(a), HeapRef::Function(b)) => Arc::ptr_eq(a, b),
            (HeapRef::ArrayBuffer(a), HeapRef::ArrayBuffer(b)) => Arc::ptr_eq(a, b),
            (HeapRef::SharedArrayBuffer(a), HeapRef::SharedArrayBuffer(b)) => Arc::ptr_eq(a, b),
            (HeapRef::TypedArray(a), HeapRef::TypedArray(b)) => Arc::ptr_eq(a, b),
            (HeapRef::DataView(a), HeapRef::DataView(b)) => Arc::ptr_eq(a, b),
            (HeapRef::Promise(a), HeapRef::Promise(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// `undefined`
    #[inline]
    pub fn undefined() -> Self {
        Value::Undefined
    }

    /// `null`
    #[inline]
    pub fn null() -> Self {
        Value::Null
    }

    /// Boolean value
    #[inline]
    pub fn boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    /// Number value
    #[inline]
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// Number value from an int32
    #[inline]
    pub fn int32(n: i32) -> Self {
        Value::Number(n as f64)
    }

    /// String value
    pub fn string(s: &str) -> Self {
        Value::String(Arc::from(s))
    }

    /// BigInt value
    pub fn bigint(b: BigInt) -> Self {
        Value::BigInt(Arc::new(b))
    }

    /// Ordinary object value
    pub fn object(obj: Arc<JsObject>) -> Self {
        Value::Object(HeapRef::Object(obj))
    }

    /// Function value
    pub fn function(f: Arc<JsFunction>) -> Self {
        Value::Object(HeapRef::Function(f))
    }

    /// ArrayBuffer value
    pub fn array_buffer(ab: Arc<JsArrayBuffer>) -> Self {
        Value::Object(HeapRef::ArrayBuffer(ab))
    }

    /// SharedArrayBuffer value
    pub fn shared_array_buffer(sab: Arc<JsSharedArrayBuffer>) -> Self {
        Value::Object(HeapRef::SharedArrayBuffer(sab))
    }

    /// TypedArray value
    pub fn typed_array(ta: Arc<JsTypedArray>) -> Self {
        Value::Object(HeapRef::TypedArray(ta))
    }

    /// DataView value
    pub fn data_view(dv: Arc<JsDataView>) -> Self {
        Value::Object(HeapRef::DataView(dv))
    }

    /// Promise value
    pub fn promise(p: Arc<JsPromise>) -> Self {
        Value::Object(HeapRef::Promise(p))
    }

    /// Check if `undefined`
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if `null` or `undefined`
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if this is a heap reference
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Check if this is a BigInt
    #[inline]
    pub fn is_bigint(&self) -> bool {
        matches!(self, Value::BigInt(_))
    }

    /// Get as number
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as BigInt
    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Value::BigInt(b) => Some(b),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the heap reference
    pub fn as_heap(&self) -> Option<&HeapRef> {
        match self {
            Value::Object(h) => Some(h),
            _ => None,
        }
    }

    /// Get as ordinary object
    pub fn as_object(&self) -> Option<&Arc<JsObject>> {
        match self {
            Value::Object(HeapRef::Object(o)) => Some(o),
            _ => None,
        }
    }

    /// Get as function
    pub fn as_function(&self) -> Option<&Arc<JsFunction>> {
        match self {
            Value::Object(HeapRef::Function(f)) => Some(f),
            _ => None,
        }
    }

    /// Get as ArrayBuffer
    pub fn as_array_buffer(&self) -> Option<&Arc<JsArrayBuffer>> {
        match self {
            Value::Object(HeapRef::ArrayBuffer(ab)) => Some(ab),
            _ => None,
        }
    }

    /// Get as SharedArrayBuffer
    pub fn as_shared_array_buffer(&self) -> Option<&Arc<JsSharedArrayBuffer>> {
        match self {
            Value::Object(HeapRef::SharedArrayBuffer(sab)) => Some(sab),
            _ => None,
        }
    }

    /// Get as TypedArray
    pub fn as_typed_array(&self) -> Option<&Arc<JsTypedArray>> {
        match self {
            Value::Object(HeapRef::TypedArray(ta)) => Some(ta),
            _ => None,
        }
    }

    /// Get as DataView
    pub fn as_data_view(&self) -> Option<&Arc<JsDataView>> {
        match self {
            Value::Object(HeapRef::DataView(dv)) => Some(dv),
            _ => None,
        }
    }

    /// Get as Promise
    pub fn as_promise(&self) -> Option<&Arc<JsPromise>> {
        match self {
            Value::Object(HeapRef::Promise(p)) => Some(p),
            _ => None,
        }
    }

    /// Identity comparison of two heap references
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.same(b),
            _ => false,
        }
    }

    /// `typeof`-style name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::BigInt(_) => "bigint",
            Value::Object(HeapRef::Function(_)) => "function",
            Value::Object(_) => "object",
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::BigInt(b) => write!(f, "{}n", b),
            Value::Object(HeapRef::Object(_)) => write!(f, "[object Object]"),
            Value::Object(HeapRef::Function(func)) => write!(f, "[Function: {}]", func.name()),
            Value::Object(HeapRef::ArrayBuffer(ab)) => {
                write!(f, "ArrayBuffer {{ byteLength: {} }}", ab.byte_length())
            }
            Value::Object(HeapRef::SharedArrayBuffer(sab)) => {
                write!(f, "SharedArrayBuffer {{ byteLength: {} }}", sab.byte_length())
            }
            Value::Object(HeapRef::TypedArray(ta)) => {
                write!(f, "{}({})", ta.kind().name(), ta.length())
            }
            Value::Object(HeapRef::DataView(_)) => write!(f, "DataView"),
            Value::Object(HeapRef::Promise(p)) => write!(f, "{:?}", p),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::int32(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        Value::bigint(b)
    }
}

// ============================================================================
// Ordinary objects
// ============================================================================

#[derive(Clone)]
enum Property {
    Data(Value),
    Getter(HookFn),
}

/// Minimal ordinary object: own properties plus optional conversion hooks
#[derive(Default)]
pub struct JsObject {
    properties: RwLock<FxHashMap<String, Property>>,
    value_of: Option<HookFn>,
    iterator: Option<IteratorFn>,
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let props = self.properties.read();
        let mut keys: Vec<&String> = props.keys().collect();
        keys.sort();
        f.debug_struct("JsObject").field("keys", &keys).finish()
    }
}

impl JsObject {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Array-like object: `length` plus index properties, not iterable
    pub fn array_like(values: Vec<Value>) -> Self {
        let mut props = FxHashMap::default();
        props.insert(
            "length".to_string(),
            Property::Data(Value::number(values.len() as f64)),
        );
        for (i, v) in values.into_iter().enumerate() {
            props.insert(i.to_string(), Property::Data(v));
        }
        Self {
            properties: RwLock::new(props),
            ..Self::default()
        }
    }

    /// Array object: array-like and iterable over its elements
    pub fn array(values: Vec<Value>) -> Self {
        let items = values.clone();
        Self::array_like(values).with_iterator(move |_| Ok(items.clone()))
    }

    /// Add a data property
    pub fn with_property(self, key: &str, value: Value) -> Self {
        self.properties
            .write()
            .insert(key.to_string(), Property::Data(value));
        self
    }

    /// Add a getter property
    pub fn with_getter<F>(self, key: &str, getter: F) -> Self
    where
        F: Fn(&mut Agent) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.properties
            .write()
            .insert(key.to_string(), Property::Getter(Arc::new(getter)));
        self
    }

    /// Install a `valueOf` hook used by ToPrimitive
    pub fn with_value_of<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Agent) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.value_of = Some(Arc::new(hook));
        self
    }

    /// Make the object iterable
    pub fn with_iterator<F>(mut self, iter: F) -> Self
    where
        F: Fn(&mut Agent) -> VmResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.iterator = Some(Arc::new(iter));
        self
    }

    /// `[[Get]]`: data properties are cloned, getters run
    pub fn get(&self, agent: &mut Agent, key: &str) -> VmResult<Value> {
        // Lock must not be held while a getter runs.
        let prop = self.properties.read().get(key).cloned();
        match prop {
            Some(Property::Data(v)) => Ok(v),
            Some(Property::Getter(getter)) => getter(agent),
            None => Ok(Value::Undefined),
        }
    }

    /// `[[Set]]` as a data property
    pub fn set(&self, key: &str, value: Value) {
        self.properties
            .write()
            .insert(key.to_string(), Property::Data(value));
    }

    /// Check for an own property
    pub fn has_own_property(&self, key: &str) -> bool {
        self.properties.read().contains_key(key)
    }

    /// Run the `valueOf` hook, if any
    pub fn value_of(&self, agent: &mut Agent) -> Option<VmResult<Value>> {
        self.value_of.as_ref().map(|hook| hook(agent))
    }

    /// The iterator hook, if the object is iterable
    pub fn iterator(&self) -> Option<IteratorFn> {
        self.iterator.clone()
    }
}

// ============================================================================
// Functions and species lookup
// ============================================================================

/// A native function object
pub struct JsFunction {
    name: String,
    call: Option<NativeFn>,
    construct: Option<ConstructFn>,
    species: Option<HookFn>,
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsFunction")
            .field("name", &self.name)
            .field("callable", &self.call.is_some())
            .field("constructor", &self.construct.is_some())
            .finish()
    }
}

impl JsFunction {
    /// A function with neither call nor construct behavior yet
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            call: None,
            construct: None,
            species: None,
        }
    }

    /// Plain callable
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut Agent, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        Self::new(name).with_call(f)
    }

    /// Set `[[Call]]`
    pub fn with_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Agent, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.call = Some(Arc::new(f));
        self
    }

    /// Set `[[Construct]]`
    pub fn with_construct<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Agent, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.construct = Some(Arc::new(f));
        self
    }

    /// Install a `[Symbol.species]` getter
    pub fn with_species<F>(mut self, getter: F) -> Self
    where
        F: Fn(&mut Agent) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.species = Some(Arc::new(getter));
        self
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if callable
    pub fn is_callable(&self) -> bool {
        self.call.is_some()
    }

    /// Check if usable with `new`
    pub fn is_constructor(&self) -> bool {
        self.construct.is_some()
    }

    /// `[[Call]]`
    pub fn call(&self, agent: &mut Agent, this: &Value, args: &[Value]) -> VmResult<Value> {
        match &self.call {
            Some(f) => f(agent, this, args),
            None => Err(VmError::type_error(format!(
                "{} is not a function",
                self.name
            ))),
        }
    }

    /// `[[Construct]]`
    pub fn construct(&self, agent: &mut Agent, args: &[Value]) -> VmResult<Value> {
        match &self.construct {
            Some(f) => f(agent, args),
            None => Err(VmError::type_error(format!(
                "{} is not a constructor",
                self.name
            ))),
        }
    }
}

/// Result of a species-constructor lookup
#[derive(Clone)]
pub enum Species {
    /// Use the intrinsic constructor of the receiver's family
    Default,
    /// A user-supplied constructor
    Custom(Arc<JsFunction>),
}

/// SpeciesConstructor: read `holder.constructor`, then its `[Symbol.species]`.
///
/// Both reads may run user code.
pub fn species_constructor(agent: &mut Agent, holder: &JsObject) -> VmResult<Species> {
    let ctor = holder.get(agent, "constructor")?;
    let species = match &ctor {
        Value::Undefined => return Ok(Species::Default),
        Value::Object(HeapRef::Function(f)) => match &f.species {
            Some(getter) => getter(agent)?,
            None => ctor.clone(),
        },
        Value::Object(_) => Value::Undefined,
        _ => {
            return Err(VmError::type_error(
                "object.constructor is not an object",
            ));
        }
    };
    match species {
        Value::Undefined | Value::Null => Ok(Species::Default),
        Value::Object(HeapRef::Function(f)) if f.is_constructor() => Ok(Species::Custom(f)),
        _ => Err(VmError::type_error(
            "object.constructor[Symbol.species] is not a constructor",
        )),
    }
}

/// A property descriptor as passed to `[[DefineOwnProperty]]`
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    /// `[[Value]]`
    pub value: Option<Value>,
    /// `[[Writable]]`
    pub writable: Option<bool>,
    /// `[[Enumerable]]`
    pub enumerable: Option<bool>,
    /// `[[Configurable]]`
    pub configurable: Option<bool>,
    /// `[[Get]]`
    pub get: Option<Value>,
    /// `[[Set]]`
    pub set: Option<Value>,
}

impl PropertyDescriptor {
    /// Data descriptor carrying only a value
    pub fn value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// Check if this is an accessor descriptor
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }
}
