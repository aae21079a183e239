//! # Otter VM Buffer
//!
//! Binary data memory model for the Otter VM: backing stores, `ArrayBuffer`,
//! `SharedArrayBuffer`, the TypedArray family, `DataView`, and `Atomics`
//! including the wait/notify protocol.
//!
//! The crate is split the same way the rest of the VM is:
//! - core objects (`array_buffer`, `typed_array`, `data_view`, ...) expose
//!   a Rust API that works on already-coerced arguments
//! - `builtins` exposes the JS-facing natives as [`builtins::Op`]s that coerce
//!   arguments in language order before calling into the core objects

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod array_buffer;
pub mod atomics;
pub mod backing_store;
pub mod buffer;
pub mod builtins;
pub mod config;
pub mod convert;
pub mod data_view;
pub mod element;
pub mod error;
pub mod memory;
pub mod promise;
pub mod shared_buffer;
pub mod typed_array;
mod typed_array_methods;
pub mod value;

pub use agent::{Agent, AgentId};
pub use array_buffer::JsArrayBuffer;
pub use backing_store::BackingStore;
pub use buffer::BufferRef;
pub use builtins::{Op, OpRegistry};
pub use config::{AtomicsStrategyKind, BufferConfig};
pub use data_view::JsDataView;
pub use element::{ElementType, Numeric};
pub use error::{ErrorKind, VmError, VmResult};
pub use memory::MemoryManager;
pub use promise::{JsPromise, PromiseState};
pub use shared_buffer::{JsSharedArrayBuffer, SharedBackingStore};
pub use typed_array::{JsTypedArray, ViewLength};
pub use value::Value;
