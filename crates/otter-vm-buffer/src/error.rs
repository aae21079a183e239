//! VM error types

use crate::value::Value;
use thiserror::Error;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., detached buffer, wrong receiver)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (e.g., invalid array length)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Syntax error (string to BigInt conversion)
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Heap limit reached
    #[error("OutOfMemory: {0}")]
    OutOfMemory(String),

    /// Thrown JS exception
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),
}

/// The error family, for callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `TypeError`
    Type,
    /// `RangeError`
    Range,
    /// `SyntaxError`
    Syntax,
    /// Engine-internal failure
    Internal,
    /// Heap limit reached
    OutOfMemory,
    /// A user value was thrown
    Exception,
}

/// A thrown JavaScript value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create a syntax error
    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError(msg.into())
    }

    /// Create an out-of-memory error
    pub fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::OutOfMemory(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create an exception from a thrown JS value
    pub fn exception(value: Value) -> Self {
        let message = match value.as_str() {
            Some(s) => s.to_string(),
            None => format!("{:?}", value),
        };
        Self::Exception(Box::new(ThrownValue { value, message }))
    }

    /// The error family
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeError(_) => ErrorKind::Type,
            Self::RangeError(_) => ErrorKind::Range,
            Self::SyntaxError(_) => ErrorKind::Syntax,
            Self::InternalError(_) => ErrorKind::Internal,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::Exception(_) => ErrorKind::Exception,
        }
    }

    /// The thrown value, if this is a user exception
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            Self::Exception(thrown) => Some(&thrown.value),
            _ => None,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;
