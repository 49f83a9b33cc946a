//! # Call Values
//!
//! Arguments and results travel as `Value`s. The core does not validate
//! argument schemas; handlers pull out what they expect through `FromValue`
//! and report a `DecodeError` when the shape is wrong.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A dynamically typed argument or result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], DecodeError> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(DecodeError::mismatch("bytes", other)),
        }
    }
}

/// An argument did not have the shape the handler expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No argument at the requested position.
    Missing { index: usize },
    /// The argument had a different variant.
    Mismatch { expected: &'static str, found: &'static str },
}

impl DecodeError {
    pub fn mismatch(expected: &'static str, found: &Value) -> Self {
        Self::Mismatch { expected, found: found.kind() }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { index } => write!(f, "missing argument {}", index),
            Self::Mismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Returns a reference to argument `index`, or `DecodeError::Missing`.
pub fn arg(args: &[Value], index: usize) -> Result<&Value, DecodeError> {
    args.get(index).ok_or(DecodeError::Missing { index })
}

/// Conversion out of a `Value`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

/// Conversion into a `Value`.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(DecodeError::mismatch("bytes", &other)),
        }
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(DecodeError::mismatch("string", &other)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(DecodeError::mismatch("int", &other)),
        }
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(DecodeError::mismatch("bool", &other)),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Null
    }
}
