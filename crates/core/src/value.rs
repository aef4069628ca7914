//! Column values
//!
//! A `Value` is what a record column or a criterion carries. Only scalar
//! column types exist: structured data is the backend's business, and a
//! backend that stores JSON documents hands them over through
//! `TryFrom<serde_json::Value>`, which refuses anything non-scalar.
//!
//! ## Type Rules
//!
//! - `Int(1) != Float(1.0)` - different types are NEVER equal
//! - `Bytes` are not `String`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//!
//! The `Display` rendering is part of every cache fingerprint, so two values
//! render alike only when they are equal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DataError;

/// Scalar column value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// SQL `NULL`
    Null,
    /// Boolean column
    Bool(bool),
    /// Integer column, widened to 64 bits
    Int(i64),
    /// Floating point column
    Float(f64),
    /// Text column
    String(String),
    /// Binary column
    Bytes(Vec<u8>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

/// Column type of a [`Value`]
///
/// Carried by every [`Criterion`](crate::Criterion) so that backends can bind
/// parameters with the right database type even when the value is `Null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    /// Untyped null
    Null,
    /// Boolean
    Bool,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Text
    String,
    /// Binary
    Bytes,
}

impl TypeTag {
    /// Name used in log output
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Null => "Null",
            TypeTag::Bool => "Bool",
            TypeTag::Int => "Int",
            TypeTag::Float => "Float",
            TypeTag::String => "String",
            TypeTag::Bytes => "Bytes",
        }
    }

    /// Whether `value` may be bound to a parameter of this type
    ///
    /// `Null` binds to every type.
    pub fn accepts(&self, value: &Value) -> bool {
        value.is_null() || value.type_tag() == *self
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Column type of this value
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Bytes(_) => TypeTag::Bytes,
        }
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload; integers are not converted
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Binary payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Floats use the `Debug` form so `1.0` never renders like `Int(1)`; strings
/// are quoted so `String("1")` never renders like `Int(1)` either.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = DataError;

    fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
        match v {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                // u64 beyond i64 range falls back to float
                None => n.as_f64().map(Value::Float).ok_or_else(|| {
                    DataError::Serialization(format!("unrepresentable number {}", n))
                }),
            },
            serde_json::Value::String(s) => Ok(Value::String(s)),
            other => Err(DataError::Serialization(format!(
                "non-scalar JSON column: {}",
                other
            ))),
        }
    }
}
