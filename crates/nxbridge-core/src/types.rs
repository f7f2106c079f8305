// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for nxbridge.
//!
//! This module defines the value model shared by the controller side and the
//! OPC UA side of the bridge:
//!
//! - [`Value`]: a dynamically typed value as produced by a controller session
//!   or carried by a client write
//! - [`DataType`]: the declared type of a tag, fixed at startup
//!
//! Every value cached or published by the synchronization engine is in the
//! canonical form for its tag's [`DataType`] (see [`DataType::coerce`]).

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// DataType
// =============================================================================

/// Declared type of a tag.
///
/// The declared type is chosen once when the tag definitions are loaded and
/// never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed 32-bit integer.
    Int32,
    /// 32-bit floating point.
    Float,
    /// Boolean.
    Bool,
    /// UTF-8 text.
    String,
}

impl DataType {
    /// Returns the canonical lowercase name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int32 => "int32",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::String => "string",
        }
    }

    /// Parses a type name.
    ///
    /// Besides the canonical names, a few common aliases are accepted
    /// (`int`, `dint`, `real`, `boolean`, `str`).
    ///
    /// # Examples
    ///
    /// ```
    /// use nxbridge_core::types::DataType;
    ///
    /// assert_eq!(DataType::parse("DINT"), Some(DataType::Int32));
    /// assert_eq!(DataType::parse("real"), Some(DataType::Float));
    /// assert_eq!(DataType::parse("lreal"), None);
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "int32" | "int" | "dint" => Some(DataType::Int32),
            "float" | "real" | "float32" => Some(DataType::Float),
            "bool" | "boolean" => Some(DataType::Bool),
            "string" | "str" => Some(DataType::String),
            _ => None,
        }
    }

    /// Converts a value into the canonical form for this type.
    ///
    /// Returns `None` when the value is not representable as this type:
    ///
    /// - `Int32` accepts any integer variant whose value fits in an `i32`
    /// - `Float` accepts `Float32`, finite `Float64` values within the `f32`
    ///   range, and integers that an `f32` represents exactly
    /// - `Bool` accepts only booleans
    /// - `String` accepts only text
    ///
    /// # Examples
    ///
    /// ```
    /// use nxbridge_core::types::{DataType, Value};
    ///
    /// assert_eq!(DataType::Int32.coerce(&Value::Int64(15)), Some(Value::Int32(15)));
    /// assert_eq!(DataType::Int32.coerce(&Value::Int64(1 << 40)), None);
    /// assert_eq!(DataType::Bool.coerce(&Value::Int32(1)), None);
    /// ```
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            DataType::Int32 => {
                if value.is_integer() {
                    value
                        .as_i64()
                        .and_then(|v| i32::try_from(v).ok())
                        .map(Value::Int32)
                } else {
                    None
                }
            }
            DataType::Float => match value {
                Value::Float32(v) => Some(Value::Float32(*v)),
                Value::Float64(v) => {
                    if v.is_nan() {
                        Some(Value::Float32(f32::NAN))
                    } else if v.is_finite() && v.abs() <= f32::MAX as f64 {
                        Some(Value::Float32(*v as f32))
                    } else {
                        None
                    }
                }
                _ if value.is_integer() => value
                    .as_i64()
                    .filter(|v| v.unsigned_abs() <= F32_EXACT_INT_LIMIT)
                    .map(|v| Value::Float32(v as f32)),
                _ => None,
            },
            DataType::Bool => value.as_bool().map(Value::Bool),
            DataType::String => value.as_str().map(|s| Value::String(s.to_string())),
        }
    }

    /// Returns the zero value of this type.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Int32 => Value::Int32(0),
            DataType::Float => Value::Float32(0.0),
            DataType::Bool => Value::Bool(false),
            DataType::String => Value::String(String::new()),
        }
    }
}

/// Largest integer magnitude an `f32` represents exactly (2^24).
const F32_EXACT_INT_LIMIT: u64 = 1 << 24;

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed value.
///
/// Controller sessions return whatever native representation their transport
/// produces, and OPC UA clients may write any variant. The engine converts
/// values to the canonical variant of the tag's [`DataType`] before comparing,
/// caching or publishing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Boolean value
    Bool(bool),

    /// Signed 8-bit integer
    Int8(i8),

    /// Signed 16-bit integer
    Int16(i16),

    /// Signed 32-bit integer
    Int32(i32),

    /// Signed 64-bit integer
    Int64(i64),

    /// Unsigned 8-bit integer
    UInt8(u8),

    /// Unsigned 16-bit integer
    UInt16(u16),

    /// Unsigned 32-bit integer
    UInt32(u32),

    /// Unsigned 64-bit integer
    UInt64(u64),

    /// 32-bit floating point
    Float32(f32),

    /// 64-bit floating point
    Float64(f64),

    /// UTF-8 string
    String(String),

    /// Raw bytes, e.g. an undecoded controller string
    Bytes(Vec<u8>),

    /// Null/undefined value
    Null,
}

impl Value {
    /// Returns the type name of this value.
    ///
    /// # Examples
    ///
    /// ```
    /// use nxbridge_core::types::Value;
    ///
    /// assert_eq!(Value::Int32(42).type_name(), "int32");
    /// assert_eq!(Value::String("x".into()).type_name(), "string");
    /// ```
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Null => "null",
        }
    }

    /// Returns `true` if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for the integer variants.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::Int8(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::UInt8(_)
                | Value::UInt16(_)
                | Value::UInt32(_)
                | Value::UInt64(_)
        )
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as an i64.
    ///
    /// Only integer variants convert; floats are never truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::UInt8(v) => Some(*v as i64),
            Value::UInt16(v) => Some(*v as i64),
            Value::UInt32(v) => Some(*v as i64),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to get the value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Compares two values for synchronization purposes.
    ///
    /// Identical to `==` except that floats compare bitwise, so a `NaN` read
    /// twice counts as unchanged.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Converts a JSON value into a [`Value`].
    ///
    /// JSON integers become `Int64` (or `UInt64` above `i64::MAX`), other
    /// numbers `Float64`. Arrays and objects have no representation and
    /// return `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int64(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Value::UInt64(u))
                } else {
                    n.as_f64().map(Value::Float64)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Converts this value to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int8(v) => serde_json::json!(v),
            Value::Int16(v) => serde_json::json!(v),
            Value::Int32(v) => serde_json::json!(v),
            Value::Int64(v) => serde_json::json!(v),
            Value::UInt8(v) => serde_json::json!(v),
            Value::UInt16(v) => serde_json::json!(v),
            Value::UInt32(v) => serde_json::json!(v),
            Value::UInt64(v) => serde_json::json!(v),
            Value::Float32(v) => serde_json::json!(v),
            Value::Float64(v) => serde_json::json!(v),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Bytes(v) => serde_json::json!(v),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

macro_rules! impl_from_for_value {
    ($variant:ident, $type:ty) => {
        impl From<$type> for Value {
            fn from(v: $type) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_for_value!(Bool, bool);
impl_from_for_value!(Int8, i8);
impl_from_for_value!(Int16, i16);
impl_from_for_value!(Int32, i32);
impl_from_for_value!(Int64, i64);
impl_from_for_value!(UInt8, u8);
impl_from_for_value!(UInt16, u16);
impl_from_for_value!(UInt32, u32);
impl_from_for_value!(UInt64, u64);
impl_from_for_value!(Float32, f32);
impl_from_for_value!(Float64, f64);
impl_from_for_value!(String, String);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("int32"), Some(DataType::Int32));
        assert_eq!(DataType::parse(" Float "), Some(DataType::Float));
        assert_eq!(DataType::parse("boolean"), Some(DataType::Bool));
        assert_eq!(DataType::parse("str"), Some(DataType::String));
        assert_eq!(DataType::parse("udt"), None);
    }

    #[test]
    fn test_coerce_int32() {
        assert_eq!(DataType::Int32.coerce(&Value::UInt8(7)), Some(Value::Int32(7)));
        assert_eq!(DataType::Int32.coerce(&Value::Int64(-15)), Some(Value::Int32(-15)));
        assert_eq!(DataType::Int32.coerce(&Value::Int64(i64::from(i32::MAX) + 1)), None);
        assert_eq!(DataType::Int32.coerce(&Value::Float64(15.0)), None);
        assert_eq!(DataType::Int32.coerce(&Value::String("15".into())), None);
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(DataType::Float.coerce(&Value::Float64(2.5)), Some(Value::Float32(2.5)));
        assert_eq!(DataType::Float.coerce(&Value::Int32(3)), Some(Value::Float32(3.0)));
        assert_eq!(DataType::Float.coerce(&Value::Int64(1 << 30)), None);
        assert_eq!(DataType::Float.coerce(&Value::Float64(f64::MAX)), None);
        assert_eq!(DataType::Float.coerce(&Value::Bool(true)), None);
    }

    #[test]
    fn test_coerce_bool_and_string() {
        assert_eq!(DataType::Bool.coerce(&Value::Bool(true)), Some(Value::Bool(true)));
        assert_eq!(DataType::Bool.coerce(&Value::Int32(0)), None);
        assert_eq!(
            DataType::String.coerce(&Value::from("abc")),
            Some(Value::String("abc".into()))
        );
        assert_eq!(DataType::String.coerce(&Value::Bytes(b"abc".to_vec())), None);
    }

    #[test]
    fn test_same_as_nan() {
        let a = Value::Float32(f32::NAN);
        assert_ne!(a, a.clone());
        assert!(a.same_as(&a.clone()));
        assert!(!Value::Int32(1).same_as(&Value::Int32(2)));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json(&serde_json::json!(10)), Some(Value::Int64(10)));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Some(Value::Float64(1.5)));
        assert_eq!(Value::from_json(&serde_json::json!(false)), Some(Value::Bool(false)));
        assert_eq!(Value::from_json(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int32(10).to_string(), "10");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(DataType::Float.to_string(), "float");
    }
}
