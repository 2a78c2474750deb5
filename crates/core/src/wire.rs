//! Payload tree
//!
//! The payload section of an envelope is one `WireValue`. Scalars are written
//! bare. Anything with a schema notation is `Described`: the descriptor
//! selects the notation (and so the serializer) used to read the body.
//!
//! ```text
//! composite   Described { descriptor, List[field, field, ...] }   fields in notation order
//! enum        Described { descriptor, List[String(name), Int(ordinal)] }
//! list/set    Described { descriptor, List[item, ...] }
//! map         Described { descriptor, Map[(key, value), ...] }
//! aliased     Reference(index)   index of an earlier object, numbered in completion order
//! ```

use crate::types::PrimitiveKind;
use crate::value::Value;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node of the payload tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// Null
    Null,
    /// `boolean`
    Bool(bool),
    /// `byte`
    Byte(i8),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `char`
    Char(char),
    /// `string`
    String(String),
    /// `binary`
    Binary(Vec<u8>),
    /// `timestamp` as microseconds since the Unix epoch
    Timestamp(i64),
    /// `uuid`
    Uuid([u8; 16]),
    /// Sequence body
    List(Vec<WireValue>),
    /// Map body
    Map(Vec<(WireValue, WireValue)>),
    /// A value whose shape is given by a schema notation
    Described {
        /// Wire descriptor of the notation
        descriptor: String,
        /// Encoded body
        body: Box<WireValue>,
    },
    /// Back-reference to an object already present in the payload
    Reference(u32),
}

impl WireValue {
    /// Wrap a body under a descriptor.
    pub fn described(descriptor: impl Into<String>, body: WireValue) -> Self {
        WireValue::Described {
            descriptor: descriptor.into(),
            body: Box::new(body),
        }
    }

    /// Short label for error messages.
    pub fn label(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "boolean",
            WireValue::Byte(_) => "byte",
            WireValue::Short(_) => "short",
            WireValue::Int(_) => "int",
            WireValue::Long(_) => "long",
            WireValue::Float(_) => "float",
            WireValue::Double(_) => "double",
            WireValue::Char(_) => "char",
            WireValue::String(_) => "string",
            WireValue::Binary(_) => "binary",
            WireValue::Timestamp(_) => "timestamp",
            WireValue::Uuid(_) => "uuid",
            WireValue::List(_) => "list",
            WireValue::Map(_) => "map",
            WireValue::Described { .. } => "described",
            WireValue::Reference(_) => "reference",
        }
    }

    /// Bare wire form of a scalar value; `None` for non-scalars.
    pub fn from_scalar(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => WireValue::Null,
            Value::Bool(v) => WireValue::Bool(*v),
            Value::Byte(v) => WireValue::Byte(*v),
            Value::Short(v) => WireValue::Short(*v),
            Value::Int(v) => WireValue::Int(*v),
            Value::Long(v) => WireValue::Long(*v),
            Value::Float(v) => WireValue::Float(*v),
            Value::Double(v) => WireValue::Double(*v),
            Value::Char(v) => WireValue::Char(*v),
            Value::String(v) => WireValue::String(v.clone()),
            Value::Binary(v) => WireValue::Binary(v.clone()),
            Value::Timestamp(v) => WireValue::Timestamp(timestamp_micros(v)),
            Value::Uuid(v) => WireValue::Uuid(*v.as_bytes()),
            Value::Collection(_) | Value::Enum(_) | Value::Record(_) => return None,
        })
    }

    /// Scalar value of a bare wire node; `None` for structured nodes and
    /// out-of-range timestamps.
    pub fn to_scalar(&self) -> Option<Value> {
        Some(match self {
            WireValue::Null => Value::Null,
            WireValue::Bool(v) => Value::Bool(*v),
            WireValue::Byte(v) => Value::Byte(*v),
            WireValue::Short(v) => Value::Short(*v),
            WireValue::Int(v) => Value::Int(*v),
            WireValue::Long(v) => Value::Long(*v),
            WireValue::Float(v) => Value::Float(*v),
            WireValue::Double(v) => Value::Double(*v),
            WireValue::Char(v) => Value::Char(*v),
            WireValue::String(v) => Value::String(v.clone()),
            WireValue::Binary(v) => Value::Binary(v.clone()),
            WireValue::Timestamp(micros) => Value::Timestamp(timestamp_from_micros(*micros)?),
            WireValue::Uuid(bytes) => Value::Uuid(Uuid::from_bytes(*bytes)),
            WireValue::List(_)
            | WireValue::Map(_)
            | WireValue::Described { .. }
            | WireValue::Reference(_) => return None,
        })
    }

    /// Primitive kind of a bare scalar node.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            WireValue::Bool(_) => PrimitiveKind::Boolean,
            WireValue::Byte(_) => PrimitiveKind::Byte,
            WireValue::Short(_) => PrimitiveKind::Short,
            WireValue::Int(_) => PrimitiveKind::Int,
            WireValue::Long(_) => PrimitiveKind::Long,
            WireValue::Float(_) => PrimitiveKind::Float,
            WireValue::Double(_) => PrimitiveKind::Double,
            WireValue::Char(_) => PrimitiveKind::Char,
            WireValue::String(_) => PrimitiveKind::String,
            WireValue::Binary(_) => PrimitiveKind::Binary,
            WireValue::Timestamp(_) => PrimitiveKind::Timestamp,
            WireValue::Uuid(_) => PrimitiveKind::Uuid,
            _ => return None,
        })
    }

    /// Items of a list body.
    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::List(items) => Some(items),
            _ => None,
        }
    }
}

fn timestamp_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp() * 1_000_000 + i64::from(ts.timestamp_subsec_micros())
}

fn timestamp_from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}
