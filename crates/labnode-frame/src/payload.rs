//! CBOR field maps.
//!
//! Every request and response is a CBOR map keyed by small signed integers.
//! [`Fields`] keeps the keys sorted, so encoding the same map always yields
//! the same bytes.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FrameError, Result};

/// An integer-keyed field map, the body of every frame.
pub type Fields = BTreeMap<i32, Value>;

/// A typed value carried in a field map.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value. Used as the argument of getter requests.
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Fields),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer value converted to `u64`, if non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|value| u64::try_from(value).ok())
    }

    /// Numeric value as `f64`. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(value) => Some(value),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Bytes(value) => {
                for byte in value {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Text(value) => f.write_str(value),
            Value::Array(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(fields) => {
                f.write_str("{")?;
                for (index, (key, item)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Fields> for Value {
    fn from(value: Fields) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Encode a field map as a CBOR map with keys in ascending order.
pub fn encode_payload(fields: &Fields) -> Result<Vec<u8>> {
    let value = fields_to_cbor(fields);
    let mut out = Vec::with_capacity(16 + fields.len() * 4);
    ciborium::ser::into_writer(&value, &mut out)
        .map_err(|err| FrameError::Payload(err.to_string()))?;
    Ok(out)
}

/// Decode a CBOR payload into a field map.
///
/// The payload must be exactly one map whose keys fit in an `i32`.
pub fn decode_payload(bytes: &[u8]) -> Result<Fields> {
    let mut rest = bytes;
    let value: ciborium::Value = ciborium::de::from_reader(&mut rest)
        .map_err(|err| FrameError::Payload(err.to_string()))?;
    if !rest.is_empty() {
        return Err(FrameError::Payload(format!(
            "{} trailing bytes after the map",
            rest.len()
        )));
    }
    match value {
        ciborium::Value::Map(entries) => cbor_to_fields(entries),
        other => Err(FrameError::Payload(format!(
            "expected a map, found {}",
            cbor_kind(&other)
        ))),
    }
}

fn fields_to_cbor(fields: &Fields) -> ciborium::Value {
    ciborium::Value::Map(
        fields
            .iter()
            .map(|(key, value)| (ciborium::Value::from(*key), value_to_cbor(value)))
            .collect(),
    )
}

fn value_to_cbor(value: &Value) -> ciborium::Value {
    match value {
        Value::Null => ciborium::Value::Null,
        Value::Bool(value) => ciborium::Value::Bool(*value),
        Value::Integer(value) => ciborium::Value::from(*value),
        Value::Float(value) => ciborium::Value::Float(*value),
        Value::Bytes(value) => ciborium::Value::Bytes(value.clone()),
        Value::Text(value) => ciborium::Value::Text(value.clone()),
        Value::Array(items) => ciborium::Value::Array(items.iter().map(value_to_cbor).collect()),
        Value::Map(fields) => fields_to_cbor(fields),
    }
}

fn cbor_to_fields(entries: Vec<(ciborium::Value, ciborium::Value)>) -> Result<Fields> {
    let mut fields = Fields::new();
    for (key, value) in entries {
        let key = match key {
            ciborium::Value::Integer(key) => i32::try_from(i128::from(key))
                .map_err(|_| FrameError::Payload(format!("map key {} out of range", i128::from(key))))?,
            other => {
                return Err(FrameError::Payload(format!(
                    "map keys must be integers, found {}",
                    cbor_kind(&other)
                )))
            }
        };
        fields.insert(key, cbor_to_value(value)?);
    }
    Ok(fields)
}

fn cbor_to_value(value: ciborium::Value) -> Result<Value> {
    Ok(match value {
        ciborium::Value::Null => Value::Null,
        ciborium::Value::Bool(value) => Value::Bool(value),
        ciborium::Value::Integer(value) => {
            let wide = i128::from(value);
            Value::Integer(
                i64::try_from(wide)
                    .map_err(|_| FrameError::Payload(format!("integer {wide} out of range")))?,
            )
        }
        ciborium::Value::Float(value) => Value::Float(value),
        ciborium::Value::Bytes(value) => Value::Bytes(value),
        ciborium::Value::Text(value) => Value::Text(value),
        ciborium::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(cbor_to_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        ciborium::Value::Map(entries) => Value::Map(cbor_to_fields(entries)?),
        // Tags carry no meaning in this protocol.
        ciborium::Value::Tag(_, inner) => cbor_to_value(*inner)?,
        other => {
            return Err(FrameError::Payload(format!(
                "unsupported CBOR item: {}",
                cbor_kind(&other)
            )))
        }
    })
}

fn cbor_kind(value: &ciborium::Value) -> &'static str {
    match value {
        ciborium::Value::Null => "null",
        ciborium::Value::Bool(_) => "bool",
        ciborium::Value::Integer(_) => "integer",
        ciborium::Value::Float(_) => "float",
        ciborium::Value::Bytes(_) => "bytes",
        ciborium::Value::Text(_) => "text",
        ciborium::Value::Array(_) => "array",
        ciborium::Value::Map(_) => "map",
        ciborium::Value::Tag(..) => "tag",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_keys_in_ascending_order() {
        let mut fields = Fields::new();
        fields.insert(5, Value::Bool(true));
        fields.insert(-1, Value::Integer(3));
        fields.insert(-9, Value::Null);

        let bytes = encode_payload(&fields).unwrap();
        // a3 = map(3); keys -9 (0x28), -1 (0x20), 5 (0x05)
        assert_eq!(bytes, vec![0xa3, 0x28, 0xf6, 0x20, 0x03, 0x05, 0xf5]);
    }

    #[test]
    fn rejects_trailing_bytes() {
        // {-1: 3} followed by a stray integer.
        let err = decode_payload(&[0xa1, 0x20, 0x03, 0x05]).unwrap_err();
        assert!(matches!(err, FrameError::Payload(ref msg) if msg.contains("trailing")));
        assert!(decode_payload(&[0xa1, 0x20, 0x03]).is_ok());
    }

    #[test]
    fn request_id_encodes_in_one_byte() {
        let mut fields = Fields::new();
        fields.insert(-1, Value::Integer(23));
        assert_eq!(encode_payload(&fields).unwrap(), vec![0xa1, 0x20, 0x17]);
    }

    #[test]
    fn decodes_nested_values() {
        let mut inner = Fields::new();
        inner.insert(1, Value::from("pid"));
        let mut fields = Fields::new();
        fields.insert(-1, Value::from(7u8));
        fields.insert(-8, Value::from(vec![0x02u8, 0x00, 0xff]));
        fields.insert(19, Value::Map(inner));
        fields.insert(
            20,
            Value::Array(vec![Value::Float(1.5), Value::Integer(-4000000000)]),
        );

        let bytes = encode_payload(&fields).unwrap();
        assert_eq!(decode_payload(&bytes).unwrap(), fields);
    }

    #[test]
    fn rejects_non_map_payload() {
        // CBOR unsigned integer 1
        let err = decode_payload(&[0x01]).unwrap_err();
        assert!(matches!(err, FrameError::Payload(msg) if msg.contains("expected a map")));
    }

    #[test]
    fn rejects_text_keys() {
        // {"a": 1}
        let err = decode_payload(&[0xa1, 0x61, 0x61, 0x01]).unwrap_err();
        assert!(matches!(err, FrameError::Payload(msg) if msg.contains("integers")));
    }

    #[test]
    fn rejects_truncated_cbor() {
        // map(2) with a single entry
        assert!(matches!(
            decode_payload(&[0xa2, 0x20, 0x01]),
            Err(FrameError::Payload(_))
        ));
        assert!(matches!(decode_payload(&[]), Err(FrameError::Payload(_))));
    }

    #[test]
    fn rejects_keys_outside_i32() {
        // {4294967296: null}
        let bytes = [0xa1, 0x1b, 0, 0, 0, 1, 0, 0, 0, 0, 0xf6];
        assert!(matches!(
            decode_payload(&bytes),
            Err(FrameError::Payload(msg)) if msg.contains("out of range")
        ));
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::Integer(4).as_f64(), Some(4.0));
        assert_eq!(Value::Integer(-4).as_u64(), None);
        assert_eq!(Value::from(Some(true)).as_bool(), Some(true));
        assert!(Value::from(None::<u32>).is_null());
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(vec![1u8, 2]).to_string(), "0102");
        assert_eq!(
            Value::Array(vec![Value::Integer(1), Value::Null]).to_string(),
            "[1, null]"
        );
    }
}
