//! Payload values an envelope can carry.
//!
//! Primitives serialize as their natural JSON form. Raw bytes travel as a
//! base64 string, the representation .NET-style JSON stacks use for byte
//! arrays, so frames stay readable by peers on the other side.

use std::fmt;

use base64::prelude::*;
use bytes::Bytes;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

mod sealed {
    pub trait Sealed {}
}

/// A value type that can ride in a [`TypedEnvelope`](crate::TypedEnvelope).
///
/// Sealed: the set of payload types is fixed.
pub trait PayloadValue: sealed::Sealed + Clone + fmt::Debug + Send + Sync + 'static {
    /// Short type label used in logs and decode errors.
    const TYPE_NAME: &'static str;

    fn serialize_value<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>;

    fn deserialize_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>;
}

macro_rules! primitive_payload {
    ($($ty:ty => $label:literal),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl PayloadValue for $ty {
                const TYPE_NAME: &'static str = $label;

                fn serialize_value<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    Serialize::serialize(self, serializer)
                }

                fn deserialize_value<'de, D: Deserializer<'de>>(
                    deserializer: D,
                ) -> Result<Self, D::Error> {
                    <$ty as Deserialize>::deserialize(deserializer)
                }
            }
        )*
    };
}

primitive_payload! {
    bool => "bool",
    i32 => "int",
    i64 => "long",
    f32 => "float",
    f64 => "double",
    String => "text",
}

impl sealed::Sealed for Bytes {}

impl PayloadValue for Bytes {
    const TYPE_NAME: &'static str = "bytes";

    fn serialize_value<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(self))
    }

    fn deserialize_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(|err| de::Error::custom(format!("invalid base64 bytes: {err}")))
    }
}

/// A payload value whose type is only known at runtime.
///
/// Decoding is best effort: JSON strings always become [`Value::Text`]
/// (base64 bytes are indistinguishable from text), integers become
/// [`Value::Int`] when they fit 32 bits and [`Value::Long`] otherwise, and
/// every other number becomes [`Value::Double`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Bytes),
}

impl Value {
    /// Type label of the carried value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => bool::TYPE_NAME,
            Value::Int(_) => i32::TYPE_NAME,
            Value::Long(_) => i64::TYPE_NAME,
            Value::Float(_) => f32::TYPE_NAME,
            Value::Double(_) => f64::TYPE_NAME,
            Value::Text(_) => String::TYPE_NAME,
            Value::Bytes(_) => Bytes::TYPE_NAME,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl sealed::Sealed for Value {}

impl PayloadValue for Value {
    const TYPE_NAME: &'static str = "dynamic";

    fn serialize_value<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => v.serialize_value(serializer),
            Value::Int(v) => v.serialize_value(serializer),
            Value::Long(v) => v.serialize_value(serializer),
            Value::Float(v) => v.serialize_value(serializer),
            Value::Double(v) => v.serialize_value(serializer),
            Value::Text(v) => v.serialize_value(serializer),
            Value::Bytes(v) => v.serialize_value(serializer),
        }
    }

    fn deserialize_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number or string")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(i32::try_from(v).map_or(Value::Long(v), Value::Int))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        if let Ok(small) = i32::try_from(v) {
            return Ok(Value::Int(small));
        }
        i64::try_from(v)
            .map(Value::Long)
            .map_err(|_| E::custom(format!("integer {v} out of range for long")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Text(v))
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Text,
    Bytes => Bytes,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Holder<T: PayloadValue> {
        #[serde(
            serialize_with = "PayloadValue::serialize_value",
            deserialize_with = "PayloadValue::deserialize_value",
            bound(serialize = "", deserialize = "")
        )]
        v: T,
    }

    fn to_json<T: PayloadValue>(v: T) -> String {
        serde_json::to_string(&Holder { v }).unwrap()
    }

    #[test]
    fn bytes_travel_as_base64() {
        let json = to_json(Bytes::from_static(b"\x00\x01hi"));
        assert_eq!(json, r#"{"v":"AAFoaQ=="}"#);

        let back: Holder<Bytes> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.v.as_ref(), b"\x00\x01hi");
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let err = serde_json::from_str::<Holder<Bytes>>(r#"{"v":"***"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn dynamic_value_picks_narrowest_integer() {
        let small: Holder<Value> = serde_json::from_str(r#"{"v":42}"#).unwrap();
        assert_eq!(small.v, Value::Int(42));

        let big: Holder<Value> = serde_json::from_str(r#"{"v":8589934592}"#).unwrap();
        assert_eq!(big.v, Value::Long(8_589_934_592));

        let negative: Holder<Value> = serde_json::from_str(r#"{"v":-3000000000}"#).unwrap();
        assert_eq!(negative.v, Value::Long(-3_000_000_000));
    }

    #[test]
    fn dynamic_value_other_shapes() {
        let b: Holder<Value> = serde_json::from_str(r#"{"v":true}"#).unwrap();
        assert_eq!(b.v, Value::Bool(true));
        let d: Holder<Value> = serde_json::from_str(r#"{"v":1.5}"#).unwrap();
        assert_eq!(d.v, Value::Double(1.5));
        let t: Holder<Value> = serde_json::from_str(r#"{"v":"hi"}"#).unwrap();
        assert_eq!(t.v, Value::Text("hi".to_string()));
        assert!(serde_json::from_str::<Holder<Value>>(r#"{"v":[1]}"#).is_err());
    }

    #[test]
    fn dynamic_value_serializes_like_its_variant() {
        assert_eq!(to_json(Value::Float(0.5)), r#"{"v":0.5}"#);
        assert_eq!(to_json(Value::from("x")), r#"{"v":"x"}"#);
        assert_eq!(to_json(Value::from(vec![255u8])), r#"{"v":"/w=="}"#);
        assert_eq!(Value::Long(1).type_name(), "long");
        assert_eq!(Value::Bytes(Bytes::from_static(b"ab")).to_string(), "<2 bytes>");
    }
}
