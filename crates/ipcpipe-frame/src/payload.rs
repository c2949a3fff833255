use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;

use crate::envelope::{Envelope, TypedEnvelope};
use crate::error::{FrameError, Result};
use crate::value::PayloadValue;

/// A decoded frame whose concrete envelope type is not yet known.
///
/// Decoding is two-phase. [`envelope`](Self::envelope) reads the base shape
/// so a receiver can branch on [`name`](Self::name); [`try_decode`](Self::try_decode)
/// then commits to a typed shape. A typed decode that does not match the
/// frame returns [`FrameError::Shape`].
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    json: serde_json::Value,
}

impl Payload {
    pub fn new(json: serde_json::Value) -> Self {
        Self { json }
    }

    /// Decode the base `name`/`sentAt` shape.
    pub fn envelope(&self) -> Result<Envelope> {
        self.try_decode()
    }

    /// Message name, when the frame carries a string `name` field.
    pub fn name(&self) -> Option<&str> {
        self.field("name", "Name").and_then(serde_json::Value::as_str)
    }

    /// Send time, when the frame carries a parseable `sentAt` field.
    pub fn sent_at(&self) -> Option<DateTime<FixedOffset>> {
        self.field("sentAt", "SentAt")
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    }

    /// Whether the frame carries a non-null `value` field.
    pub fn has_value(&self) -> bool {
        self.field("value", "Value")
            .is_some_and(|value| !value.is_null())
    }

    /// Re-decode the payload into `T`.
    pub fn try_decode<T: DeserializeOwned>(&self) -> Result<T> {
        <T as serde::Deserialize>::deserialize(&self.json).map_err(|source| FrameError::Shape {
            expected: std::any::type_name::<T>(),
            source,
        })
    }

    /// Decode the payload as a [`TypedEnvelope<V>`] and return its value.
    pub fn value<V: PayloadValue>(&self) -> Result<V> {
        self.try_decode::<TypedEnvelope<V>>()
            .map(TypedEnvelope::into_value)
            .map_err(|err| match err {
                FrameError::Shape { source, .. } => FrameError::Shape {
                    expected: V::TYPE_NAME,
                    source,
                },
                other => other,
            })
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.json
    }

    pub fn into_json(self) -> serde_json::Value {
        self.json
    }

    fn field(&self, camel: &str, pascal: &str) -> Option<&serde_json::Value> {
        let object = self.json.as_object()?;
        object.get(camel).or_else(|| object.get(pascal))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(json: serde_json::Value) -> Self {
        Self::new(json)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::envelope::{BytesEnvelope, IntEnvelope, TextEnvelope};
    use crate::value::Value;

    fn payload_of<T: serde::Serialize>(envelope: &T) -> Payload {
        Payload::new(serde_json::to_value(envelope).unwrap())
    }

    #[test]
    fn first_phase_reads_name_and_time() {
        let env = TextEnvelope::new("greet", "hi".into());
        let payload = payload_of(&env);

        let base = payload.envelope().unwrap();
        assert_eq!(base.name(), Some("greet"));
        assert_eq!(payload.name(), Some("greet"));
        assert_eq!(payload.sent_at(), Some(env.sent_at()));
        assert!(payload.has_value());
    }

    #[test]
    fn matching_name_decodes_typed_value() {
        let payload = payload_of(&IntEnvelope::new("myIntegerMessage", 41));
        let value = match payload.name() {
            Some("myIntegerMessage") => payload.value::<i32>().unwrap(),
            other => panic!("unexpected name {other:?}"),
        };
        assert_eq!(value, 41);
    }

    #[test]
    fn mismatched_shape_is_explicit_error() {
        let payload = payload_of(&TextEnvelope::new("textMessage", "hello".into()));
        let err = payload.value::<i32>().unwrap_err();
        match err {
            FrameError::Shape { expected, .. } => assert_eq!(expected, "int"),
            other => panic!("expected shape error, got {other:?}"),
        }
        assert!(payload.try_decode::<IntEnvelope>().is_err());
    }

    #[test]
    fn base_envelope_has_no_typed_value() {
        let payload = payload_of(&Envelope::new("ping"));
        assert!(!payload.has_value());
        assert!(matches!(
            payload.value::<bool>(),
            Err(FrameError::Shape { .. })
        ));
        assert!(payload.envelope().is_ok());
    }

    #[test]
    fn base_shape_requires_sent_at() {
        let payload = Payload::new(json!({ "name": "x", "value": 1 }));
        assert!(payload.envelope().is_err());
        assert!(payload.sent_at().is_none());
        assert_eq!(payload.name(), Some("x"));
    }

    #[test]
    fn dynamic_value_accepts_any_primitive() {
        let payload = payload_of(&BytesEnvelope::new("blob", Bytes::from_static(b"hey")));
        assert_eq!(payload.value::<Value>().unwrap(), Value::Text("aGV5".into()));
        assert_eq!(payload.value::<Bytes>().unwrap().as_ref(), b"hey");
    }

    #[test]
    fn custom_shapes_decode_through_try_decode() {
        #[derive(Deserialize)]
        struct Reading {
            #[serde(flatten)]
            envelope: Envelope,
            celsius: f64,
        }

        let payload = Payload::new(json!({
            "name": "temp",
            "sentAt": "2024-05-01T10:30:00Z",
            "celsius": 21.5,
        }));
        let reading: Reading = payload.try_decode().unwrap();
        assert_eq!(reading.envelope.name(), Some("temp"));
        assert_eq!(reading.celsius, 21.5);
        assert_eq!(payload.into_json()["celsius"], 21.5);
    }
}
