use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{PayloadValue, Value};

/// The base message shape: a name and the time it was sent.
///
/// Every frame on a channel decodes into this shape, whatever value it
/// carries. Receivers use it to look at `name` before committing to a
/// typed decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(alias = "SentAt")]
    sent_at: DateTime<FixedOffset>,
}

impl Envelope {
    /// Envelope named `name`, stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timestamp(Some(name.into()), now())
    }

    /// Envelope without a name, stamped with the current time.
    pub fn anonymous() -> Self {
        Self::with_timestamp(None, now())
    }

    /// Envelope with an explicit send time.
    pub fn with_timestamp(name: Option<String>, sent_at: DateTime<FixedOffset>) -> Self {
        Self { name, sent_at }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn sent_at(&self) -> DateTime<FixedOffset> {
        self.sent_at
    }
}

/// An envelope carrying exactly one value of type `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct TypedEnvelope<T: PayloadValue> {
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(alias = "SentAt")]
    sent_at: DateTime<FixedOffset>,
    #[serde(
        alias = "Value",
        serialize_with = "PayloadValue::serialize_value",
        deserialize_with = "PayloadValue::deserialize_value"
    )]
    value: T,
}

impl<T: PayloadValue> TypedEnvelope<T> {
    /// Envelope named `name` carrying `value`, stamped with the current time.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self::with_timestamp(Some(name.into()), now(), value)
    }

    pub fn anonymous(value: T) -> Self {
        Self::with_timestamp(None, now(), value)
    }

    pub fn with_timestamp(name: Option<String>, sent_at: DateTime<FixedOffset>, value: T) -> Self {
        Self {
            name,
            sent_at,
            value,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn sent_at(&self) -> DateTime<FixedOffset> {
        self.sent_at
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// The base shape of this envelope, without its value.
    pub fn envelope(&self) -> Envelope {
        Envelope::with_timestamp(self.name.clone(), self.sent_at)
    }
}

pub type BoolEnvelope = TypedEnvelope<bool>;
pub type IntEnvelope = TypedEnvelope<i32>;
pub type LongEnvelope = TypedEnvelope<i64>;
pub type FloatEnvelope = TypedEnvelope<f32>;
pub type DoubleEnvelope = TypedEnvelope<f64>;
pub type TextEnvelope = TypedEnvelope<String>;
pub type BytesEnvelope = TypedEnvelope<Bytes>;

/// Envelope whose value type is decided at runtime.
pub type DynamicEnvelope = TypedEnvelope<Value>;

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}
