//! Message envelopes and the frame codec for ipcpipe.
//!
//! A frame is one envelope serialized to JSON and encoded as UTF-16LE text:
//! ```text
//! { "name": "greet", "sentAt": "2024-05-01T10:30:00+00:00", "value": "hi" }
//! ```
//! `value` is absent for the base [`Envelope`]. Receivers decode a frame into
//! a [`Payload`] first and pick a typed shape afterwards.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod value;

pub use codec::{decode_payload, decode_text, encode_envelope, encode_text};
pub use envelope::{
    BoolEnvelope, BytesEnvelope, DoubleEnvelope, DynamicEnvelope, Envelope, FloatEnvelope,
    IntEnvelope, LongEnvelope, TextEnvelope, TypedEnvelope,
};
pub use error::{FrameError, Result};
pub use payload::Payload;
pub use value::{PayloadValue, Value};
