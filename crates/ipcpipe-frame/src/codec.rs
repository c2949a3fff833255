use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::payload::Payload;

/// UTF-16LE byte order mark. Stripped when it leads a frame.
const BOM: u16 = 0xFEFF;

/// Encode `text` as UTF-16LE without a byte order mark.
pub fn encode_text(text: &str) -> Bytes {
    let mut dst = BytesMut::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        dst.put_u16_le(unit);
    }
    dst.freeze()
}

/// Decode a UTF-16LE frame into text.
pub fn decode_text(frame: &[u8]) -> Result<String> {
    if frame.len() % 2 != 0 {
        return Err(FrameError::InvalidText(format!(
            "odd frame length {}",
            frame.len()
        )));
    }

    let mut units: Vec<u16> = frame
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if units.first() == Some(&BOM) {
        units.remove(0);
    }

    String::from_utf16(&units).map_err(|err| FrameError::InvalidText(err.to_string()))
}

/// Serialize `envelope` into a wire frame: JSON text encoded as UTF-16LE.
///
/// A value that serializes to nothing (`null` or an empty document) is
/// [`FrameError::EmptyPayload`]; such a frame would carry no message.
pub fn encode_envelope<T: Serialize + ?Sized>(envelope: &T) -> Result<Bytes> {
    let json = serde_json::to_string(envelope)?;
    if json.is_empty() || json == "null" {
        return Err(FrameError::EmptyPayload);
    }

    let frame = encode_text(&json);
    trace!(bytes = frame.len(), "encoded envelope");
    Ok(frame)
}

/// Decode a wire frame into a generic [`Payload`].
///
/// This is the first decode phase; typed decoding happens on the payload.
pub fn decode_payload(frame: &[u8]) -> Result<Payload> {
    let text = decode_text(frame)?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    trace!(bytes = frame.len(), "decoded payload");
    Ok(Payload::new(json))
}
