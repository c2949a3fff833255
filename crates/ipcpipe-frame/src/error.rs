/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The envelope serialized to `null` or nothing at all.
    #[error("envelope serialized to an empty document")]
    EmptyPayload,

    /// The frame bytes are not UTF-16LE text.
    #[error("frame is not valid UTF-16 text: {0}")]
    InvalidText(String),

    /// The frame text is not valid JSON, or serialization failed.
    #[error("frame json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload decoded, but not into the requested shape.
    #[error("payload does not match {expected}: {source}")]
    Shape {
        expected: &'static str,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
