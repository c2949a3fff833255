/// Errors that can occur in queue transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The queue options are not usable.
    #[error("invalid queue options: {0}")]
    InvalidOptions(String),

    /// Failed to open or create the backing segment.
    #[error("failed to open queue '{name}': {source}")]
    Open {
        name: String,
        source: std::io::Error,
    },

    /// An existing segment was created with a different capacity.
    #[error("queue '{name}' already exists with capacity {existing} (requested {requested})")]
    CapacityMismatch {
        name: String,
        existing: usize,
        requested: usize,
    },

    /// The backing segment does not hold a valid queue.
    #[error("queue '{name}' has an invalid segment: {reason}")]
    InvalidSegment { name: String, reason: String },

    /// A blocking dequeue observed cancellation.
    #[error("dequeue cancelled")]
    Cancelled,

    /// The caller's scratch buffer cannot hold the next frame.
    #[error("scratch buffer too small ({available} bytes, frame needs {needed})")]
    BufferTooSmall { needed: usize, available: usize },

    /// An I/O error occurred on the backing segment.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
