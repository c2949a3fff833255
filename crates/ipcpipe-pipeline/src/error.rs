/// Errors surfaced by pipeline operations.
///
/// Transport rejections and undecodable frames never show up here: a full
/// channel is a non-success [`SendResponse`](crate::SendResponse) and a bad
/// frame is logged and dropped by the receive worker.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Send attempted on a pipeline opened without write access.
    #[error("pipeline was opened without write access")]
    WriteNotSupported,

    /// Operation attempted after `close`.
    #[error("pipeline is closed")]
    Disposed,

    /// Channel name rejected before any handle was opened.
    #[error("invalid channel name: {0}")]
    InvalidChannelName(String),

    /// Opening a channel handle failed.
    #[error("transport error: {0}")]
    Transport(#[from] ipcpipe_transport::TransportError),

    /// Envelope could not be encoded.
    #[error("frame error: {0}")]
    Frame(#[from] ipcpipe_frame::FrameError),

    /// The receive worker could not be started.
    #[error("failed to start receive worker: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
