use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Default channel capacity: 4 MiB.
pub const DEFAULT_CAPACITY: usize = 4 * 1024 * 1024;

/// Smallest accepted channel capacity.
pub const MIN_CAPACITY: usize = 64;

/// Largest accepted channel capacity: 1 GiB.
pub const MAX_CAPACITY: usize = 1024 * 1024 * 1024;

/// Per-record bookkeeping: length (4) + reserved (4) = 8 bytes.
pub const RECORD_HEADER_SIZE: usize = 8;

/// How often a parked dequeue re-checks its cancellation token.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

const MAX_NAME_LEN: usize = 200;

/// Capacity a frame of `len` bytes occupies inside a channel.
///
/// Records are 8-byte aligned so record headers never straddle a word.
pub fn record_size(len: usize) -> usize {
    (RECORD_HEADER_SIZE + len + 7) & !7
}

/// Identifies a named channel and its fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Process-wide unique channel name.
    pub name: String,
    /// Byte capacity of the channel, fixed when the segment is created.
    pub capacity: usize,
    /// Directory holding backing files. Ignored by backends without files.
    pub path: Option<PathBuf>,
}

impl QueueOptions {
    /// Options for `name` with an explicit capacity.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            path: None,
        }
    }

    /// Store backing files under `path`.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Check that a backend can honour these options.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TransportError::InvalidOptions(
                "queue name must not be empty".to_string(),
            ));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(TransportError::InvalidOptions(format!(
                "queue name too long ({} bytes, max {MAX_NAME_LEN})",
                self.name.len()
            )));
        }
        if self
            .name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(TransportError::InvalidOptions(format!(
                "queue name '{}' contains a path separator or NUL",
                self.name.escape_default()
            )));
        }
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&self.capacity) {
            return Err(TransportError::InvalidOptions(format!(
                "capacity {} outside [{MIN_CAPACITY}, {MAX_CAPACITY}]",
                self.capacity
            )));
        }
        Ok(())
    }

    /// Largest frame that could ever fit into an empty channel.
    pub fn max_frame_len(&self) -> usize {
        self.capacity.saturating_sub(RECORD_HEADER_SIZE) & !7
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_CAPACITY)
    }
}

/// Opens publish and subscribe handles on named channels.
///
/// Opening is idempotent from the caller's point of view: every handle opened
/// with the same name shares one channel.
pub trait QueueFactory: Send + Sync {
    /// Open a publish handle on the channel described by `options`.
    fn create_publisher(&self, options: &QueueOptions) -> Result<Box<dyn QueuePublisher>>;

    /// Open a subscribe handle on the channel described by `options`.
    fn create_subscriber(&self, options: &QueueOptions) -> Result<Box<dyn QueueSubscriber>>;

    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;
}

/// Write side of a channel.
///
/// `try_enqueue` takes `&self` and implementors must be `Sync`: concurrent
/// enqueues from many threads are part of the contract, callers hold no lock.
pub trait QueuePublisher: Send + Sync {
    /// Append one frame without blocking.
    ///
    /// Returns `false` when the channel lacks free space for the frame.
    fn try_enqueue(&self, frame: &[u8]) -> bool;
}

/// Read side of a channel.
pub trait QueueSubscriber: Send {
    /// Block until the next frame is available and copy it into `buf`.
    ///
    /// Returns the frame length, or [`TransportError::Cancelled`] once
    /// `cancel` fires. A frame is removed from the channel by the subscriber
    /// that dequeues it.
    fn dequeue(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize>;
}
