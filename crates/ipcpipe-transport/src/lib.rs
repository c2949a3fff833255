//! Named, fixed-capacity queue transport.
//!
//! This is the lowest layer of ipcpipe. A channel is identified by name and
//! carries opaque byte frames in FIFO order:
//! - [`MemoryQueueFactory`] keeps channels in a process-wide registry
//! - [`ShmQueueFactory`] maps channels into shared memory files (Unix)
//!
//! Everything above this layer talks to the [`QueueFactory`],
//! [`QueuePublisher`] and [`QueueSubscriber`] traits only.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod shm;

pub use error::{Result, TransportError};
pub use memory::MemoryQueueFactory;
pub use traits::{
    record_size, QueueFactory, QueueOptions, QueuePublisher, QueueSubscriber,
    CANCEL_POLL_INTERVAL, DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY, RECORD_HEADER_SIZE,
};

#[cfg(unix)]
pub use shm::ShmQueueFactory;

/// Re-exported so callers can build cancellation handles without naming
/// `tokio-util` themselves.
pub use tokio_util::sync::CancellationToken;
