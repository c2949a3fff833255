//! Named-channel publish/subscribe messaging between processes.
//!
//! A [`Pipeline`] binds to a channel by name. Writers send typed envelopes;
//! readers get each frame, in order, through a registered handler.
//!
//! # Crate Structure
//!
//! - [`transport`]: fixed-capacity named queues (in-process and shared memory)
//! - [`frame`]: envelopes, payload values and the UTF-16 JSON frame codec
//! - [`pipeline`]: capability-gated pipeline with its receive worker
//!
//! ```no_run
//! use ipcpipe::{PipeAccess, Pipeline, TextEnvelope};
//!
//! let pipe = Pipeline::builder("chat", PipeAccess::READ_WRITE)
//!     .on_message_blocking(|seq, payload| {
//!         if payload.name() == Some("greet") {
//!             let text: String = payload.value().unwrap_or_default();
//!             println!("#{seq}: {text}");
//!         }
//!     })
//!     .build()?;
//! pipe.send(&TextEnvelope::new("greet", "hi".to_string()))?;
//! # Ok::<(), ipcpipe::PipelineError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use ipcpipe_transport::*;
}

/// Re-export envelope and codec types.
pub mod frame {
    pub use ipcpipe_frame::*;
}

/// Re-export pipeline types.
pub mod pipeline {
    pub use ipcpipe_pipeline::*;
}

pub use ipcpipe_frame::{
    BoolEnvelope, BytesEnvelope, DoubleEnvelope, DynamicEnvelope, Envelope, FloatEnvelope,
    IntEnvelope, LongEnvelope, Payload, TextEnvelope, TypedEnvelope, Value,
};
pub use ipcpipe_pipeline::{
    Message, MessageResponse, MessageStream, PipeAccess, Pipeline, PipelineBuilder,
    PipelineError, PipelineSettings, SendResponse,
};
