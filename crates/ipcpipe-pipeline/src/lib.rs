//! Capability-gated messaging pipeline over a named channel.
//!
//! A [`Pipeline`] is opened on a channel name with [`PipeAccess`] flags.
//! Write access opens a publish handle; read access opens a subscribe handle
//! and starts one receive thread that decodes frames and hands them to the
//! registered handler, strictly one at a time in arrival order.
//!
//! ```no_run
//! use ipcpipe_pipeline::{PipeAccess, Pipeline};
//!
//! let reader = Pipeline::builder("chat", PipeAccess::READ)
//!     .on_message_blocking(|seq, payload| {
//!         println!("#{seq} {:?}", payload.name());
//!     })
//!     .build()?;
//!
//! let writer = Pipeline::open("chat", PipeAccess::WRITE)?;
//! writer.send_text("greet", "hi")?;
//! # Ok::<(), ipcpipe_pipeline::PipelineError>(())
//! ```

pub mod access;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod response;
pub mod settings;

pub use access::PipeAccess;
pub use error::{PipelineError, Result};
pub use handler::{Message, MessageStream};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use response::{MessageResponse, SendResponse};
pub use settings::{PipelineSettings, DEFAULT_SHUTDOWN_TIMEOUT};
