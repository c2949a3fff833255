use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, FixedOffset, Utc};
use ipcpipe_frame::{decode_payload, encode_envelope, Payload, PayloadValue, TypedEnvelope, Value};
use ipcpipe_transport::{
    QueueFactory, QueueOptions, QueuePublisher, QueueSubscriber, TransportError, DEFAULT_CAPACITY,
};
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::access::PipeAccess;
use crate::error::{PipelineError, Result};
use crate::handler::{self, Handler, HandlerSlot, MessageStream};
use crate::response::SendResponse;
use crate::settings::PipelineSettings;

/// Configures and opens a [`Pipeline`].
pub struct PipelineBuilder {
    channel: String,
    access: PipeAccess,
    capacity: usize,
    path: Option<PathBuf>,
    settings: PipelineSettings,
    factory: Option<Arc<dyn QueueFactory>>,
    handler: Option<Handler>,
    stop: Option<CancellationToken>,
}

impl PipelineBuilder {
    fn new(channel: impl Into<String>, access: PipeAccess) -> Self {
        Self {
            channel: channel.into(),
            access,
            capacity: DEFAULT_CAPACITY,
            path: None,
            settings: PipelineSettings::default(),
            factory: None,
            handler: None,
            stop: None,
        }
    }

    /// Channel byte capacity. Must match the capacity of an existing channel.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Directory for backing files, for transports that use them.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Transport to open the channel with. Defaults to shared memory on Unix
    /// and the in-process transport elsewhere.
    pub fn factory(mut self, factory: Arc<dyn QueueFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Receive handler installed before the worker pulls its first frame.
    ///
    /// Frames already waiting on the channel are delivered to it. A handler
    /// registered later through [`Pipeline::on_message`] misses every frame
    /// the worker pulls before then.
    pub fn on_message<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(u64, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.handler = Some(handler::boxed(callback));
        self
    }

    /// Synchronous form of [`on_message`](Self::on_message).
    pub fn on_message_blocking<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, Payload) + Send + Sync + 'static,
    {
        self.handler = Some(handler::blocking(callback));
        self
    }

    /// Forward received messages into a bounded stream from the first frame on.
    pub fn messages(mut self, buffer: usize) -> (Self, MessageStream) {
        let (handler, stream) = handler::forward(buffer);
        self.handler = Some(handler);
        (self, stream)
    }

    /// Stop the receive worker once `token` is cancelled.
    ///
    /// The worker checks the token before every dequeue, so a handler that
    /// cancels it leaves all later frames on the channel.
    pub fn stop_on(mut self, token: CancellationToken) -> Self {
        self.stop = Some(token);
        self
    }

    /// Open the channel handles allowed by the access flags and start the
    /// receive worker when reading.
    ///
    /// Never waits for a peer. On failure every handle opened so far is
    /// released before returning.
    pub fn build(self) -> Result<Pipeline> {
        if self.channel.trim().is_empty() {
            return Err(PipelineError::InvalidChannelName(
                "channel name must not be empty".to_string(),
            ));
        }

        let factory = self.factory.unwrap_or_else(default_factory);
        let mut options = QueueOptions::new(&self.channel, self.capacity);
        if let Some(path) = &self.path {
            options = options.with_path(path);
        }
        options.validate()?;

        let created_at = Utc::now().fixed_offset();

        let publisher: Option<Arc<dyn QueuePublisher>> = if self.access.can_write() {
            Some(Arc::from(factory.create_publisher(&options)?))
        } else {
            None
        };

        let handler = Arc::new(HandlerSlot::default());
        if let Some(callback) = self.handler {
            if !self.access.can_read() {
                warn!(channel = %self.channel, "handler registered on a pipeline without read access");
            }
            handler.set(callback);
        }
        let frames_received = Arc::new(AtomicU64::new(0));
        let receiving = Arc::new(AtomicBool::new(false));

        let worker = if self.access.can_read() {
            let cancel = self
                .stop
                .as_ref()
                .map_or_else(CancellationToken::new, CancellationToken::child_token);
            let started = factory
                .create_subscriber(&options)
                .map_err(PipelineError::from)
                .and_then(|subscriber| {
                    Worker {
                        channel: self.channel.clone(),
                        subscriber,
                        scratch: vec![0u8; self.capacity],
                        created_at,
                        discard_past_messages: self.settings.discard_past_messages,
                        handler: Arc::clone(&handler),
                        frames_received: Arc::clone(&frames_received),
                    }
                    .spawn(cancel, Arc::clone(&receiving))
                });
            match started {
                Ok(worker) => Some(worker),
                Err(err) => {
                    if publisher.is_some() {
                        debug!(channel = %self.channel, "releasing publisher after failed open");
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        info!(
            channel = %self.channel,
            access = %self.access,
            capacity = self.capacity,
            backend = factory.backend_name(),
            "pipeline opened"
        );

        Ok(Pipeline {
            channel: self.channel,
            access: self.access,
            capacity: self.capacity,
            settings: self.settings,
            created_at,
            publisher: RwLock::new(publisher),
            handler,
            frames_received,
            receiving,
            worker: Mutex::new(worker),
            closed: AtomicBool::new(false),
        })
    }
}

fn default_factory() -> Arc<dyn QueueFactory> {
    #[cfg(unix)]
    {
        Arc::new(ipcpipe_transport::ShmQueueFactory::new())
    }
    #[cfg(not(unix))]
    {
        Arc::new(ipcpipe_transport::MemoryQueueFactory::new())
    }
}

/// A capability-gated endpoint on a named channel.
///
/// A write-capable pipeline holds a publish handle; a read-capable one owns a
/// dedicated receive thread that pulls frames, decodes them and awaits the
/// registered handler one frame at a time, in arrival order. A pipeline with
/// both capabilities receives its own sends.
///
/// Sends take `&self` and may run concurrently from any thread; the
/// transport's publisher is required to be `Sync` for that.
pub struct Pipeline {
    channel: String,
    access: PipeAccess,
    capacity: usize,
    settings: PipelineSettings,
    created_at: DateTime<FixedOffset>,
    publisher: RwLock<Option<Arc<dyn QueuePublisher>>>,
    handler: Arc<HandlerSlot>,
    frames_received: Arc<AtomicU64>,
    receiving: Arc<AtomicBool>,
    worker: Mutex<Option<WorkerHandle>>,
    closed: AtomicBool,
}

impl Pipeline {
    pub fn builder(channel: impl Into<String>, access: PipeAccess) -> PipelineBuilder {
        PipelineBuilder::new(channel, access)
    }

    /// Open `channel` with default capacity, transport and settings.
    pub fn open(channel: impl Into<String>, access: PipeAccess) -> Result<Self> {
        Self::builder(channel, access).build()
    }

    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    pub fn access(&self) -> PipeAccess {
        self.access
    }

    pub fn can_read(&self) -> bool {
        self.access.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.access.can_write()
    }

    /// Creation time; the cut-off for discarding past messages.
    pub fn created_at(&self) -> DateTime<FixedOffset> {
        self.created_at
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a receive worker is running for this pipeline. False once the
    /// worker has exited, whether through `close`, a stop token or a fatal
    /// transport error.
    pub fn is_receiving(&self) -> bool {
        !self.is_closed() && self.receiving.load(Ordering::Acquire)
    }

    /// Frames pulled off the channel so far, including dropped ones.
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Acquire)
    }

    /// Serialize `envelope` and offer it to the channel.
    ///
    /// Fails with [`PipelineError::WriteNotSupported`] before any encoding
    /// when the pipeline lacks write access. A full channel is not an error:
    /// the response reports `delivered == false`.
    pub fn send<T: Serialize + ?Sized>(&self, envelope: &T) -> Result<SendResponse> {
        if !self.can_write() {
            return Err(PipelineError::WriteNotSupported);
        }
        let publisher = self.publisher()?;

        let frame = encode_envelope(envelope)?;
        let delivered = publisher.try_enqueue(&frame);
        if delivered {
            trace!(channel = %self.channel, bytes = frame.len(), "frame enqueued");
        } else {
            debug!(channel = %self.channel, bytes = frame.len(), "channel rejected frame");
        }
        Ok(SendResponse::new(delivered))
    }

    /// Async form of [`send`](Self::send). Enqueueing never blocks, so the
    /// outcome is the same.
    pub async fn send_async<T: Serialize + ?Sized>(&self, envelope: &T) -> Result<SendResponse> {
        self.send(envelope)
    }

    /// Wrap `value` in a typed envelope named `name` and send it.
    pub fn send_value<V: PayloadValue>(
        &self,
        name: impl Into<String>,
        value: V,
    ) -> Result<SendResponse> {
        self.send(&TypedEnvelope::new(name, value))
    }

    pub async fn send_value_async<V: PayloadValue>(
        &self,
        name: impl Into<String>,
        value: V,
    ) -> Result<SendResponse> {
        self.send_value(name, value)
    }

    pub fn send_text(&self, name: impl Into<String>, text: &str) -> Result<SendResponse> {
        self.send_value(name, text.to_string())
    }

    /// Send a value whose type is chosen at runtime.
    pub fn send_dynamic(&self, name: impl Into<String>, value: Value) -> Result<SendResponse> {
        self.send_value(name, value)
    }

    /// Register the receive handler, replacing any previous one.
    ///
    /// The handler is called with the frame's sequence number and decoded
    /// payload. The worker awaits each call before pulling the next frame,
    /// so a slow handler slows down receipt. Frames pulled while no handler
    /// is registered are counted and dropped; register through
    /// [`PipelineBuilder::on_message`] to receive frames already waiting.
    pub fn on_message<F, Fut>(&self, callback: F) -> Result<()>
    where
        F: Fn(u64, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.install(handler::boxed(callback))
    }

    /// Register a synchronous receive handler.
    pub fn on_message_blocking<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(u64, Payload) + Send + Sync + 'static,
    {
        self.install(handler::blocking(callback))
    }

    /// Forward received messages into a bounded stream.
    ///
    /// Replaces the current handler. The worker waits while the stream holds
    /// `buffer` undrained messages.
    pub fn messages(&self, buffer: usize) -> Result<MessageStream> {
        let (handler, stream) = handler::forward(buffer);
        self.install(handler)?;
        Ok(stream)
    }

    fn install(&self, handler: Handler) -> Result<()> {
        self.ensure_open()?;
        if !self.can_read() {
            warn!(channel = %self.channel, "handler registered on a pipeline without read access");
        }
        self.handler.set(handler);
        Ok(())
    }

    pub fn clear_handler(&self) {
        self.handler.clear();
    }

    /// Stop the receive worker and release both channel handles.
    ///
    /// Idempotent. Waits up to the configured shutdown timeout for the
    /// worker to finish its current frame; a worker still busy in a handler
    /// after that is detached and releases its handle when it returns. A
    /// frame the worker already pulled still reaches the handler, which is
    /// dropped only after the worker has stopped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.publisher
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.stop(&self.channel, self.settings.shutdown_timeout);
        }
        self.handler.clear();

        info!(channel = %self.channel, "pipeline closed");
    }

    fn publisher(&self) -> Result<Arc<dyn QueuePublisher>> {
        self.publisher
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(PipelineError::Disposed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PipelineError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("channel", &self.channel)
            .field("access", &self.access)
            .field("capacity", &self.capacity)
            .field("created_at", &self.created_at)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct WorkerHandle {
    cancel: CancellationToken,
    thread: JoinHandle<()>,
    exited: std_mpsc::Receiver<()>,
}

impl WorkerHandle {
    fn stop(self, channel: &str, timeout: std::time::Duration) {
        self.cancel.cancel();

        // Closing from inside a handler: the worker exits after it returns.
        if thread::current().id() == self.thread.thread().id() {
            debug!(channel, "close called on receive worker; not waiting");
            return;
        }

        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    error!(channel, "receive worker panicked");
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(channel, ?timeout, "receive worker did not stop in time; detaching");
            }
        }
    }
}

/// State owned by the receive thread.
struct Worker {
    channel: String,
    subscriber: Box<dyn QueueSubscriber>,
    scratch: Vec<u8>,
    created_at: DateTime<FixedOffset>,
    discard_past_messages: bool,
    handler: Arc<HandlerSlot>,
    frames_received: Arc<AtomicU64>,
}

impl Worker {
    fn spawn(self, cancel: CancellationToken, receiving: Arc<AtomicBool>) -> Result<WorkerHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(PipelineError::Spawn)?;
        let (exited_tx, exited) = std_mpsc::channel();

        let token = cancel.clone();
        let running = Arc::clone(&receiving);
        receiving.store(true, Ordering::Release);
        let thread = thread::Builder::new()
            .name(format!("ipcpipe-recv:{}", self.channel))
            .spawn(move || {
                self.run(&runtime, &token);
                running.store(false, Ordering::Release);
                let _ = exited_tx.send(());
            })
            .map_err(|err| {
                receiving.store(false, Ordering::Release);
                PipelineError::Spawn(err)
            })?;

        Ok(WorkerHandle {
            cancel,
            thread,
            exited,
        })
    }

    fn run(mut self, runtime: &Runtime, cancel: &CancellationToken) {
        debug!(channel = %self.channel, "receive worker started");
        let mut seq: u64 = 0;

        while !cancel.is_cancelled() {
            let len = match self.subscriber.dequeue(&mut self.scratch, cancel) {
                Ok(len) => len,
                Err(TransportError::Cancelled) => break,
                Err(TransportError::BufferTooSmall { needed, .. }) => {
                    self.scratch.resize(needed, 0);
                    continue;
                }
                Err(err) => {
                    error!(channel = %self.channel, error = %err, "receive worker stopped");
                    break;
                }
            };

            let frame = self.scratch[..len].to_vec();
            let current = seq;
            seq += 1;
            self.frames_received.store(seq, Ordering::Release);

            self.dispatch(runtime, current, &frame);
        }

        debug!(channel = %self.channel, frames = seq, "receive worker stopped");
    }

    fn dispatch(&self, runtime: &Runtime, seq: u64, frame: &[u8]) {
        let payload = match decode_payload(frame) {
            Ok(payload) if payload.as_json().is_object() => payload,
            Ok(_) => {
                warn!(channel = %self.channel, seq, bytes = frame.len(), "dropping frame: not a JSON object");
                return;
            }
            Err(err) => {
                warn!(channel = %self.channel, seq, bytes = frame.len(), error = %err, "dropping undecodable frame");
                return;
            }
        };

        if self.discard_past_messages {
            match payload.sent_at() {
                Some(sent_at) if sent_at < self.created_at => {
                    debug!(channel = %self.channel, seq, %sent_at, "discarding past message");
                    return;
                }
                Some(_) => {}
                None => {
                    warn!(channel = %self.channel, seq, "dropping frame without sentAt");
                    return;
                }
            }
        }

        let Some(handler) = self.handler.current() else {
            trace!(channel = %self.channel, seq, "no handler registered");
            return;
        };

        debug!(channel = %self.channel, seq, name = ?payload.name(), "delivering message");
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(handler(seq, payload));
        }));
        if delivered.is_err() {
            error!(channel = %self.channel, seq, "message handler panicked");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
