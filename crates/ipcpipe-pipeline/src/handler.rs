use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use futures_core::Stream;
use ipcpipe_frame::Payload;
use tokio::sync::mpsc;

pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Type-erased receive callback. Futures it returns are polled on the
/// receive worker thread only, so they need not be `Send`.
pub(crate) type Handler = Arc<dyn Fn(u64, Payload) -> HandlerFuture + Send + Sync>;

/// The single registered callback of a pipeline, shared with its worker.
#[derive(Default)]
pub(crate) struct HandlerSlot {
    inner: RwLock<Option<Handler>>,
}

impl HandlerSlot {
    pub(crate) fn set(&self, handler: Handler) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = Some(handler);
    }

    pub(crate) fn clear(&self) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub(crate) fn current(&self) -> Option<Handler> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

pub(crate) fn boxed<F, Fut>(handler: F) -> Handler
where
    F: Fn(u64, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + 'static,
{
    Arc::new(move |seq, payload| Box::pin(handler(seq, payload)) as HandlerFuture)
}

pub(crate) fn blocking<F>(callback: F) -> Handler
where
    F: Fn(u64, Payload) + Send + Sync + 'static,
{
    boxed(move |seq, payload| {
        callback(seq, payload);
        std::future::ready(())
    })
}

/// A handler forwarding every message into a new [`MessageStream`].
pub(crate) fn forward(buffer: usize) -> (Handler, MessageStream) {
    let (tx, stream) = MessageStream::channel(buffer);
    let handler = boxed(move |seq, payload| {
        let tx = tx.clone();
        async move {
            if tx.send(Message { seq, payload }).await.is_err() {
                tracing::trace!(seq, "message stream dropped");
            }
        }
    });
    (handler, stream)
}

/// One frame delivered by the receive worker.
#[derive(Debug, Clone)]
pub struct Message {
    /// Position of the frame among all frames this pipeline pulled.
    pub seq: u64,
    pub payload: Payload,
}

/// Messages forwarded from a pipeline's receive worker.
///
/// Backed by a bounded channel: when it is full the worker waits, so a slow
/// consumer slows down receipt instead of buffering without limit. The
/// stream ends once the pipeline is closed or its handler is replaced.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<Message>,
}

impl MessageStream {
    pub(crate) fn channel(buffer: usize) -> (mpsc::Sender<Message>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Next message, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for synchronous callers.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Message> {
        self.rx.blocking_recv()
    }

    pub fn into_inner(self) -> mpsc::Receiver<Message> {
        self.rx
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}
