use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, Weak};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    record_size, QueueFactory, QueueOptions, QueuePublisher, QueueSubscriber,
    CANCEL_POLL_INTERVAL,
};

/// In-process queue transport.
///
/// Channels live in a process-wide registry keyed by name, so every factory
/// value attaches to the same segment for a given name. A segment is released
/// once its last publisher or subscriber drops. The `path` option is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryQueueFactory;

impl MemoryQueueFactory {
    pub fn new() -> Self {
        Self
    }

    /// Frames currently waiting in channel `name` (0 if it does not exist).
    pub fn pending_frames(&self, name: &str) -> usize {
        lock(registry())
            .get(name)
            .and_then(Weak::upgrade)
            .map(|segment| lock(&segment.state).frames.len())
            .unwrap_or(0)
    }

    fn attach(&self, options: &QueueOptions) -> Result<Arc<Segment>> {
        options.validate()?;

        let mut segments = lock(registry());
        if let Some(existing) = segments.get(&options.name).and_then(Weak::upgrade) {
            if existing.capacity != options.capacity {
                return Err(TransportError::CapacityMismatch {
                    name: options.name.clone(),
                    existing: existing.capacity,
                    requested: options.capacity,
                });
            }
            debug!(name = %options.name, "attached to in-memory queue");
            return Ok(existing);
        }

        segments.retain(|_, segment| segment.strong_count() > 0);

        let segment = Arc::new(Segment {
            name: options.name.clone(),
            capacity: options.capacity,
            state: Mutex::new(SegmentState::default()),
            available: Condvar::new(),
        });
        segments.insert(options.name.clone(), Arc::downgrade(&segment));
        debug!(
            name = %options.name,
            capacity = options.capacity,
            "created in-memory queue"
        );
        Ok(segment)
    }
}

impl QueueFactory for MemoryQueueFactory {
    fn create_publisher(&self, options: &QueueOptions) -> Result<Box<dyn QueuePublisher>> {
        let segment = self.attach(options)?;
        Ok(Box::new(MemoryPublisher { segment }))
    }

    fn create_subscriber(&self, options: &QueueOptions) -> Result<Box<dyn QueueSubscriber>> {
        let segment = self.attach(options)?;
        Ok(Box::new(MemorySubscriber { segment }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct Segment {
    name: String,
    capacity: usize,
    state: Mutex<SegmentState>,
    available: Condvar,
}

#[derive(Default)]
struct SegmentState {
    frames: VecDeque<Bytes>,
    used: usize,
}

struct MemoryPublisher {
    segment: Arc<Segment>,
}

impl QueuePublisher for MemoryPublisher {
    fn try_enqueue(&self, frame: &[u8]) -> bool {
        let needed = record_size(frame.len());
        if needed > self.segment.capacity {
            warn!(
                name = %self.segment.name,
                bytes = frame.len(),
                capacity = self.segment.capacity,
                "frame can never fit channel capacity"
            );
            return false;
        }

        let mut state = lock(&self.segment.state);
        if state.used + needed > self.segment.capacity {
            return false;
        }
        state.used += needed;
        state.frames.push_back(Bytes::copy_from_slice(frame));
        drop(state);

        self.segment.available.notify_all();
        true
    }
}

struct MemorySubscriber {
    segment: Arc<Segment>,
}

impl QueueSubscriber for MemorySubscriber {
    fn dequeue(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        let mut state = lock(&self.segment.state);
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            if let Some(frame) = state.frames.pop_front() {
                if frame.len() > buf.len() {
                    let needed = frame.len();
                    state.frames.push_front(frame);
                    return Err(TransportError::BufferTooSmall {
                        needed,
                        available: buf.len(),
                    });
                }
                state.used -= record_size(frame.len());
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(frame.len());
            }

            state = match self
                .segment
                .available
                .wait_timeout(state, CANCEL_POLL_INTERVAL)
            {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

fn registry() -> &'static Mutex<HashMap<String, Weak<Segment>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Weak<Segment>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
