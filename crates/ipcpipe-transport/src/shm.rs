use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    record_size, QueueFactory, QueueOptions, QueuePublisher, QueueSubscriber,
    CANCEL_POLL_INTERVAL, RECORD_HEADER_SIZE,
};

/// Segment header size. The data region starts right after it.
pub const SEGMENT_HEADER_SIZE: usize = 64;

/// Magic number at offset 0: "IPCQ".
pub const SEGMENT_MAGIC: u32 = u32::from_le_bytes(*b"IPCQ");

const SEGMENT_VERSION: u32 = 2;
const FILE_EXTENSION: &str = "ipcq";

// Header layout (all fields little-endian, naturally aligned):
//   0  magic     u32
//   4  version   u32
//   8  capacity  u64
//  16  lock      u32   (0 = free, else pid of the holder)
//  24  head      u64   (monotonic read offset)
//  32  tail      u64   (monotonic write offset)
const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const CAPACITY_OFFSET: usize = 8;
const LOCK_OFFSET: usize = 16;
const HEAD_OFFSET: usize = 24;
const TAIL_OFFSET: usize = 32;

const SPINS_BEFORE_YIELD: u32 = 64;
const SPINS_PER_OWNER_CHECK: u32 = 1024;
const MIN_IDLE_BACKOFF: Duration = Duration::from_micros(50);

/// Longest a handle waits for the segment lock before giving up on one
/// operation. A publisher reports the frame as not delivered; a subscriber
/// keeps polling.
pub const LOCK_WAIT: Duration = Duration::from_millis(250);

/// Shared-memory queue transport (Unix).
///
/// Each channel is a file `<dir>/<name>.ipcq` mapped `MAP_SHARED` into every
/// attached process. The file outlives its handles so frames published before
/// a subscriber attaches can still be drained; use [`ShmQueueFactory::remove`]
/// to delete it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShmQueueFactory;

impl ShmQueueFactory {
    pub fn new() -> Self {
        Self
    }

    /// Directory used when the options carry no path.
    pub fn default_dir() -> PathBuf {
        let dev_shm = Path::new("/dev/shm");
        if dev_shm.is_dir() {
            dev_shm.to_path_buf()
        } else {
            std::env::temp_dir()
        }
    }

    /// Backing file for a channel.
    pub fn segment_path(options: &QueueOptions) -> PathBuf {
        let dir = options.path.clone().unwrap_or_else(Self::default_dir);
        dir.join(format!("{}.{FILE_EXTENSION}", options.name))
    }

    /// Delete the backing file of a channel. Attached handles keep working
    /// on their existing mapping.
    pub fn remove(options: &QueueOptions) -> Result<()> {
        options.validate()?;
        let path = Self::segment_path(options);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(?path, "removed shared queue segment");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl QueueFactory for ShmQueueFactory {
    fn create_publisher(&self, options: &QueueOptions) -> Result<Box<dyn QueuePublisher>> {
        let mapping = Mapping::open(options)?;
        Ok(Box::new(ShmPublisher { mapping }))
    }

    fn create_subscriber(&self, options: &QueueOptions) -> Result<Box<dyn QueueSubscriber>> {
        let mapping = Mapping::open(options)?;
        Ok(Box::new(ShmSubscriber { mapping }))
    }

    fn backend_name(&self) -> &'static str {
        "shared-memory"
    }
}

struct ShmPublisher {
    mapping: Mapping,
}

impl QueuePublisher for ShmPublisher {
    fn try_enqueue(&self, frame: &[u8]) -> bool {
        let needed = record_size(frame.len());
        let Ok(len) = u32::try_from(frame.len()) else {
            return false;
        };
        if needed > self.mapping.capacity {
            warn!(
                name = %self.mapping.name,
                bytes = frame.len(),
                capacity = self.mapping.capacity,
                "frame can never fit channel capacity"
            );
            return false;
        }

        let Some(_guard) = self.mapping.lock() else {
            warn!(name = %self.mapping.name, "segment lock busy; frame not enqueued");
            return false;
        };
        let head = self.mapping.head().load(Ordering::Acquire);
        let tail = self.mapping.tail().load(Ordering::Acquire);
        let used = tail.wrapping_sub(head) as usize;
        if used + needed > self.mapping.capacity {
            return false;
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        header[..4].copy_from_slice(&len.to_le_bytes());
        self.mapping.write_wrapped(tail, &header);
        self.mapping
            .write_wrapped(tail + RECORD_HEADER_SIZE as u64, frame);
        self.mapping
            .tail()
            .store(tail + needed as u64, Ordering::Release);
        true
    }
}

struct ShmSubscriber {
    mapping: Mapping,
}

impl ShmSubscriber {
    fn try_pop(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(_guard) = self.mapping.lock() else {
            debug!(name = %self.mapping.name, "segment lock busy; retrying");
            return Ok(None);
        };
        let head = self.mapping.head().load(Ordering::Acquire);
        let tail = self.mapping.tail().load(Ordering::Acquire);
        if tail == head {
            return Ok(None);
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.mapping.read_wrapped(head, &mut header);
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let record = record_size(len) as u64;
        if record > tail.wrapping_sub(head) {
            return Err(TransportError::InvalidSegment {
                name: self.mapping.name.clone(),
                reason: format!("record of {len} bytes overruns written region"),
            });
        }
        if len > buf.len() {
            return Err(TransportError::BufferTooSmall {
                needed: len,
                available: buf.len(),
            });
        }

        self.mapping
            .read_wrapped(head + RECORD_HEADER_SIZE as u64, &mut buf[..len]);
        self.mapping.head().store(head + record, Ordering::Release);
        Ok(Some(len))
    }
}

impl QueueSubscriber for ShmSubscriber {
    fn dequeue(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        let mut backoff = MIN_IDLE_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if let Some(len) = self.try_pop(buf)? {
                return Ok(len);
            }
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(CANCEL_POLL_INTERVAL);
        }
    }
}

/// A mapped queue segment. Unmapped on drop.
struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
    name: String,
    _file: File,
}

// SAFETY: the mapping is plain shared memory. Header words are only accessed
// through atomics and the data region only while holding the segment lock.
unsafe impl Send for Mapping {}
// SAFETY: see `Send` above.
unsafe impl Sync for Mapping {}

impl Mapping {
    fn open(options: &QueueOptions) -> Result<Self> {
        options.validate()?;
        let path = ShmQueueFactory::segment_path(options);
        let open_err = |source: std::io::Error| TransportError::Open {
            name: options.name.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)
            .map_err(open_err)?;

        let _init_lock = FileLock::exclusive(&file).map_err(open_err)?;

        let total = SEGMENT_HEADER_SIZE + options.capacity;
        let existing_len = file.metadata().map_err(open_err)?.len() as usize;
        let fresh = existing_len == 0;
        if fresh {
            file.set_len(total as u64).map_err(open_err)?;
        } else if existing_len < SEGMENT_HEADER_SIZE {
            return Err(TransportError::InvalidSegment {
                name: options.name.clone(),
                reason: format!("file of {existing_len} bytes is shorter than the header"),
            });
        }

        let map_len = if fresh { total } else { existing_len };
        let mapping = Self::map(&file, map_len, options).map_err(open_err)?;

        let magic = mapping.word32(MAGIC_OFFSET).load(Ordering::Acquire);
        if fresh || magic == 0 {
            mapping.initialize(options.capacity, map_len)?;
            info!(?path, capacity = options.capacity, "created shared queue segment");
        } else {
            mapping.verify(magic, options.capacity, map_len)?;
            debug!(?path, "attached to shared queue segment");
        }

        Ok(mapping)
    }

    fn map(file: &File, len: usize, options: &QueueOptions) -> std::io::Result<Self> {
        // SAFETY: `file` is open read/write and at least `len` bytes long;
        // the kernel picks the address and the result is checked below.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }
        let ptr = NonNull::new(raw.cast::<u8>())
            .ok_or_else(|| std::io::Error::other("mmap returned a null mapping"))?;

        Ok(Self {
            ptr,
            len,
            capacity: options.capacity,
            name: options.name.clone(),
            _file: file.try_clone()?,
        })
    }

    fn initialize(&self, capacity: usize, map_len: usize) -> Result<()> {
        if map_len < SEGMENT_HEADER_SIZE + capacity {
            return Err(TransportError::InvalidSegment {
                name: self.name.clone(),
                reason: format!("file of {map_len} bytes cannot hold capacity {capacity}"),
            });
        }
        self.word32(VERSION_OFFSET)
            .store(SEGMENT_VERSION, Ordering::Relaxed);
        self.word64(CAPACITY_OFFSET)
            .store(capacity as u64, Ordering::Relaxed);
        self.word32(LOCK_OFFSET).store(0, Ordering::Relaxed);
        self.head().store(0, Ordering::Relaxed);
        self.tail().store(0, Ordering::Relaxed);
        self.word32(MAGIC_OFFSET)
            .store(SEGMENT_MAGIC, Ordering::Release);
        Ok(())
    }

    fn verify(&self, magic: u32, capacity: usize, map_len: usize) -> Result<()> {
        if magic != SEGMENT_MAGIC {
            return Err(TransportError::InvalidSegment {
                name: self.name.clone(),
                reason: format!("bad magic {magic:#010x}"),
            });
        }
        let version = self.word32(VERSION_OFFSET).load(Ordering::Acquire);
        if version != SEGMENT_VERSION {
            return Err(TransportError::InvalidSegment {
                name: self.name.clone(),
                reason: format!("unsupported version {version}"),
            });
        }
        let existing = self.word64(CAPACITY_OFFSET).load(Ordering::Acquire) as usize;
        if existing != capacity {
            return Err(TransportError::CapacityMismatch {
                name: self.name.clone(),
                existing,
                requested: capacity,
            });
        }
        if map_len < SEGMENT_HEADER_SIZE + capacity {
            return Err(TransportError::InvalidSegment {
                name: self.name.clone(),
                reason: format!("file of {map_len} bytes is truncated"),
            });
        }
        Ok(())
    }

    fn word32(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset % 4 == 0 && offset + 4 <= SEGMENT_HEADER_SIZE);
        // SAFETY: the mapping is page aligned and at least header-sized, so the
        // offset is in bounds and 4-byte aligned; it lives as long as `self`.
        unsafe { &*self.ptr.as_ptr().add(offset).cast::<AtomicU32>() }
    }

    fn word64(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(offset % 8 == 0 && offset + 8 <= SEGMENT_HEADER_SIZE);
        // SAFETY: as in `word32`, with 8-byte alignment.
        unsafe { &*self.ptr.as_ptr().add(offset).cast::<AtomicU64>() }
    }

    fn head(&self) -> &AtomicU64 {
        self.word64(HEAD_OFFSET)
    }

    fn tail(&self) -> &AtomicU64 {
        self.word64(TAIL_OFFSET)
    }

    /// Take the segment lock, waiting at most [`LOCK_WAIT`].
    ///
    /// The lock word holds the pid of its holder. A word left behind by a
    /// process that no longer exists is taken over; head and tail are
    /// published last in every critical section, so a dead holder leaves no
    /// partial record visible.
    fn lock(&self) -> Option<SegmentGuard<'_>> {
        let word = self.word32(LOCK_OFFSET);
        let me = std::process::id();
        let deadline = Instant::now() + LOCK_WAIT;
        let mut spins = 0u32;
        loop {
            let owner = match word.compare_exchange_weak(0, me, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => return Some(SegmentGuard { word }),
                Err(owner) => owner,
            };

            spins = spins.wrapping_add(1);
            if owner != 0 && spins % SPINS_PER_OWNER_CHECK == 0 {
                if !process_alive(owner)
                    && word
                        .compare_exchange(owner, me, Ordering::Acquire, Ordering::Relaxed)
                        .is_ok()
                {
                    warn!(name = %self.name, owner, "took over segment lock from exited process");
                    return Some(SegmentGuard { word });
                }
                if Instant::now() >= deadline {
                    return None;
                }
            }

            if spins < SPINS_BEFORE_YIELD {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Copy `bytes` into the data region at monotonic offset `pos`, wrapping
    /// at the end of the region. Caller holds the segment lock.
    fn write_wrapped(&self, pos: u64, bytes: &[u8]) {
        let start = (pos % self.capacity as u64) as usize;
        let first = bytes.len().min(self.capacity - start);
        let data = self.data_ptr();
        // SAFETY: `start + first <= capacity` and `bytes.len() - first <= capacity`,
        // both ranges lie inside the data region; the lock excludes other writers.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.add(start), first);
            std::ptr::copy_nonoverlapping(bytes.as_ptr().add(first), data, bytes.len() - first);
        }
    }

    /// Copy from the data region at monotonic offset `pos` into `out`.
    /// Caller holds the segment lock.
    fn read_wrapped(&self, pos: u64, out: &mut [u8]) {
        let start = (pos % self.capacity as u64) as usize;
        let first = out.len().min(self.capacity - start);
        let data = self.data_ptr();
        // SAFETY: same bounds as `write_wrapped`; `out` never aliases the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(data.add(start), out.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(data, out.as_mut_ptr().add(first), out.len() - first);
        }
    }

    fn data_ptr(&self) -> *mut u8 {
        // SAFETY: the mapping is at least `SEGMENT_HEADER_SIZE + capacity` bytes.
        unsafe { self.ptr.as_ptr().add(SEGMENT_HEADER_SIZE) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` come from a successful mmap and are unmapped once.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len) };
        if rc != 0 {
            debug!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "munmap failed"
            );
        }
    }
}

struct SegmentGuard<'a> {
    word: &'a AtomicU32,
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        self.word.store(0, Ordering::Release);
    }
}

/// Whether `pid` names a live process. Signal 0 only checks existence.
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: `kill` with signal 0 delivers nothing; it only reports whether
    // the target exists and may be signalled.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Advisory `flock` held while a segment is created or verified.
struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    fn exclusive(file: &'a File) -> std::io::Result<Self> {
        loop {
            // SAFETY: the descriptor is owned by `file`, which outlives the lock.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                return Ok(Self { file });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        // SAFETY: see `FileLock::exclusive`.
        let _ = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, SeekFrom, Write};
    use std::thread;

    use super::*;

    fn options_in(dir: &tempfile::TempDir, name: &str, capacity: usize) -> QueueOptions {
        QueueOptions::new(name, capacity).with_path(dir.path())
    }

    #[test]
    fn creates_segment_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "create", 256);
        let _publisher = ShmQueueFactory.create_publisher(&options).unwrap();

        let path = ShmQueueFactory::segment_path(&options);
        assert!(path.exists());
        let len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(len, SEGMENT_HEADER_SIZE + 256);
    }

    #[test]
    fn roundtrip_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "roundtrip", 1024);
        let publisher = ShmQueueFactory.create_publisher(&options).unwrap();
        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();

        assert!(publisher.try_enqueue(b"first"));
        assert!(publisher.try_enqueue(b"second"));

        let cancel = CancellationToken::new();
        let mut buf = vec![0u8; 1024];
        let n = subscriber.dequeue(&mut buf, &cancel).unwrap();
        assert_eq!(&buf[..n], b"first");
        let n = subscriber.dequeue(&mut buf, &cancel).unwrap();
        assert_eq!(&buf[..n], b"second");
    }

    #[test]
    fn frames_survive_publisher_drop() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "persist", 1024);
        {
            let publisher = ShmQueueFactory.create_publisher(&options).unwrap();
            assert!(publisher.try_enqueue(b"left behind"));
        }

        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();
        let mut buf = vec![0u8; 1024];
        let n = subscriber
            .dequeue(&mut buf, &CancellationToken::new())
            .unwrap();
        assert_eq!(&buf[..n], b"left behind");
    }

    #[test]
    fn wraps_around_data_region() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "wrap", 100);
        let publisher = ShmQueueFactory.create_publisher(&options).unwrap();
        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();
        let cancel = CancellationToken::new();
        let mut buf = vec![0u8; 100];

        for round in 0..20u8 {
            let frame = vec![round; 20 + (round as usize % 7)];
            assert!(publisher.try_enqueue(&frame), "round {round} should fit");
            let n = subscriber.dequeue(&mut buf, &cancel).unwrap();
            assert_eq!(&buf[..n], frame.as_slice());
        }
    }

    #[test]
    fn full_segment_rejects_enqueue() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "full", 64);
        let publisher = ShmQueueFactory.create_publisher(&options).unwrap();

        assert!(publisher.try_enqueue(&[7u8; 56]));
        assert!(!publisher.try_enqueue(b"x"));
        assert!(!publisher.try_enqueue(&[0u8; 200]));
    }

    #[test]
    fn capacity_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let _publisher = ShmQueueFactory
            .create_publisher(&options_in(&dir, "mismatch", 256))
            .unwrap();
        let err = ShmQueueFactory
            .create_subscriber(&options_in(&dir, "mismatch", 512))
            .err()
            .expect("mismatched capacity should fail");
        assert!(matches!(err, TransportError::CapacityMismatch { .. }));
    }

    #[test]
    fn rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "foreign", 256);
        std::fs::write(ShmQueueFactory::segment_path(&options), vec![0xEE; 512]).unwrap();

        let err = ShmQueueFactory
            .create_publisher(&options)
            .err()
            .expect("foreign file should be rejected");
        assert!(matches!(err, TransportError::InvalidSegment { .. }));
    }

    #[test]
    fn dequeue_observes_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "cancel", 256);
        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();
        let cancel = CancellationToken::new();

        let trigger = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let mut buf = vec![0u8; 256];
        let err = subscriber.dequeue(&mut buf, &cancel).unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        trigger.join().unwrap();
    }

    #[test]
    fn concurrent_publishers_do_not_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "concurrent", 64 * 1024);
        let publisher = std::sync::Arc::new(ShmQueueFactory.create_publisher(&options).unwrap());
        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();

        let writers: Vec<_> = (0..4u8)
            .map(|id| {
                let publisher = std::sync::Arc::clone(&publisher);
                thread::spawn(move || {
                    for i in 0..50u8 {
                        assert!(publisher.try_enqueue(&[id, i, id ^ i]));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let cancel = CancellationToken::new();
        let mut buf = vec![0u8; 16];
        let mut last_seen = [None::<u8>; 4];
        for _ in 0..200 {
            let n = subscriber.dequeue(&mut buf, &cancel).unwrap();
            assert_eq!(n, 3);
            let (id, i) = (buf[0], buf[1]);
            assert_eq!(buf[2], id ^ i);
            let slot = &mut last_seen[id as usize];
            assert!(slot.map_or(true, |prev| prev < i), "per-writer order kept");
            *slot = Some(i);
        }
    }

    fn hold_lock_as(options: &QueueOptions, pid: u32) {
        let mut file = OpenOptions::new()
            .write(true)
            .open(ShmQueueFactory::segment_path(options))
            .unwrap();
        file.seek(SeekFrom::Start(LOCK_OFFSET as u64)).unwrap();
        file.write_all(&pid.to_le_bytes()).unwrap();
    }

    fn exited_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn lock_of_exited_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "stale-lock", 256);
        let publisher = ShmQueueFactory.create_publisher(&options).unwrap();
        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();
        hold_lock_as(&options, exited_pid());

        let started = Instant::now();
        assert!(publisher.try_enqueue(b"x"));
        assert!(started.elapsed() < Duration::from_secs(2));

        let mut buf = vec![0u8; 16];
        let n = subscriber
            .dequeue(&mut buf, &CancellationToken::new())
            .unwrap();
        assert_eq!(&buf[..n], b"x");
    }

    #[test]
    fn lock_held_by_live_process_bounds_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "held-lock", 256);
        let publisher = ShmQueueFactory.create_publisher(&options).unwrap();
        let mut subscriber = ShmQueueFactory.create_subscriber(&options).unwrap();
        hold_lock_as(&options, std::process::id());

        let started = Instant::now();
        assert!(!publisher.try_enqueue(b"x"));
        assert!(started.elapsed() < Duration::from_secs(2));

        let cancel = CancellationToken::new();
        let trigger = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                cancel.cancel();
            })
        };
        let started = Instant::now();
        let mut buf = vec![0u8; 16];
        assert!(matches!(
            subscriber.dequeue(&mut buf, &cancel),
            Err(TransportError::Cancelled)
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
        trigger.join().unwrap();

        hold_lock_as(&options, 0);
        assert!(publisher.try_enqueue(b"y"));
    }

    #[test]
    fn remove_deletes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(&dir, "remove", 256);
        drop(ShmQueueFactory.create_publisher(&options).unwrap());

        let path = ShmQueueFactory::segment_path(&options);
        assert!(path.exists());
        ShmQueueFactory::remove(&options).unwrap();
        assert!(!path.exists());
        ShmQueueFactory::remove(&options).unwrap();
    }
}
