//! Cursor factories and reference-counted lifecycle management.
//!
//! A [`CursorStreamProvider`] opens any number of cursors against one
//! shared backing (an in-memory array or an [`InputStreamBuffer`]) and
//! guarantees the backing is released exactly once, only after the
//! provider is closed AND every open cursor has closed (the
//! "last one out" rule). A cursor mid-traversal therefore never sees its
//! spill file vanish, and nothing requires an external reference count.

use rustc_hash::FxHashSet;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};

use crate::buffer::InputStreamBuffer;
use crate::config::{BufferConfig, OffHeapMode};
use crate::cursor::{BufferedCursorStream, ByteArrayCursorStream, CursorStream};
use crate::error::{Result, StreamError};
use crate::store::{FileStore, NullStore, OffHeapStore, TempFileManager};

/// How a provider backs its cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStrategy {
    /// Payload fit under the threshold: a shared array, no disk.
    InMemory,
    /// Payload filled the threshold: shared buffer with optional spill.
    Buffered,
}

/// Source of cursors plus the release action for their shared backing.
trait CursorBacking: Send + Sync {
    fn open(&self) -> Result<Box<dyn CursorStream>>;
    fn release(&self);
}

struct InMemoryBacking {
    bytes: Mutex<Option<Arc<[u8]>>>,
}

impl CursorBacking for InMemoryBacking {
    fn open(&self) -> Result<Box<dyn CursorStream>> {
        let bytes = self
            .bytes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StreamError::Closed)?;
        Ok(Box::new(ByteArrayCursorStream::new(bytes)))
    }

    fn release(&self) {
        // Cursors still holding the array keep it alive; this just drops
        // the provider's reference.
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

struct BufferedBacking {
    buffer: Arc<InputStreamBuffer>,
    local_buffer_size: usize,
}

impl CursorBacking for BufferedBacking {
    fn open(&self) -> Result<Box<dyn CursorStream>> {
        Ok(Box::new(BufferedCursorStream::new(
            self.buffer.clone(),
            self.local_buffer_size,
        )))
    }

    fn release(&self) {
        self.buffer.close();
    }
}

/// Tracks the live cursor set and fires the release action exactly once.
struct CursorRegistry {
    live: Mutex<FxHashSet<u64>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    released: Once,
    backing: Box<dyn CursorBacking>,
}

impl CursorRegistry {
    fn new(backing: Box<dyn CursorBacking>) -> Self {
        Self {
            live: Mutex::new(FxHashSet::default()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            released: Once::new(),
            backing,
        }
    }

    fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_live().insert(id);
        id
    }

    fn unregister(&self, id: u64) {
        let empty = {
            let mut live = self.lock_live();
            live.remove(&id);
            live.is_empty()
        };

        if empty && self.closed.load(Ordering::Acquire) {
            self.fire_release();
        }
    }

    fn close_provider(&self) {
        self.closed.store(true, Ordering::Release);
        if self.lock_live().is_empty() {
            self.fire_release();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn fire_release(&self) {
        self.released.call_once(|| self.backing.release());
    }

    fn lock_live(&self) -> std::sync::MutexGuard<'_, FxHashSet<u64>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A cursor handle that removes itself from its provider's live set when
/// closed (or dropped), triggering backing release if it was the last one
/// out of an already-closed provider.
pub struct ManagedCursorStream {
    inner: Box<dyn CursorStream>,
    registry: Arc<CursorRegistry>,
    id: u64,
    closed: bool,
}

impl ManagedCursorStream {
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        self.inner.seek_to(position)
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.inner.skip(n)
    }

    pub fn mark(&mut self) {
        self.inner.mark();
    }

    pub fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close this cursor and notify the provider. Idempotent; also runs
    /// on drop.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
            self.registry.unregister(self.id);
        }
    }
}

impl Read for ManagedCursorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ManagedCursorStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => self
                .position()
                .checked_add_signed(delta)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before byte 0")
                })?,
            SeekFrom::End(_) => {
                // Total length is unknown until the source is exhausted.
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "seek from end is not supported on a cursor stream",
                ));
            }
        };

        self.seek_to(target)?;
        Ok(target)
    }
}

impl Drop for ManagedCursorStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory and lifecycle owner for cursors over one source stream.
pub struct CursorStreamProvider {
    registry: Arc<CursorRegistry>,
    strategy: ProviderStrategy,
}

impl CursorStreamProvider {
    fn new(backing: Box<dyn CursorBacking>, strategy: ProviderStrategy) -> Self {
        Self {
            registry: Arc::new(CursorRegistry::new(backing)),
            strategy,
        }
    }

    /// Open an independent cursor positioned at offset zero.
    pub fn open_cursor(&self) -> Result<ManagedCursorStream> {
        if self.registry.is_closed() {
            return Err(StreamError::Closed);
        }

        let inner = self.registry.backing.open()?;
        let id = self.registry.register();
        Ok(ManagedCursorStream {
            inner,
            registry: self.registry.clone(),
            id,
            closed: false,
        })
    }

    /// Mark the provider closed. Idempotent. The backing is released now
    /// if no cursors are open, otherwise when the last one closes.
    pub fn close(&self) {
        self.registry.close_provider();
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn strategy(&self) -> ProviderStrategy {
        self.strategy
    }
}

impl Drop for CursorStreamProvider {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds providers, choosing the backing strategy from a bounded
/// prefetch of the source.
pub struct CursorProviderFactory {
    config: BufferConfig,
    files: Arc<TempFileManager>,
    /// When false, a payload filling the window capacity is refused with
    /// [`StreamError::MaximumSizeExceeded`] instead of spilling.
    allow_oversize: bool,
}

impl CursorProviderFactory {
    /// Spill-capable factory: oversized payloads go through an
    /// [`InputStreamBuffer`] with the configured off-heap store.
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            files: Arc::new(TempFileManager::new()),
            allow_oversize: true,
        }
    }

    /// Fixed-capacity factory: payloads larger than `buffer_size` fail at
    /// construction, before any cursor opens.
    pub fn in_memory_only(buffer_size: usize) -> Self {
        Self {
            config: BufferConfig::new().with_buffer_size(buffer_size),
            files: Arc::new(TempFileManager::new()),
            allow_oversize: false,
        }
    }

    /// Substitute the temp-file collaborator (tests point this at a
    /// scratch directory to observe spill-file cleanup).
    pub fn with_temp_files(mut self, files: Arc<TempFileManager>) -> Self {
        self.files = files;
        self
    }

    /// Wrap `source` in a provider. Consumes the source at most once: a
    /// bounded prefetch decides the strategy, and whatever was prefetched
    /// is replayed ahead of the remaining stream.
    pub fn create(&self, source: impl Read + Send + 'static) -> Result<CursorStreamProvider> {
        let mut source = source;
        let prefetched = read_until(&mut source, self.config.buffer_size)?;

        if prefetched.len() < self.config.buffer_size {
            // The whole payload fit: the source is exhausted and can be
            // dropped right away.
            let backing = InMemoryBacking {
                bytes: Mutex::new(Some(Arc::from(prefetched))),
            };
            return Ok(CursorStreamProvider::new(
                Box::new(backing),
                ProviderStrategy::InMemory,
            ));
        }

        if !self.allow_oversize {
            return Err(StreamError::MaximumSizeExceeded {
                max_bytes: self.config.buffer_size,
            });
        }

        let store: Box<dyn OffHeapStore> = match self.config.off_heap {
            OffHeapMode::FileStore => Box::new(FileStore::new(self.files.clone())?),
            OffHeapMode::Disabled => Box::new(NullStore),
        };

        let replay = io::Cursor::new(prefetched).chain(source);
        let buffer = Arc::new(InputStreamBuffer::new(
            Box::new(replay),
            self.config.buffer_size,
            store,
        ));

        let backing = BufferedBacking {
            buffer,
            local_buffer_size: self.config.local_buffer_size,
        };
        Ok(CursorStreamProvider::new(
            Box::new(backing),
            ProviderStrategy::Buffered,
        ))
    }
}

/// Read up to `limit` bytes, looping over short reads, stopping early at
/// end-of-stream.
fn read_until(reader: &mut impl Read, limit: usize) -> io::Result<Vec<u8>> {
    let mut data = vec![0u8; limit];
    let mut filled = 0;

    while filled < limit {
        let read = reader.read(&mut data[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    data.truncate(filled);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_small_payload_selects_in_memory() {
        let factory = CursorProviderFactory::new(BufferConfig::new().with_buffer_size(1024));
        let provider = factory.create(Cursor::new(payload(100))).unwrap();
        assert_eq!(provider.strategy(), ProviderStrategy::InMemory);
    }

    #[test]
    fn test_large_payload_selects_buffered() {
        let factory = CursorProviderFactory::new(BufferConfig::new().with_buffer_size(64));
        let provider = factory.create(Cursor::new(payload(100))).unwrap();
        assert_eq!(provider.strategy(), ProviderStrategy::Buffered);
    }

    #[test]
    fn test_in_memory_only_refuses_oversized_payload() {
        let factory = CursorProviderFactory::in_memory_only(64);
        let result = factory.create(Cursor::new(payload(100)));
        assert!(matches!(
            result,
            Err(StreamError::MaximumSizeExceeded { max_bytes: 64 })
        ));
    }

    #[test]
    fn test_in_memory_only_accepts_fitting_payload() {
        let factory = CursorProviderFactory::in_memory_only(256);
        let provider = factory.create(Cursor::new(payload(100))).unwrap();
        let mut cursor = provider.open_cursor().unwrap();
        let mut out = Vec::new();
        cursor.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload(100));
    }

    #[test]
    fn test_buffered_provider_replays_prefetched_bytes() {
        let data = payload(300);
        let factory = CursorProviderFactory::new(BufferConfig::new().with_buffer_size(64));
        let provider = factory.create(Cursor::new(data.clone())).unwrap();

        let mut cursor = provider.open_cursor().unwrap();
        let mut out = Vec::new();
        cursor.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_open_cursor_after_close_fails() {
        let factory = CursorProviderFactory::new(BufferConfig::default());
        let provider = factory.create(Cursor::new(payload(10))).unwrap();
        provider.close();
        assert!(provider.is_closed());
        assert!(matches!(provider.open_cursor(), Err(StreamError::Closed)));
    }

    #[test]
    fn test_provider_close_is_idempotent() {
        let factory = CursorProviderFactory::new(BufferConfig::default());
        let provider = factory.create(Cursor::new(payload(10))).unwrap();
        provider.close();
        provider.close();
        assert!(provider.is_closed());
    }

    #[test]
    fn test_open_cursor_survives_provider_close() {
        let data = payload(300);
        let factory = CursorProviderFactory::new(BufferConfig::new().with_buffer_size(64));
        let provider = factory.create(Cursor::new(data.clone())).unwrap();

        let mut cursor = provider.open_cursor().unwrap();
        provider.close();

        // Backing release is deferred until this cursor closes.
        let mut out = Vec::new();
        cursor.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_cursors_from_one_provider_are_independent() {
        let data = payload(300);
        let factory = CursorProviderFactory::new(BufferConfig::new().with_buffer_size(64));
        let provider = factory.create(Cursor::new(data.clone())).unwrap();

        let mut a = provider.open_cursor().unwrap();
        let mut b = provider.open_cursor().unwrap();

        let mut from_a = [0u8; 128];
        a.read_exact(&mut from_a).unwrap();
        assert_eq!(b.position(), 0);

        let mut from_b = [0u8; 128];
        b.read_exact(&mut from_b).unwrap();
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn test_managed_cursor_seek_impl() {
        let factory = CursorProviderFactory::new(BufferConfig::default());
        let provider = factory.create(Cursor::new(payload(100))).unwrap();
        let mut cursor = provider.open_cursor().unwrap();

        assert_eq!(cursor.seek(SeekFrom::Start(40)).unwrap(), 40);
        assert_eq!(cursor.seek(SeekFrom::Current(-10)).unwrap(), 30);
        assert!(cursor.seek(SeekFrom::Current(-31)).is_err());
        assert!(cursor.seek(SeekFrom::End(0)).is_err());
    }

    #[test]
    fn test_managed_cursor_close_idempotent_and_terminal() {
        let factory = CursorProviderFactory::new(BufferConfig::default());
        let provider = factory.create(Cursor::new(payload(100))).unwrap();
        let mut cursor = provider.open_cursor().unwrap();

        cursor.close();
        cursor.close();
        assert!(cursor.is_closed());

        let mut dest = [0u8; 4];
        assert!(cursor.read(&mut dest).is_err());
    }

    #[test]
    fn test_read_until_stops_at_limit_and_eof() {
        let mut short = Cursor::new(vec![1u8; 10]);
        assert_eq!(read_until(&mut short, 64).unwrap().len(), 10);

        let mut long = Cursor::new(vec![2u8; 100]);
        assert_eq!(read_until(&mut long, 64).unwrap().len(), 64);
    }
}
