//! Off-heap storage for window contents that scrolled out of memory.
//!
//! The buffering engine only ever moves its window forward. Bytes about to
//! be overwritten are handed to an [`OffHeapStore`] first, so cursors can
//! still seek back to them. Two implementations exist: a disk-backed store
//! writing one temp file per buffer, and a no-op store that keeps nothing
//! (a deliberate memory-only tradeoff where behind-window reads simply
//! report end-of-data).

use crossbeam_channel::Sender;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::Result;

/// Byte-addressable append/random-read storage keyed by absolute offset.
///
/// Lifecycle is tied to the owning buffer: `release` is called exactly
/// once when the buffer closes, and must never propagate errors.
pub trait OffHeapStore: Send + Sync {
    /// Positional random read at `offset`. Returns `Ok(None)` when the
    /// store holds no data there; otherwise the number of bytes copied
    /// into `dest` (short counts are normal near the stored tail).
    fn get(&self, dest: &mut [u8], offset: u64) -> Result<Option<usize>>;

    /// Persist a window just before it is overwritten. Windows arrive in
    /// stream order, so an implementation may simply append. Returns
    /// `false` when the store chose not to keep the data.
    fn put(&self, window: &[u8]) -> Result<bool>;

    /// Release backing resources. Idempotent; failures are logged, never
    /// propagated.
    fn release(&self);
}

/// Creates temp files and deletes them on a background worker thread.
///
/// Injected into [`FileStore`] rather than reached for as ambient global
/// state, so tests can point it at a scratch directory and watch cleanup
/// happen.
pub struct TempFileManager {
    dir: Option<PathBuf>,
    tx: Option<Sender<PathBuf>>,
    worker: Option<JoinHandle<()>>,
}

impl TempFileManager {
    /// Manager backed by the system temp directory.
    pub fn new() -> Self {
        Self::with_dir(None)
    }

    /// Manager creating its files inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::with_dir(Some(dir.into()))
    }

    fn with_dir(dir: Option<PathBuf>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<PathBuf>();
        let worker = thread::spawn(move || {
            for path in rx {
                if let Err(e) = fs::remove_file(&path) {
                    log::debug!("could not delete buffer file {}: {e}", path.display());
                }
            }
        });

        Self {
            dir,
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Create a new temp file that survives until explicitly deleted.
    pub fn create_file(&self, prefix: &str) -> io::Result<(File, PathBuf)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(".tmp");

        let named = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        // Detach from tempfile's drop-deletes behavior; deletion is the
        // manager's job, asynchronously, at release time.
        named.keep().map_err(|e| e.error)
    }

    /// Queue `path` for deletion on the worker thread. Falls back to a
    /// synchronous delete if the worker is gone.
    pub fn delete_async(&self, path: PathBuf) {
        let queued = match &self.tx {
            Some(tx) => tx.send(path.clone()).is_ok(),
            None => false,
        };

        if !queued {
            if let Err(e) = fs::remove_file(&path) {
                log::debug!("could not delete buffer file {}: {e}", path.display());
            }
        }
    }
}

impl Default for TempFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain pending deletions
        // and exit; join so no file outlives the manager.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct FileStoreState {
    file: File,
    len: u64,
}

/// Disk-backed [`OffHeapStore`]: one temp file per buffer instance.
///
/// Windows are appended in stream order, so the file always holds exactly
/// the contiguous byte range `[0, len)` of the source. Reads and writes
/// are serialized by this store's own mutex, independent of the window
/// mutex: the window and the file cover disjoint halves of the dataset at
/// any instant, so a historical read never needs to wait on a reload.
pub struct FileStore {
    state: Mutex<Option<FileStoreState>>,
    path: PathBuf,
    files: Arc<TempFileManager>,
}

impl FileStore {
    pub fn new(files: Arc<TempFileManager>) -> Result<Self> {
        let (file, path) = files.create_file("stream-buffer-")?;
        Ok(Self {
            state: Mutex::new(Some(FileStoreState { file, len: 0 })),
            path,
            files,
        })
    }

    /// Path of the backing file. Exposed for lifecycle tests.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<FileStoreState>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OffHeapStore for FileStore {
    fn get(&self, dest: &mut [u8], offset: u64) -> Result<Option<usize>> {
        let mut guard = self.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => return Ok(None),
        };

        if offset >= state.len || dest.is_empty() {
            return Ok(None);
        }

        let available = (state.len - offset).min(dest.len() as u64) as usize;
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.read_exact(&mut dest[..available])?;
        Ok(Some(available))
    }

    fn put(&self, window: &[u8]) -> Result<bool> {
        let mut guard = self.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => return Ok(false),
        };

        state.file.seek(SeekFrom::Start(state.len))?;
        state.file.write_all(window)?;
        state.len += window.len() as u64;
        Ok(true)
    }

    fn release(&self) {
        // Taking the state closes the file handle; repeated calls find
        // nothing left to do.
        let state = self.lock().take();
        if state.is_some() {
            self.files.delete_async(self.path.clone());
        }
    }
}

/// No-op [`OffHeapStore`]: keeps nothing, reports nothing found.
pub struct NullStore;

impl OffHeapStore for NullStore {
    fn get(&self, _dest: &mut [u8], _offset: u64) -> Result<Option<usize>> {
        Ok(None)
    }

    fn put(&self, _window: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn release(&self) {}
}
