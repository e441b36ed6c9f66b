//! Per-consumer cursors over a shared buffered dataset.
//!
//! Each cursor owns nothing but its own position and mark; many cursors
//! share one [`InputStreamBuffer`] by reference, or a plain byte array
//! for payloads small enough to skip buffering entirely.

use std::io::{self, Read};
use std::sync::Arc;

use crate::buffer::InputStreamBuffer;
use crate::error::{Result, StreamError};

/// One reader's vantage point over a repeatable stream.
///
/// `seek_to` performs no bounds validation: seeking past end-of-data is
/// legal and simply yields end-of-data on the next read. `mark`/`reset`
/// capture and restore the position as a true arbitrary rewind, since the
/// backing buffer supports historical random access. Close is idempotent
/// and terminal; post-close reads fail with [`StreamError::Closed`].
pub trait CursorStream: Read + Send {
    /// Absolute offset of the next byte this cursor will serve.
    fn position(&self) -> u64;

    /// Move to an absolute offset.
    fn seek_to(&mut self, position: u64) -> Result<()>;

    /// Advance the position by `n` bytes without reading them.
    fn skip(&mut self, n: u64) -> Result<()> {
        self.seek_to(self.position() + n)
    }

    /// Remember the current position for a later [`reset`](Self::reset).
    fn mark(&mut self);

    /// Return to the last marked position (offset 0 if never marked).
    fn reset(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Close this cursor, dropping any local resources. Idempotent.
    fn close(&mut self);
}

/// A cursor reading through a shared [`InputStreamBuffer`].
///
/// Reads pull through a small local buffer so that a run of short reads
/// costs one trip to the shared buffer instead of one per call; the local
/// buffer is reloaded only when exhausted and discarded on seek.
pub struct BufferedCursorStream {
    buffer: Arc<InputStreamBuffer>,
    local: Vec<u8>,
    local_capacity: usize,
    /// Next unread index into `local`.
    local_pos: usize,
    position: u64,
    mark: u64,
    closed: bool,
}

impl BufferedCursorStream {
    pub fn new(buffer: Arc<InputStreamBuffer>, local_capacity: usize) -> Self {
        Self {
            buffer,
            local: Vec::with_capacity(local_capacity),
            local_capacity,
            local_pos: 0,
            position: 0,
            mark: 0,
            closed: false,
        }
    }

    /// Bytes left in the local buffer, refilling it from the shared
    /// buffer when empty. `None` means end-of-data at this position.
    fn reload_local_if_empty(&mut self) -> Result<Option<usize>> {
        let remaining = self.local.len() - self.local_pos;
        if remaining > 0 {
            return Ok(Some(remaining));
        }

        self.local.resize(self.local_capacity, 0);
        self.local_pos = 0;
        match self.buffer.get(&mut self.local, self.position) {
            Ok(Some(read)) if read > 0 => {
                self.local.truncate(read);
                Ok(Some(read))
            }
            Ok(_) => {
                self.local.clear();
                Ok(None)
            }
            Err(e) => {
                // Scratch contents must not masquerade as stream bytes.
                self.local.clear();
                Err(e)
            }
        }
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }

        let mut read = 0;
        while read < buf.len() {
            let remaining = match self.reload_local_if_empty()? {
                Some(remaining) => remaining,
                None => break,
            };

            let count = remaining.min(buf.len() - read);
            buf[read..read + count]
                .copy_from_slice(&self.local[self.local_pos..self.local_pos + count]);
            self.local_pos += count;
            self.position += count as u64;
            read += count;
        }

        Ok(read)
    }
}

impl CursorStream for BufferedCursorStream {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek_to(&mut self, position: u64) -> Result<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.position = position;
        // The local buffer holds bytes at the old position.
        self.local.clear();
        self.local_pos = 0;
        Ok(())
    }

    fn mark(&mut self) {
        self.mark = self.position;
    }

    fn reset(&mut self) -> Result<()> {
        self.seek_to(self.mark)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.local = Vec::new();
            self.local_pos = 0;
        }
    }
}

impl Read for BufferedCursorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(Into::into)
    }
}

/// The wholly in-memory cursor variant for small payloads.
///
/// Backed by a shared immutable array: no buffer, no disk, direct
/// indexing. Closing drops this cursor's reference to the array.
pub struct ByteArrayCursorStream {
    bytes: Option<Arc<[u8]>>,
    position: u64,
    mark: u64,
}

impl ByteArrayCursorStream {
    pub fn new(bytes: Arc<[u8]>) -> Self {
        Self {
            bytes: Some(bytes),
            position: 0,
            mark: 0,
        }
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.bytes.as_ref().ok_or(StreamError::Closed)?;

        let len = bytes.len() as u64;
        if self.position >= len {
            return Ok(0);
        }

        let start = self.position as usize;
        let count = buf.len().min(bytes.len() - start);
        buf[..count].copy_from_slice(&bytes[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl CursorStream for ByteArrayCursorStream {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek_to(&mut self, position: u64) -> Result<()> {
        if self.bytes.is_none() {
            return Err(StreamError::Closed);
        }
        self.position = position;
        Ok(())
    }

    fn mark(&mut self) {
        self.mark = self.position;
    }

    fn reset(&mut self) -> Result<()> {
        self.seek_to(self.mark)
    }

    fn is_closed(&self) -> bool {
        self.bytes.is_none()
    }

    fn close(&mut self) {
        self.bytes = None;
    }
}

impl Read for ByteArrayCursorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(Into::into)
    }
}
