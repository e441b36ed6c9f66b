//! The buffering engine: random repeatable access over a single-pass source.
//!
//! An [`InputStreamBuffer`] owns a fixed-capacity in-memory window over the
//! most recently pulled slice of the source, plus an [`OffHeapStore`] for
//! everything that already scrolled out. The buffer itself has no read
//! position: callers name absolute offsets and the buffer classifies each
//! request against the window.
//!
//! The window is ALWAYS moving forward. It never rewinds to reload
//! historical data; bytes behind `buffer_range.start` are only reachable
//! through the off-heap store, and bytes ahead of `buffer_range.end` are
//! pulled from the source, spilling the current window first.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StreamError};
use crate::range::Range;
use crate::store::OffHeapStore;

struct WindowState {
    window: Box<[u8]>,
    /// Valid bytes at the front of `window`; always `buffer_range.len()`.
    window_len: usize,
    /// Absolute offsets currently held in memory. Only ever advances.
    buffer_range: Range,
    /// The single-pass producer. Dropped on close, and once exhausted.
    source: Option<Box<dyn Read + Send>>,
    fully_consumed: bool,
}

/// Concurrent random access over the entirety of a streamed dataset.
pub struct InputStreamBuffer {
    state: Mutex<WindowState>,
    store: Box<dyn OffHeapStore>,
    capacity: usize,
    closed: AtomicBool,
}

impl InputStreamBuffer {
    /// Create a buffer over `source` with an in-memory window of
    /// `capacity` bytes, spilling evicted windows into `store`.
    pub fn new(
        source: Box<dyn Read + Send>,
        capacity: usize,
        store: Box<dyn OffHeapStore>,
    ) -> Self {
        Self {
            state: Mutex::new(WindowState {
                window: vec![0u8; capacity].into_boxed_slice(),
                window_len: 0,
                buffer_range: Range::new(0, 0),
                source: Some(source),
                fully_consumed: false,
            }),
            store,
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Window capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the absolute offsets currently held in memory.
    pub fn buffer_range(&self) -> Range {
        self.lock_state().buffer_range
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Copy bytes at absolute `position` into `dest`.
    ///
    /// Returns `Ok(Some(n))` with `n <= dest.len()` bytes copied (short
    /// counts are normal, callers loop), or `Ok(None)` once `position`
    /// sits at or past end-of-data. Requests behind the window are served
    /// by the off-heap store; requests ahead consume the source.
    ///
    /// Fails with [`StreamError::Closed`] after [`close`](Self::close).
    pub fn get(&self, dest: &mut [u8], position: u64) -> Result<Option<usize>> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        if dest.is_empty() {
            return Ok(Some(0));
        }

        let required = Range::of_len(position, dest.len() as u64);
        let mut state = self.lock_state();
        let mut consume = true;

        loop {
            if state.fully_consumed && required.starts_after(&state.buffer_range) {
                return Ok(None);
            }

            if state.buffer_range.contains(&required) {
                let copied = copy_from_window(&state, dest, &required);
                return Ok(Some(copied));
            }

            if required.start < state.buffer_range.start {
                // Purely historical prefix. The window lock is released
                // before touching disk: once classified, this read no
                // longer depends on window state, and holding the lock
                // would stall reloads for no reason.
                drop(state);
                return self.store.get(dest, position);
            }

            if consume {
                while !state.fully_consumed && state.buffer_range.is_behind(&required) {
                    if self.reload(&mut state)? > 0 {
                        if let Some(copied) = serve_overlap(&state, dest, &required) {
                            return Ok(Some(copied));
                        }
                    }
                }
                // Source exhausted or window caught up: one final
                // classification pass without consuming any further.
                consume = false;
            } else {
                return match serve_overlap(&state, dest, &required) {
                    Some(copied) => Ok(Some(copied)),
                    None => Ok(None),
                };
            }
        }
    }

    /// Spill the current window and refill it from the source, advancing
    /// `buffer_range` by the bytes read. Returns the refill count; zero
    /// marks the source fully consumed.
    fn reload(&self, state: &mut WindowState) -> Result<usize> {
        if state.fully_consumed {
            return Ok(0);
        }

        if state.window_len > 0 {
            // A declined put (NullStore) is fine: behind-window reads
            // will simply report end-of-data.
            self.store.put(&state.window[..state.window_len])?;
        }

        let source = state.source.as_mut().ok_or(StreamError::Closed)?;
        let read = source.read(&mut state.window)?;

        if read == 0 {
            state.fully_consumed = true;
            state.source = None;
        } else {
            state.buffer_range = state.buffer_range.advance(read as u64);
            state.window_len = read;
        }

        Ok(read)
    }

    /// Idempotent: releases the window memory, drops the source, and
    /// releases the off-heap store. Never propagates release failures;
    /// the store logs its own, and dropping a reader cannot fail.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut state = self.lock_state();
        state.window = Box::new([]);
        state.window_len = 0;
        state.source = None;
        drop(state);

        self.store.release();
    }

    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for InputStreamBuffer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copy a request fully contained in the window.
fn copy_from_window(state: &WindowState, dest: &mut [u8], required: &Range) -> usize {
    let offset = (required.start - state.buffer_range.start) as usize;
    let count = dest
        .len()
        .min(required.len() as usize)
        .min(state.window_len - offset);
    dest[..count].copy_from_slice(&state.window[offset..offset + count]);
    count
}

/// Serve the window's overlap with `required`, if any. Only an overlap
/// anchored at the request start can be handed back as a short read; the
/// caller re-requests the remainder at its new position.
fn serve_overlap(state: &WindowState, dest: &mut [u8], required: &Range) -> Option<usize> {
    state
        .buffer_range
        .overlap(required)
        .filter(|overlap| !overlap.is_empty() && overlap.start == required.start)
        .map(|overlap| copy_from_window(state, dest, &overlap))
}
