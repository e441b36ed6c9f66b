//! Capacity configuration for buffers, cursors, and providers.
//!
//! These sizes control the memory vs disk-spill tradeoff. The defaults
//! keep one window per source plus a small local buffer per cursor.

use std::fmt;

/// Default window capacity (256 KB).
/// Payloads fitting below this stay entirely in memory.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Low-memory window capacity (64 KB).
/// Use when many sources are buffered concurrently.
pub const LOW_MEMORY_BUFFER_SIZE: usize = 64 * 1024;

/// Default per-cursor local buffer (8 KB).
/// Serves repeated small reads without touching the shared window.
pub const DEFAULT_LOCAL_BUFFER_SIZE: usize = 8 * 1024;

/// Returns the appropriate window capacity based on the low_memory flag.
#[inline]
pub const fn buffer_size(low_memory: bool) -> usize {
    if low_memory {
        LOW_MEMORY_BUFFER_SIZE
    } else {
        DEFAULT_BUFFER_SIZE
    }
}

/// Where window contents go once they scroll out of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffHeapMode {
    /// Spill evicted windows to a temp file; historical reads hit disk.
    FileStore,
    /// Keep nothing: reads behind the window report end-of-data.
    Disabled,
}

/// Capacity settings consumed by the provider/buffer factory.
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// In-memory window capacity in bytes. Also the in-memory payload
    /// threshold: anything smaller never touches a buffer at all.
    pub buffer_size: usize,
    /// Per-cursor intermediate buffer in bytes.
    pub local_buffer_size: usize,
    /// Off-heap strategy for data that scrolled out of the window.
    pub off_heap: OffHeapMode,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            local_buffer_size: DEFAULT_LOCAL_BUFFER_SIZE,
            off_heap: OffHeapMode::FileStore,
        }
    }
}

impl BufferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    pub fn with_local_buffer_size(mut self, bytes: usize) -> Self {
        self.local_buffer_size = bytes;
        self
    }

    pub fn with_off_heap(mut self, mode: OffHeapMode) -> Self {
        self.off_heap = mode;
        self
    }
}

impl fmt::Display for BufferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window={}B local={}B off_heap={:?}",
            self.buffer_size, self.local_buffer_size, self.off_heap
        )
    }
}

/// Parse a byte size with an optional `K`/`M`/`G` suffix, e.g. `256K`, `2M`.
///
/// Plain integers are bytes. Suffixes are binary (1K = 1024) and
/// case-insensitive.
pub fn parse_byte_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }

    let (digits, multiplier) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1024usize),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };

    let value: usize = digits.parse().map_err(|_| format!("invalid size: {s}"))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size overflows: {s}"))
}
