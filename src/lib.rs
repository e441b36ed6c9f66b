//! rebuf: repeatable buffered byte streams.
//!
//! This library turns a forward-only, single-consumption byte source into
//! a dataset that any number of independent readers can read, seek, and
//! re-read concurrently, without re-invoking the producer.
//!
//! # Features
//!
//! - **Bounded memory**: a fixed-capacity window over the live slice of
//!   the source; data that scrolls out is spilled to a temp file
//! - **Independent cursors**: each reader owns its position and mark
//!   over one shared buffer
//! - **Last-one-out cleanup**: backing resources are released exactly
//!   once, when the provider and every cursor are closed
//!
//! # Example
//!
//! ```rust,no_run
//! use rebuf::{BufferConfig, CursorProviderFactory};
//! use std::fs::File;
//! use std::io::Read;
//!
//! let source = File::open("payload.bin").unwrap();
//! let factory = CursorProviderFactory::new(BufferConfig::default());
//! let provider = factory.create(source).unwrap();
//!
//! let mut cursor = provider.open_cursor().unwrap();
//! let mut head = [0u8; 128];
//! cursor.read_exact(&mut head).unwrap();
//!
//! // Rewind and read the same bytes again.
//! cursor.seek_to(0).unwrap();
//! cursor.read_exact(&mut head).unwrap();
//! ```

pub mod buffer;
pub mod config;
pub mod cursor;
pub mod error;
pub mod provider;
pub mod range;
pub mod store;

// Re-export commonly used types
pub use buffer::InputStreamBuffer;
pub use config::{BufferConfig, OffHeapMode};
pub use cursor::{BufferedCursorStream, ByteArrayCursorStream, CursorStream};
pub use error::{Result, StreamError};
pub use provider::{
    CursorProviderFactory, CursorStreamProvider, ManagedCursorStream, ProviderStrategy,
};
pub use range::Range;
pub use store::{FileStore, NullStore, OffHeapStore, TempFileManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{BufferConfig, OffHeapMode};
    pub use crate::cursor::CursorStream;
    pub use crate::error::{Result, StreamError};
    pub use crate::provider::{CursorProviderFactory, CursorStreamProvider, ProviderStrategy};
}
