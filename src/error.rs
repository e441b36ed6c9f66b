//! Error taxonomy for the streaming engine.

use std::io;
use thiserror::Error;

/// Errors surfaced while buffering or reading a stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The buffer, cursor, or provider was already closed.
    #[error("stream is closed")]
    Closed,

    /// A non-spilling provider was handed a payload larger than its
    /// fixed capacity. Raised at construction, before any cursor opens.
    #[error("buffer of {max_bytes} bytes was defined but the stream contains more data than that")]
    MaximumSizeExceeded { max_bytes: usize },

    /// Disk or source failure during a window reload or off-heap page.
    /// Never retried internally; retry policy belongs to the caller.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        if let StreamError::Io(io) = e {
            return io;
        }
        let kind = match e {
            StreamError::Closed => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_size_message_names_the_limit() {
        let e = StreamError::MaximumSizeExceeded { max_bytes: 1024 };
        assert!(e.to_string().contains("1024"));
    }

    #[test]
    fn test_io_conversion_preserves_io_errors() {
        let inner = io::Error::new(io::ErrorKind::UnexpectedEof, "short file");
        let e = StreamError::Io(inner);
        let back: io::Error = e.into();
        assert_eq!(back.kind(), io::ErrorKind::UnexpectedEof);
    }
}
