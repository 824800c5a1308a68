//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the image.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current image size.
        size: u64,
    },

    /// Truncation past the current end of the image.
    #[error("cannot truncate to {requested} bytes, image holds {size}")]
    TruncatePastEnd {
        /// The requested size.
        requested: u64,
        /// The current image size.
        size: u64,
    },
}
