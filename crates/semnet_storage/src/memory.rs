//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An image held entirely in memory.
///
/// Used by unit tests and by in-memory graphs that still want to exercise
/// the dump/load path without a directory.
///
/// # Example
///
/// ```rust
/// use semnet_storage::{StorageBackend, InMemoryBackend};
///
/// let mut image = InMemoryBackend::new();
/// image.replace(b"SNSG").unwrap();
/// assert_eq!(image.read_all().unwrap(), b"SNSG");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an image preloaded with `bytes`.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Returns a copy of the image.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= bytes.len() => Ok(bytes[start..end].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}
