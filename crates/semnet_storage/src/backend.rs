//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store holding one persisted image (a segment file or
/// the content file).
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` hands appended data to the OS, `sync` makes it durable
/// - Backends must be `Send + Sync` so a dump can run off the caller thread
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the image and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes buffered writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the image in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the image to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncatePastEnd`] if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole image.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`StorageBackend::size`] and
    /// [`StorageBackend::read_at`].
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| crate::StorageError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }

    /// Replaces the whole image with `data` and syncs it.
    ///
    /// Dumps rewrite an image wholesale rather than appending to it.
    ///
    /// # Errors
    ///
    /// Propagates errors from truncation, append or sync.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }
}
