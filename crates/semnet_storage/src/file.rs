//! File-backed storage for persisted segment and content images.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An image stored in a single OS file.
///
/// The file handle and the cached length sit behind one mutex, so a read
/// never observes a half-finished append.
///
/// # Example
///
/// ```no_run
/// use semnet_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut image = FileBackend::open(Path::new("00001.seg")).unwrap();
/// image.replace(b"segment bytes").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    len: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, len }),
        })
    }

    /// Opens the file, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let size = state.len;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.inner.lock();
        let offset = state.len;
        if data.is_empty() {
            return Ok(offset);
        }

        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.len += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if new_size > state.len {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: state.len,
            });
        }

        state.file.set_len(new_size)?;
        state.len = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("00001.seg");

        let image = FileBackend::open(&path).unwrap();
        assert_eq!(image.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(image.path(), path);
    }

    #[test]
    fn append_then_read_back() {
        let dir = tempdir().unwrap();
        let mut image = FileBackend::open(&dir.path().join("content.dat")).unwrap();

        assert_eq!(image.append(b"link").unwrap(), 0);
        assert_eq!(image.append(b" content").unwrap(), 4);
        assert_eq!(image.read_at(5, 7).unwrap(), b"content");
        assert!(matches!(
            image.read_at(10, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn replace_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segments").join("00002.seg");

        {
            let mut image = FileBackend::open_with_create_dirs(&path).unwrap();
            image.append(b"an older and longer image").unwrap();
            image.replace(b"new image").unwrap();
        }

        let image = FileBackend::open(&path).unwrap();
        assert_eq!(image.size().unwrap(), 9);
        assert_eq!(image.read_all().unwrap(), b"new image");
    }

    #[test]
    fn truncate_cannot_grow() {
        let dir = tempdir().unwrap();
        let mut image = FileBackend::open(&dir.path().join("x.seg")).unwrap();
        image.append(b"abc").unwrap();
        assert!(image.truncate(10).is_err());
        image.truncate(1).unwrap();
        assert_eq!(image.read_all().unwrap(), b"a");
    }
}
