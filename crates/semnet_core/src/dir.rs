//! Storage directory management.
//!
//! ```text
//! <path>/
//! ├─ LOCK               # advisory lock, one process at a time
//! ├─ MANIFEST           # dump metadata and keynodes
//! ├─ content.dat        # link content
//! └─ segments/
//!    ├─ 00001.seg
//!    └─ 00002.seg
//! ```
//!
//! A dump first writes every file under a staged `.tmp` name, then the new
//! manifest as `MANIFEST.next`. Once `MANIFEST.next` exists the dump is
//! committed: the staged files are renamed into place and `MANIFEST.next`
//! becomes `MANIFEST`. Opening the directory finishes a committed dump that
//! was interrupted and discards staged files of one that was not.

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const MANIFEST_NEXT: &str = "MANIFEST.next";
const STAGED_EXT: &str = "tmp";
const LOCK_FILE: &str = "LOCK";
const CONTENT_FILE: &str = "content.dat";
const SEGMENTS_DIR: &str = "segments";

/// An opened storage directory. Holds the exclusive LOCK until dropped.
#[derive(Debug)]
pub struct StorageDir {
    path: PathBuf,
    _lock_file: File,
}

impl StorageDir {
    /// Opens or creates a storage directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if the directory is missing and `create_if_missing`
    ///   is false, or if `path` is not a directory
    /// - `DirectoryLocked` if another process holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "storage directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked);
        }

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };
        dir.recover()?;
        Ok(dir)
    }

    /// Staged name of a dump file: the path with `.tmp` appended.
    #[must_use]
    pub fn staged_path(path: &Path) -> PathBuf {
        let mut staged = path.as_os_str().to_owned();
        staged.push(".");
        staged.push(STAGED_EXT);
        PathBuf::from(staged)
    }

    /// Root of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the MANIFEST.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Path of the link content file.
    #[must_use]
    pub fn content_path(&self) -> PathBuf {
        self.path.join(CONTENT_FILE)
    }

    /// Directory holding segment files.
    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        self.path.join(SEGMENTS_DIR)
    }

    /// Path of the file for segment `id`.
    #[must_use]
    pub fn segment_path(&self, id: u16) -> PathBuf {
        self.segments_dir().join(format!("{id:05}.seg"))
    }

    /// Returns true if nothing has been dumped here yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        !self.manifest_path().exists()
    }

    /// Loads the manifest, or `None` for a fresh directory.
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        if data.is_empty() {
            return Ok(None);
        }
        Manifest::decode(&data).map(Some)
    }

    /// Writes the manifest through a temporary file and an atomic rename.
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        self.write_manifest(manifest, &self.manifest_path())
    }

    /// Writes `MANIFEST.next`, committing the files staged so far.
    pub fn stage_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        self.write_manifest(manifest, &self.path.join(MANIFEST_NEXT))
    }

    /// Renames staged files into place, then `MANIFEST.next` over the
    /// MANIFEST. Returns how many data files were published.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` if no manifest is staged.
    pub fn publish_staged(&self) -> CoreResult<usize> {
        let next = self.path.join(MANIFEST_NEXT);
        if !next.exists() {
            return Err(CoreError::invalid_format("no staged manifest to publish"));
        }
        let staged = self.staged_files()?;
        for path in &staged {
            fs::rename(path, path.with_extension(""))?;
        }
        if self.segments_dir().exists() {
            sync_dir(&self.segments_dir())?;
        }
        fs::rename(&next, self.manifest_path())?;
        sync_dir(&self.path)?;
        Ok(staged.len())
    }

    /// Deletes staged files that were never committed.
    pub fn discard_staged(&self) -> CoreResult<usize> {
        let staged = self.staged_files()?;
        for path in &staged {
            fs::remove_file(path)?;
        }
        Ok(staged.len())
    }

    fn staged_files(&self) -> CoreResult<Vec<PathBuf>> {
        let mut staged = Vec::new();
        let content = Self::staged_path(&self.content_path());
        if content.exists() {
            staged.push(content);
        }
        let segments = self.segments_dir();
        if segments.exists() {
            for entry in fs::read_dir(&segments)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == STAGED_EXT) {
                    staged.push(path);
                }
            }
        }
        Ok(staged)
    }

    fn recover(&self) -> CoreResult<()> {
        let next = self.path.join(MANIFEST_NEXT);
        if next.exists() {
            if Manifest::decode(&fs::read(&next)?).is_ok() {
                let published = self.publish_staged()?;
                tracing::info!(path = %self.path.display(), files = published, "finished interrupted dump");
                return Ok(());
            }
            fs::remove_file(&next)?;
        }
        let discarded = self.discard_staged()?;
        if discarded > 0 {
            tracing::info!(path = %self.path.display(), files = discarded, "discarded unfinished dump");
        }
        Ok(())
    }

    fn write_manifest(&self, manifest: &Manifest, target: &Path) -> CoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);
        let mut file = File::create(&temp_path)?;
        file.write_all(&manifest.encode())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, target)?;
        sync_dir(&self.path)
    }

    /// Deletes segment files numbered above `count`.
    ///
    /// Returns how many files were removed.
    pub fn remove_segments_after(&self, count: usize) -> CoreResult<usize> {
        let dir = self.segments_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .filter(|_| path.extension().is_some_and(|ext| ext == "seg"))
                .and_then(|stem| stem.parse::<usize>().ok());
            if id.is_some_and(|id| id > count) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            sync_dir(&dir)?;
        }
        Ok(removed)
    }
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> CoreResult<()> {
    Ok(())
}
