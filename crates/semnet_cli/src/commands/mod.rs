//! CLI command implementations.

pub mod dump;
pub mod find;
pub mod inspect;
pub mod verify;

use semnet_core::{Config, CoreError, Memory, StorageDir};
use semnet_storage::{FileBackend, StorageBackend, StorageError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The directory holds no dump.
    #[error("no knowledge base found at {}", .0.display())]
    NotFound(PathBuf),

    /// A dump file is missing.
    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),

    /// Unknown `--format` value.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Error from the knowledge base.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from a storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Output format shared by commands that print structured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(value: &str) -> Result<Self, CliError> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Opens an existing dump for reading. Nothing is written back on close.
pub fn open_existing(path: &Path) -> Result<Memory, CliError> {
    if !path.join("MANIFEST").exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    let config = Config::new()
        .create_if_missing(false)
        .save_on_close(false)
        .event_threads(1);
    debug!(path = %path.display(), "opening knowledge base read-only");
    Ok(Memory::open_with_config(path, config)?)
}

/// Locks the directory of an existing dump without loading it.
pub fn lock_existing(path: &Path) -> Result<StorageDir, CliError> {
    if !path.join("MANIFEST").exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    Ok(StorageDir::open(path, false)?)
}

/// Reads a whole dump file.
pub fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    if !path.exists() {
        return Err(CliError::MissingFile(path.to_path_buf()));
    }
    Ok(FileBackend::open(path)?.read_all()?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_parsing() {
        assert_eq!(Format::parse("text").unwrap(), Format::Text);
        assert_eq!(Format::parse("json").unwrap(), Format::Json);
        assert!(matches!(
            Format::parse("yaml"),
            Err(CliError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn open_existing_rejects_empty_directory() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            open_existing(temp.path()),
            Err(CliError::NotFound(_))
        ));
    }

    #[test]
    fn open_existing_loads_sample() {
        let temp = tempdir().unwrap();
        test_support::write_sample(temp.path());
        let memory = open_existing(temp.path()).unwrap();
        assert_eq!(memory.stats().unwrap().elements.total(), 10);
    }
}
