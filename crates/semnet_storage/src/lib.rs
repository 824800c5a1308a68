//! # SemNet Storage
//!
//! Byte-store backends used by SemNet to persist segment images and the
//! link-content store.
//!
//! Backends know nothing about elements, arcs or segments. They hold
//! opaque bytes; `semnet_core` owns every on-disk format.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral images, used by tests and by dumps that
//!   are inspected without touching disk
//! - [`FileBackend`] - one OS file per image
//!
//! ## Example
//!
//! ```rust
//! use semnet_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"segment header").unwrap();
//! let data = backend.read_at(offset, 14).unwrap();
//! assert_eq!(&data, b"segment header");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
