//! Error types for SemNet core.

use crate::types::{Address, ElementType, TransactionId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SemNet core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The address is empty or points outside any allocated segment.
    #[error("invalid address {addr}")]
    InvalidAddress {
        /// The offending address.
        addr: Address,
    },

    /// The address does not hold a live element.
    #[error("no live element at {addr}")]
    NotFound {
        /// The address looked up.
        addr: Address,
    },

    /// The operation does not apply to the element's type.
    #[error("operation `{operation}` not applicable to type {ty}")]
    InvalidType {
        /// The operation attempted.
        operation: &'static str,
        /// The type it was attempted on.
        ty: ElementType,
    },

    /// An arc endpoint is not a valid existing element.
    #[error("invalid arc endpoint {addr}")]
    InvalidElement {
        /// The endpoint address.
        addr: Address,
    },

    /// Erase blocked because arcs still reference the element.
    #[error("element {addr} still has {incoming} incoming and {outgoing} outgoing arcs")]
    HasDependents {
        /// The element that could not be erased.
        addr: Address,
        /// Remaining incoming arcs.
        incoming: u32,
        /// Remaining outgoing arcs.
        outgoing: u32,
    },

    /// No free slot left and the segment limit is reached.
    #[error("out of element storage: {segments} segments in use")]
    OutOfMemory {
        /// Segments allocated when the request failed.
        segments: usize,
    },

    /// Transaction validation failed against the live store.
    #[error("{txn} conflicts with the store: {reason}")]
    Conflict {
        /// The transaction that failed.
        txn: TransactionId,
        /// What no longer holds.
        reason: String,
    },

    /// A handle passed to the API is no longer usable.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] semnet_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted segment image is malformed.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Invalid on-disk format or version.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Checksum mismatch detected while loading.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Another process holds the storage directory.
    #[error("storage directory locked: another process has exclusive access")]
    DirectoryLocked,

    /// The transaction manager has been shut down.
    #[error("transaction manager is shut down")]
    ManagerShutdown,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The memory context is closed.
    #[error("memory context is closed")]
    MemoryClosed,
}

impl CoreError {
    /// Creates an invalid address error.
    pub fn invalid_address(addr: Address) -> Self {
        Self::InvalidAddress { addr }
    }

    /// Creates a not found error.
    pub fn not_found(addr: Address) -> Self {
        Self::NotFound { addr }
    }

    /// Creates an invalid type error.
    pub fn invalid_type(operation: &'static str, ty: ElementType) -> Self {
        Self::InvalidType { operation, ty }
    }

    /// Creates a conflict error.
    pub fn conflict(txn: TransactionId, reason: impl Into<String>) -> Self {
        Self::Conflict {
            txn,
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying with a fresh transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if the error means "nothing there" rather than a fault.
    ///
    /// Callers usually turn these into an empty result.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidAddress { .. })
    }
}
