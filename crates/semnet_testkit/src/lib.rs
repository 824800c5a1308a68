//! # SemNet Testkit
//!
//! Test utilities for SemNet.
//!
//! This crate provides:
//! - Memory fixtures and small prepared graphs
//! - Property-based generators for element types and graph operations
//! - An integration harness that mirrors the graph in a plain model
//! - Concurrent stress drivers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use semnet_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_memory() {
//!     with_temp_memory(|memory| {
//!         let node = memory.node_new(ElementType::CONST_NODE).unwrap();
//!         assert!(memory.is_element(node));
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
    pub use semnet_core::{Address, ElementType, Memory};
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
