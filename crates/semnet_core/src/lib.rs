//! # SemNet Core
//!
//! Transactional storage core of the SemNet semantic-graph knowledge base.
//!
//! This crate provides:
//! - A segmented element store of typed nodes, links and connectors, with
//!   arc lists threaded through the connectors
//! - Striped reader/writer monitors with ordered multi-acquire
//! - Transactions that stage changes in a buffer and commit them atomically
//!   under monitors, advancing a global epoch
//! - Triple and quintuple pattern iterators
//! - Change events, a bounded callback worker pool and agents
//! - Dump and reload of the whole graph, keynodes included
//!
//! The entry point is [`Memory`], which owns all of the above.
//!
//! ## Quick Start
//!
//! ```rust
//! use semnet_core::{ContentStream, ElementType, Memory};
//!
//! let memory = Memory::open_in_memory().unwrap();
//! let concept = memory.node_new(ElementType::CONST_NODE_CLASS).unwrap();
//! let name = memory.link_new(ElementType::CONST_LINK).unwrap();
//! memory
//!     .set_link_content(name, ContentStream::from_str_content("apple"))
//!     .unwrap();
//! memory
//!     .arc_new(ElementType::CONST_COMMON_ARC, concept, name)
//!     .unwrap();
//!
//! assert_eq!(memory.find_links_with_content("apple").unwrap(), vec![name]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod dir;
mod error;
mod event;
mod iterator;
mod keynode;
pub mod manifest;
mod memory;
mod monitor;
pub mod persist;
mod stats;
mod store;
mod stream;
mod transaction;
mod types;

pub use config::{Config, ConflictPolicy, MAX_EVENT_THREADS};
pub use dir::StorageDir;
pub use error::{CoreError, CoreResult};
pub use event::{
    Agent, AgentRegistry, Callback, Event, EventBus, EventKind, SubscriptionId, WorkerPool,
};
pub use iterator::{Iterator3, Iterator5, Param, Quintuples, Triples};
pub use keynode::KeynodeRegistry;
pub use manifest::Manifest;
pub use memory::Memory;
pub use monitor::{MonitorReadGuard, MonitorSet, MonitorTable, MonitorWriteGuard};
pub use stats::{MemoryStats, StatsSnapshot};
pub use store::{ContentStore, Element, ElementStats, ElementStore, SegmentImage, SlotState};
pub use stream::ContentStream;
pub use transaction::{
    ElementSnapshot, Transaction, TransactionBuffer, TransactionManager, TransactionState,
};
pub use types::{Address, ElementType, Epoch, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
