//! Memory context statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! use semnet_core::Memory;
//!
//! let memory = Memory::open_in_memory()?;
//! memory.node_new(ElementType::CONST_NODE)?;
//!
//! let stats = memory.stats()?;
//! println!("Nodes: {}", stats.elements.nodes);
//! println!("Commits: {}", stats.transactions_committed);
//! ```

use crate::store::ElementStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one memory context.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct MemoryStats {
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    conflicts: AtomicU64,
    elements_created: AtomicU64,
    elements_erased: AtomicU64,
    content_writes: AtomicU64,
    iterator_scans: AtomicU64,
    saves: AtomicU64,
}

impl MemoryStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, created: usize, erased: usize, content: usize) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.elements_created
            .fetch_add(created as u64, Ordering::Relaxed);
        self.elements_erased.fetch_add(erased as u64, Ordering::Relaxed);
        self.content_writes.fetch_add(content as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.transactions_rolled_back
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an all-variable pattern that had to scan every connector.
    pub(crate) fn record_scan(&self) {
        self.iterator_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions handed out.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Transactions rolled back, including failed commits.
    pub fn transactions_rolled_back(&self) -> u64 {
        self.transactions_rolled_back.load(Ordering::Relaxed)
    }

    /// Commits rejected by validation.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Elements made live by commits.
    pub fn elements_created(&self) -> u64 {
        self.elements_created.load(Ordering::Relaxed)
    }

    /// Elements erased by commits.
    pub fn elements_erased(&self) -> u64 {
        self.elements_erased.load(Ordering::Relaxed)
    }

    /// Link contents written by commits.
    pub fn content_writes(&self) -> u64 {
        self.content_writes.load(Ordering::Relaxed)
    }

    /// Slow-path iterator scans.
    pub fn iterator_scans(&self) -> u64 {
        self.iterator_scans.load(Ordering::Relaxed)
    }

    /// Dumps to the storage directory.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Combines the counters with current element counts.
    #[must_use]
    pub fn snapshot(&self, elements: ElementStats) -> StatsSnapshot {
        StatsSnapshot {
            elements,
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_rolled_back: self.transactions_rolled_back(),
            conflicts: self.conflicts(),
            elements_created: self.elements_created(),
            elements_erased: self.elements_erased(),
            content_writes: self.content_writes(),
            iterator_scans: self.iterator_scans(),
            saves: self.saves(),
        }
    }
}

/// A point-in-time copy of [`MemoryStats`] plus element counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Live element counts.
    pub elements: ElementStats,
    /// Transactions handed out.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back, including failed commits.
    pub transactions_rolled_back: u64,
    /// Commits rejected by validation.
    pub conflicts: u64,
    /// Elements made live by commits.
    pub elements_created: u64,
    /// Elements erased by commits.
    pub elements_erased: u64,
    /// Link contents written by commits.
    pub content_writes: u64,
    /// Slow-path iterator scans.
    pub iterator_scans: u64,
    /// Dumps to the storage directory.
    pub saves: u64,
}
