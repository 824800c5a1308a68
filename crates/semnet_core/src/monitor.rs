//! Striped reader/writer monitors keyed by element address.
//!
//! A fixed table of `parking_lot` read/write locks; an address maps to slot
//! `hash % size`, so distinct addresses may share a monitor. Multi-address
//! acquisition resolves the distinct slots, sorts them ascending and locks
//! in that order. Every caller therefore agrees on one global lock order and
//! circular waits cannot form. Guards release in reverse order on drop.
//!
//! `parking_lot` locks are eventually fair, so a stream of readers cannot
//! starve a waiting writer.

use crate::types::Address;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared guard over one monitor.
pub type MonitorReadGuard<'a> = RwLockReadGuard<'a, ()>;
/// Exclusive guard over one monitor.
pub type MonitorWriteGuard<'a> = RwLockWriteGuard<'a, ()>;

/// The process-wide monitor table of one memory context.
pub struct MonitorTable {
    monitors: Box<[RwLock<()>]>,
}

impl MonitorTable {
    /// Creates a table with `size` monitors (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let monitors = (0..size.max(1)).map(|_| RwLock::new(())).collect();
        Self { monitors }
    }

    /// Number of monitors.
    #[must_use]
    pub fn size(&self) -> usize {
        self.monitors.len()
    }

    /// Monitor slot guarding `addr`.
    #[must_use]
    pub fn slot_of(&self, addr: Address) -> usize {
        addr.hash() as usize % self.monitors.len()
    }

    /// Blocks until `addr` can be read.
    pub fn read(&self, addr: Address) -> MonitorReadGuard<'_> {
        self.monitors[self.slot_of(addr)].read()
    }

    /// Blocks until `addr` can be written.
    pub fn write(&self, addr: Address) -> MonitorWriteGuard<'_> {
        self.monitors[self.slot_of(addr)].write()
    }

    /// Read-locks every monitor covering `addrs` in canonical order.
    ///
    /// Empty addresses are skipped.
    pub fn read_n<I>(&self, addrs: I) -> MonitorSet<'_>
    where
        I: IntoIterator<Item = Address>,
    {
        let slots = self.canonical_slots(addrs);
        let guards = slots
            .iter()
            .map(|&slot| Held::Read(self.monitors[slot].read()))
            .collect();
        MonitorSet { slots, guards }
    }

    /// Write-locks every monitor covering `addrs` in canonical order.
    ///
    /// Empty addresses are skipped.
    pub fn write_n<I>(&self, addrs: I) -> MonitorSet<'_>
    where
        I: IntoIterator<Item = Address>,
    {
        let slots = self.canonical_slots(addrs);
        let guards = slots
            .iter()
            .map(|&slot| Held::Write(self.monitors[slot].write()))
            .collect();
        MonitorSet { slots, guards }
    }

    fn canonical_slots<I>(&self, addrs: I) -> Vec<usize>
    where
        I: IntoIterator<Item = Address>,
    {
        let mut slots: Vec<usize> = addrs
            .into_iter()
            .filter(|addr| !addr.is_empty())
            .map(|addr| self.slot_of(addr))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

impl std::fmt::Debug for MonitorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorTable")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

enum Held<'a> {
    Read(MonitorReadGuard<'a>),
    Write(MonitorWriteGuard<'a>),
}

/// Monitors held together; released in reverse acquisition order.
pub struct MonitorSet<'a> {
    slots: Vec<usize>,
    guards: Vec<Held<'a>>,
}

impl MonitorSet<'_> {
    /// Number of distinct monitors held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Returns true if no monitor is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Slots held, in acquisition order.
    #[must_use]
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }
}

impl Drop for MonitorSet<'_> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            match guard {
                Held::Read(g) => drop(g),
                Held::Write(g) => drop(g),
            }
        }
    }
}

impl std::fmt::Debug for MonitorSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSet")
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}
