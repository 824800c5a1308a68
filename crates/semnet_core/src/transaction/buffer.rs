//! Per-transaction staging of element changes.

use crate::error::{CoreError, CoreResult};
use crate::store::Element;
use crate::stream::ContentStream;
use crate::types::{Address, ElementType};
use std::collections::{HashMap, HashSet};

/// What a transaction saw of an element, plus the type it wants it to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSnapshot {
    /// Type when observed.
    pub element_type: ElementType,
    /// Slot generation when observed.
    pub generation: u32,
    /// Mutation version when observed.
    pub version: u64,
    /// Type to set on commit, if the transaction changes it.
    pub target_type: Option<ElementType>,
}

impl ElementSnapshot {
    /// Captures the observable state of `element`.
    #[must_use]
    pub fn observe(element: &Element) -> Self {
        Self {
            element_type: element.element_type(),
            generation: element.generation(),
            version: element.version(),
            target_type: None,
        }
    }

    /// Sets the type to apply on commit.
    #[must_use]
    pub fn with_target(mut self, ty: ElementType) -> Self {
        self.target_type = Some(ty);
        self
    }
}

#[derive(Debug, Default)]
struct OrderedSet {
    order: Vec<Address>,
    members: HashSet<Address>,
}

impl OrderedSet {
    fn insert(&mut self, addr: Address) {
        if self.members.insert(addr) {
            self.order.push(addr);
        }
    }

    fn contains(&self, addr: Address) -> bool {
        self.members.contains(&addr)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug)]
struct OrderedMap<V> {
    order: Vec<Address>,
    entries: HashMap<Address, V>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    /// Last write wins; the first insertion fixes the position.
    fn upsert(&mut self, addr: Address, value: V) {
        if self.entries.insert(addr, value).is_none() {
            self.order.push(addr);
        }
    }

    fn get(&self, addr: Address) -> Option<&V> {
        self.entries.get(&addr)
    }

    fn iter(&self) -> impl Iterator<Item = (Address, &V)> + '_ {
        self.order
            .iter()
            .filter_map(|addr| self.entries.get(addr).map(|value| (*addr, value)))
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Staged effects of one transaction.
///
/// Four insertion-ordered collections with unique membership: created
/// addresses, modified addresses with snapshots, removed addresses and
/// pending content. Nothing here touches the live store.
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    created: OrderedSet,
    modified: OrderedMap<ElementSnapshot>,
    removed: OrderedSet,
    content: OrderedMap<ContentStream>,
}

fn require_address(addr: Address) -> CoreResult<()> {
    if addr.is_empty() {
        Err(CoreError::invalid_address(addr))
    } else {
        Ok(())
    }
}

impl TransactionBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly created element. Re-adding is a no-op.
    pub fn record_created(&mut self, addr: Address) -> CoreResult<()> {
        require_address(addr)?;
        self.created.insert(addr);
        Ok(())
    }

    /// Records (or overwrites) the snapshot for `addr`.
    pub fn record_modified(&mut self, addr: Address, snapshot: ElementSnapshot) -> CoreResult<()> {
        require_address(addr)?;
        self.modified.upsert(addr, snapshot);
        Ok(())
    }

    /// Records an erased element. Re-adding is a no-op.
    ///
    /// An address that is both created and removed never reaches the store.
    pub fn record_removed(&mut self, addr: Address) -> CoreResult<()> {
        require_address(addr)?;
        self.removed.insert(addr);
        Ok(())
    }

    /// Stages content for a link, dropping any stream staged before.
    pub fn record_content_change(&mut self, addr: Address, stream: ContentStream) -> CoreResult<()> {
        require_address(addr)?;
        self.content.upsert(addr, stream);
        Ok(())
    }

    /// Returns true if `addr` was created in this buffer.
    #[must_use]
    pub fn contains_created(&self, addr: Address) -> bool {
        self.created.contains(addr)
    }

    /// Returns true if `addr` was removed in this buffer.
    #[must_use]
    pub fn contains_removed(&self, addr: Address) -> bool {
        self.removed.contains(addr)
    }

    /// Returns true if created and removed in this buffer.
    #[must_use]
    pub fn is_transient(&self, addr: Address) -> bool {
        self.contains_created(addr) && self.contains_removed(addr)
    }

    /// Snapshot staged for `addr`.
    #[must_use]
    pub fn snapshot(&self, addr: Address) -> Option<&ElementSnapshot> {
        self.modified.get(addr)
    }

    /// Content staged for `addr`.
    #[must_use]
    pub fn content_change(&self, addr: Address) -> Option<&ContentStream> {
        self.content.get(addr)
    }

    /// Created addresses in insertion order.
    pub fn created(&self) -> impl Iterator<Item = Address> + '_ {
        self.created.order.iter().copied()
    }

    /// Modified addresses with their snapshots, in insertion order.
    pub fn modified(&self) -> impl Iterator<Item = (Address, &ElementSnapshot)> + '_ {
        self.modified.iter()
    }

    /// Removed addresses in insertion order.
    pub fn removed(&self) -> impl Iterator<Item = Address> + '_ {
        self.removed.order.iter().copied()
    }

    /// Content changes in insertion order.
    pub fn content_changes(&self) -> impl Iterator<Item = (Address, &ContentStream)> + '_ {
        self.content.iter()
    }

    /// Number of created addresses.
    #[must_use]
    pub fn created_len(&self) -> usize {
        self.created.len()
    }

    /// Number of modified addresses.
    #[must_use]
    pub fn modified_len(&self) -> usize {
        self.modified.len()
    }

    /// Number of removed addresses.
    #[must_use]
    pub fn removed_len(&self) -> usize {
        self.removed.len()
    }

    /// Number of pending content changes.
    #[must_use]
    pub fn content_changes_len(&self) -> usize {
        self.content.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created_len() == 0
            && self.modified_len() == 0
            && self.removed_len() == 0
            && self.content_changes_len() == 0
    }

    /// Every address mentioned by the buffer, deduplicated, first mention
    /// first.
    #[must_use]
    pub fn touched(&self) -> Vec<Address> {
        let mut seen = HashSet::new();
        self.created()
            .chain(self.modified().map(|(addr, _)| addr))
            .chain(self.removed())
            .chain(self.content_changes().map(|(addr, _)| addr))
            .filter(|addr| seen.insert(*addr))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(version: u64) -> ElementSnapshot {
        ElementSnapshot {
            element_type: ElementType::CONST_NODE,
            generation: 1,
            version,
            target_type: None,
        }
    }

    #[test]
    fn created_is_idempotent() {
        let mut buffer = TransactionBuffer::new();
        let addr = Address::new(1, 1);
        buffer.record_created(addr).unwrap();
        buffer.record_created(addr).unwrap();
        assert_eq!(buffer.created_len(), 1);
        assert!(buffer.contains_created(addr));
    }

    #[test]
    fn content_last_write_wins() {
        let mut buffer = TransactionBuffer::new();
        let link = Address::new(1, 2);
        buffer
            .record_content_change(link, ContentStream::from_str_content("s1"))
            .unwrap();
        buffer
            .record_content_change(link, ContentStream::from_str_content("s2"))
            .unwrap();

        assert_eq!(buffer.content_changes_len(), 1);
        assert_eq!(buffer.content_change(link).unwrap().as_str(), Some("s2"));
    }

    #[test]
    fn modified_overwrites_snapshot_keeps_position() {
        let mut buffer = TransactionBuffer::new();
        let a = Address::new(1, 1);
        let b = Address::new(1, 2);
        buffer.record_modified(a, snapshot(1)).unwrap();
        buffer.record_modified(b, snapshot(1)).unwrap();
        buffer.record_modified(a, snapshot(5)).unwrap();

        let entries: Vec<_> = buffer.modified().map(|(addr, s)| (addr, s.version)).collect();
        assert_eq!(entries, vec![(a, 5), (b, 1)]);
    }

    #[test]
    fn empty_address_rejected_everywhere() {
        let mut buffer = TransactionBuffer::new();
        let empty = Address::EMPTY;
        assert!(matches!(
            buffer.record_created(empty),
            Err(CoreError::InvalidAddress { .. })
        ));
        assert!(buffer.record_modified(empty, snapshot(0)).is_err());
        assert!(buffer.record_removed(empty).is_err());
        assert!(buffer
            .record_content_change(empty, ContentStream::new())
            .is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn created_then_removed_is_transient() {
        let mut buffer = TransactionBuffer::new();
        let addr = Address::new(2, 0);
        buffer.record_created(addr).unwrap();
        buffer.record_removed(addr).unwrap();
        buffer.record_removed(addr).unwrap();
        assert!(buffer.is_transient(addr));
        assert_eq!(buffer.removed_len(), 1);
    }

    #[test]
    fn touched_is_deduplicated_in_first_mention_order() {
        let mut buffer = TransactionBuffer::new();
        let a = Address::new(1, 1);
        let b = Address::new(1, 2);
        let c = Address::new(1, 3);
        buffer.record_modified(b, snapshot(0)).unwrap();
        buffer.record_created(a).unwrap();
        buffer.record_removed(b).unwrap();
        buffer
            .record_content_change(c, ContentStream::new())
            .unwrap();
        assert_eq!(buffer.touched(), vec![a, b, c]);
    }
}
