//! Link content storage with an exact-match index.

use crate::types::Address;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Byte payloads owned by links.
///
/// Empty content is not stored: a link without an entry reads as empty.
#[derive(Debug, Default)]
pub struct ContentStore {
    inner: RwLock<ContentIndex>,
}

#[derive(Debug, Default)]
struct ContentIndex {
    by_addr: HashMap<Address, Arc<[u8]>>,
    by_content: HashMap<Arc<[u8]>, BTreeSet<Address>>,
}

impl ContentIndex {
    fn unindex(&mut self, addr: Address, content: &Arc<[u8]>) {
        if let Some(owners) = self.by_content.get_mut(content) {
            owners.remove(&addr);
            if owners.is_empty() {
                self.by_content.remove(content);
            }
        }
    }
}

impl ContentStore {
    /// Creates an empty content store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the content of `addr`, returning the previous payload.
    pub fn set(&self, addr: Address, bytes: &[u8]) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.write();
        let previous = inner.by_addr.remove(&addr);
        if let Some(old) = &previous {
            inner.unindex(addr, old);
        }
        if !bytes.is_empty() {
            let shared: Arc<[u8]> = Arc::from(bytes);
            inner
                .by_content
                .entry(Arc::clone(&shared))
                .or_default()
                .insert(addr);
            inner.by_addr.insert(addr, shared);
        }
        previous
    }

    /// Restores a payload captured by [`ContentStore::set`] or
    /// [`ContentStore::remove`].
    pub fn restore(&self, addr: Address, previous: Option<Arc<[u8]>>) {
        match previous {
            Some(bytes) => {
                self.set(addr, &bytes);
            }
            None => {
                self.remove(addr);
            }
        }
    }

    /// Returns the content of `addr` (empty if none was set).
    #[must_use]
    pub fn get(&self, addr: Address) -> Arc<[u8]> {
        self.inner
            .read()
            .by_addr
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Drops the content of `addr`.
    pub fn remove(&self, addr: Address) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.write();
        let previous = inner.by_addr.remove(&addr);
        if let Some(old) = &previous {
            inner.unindex(addr, old);
        }
        previous
    }

    /// Addresses whose content equals `bytes`, in address order.
    #[must_use]
    pub fn find(&self, bytes: &[u8]) -> Vec<Address> {
        self.inner
            .read()
            .by_content
            .get(bytes)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of links holding non-empty content.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_addr.len()
    }

    /// Returns true if no link holds content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.inner.read().by_addr.values().map(|b| b.len()).sum()
    }

    /// All entries sorted by address.
    #[must_use]
    pub fn entries(&self) -> Vec<(Address, Arc<[u8]>)> {
        let mut entries: Vec<_> = self
            .inner
            .read()
            .by_addr
            .iter()
            .map(|(addr, bytes)| (*addr, Arc::clone(bytes)))
            .collect();
        entries.sort_by_key(|(addr, _)| *addr);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_replace() {
        let store = ContentStore::new();
        let link = Address::new(1, 3);

        assert!(store.get(link).is_empty());
        assert!(store.set(link, b"first").is_none());
        let previous = store.set(link, b"second").unwrap();
        assert_eq!(&*previous, b"first");
        assert_eq!(&*store.get(link), b"second");
        assert!(store.find(b"first").is_empty());
    }

    #[test]
    fn find_returns_all_owners() {
        let store = ContentStore::new();
        store.set(Address::new(1, 9), b"apple");
        store.set(Address::new(1, 2), b"apple");
        store.set(Address::new(1, 4), b"pear");

        assert_eq!(
            store.find(b"apple"),
            vec![Address::new(1, 2), Address::new(1, 9)]
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.total_bytes(), 14);
    }

    #[test]
    fn empty_content_is_not_stored() {
        let store = ContentStore::new();
        let link = Address::new(2, 0);
        store.set(link, b"x");
        store.set(link, b"");
        assert!(store.is_empty());
        assert!(store.find(b"").is_empty());
    }

    #[test]
    fn restore_undoes_set() {
        let store = ContentStore::new();
        let link = Address::new(1, 1);
        let previous = store.set(link, b"value");
        store.restore(link, previous);
        assert!(store.get(link).is_empty());

        store.set(link, b"kept");
        let previous = store.remove(link);
        store.restore(link, previous);
        assert_eq!(&*store.get(link), b"kept");
    }
}
