//! Named system elements.
//!
//! A keynode is an element the application refers to by a stable name
//! rather than by address. The registry is populated lazily by
//! [`crate::Memory::resolve_keynode`] and persisted in the MANIFEST.

use crate::error::CoreResult;
use crate::types::Address;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Name to address map for keynodes.
#[derive(Debug, Default)]
pub struct KeynodeRegistry {
    names: RwLock<HashMap<String, Address>>,
}

impl KeynodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from persisted entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Address)>,
    {
        Self {
            names: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Looks up a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Address> {
        self.names.read().get(name).copied()
    }

    /// Binds `name` to `addr`, returning the previous binding.
    pub fn insert(&self, name: impl Into<String>, addr: Address) -> Option<Address> {
        self.names.write().insert(name.into(), addr)
    }

    /// Drops a binding.
    pub fn remove(&self, name: &str) -> Option<Address> {
        self.names.write().remove(name)
    }

    /// Returns the bound address if `is_live` accepts it, otherwise calls
    /// `create` and binds its result.
    ///
    /// The registry stays write-locked while `create` runs, so concurrent
    /// resolvers of one name agree on a single element.
    pub fn resolve<L, C>(&self, name: &str, is_live: L, create: C) -> CoreResult<Address>
    where
        L: Fn(Address) -> bool,
        C: FnOnce() -> CoreResult<Address>,
    {
        if let Some(addr) = self.get(name).filter(|&addr| is_live(addr)) {
            return Ok(addr);
        }
        let mut names = self.names.write();
        if let Some(&addr) = names.get(name) {
            if is_live(addr) {
                return Ok(addr);
            }
        }
        let addr = create()?;
        names.insert(name.to_string(), addr);
        Ok(addr)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    /// All bindings, sorted by name.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Address)> {
        let mut entries: Vec<_> = self
            .names
            .read()
            .iter()
            .map(|(name, &addr)| (name.clone(), addr))
            .collect();
        entries.sort();
        entries
    }
}
