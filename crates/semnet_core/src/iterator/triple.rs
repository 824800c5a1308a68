//! Three-position pattern iterator.

use super::Param;
use crate::monitor::MonitorTable;
use crate::store::{Element, ElementStore};
use crate::types::{Address, ElementType};

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Connector(Address),
    Outgoing(Address),
    Incoming(Address),
    Scan,
}

#[derive(Debug)]
enum Cursor {
    Start,
    At(Address),
    Scan { candidates: Vec<Address>, index: usize },
    Done,
}

/// Cursor over `(source, connector, target)` matches.
///
/// ```rust
/// use semnet_core::{ElementStore, ElementType, Iterator3, MonitorTable};
///
/// let store = ElementStore::new(64, 4);
/// let monitors = MonitorTable::new(13);
/// let a = store.allocate(ElementType::CONST_NODE).unwrap();
/// let b = store.allocate(ElementType::CONST_NODE).unwrap();
/// let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
///
/// let mut it = Iterator3::f_a_a(&store, &monitors, a, ElementType::PERM_POS_ARC, ElementType::NODE);
/// assert!(it.next());
/// assert_eq!(it.get(1), Some(arc));
/// assert!(!it.next());
/// ```
pub struct Iterator3<'a> {
    store: &'a ElementStore,
    monitors: &'a MonitorTable,
    params: [Param; 3],
    strategy: Strategy,
    cursor: Cursor,
    current: Option<[Address; 3]>,
}

impl<'a> Iterator3<'a> {
    /// Creates an iterator for an arbitrary pattern.
    pub fn new(store: &'a ElementStore, monitors: &'a MonitorTable, params: [Param; 3]) -> Self {
        let strategy = match params {
            [_, Param::Fixed(connector), _] => Strategy::Connector(connector),
            [Param::Fixed(source), _, _] => Strategy::Outgoing(source),
            [_, _, Param::Fixed(target)] => Strategy::Incoming(target),
            _ => Strategy::Scan,
        };
        Self {
            store,
            monitors,
            params,
            strategy,
            cursor: Cursor::Start,
            current: None,
        }
    }

    /// Fixed source, any connector and target of the given types.
    pub fn f_a_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector_type: ElementType,
        target_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source.into(), connector_type.into(), target_type.into()],
        )
    }

    /// Fixed target, any source and connector of the given types.
    pub fn a_a_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector_type: ElementType,
        target: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source_type.into(), connector_type.into(), target.into()],
        )
    }

    /// Connectors of a type between two fixed elements.
    pub fn f_a_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector_type: ElementType,
        target: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source.into(), connector_type.into(), target.into()],
        )
    }

    /// Endpoints of a fixed connector, filtered by type.
    pub fn a_f_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector: Address,
        target_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source_type.into(), connector.into(), target_type.into()],
        )
    }

    /// Fixed source and connector.
    pub fn f_f_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector: Address,
        target_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source.into(), connector.into(), target_type.into()],
        )
    }

    /// Fixed connector and target.
    pub fn a_f_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector: Address,
        target: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source_type.into(), connector.into(), target.into()],
        )
    }

    /// Checks one fully fixed triple.
    pub fn f_f_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector: Address,
        target: Address,
    ) -> Self {
        Self::new(store, monitors, [source.into(), connector.into(), target.into()])
    }

    /// Every connector in the store matching three type constraints.
    ///
    /// Scans all live connectors.
    pub fn a_a_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector_type: ElementType,
        target_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [source_type.into(), connector_type.into(), target_type.into()],
        )
    }

    /// The pattern being matched.
    #[must_use]
    pub fn params(&self) -> [Param; 3] {
        self.params
    }

    /// Returns true if this pattern falls back to a full connector scan.
    #[must_use]
    pub fn is_scan(&self) -> bool {
        matches!(self.strategy, Strategy::Scan)
    }

    /// Advances to the next match. Returns false once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        while let Some((connector, element)) = self.advance() {
            if let Some(triple) = self.check(connector, &element) {
                self.current = Some(triple);
                return true;
            }
        }
        self.cursor = Cursor::Done;
        self.current = None;
        false
    }

    /// Address at position `index` of the current match.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Address> {
        self.current.and_then(|triple| triple.get(index).copied())
    }

    /// The current match.
    #[must_use]
    pub fn current(&self) -> Option<[Address; 3]> {
        self.current
    }

    /// Rewinds to before the first match.
    pub fn reset(&mut self) {
        self.cursor = Cursor::Start;
        self.current = None;
    }

    /// Adapts the cursor into a standard iterator.
    #[must_use]
    pub fn into_triples(self) -> Triples<'a> {
        Triples(self)
    }

    fn advance(&mut self) -> Option<(Address, Element)> {
        loop {
            match &mut self.cursor {
                Cursor::Done => return None,
                Cursor::Start => {
                    let next = match self.strategy {
                        Strategy::Connector(connector) => {
                            self.cursor = Cursor::Done;
                            return self.read(connector).map(|element| (connector, element));
                        }
                        Strategy::Outgoing(source) => self
                            .read(source)
                            .map_or(Cursor::Done, |element| Cursor::At(element.first_outgoing())),
                        Strategy::Incoming(target) => self
                            .read(target)
                            .map_or(Cursor::Done, |element| Cursor::At(element.first_incoming())),
                        Strategy::Scan => Cursor::Scan {
                            candidates: self.store.live_connectors(),
                            index: 0,
                        },
                    };
                    self.cursor = next;
                }
                Cursor::At(addr) => {
                    let connector = *addr;
                    if connector.is_empty() {
                        self.cursor = Cursor::Done;
                        return None;
                    }
                    let Some(element) = self.read(connector) else {
                        // unlinked under us; the rest of the list is unreachable
                        self.cursor = Cursor::Done;
                        return None;
                    };
                    let next = if matches!(self.strategy, Strategy::Outgoing(_)) {
                        element.next_outgoing()
                    } else {
                        element.next_incoming()
                    };
                    self.cursor = Cursor::At(next);
                    return Some((connector, element));
                }
                Cursor::Scan { candidates, index } => {
                    let Some(&connector) = candidates.get(*index) else {
                        self.cursor = Cursor::Done;
                        return None;
                    };
                    *index += 1;
                    if let Some(element) = self.read(connector) {
                        return Some((connector, element));
                    }
                }
            }
        }
    }

    fn read(&self, addr: Address) -> Option<Element> {
        let _guard = self.monitors.read(addr);
        self.store.get(addr).ok()
    }

    fn type_of(&self, addr: Address) -> Option<ElementType> {
        self.read(addr).map(|element| element.element_type())
    }

    fn check(&self, connector: Address, element: &Element) -> Option<[Address; 3]> {
        if !element.is_connector() {
            return None;
        }
        let connector_ok = match self.params[1] {
            Param::Fixed(addr) => addr == connector,
            Param::Type(ty) => element.element_type().matches(ty),
        };
        let source_ok = connector_ok && self.endpoint_matches(self.params[0], element.begin());
        if source_ok && self.endpoint_matches(self.params[2], element.end()) {
            Some([element.begin(), connector, element.end()])
        } else {
            None
        }
    }

    fn endpoint_matches(&self, param: Param, addr: Address) -> bool {
        match param {
            Param::Fixed(fixed) => fixed == addr,
            Param::Type(ty) => self.type_of(addr).is_some_and(|actual| actual.matches(ty)),
        }
    }
}

impl std::fmt::Debug for Iterator3<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iterator3")
            .field("params", &self.params)
            .field("strategy", &self.strategy)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Standard iterator over the matches of an [`Iterator3`].
#[derive(Debug)]
pub struct Triples<'a>(Iterator3<'a>);

impl Iterator for Triples<'_> {
    type Item = [Address; 3];

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.next() {
            self.0.current()
        } else {
            None
        }
    }
}
