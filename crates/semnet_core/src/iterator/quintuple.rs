//! Five-position pattern iterator.

use super::{Iterator3, Param};
use crate::monitor::MonitorTable;
use crate::store::ElementStore;
use crate::types::{Address, ElementType};

/// Cursor over `(source, connector, target, attr_connector, attr)` matches,
/// where `attr_connector` runs from `attr` to `connector`.
///
/// The main triple is matched first and each hit is extended with the arcs
/// entering its connector. When only the attribute is fixed, the walk
/// starts from the attribute's outgoing list instead.
pub struct Iterator5<'a> {
    store: &'a ElementStore,
    monitors: &'a MonitorTable,
    params: [Param; 5],
    attribute_first: bool,
    outer: Iterator3<'a>,
    inner: Option<Iterator3<'a>>,
    current: Option<[Address; 5]>,
}

impl<'a> Iterator5<'a> {
    /// Creates an iterator for an arbitrary pattern.
    pub fn new(store: &'a ElementStore, monitors: &'a MonitorTable, params: [Param; 5]) -> Self {
        let [p0, p1, p2, p3, p4] = params;
        let attribute_first =
            p4.is_fixed() && !p0.is_fixed() && !p1.is_fixed() && !p2.is_fixed();
        let outer = if attribute_first {
            Iterator3::new(store, monitors, [p4, p3, p1])
        } else {
            Iterator3::new(store, monitors, [p0, p1, p2])
        };
        Self {
            store,
            monitors,
            params,
            attribute_first,
            outer,
            inner: None,
            current: None,
        }
    }

    /// Attributes of arcs leaving a fixed source.
    pub fn f_a_a_a_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector_type: ElementType,
        target_type: ElementType,
        attr_connector_type: ElementType,
        attr_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source.into(),
                connector_type.into(),
                target_type.into(),
                attr_connector_type.into(),
                attr_type.into(),
            ],
        )
    }

    /// Arcs leaving a fixed source that carry a fixed attribute.
    pub fn f_a_a_a_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector_type: ElementType,
        target_type: ElementType,
        attr_connector_type: ElementType,
        attr: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source.into(),
                connector_type.into(),
                target_type.into(),
                attr_connector_type.into(),
                attr.into(),
            ],
        )
    }

    /// Attributes of arcs between two fixed elements.
    pub fn f_a_f_a_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector_type: ElementType,
        target: Address,
        attr_connector_type: ElementType,
        attr_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source.into(),
                connector_type.into(),
                target.into(),
                attr_connector_type.into(),
                attr_type.into(),
            ],
        )
    }

    /// Arcs between two fixed elements that carry a fixed attribute.
    pub fn f_a_f_a_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source: Address,
        connector_type: ElementType,
        target: Address,
        attr_connector_type: ElementType,
        attr: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source.into(),
                connector_type.into(),
                target.into(),
                attr_connector_type.into(),
                attr.into(),
            ],
        )
    }

    /// Attributes of arcs entering a fixed target.
    pub fn a_a_f_a_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector_type: ElementType,
        target: Address,
        attr_connector_type: ElementType,
        attr_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source_type.into(),
                connector_type.into(),
                target.into(),
                attr_connector_type.into(),
                attr_type.into(),
            ],
        )
    }

    /// Arcs entering a fixed target that carry a fixed attribute.
    pub fn a_a_f_a_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector_type: ElementType,
        target: Address,
        attr_connector_type: ElementType,
        attr: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source_type.into(),
                connector_type.into(),
                target.into(),
                attr_connector_type.into(),
                attr.into(),
            ],
        )
    }

    /// Every arc carrying a fixed attribute. Walks the attribute's
    /// outgoing list.
    pub fn a_a_a_a_f(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector_type: ElementType,
        target_type: ElementType,
        attr_connector_type: ElementType,
        attr: Address,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source_type.into(),
                connector_type.into(),
                target_type.into(),
                attr_connector_type.into(),
                attr.into(),
            ],
        )
    }

    /// Every attributed arc in the store. Scans all live connectors.
    pub fn a_a_a_a_a(
        store: &'a ElementStore,
        monitors: &'a MonitorTable,
        source_type: ElementType,
        connector_type: ElementType,
        target_type: ElementType,
        attr_connector_type: ElementType,
        attr_type: ElementType,
    ) -> Self {
        Self::new(
            store,
            monitors,
            [
                source_type.into(),
                connector_type.into(),
                target_type.into(),
                attr_connector_type.into(),
                attr_type.into(),
            ],
        )
    }

    /// The pattern being matched.
    #[must_use]
    pub fn params(&self) -> [Param; 5] {
        self.params
    }

    /// Returns true if the outer walk is a full connector scan.
    #[must_use]
    pub fn is_scan(&self) -> bool {
        self.outer.is_scan()
    }

    /// Advances to the next match. Returns false once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if inner.next() {
                    if let (Some(outer), Some(inner)) = (self.outer.current(), inner.current()) {
                        self.current = Some(combine(self.attribute_first, outer, inner));
                        return true;
                    }
                }
                self.inner = None;
            }
            if !self.outer.next() {
                self.current = None;
                return false;
            }
            if let Some(outer) = self.outer.current() {
                self.inner = Some(self.nested(outer));
            }
        }
    }

    /// Address at position `index` of the current match.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Address> {
        self.current.and_then(|tuple| tuple.get(index).copied())
    }

    /// The current match.
    #[must_use]
    pub fn current(&self) -> Option<[Address; 5]> {
        self.current
    }

    /// Rewinds to before the first match.
    pub fn reset(&mut self) {
        self.outer.reset();
        self.inner = None;
        self.current = None;
    }

    /// Adapts the cursor into a standard iterator.
    #[must_use]
    pub fn into_quintuples(self) -> Quintuples<'a> {
        Quintuples(self)
    }

    fn nested(&self, outer: [Address; 3]) -> Iterator3<'a> {
        let [p0, _, p2, p3, p4] = self.params;
        let pattern = if self.attribute_first {
            [p0, Param::Fixed(outer[2]), p2]
        } else {
            [p4, p3, Param::Fixed(outer[1])]
        };
        Iterator3::new(self.store, self.monitors, pattern)
    }
}

fn combine(attribute_first: bool, outer: [Address; 3], inner: [Address; 3]) -> [Address; 5] {
    if attribute_first {
        [inner[0], inner[1], inner[2], outer[1], outer[0]]
    } else {
        [outer[0], outer[1], outer[2], inner[1], inner[0]]
    }
}

impl std::fmt::Debug for Iterator5<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iterator5")
            .field("params", &self.params)
            .field("attribute_first", &self.attribute_first)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Standard iterator over the matches of an [`Iterator5`].
#[derive(Debug)]
pub struct Quintuples<'a>(Iterator5<'a>);

impl Iterator for Quintuples<'_> {
    type Item = [Address; 5];

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.next() {
            self.0.current()
        } else {
            None
        }
    }
}
