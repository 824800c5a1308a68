//! Pattern iterators over the arc lists.
//!
//! A pattern position is either a fixed address or a type constraint.
//! [`Iterator3`] matches `(source, connector, target)`; [`Iterator5`]
//! extends each match with an attribute connector pointing at the main
//! connector: `(source, connector, target, attr_connector, attr)`.
//!
//! Evaluation strategy, cheapest first:
//! - fixed connector: a single record check
//! - fixed source: walk the source's outgoing list
//! - fixed target: walk the target's incoming list
//! - nothing fixed: scan every live connector. This is O(store size) and
//!   only meant for diagnostics and small graphs.
//!
//! Construction never locks. Every step takes a read monitor on the
//! element it dereferences and releases it before moving on, so a walk
//! that races a commit may observe the list before or after it. Callers
//! that need a stable view must not commit while iterating.
//!
//! Matches come out in list order, newest connector first.

mod quintuple;
mod triple;

pub use quintuple::{Iterator5, Quintuples};
pub use triple::{Iterator3, Triples};

use crate::types::{Address, ElementType};

/// One position of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Exactly this element.
    Fixed(Address),
    /// Any element whose type contains every bit of the constraint.
    Type(ElementType),
}

impl Param {
    /// Returns true if the position is fixed.
    #[must_use]
    pub fn is_fixed(self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// The fixed address, if any.
    #[must_use]
    pub fn address(self) -> Option<Address> {
        match self {
            Self::Fixed(addr) => Some(addr),
            Self::Type(_) => None,
        }
    }
}

impl From<Address> for Param {
    fn from(addr: Address) -> Self {
        Self::Fixed(addr)
    }
}

impl From<ElementType> for Param {
    fn from(ty: ElementType) -> Self {
        Self::Type(ty)
    }
}
