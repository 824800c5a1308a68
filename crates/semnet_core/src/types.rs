//! Core type definitions for SemNet.

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Location of one element slot: a segment id and an offset inside it.
///
/// Segment ids start at 1, so the all-zero address never names a live
/// element and serves as the empty sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address {
    /// Segment id (1-based for allocated segments).
    pub segment: u16,
    /// Slot offset inside the segment.
    pub offset: u16,
}

impl Address {
    /// The empty sentinel address.
    pub const EMPTY: Self = Self::new(0, 0);

    /// Creates an address from its parts.
    #[must_use]
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    /// Returns true for the empty sentinel.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.segment == 0 && self.offset == 0
    }

    /// Packs the address into a single integer.
    #[must_use]
    pub const fn hash(self) -> u32 {
        ((self.segment as u32) << 16) | self.offset as u32
    }

    /// Inverse of [`Address::hash`].
    #[must_use]
    pub const fn from_hash(hash: u32) -> Self {
        Self::new((hash >> 16) as u16, (hash & 0xFFFF) as u16)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

/// Element type bitset.
///
/// The low five bits say what the element is (node, link or one of the
/// connector kinds); the remaining bits refine it. Node structure bits reuse
/// the range that arcs use for positivity and permanency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ElementType(u16);

impl ElementType {
    /// No constraint. Matches every element.
    pub const EMPTY: Self = Self(0);

    /// Node.
    pub const NODE: Self = Self(0x1);
    /// Content-bearing link.
    pub const LINK: Self = Self(0x2);
    /// Undirected common edge.
    pub const COMMON_EDGE: Self = Self(0x4);
    /// Directed common arc.
    pub const COMMON_ARC: Self = Self(0x8);
    /// Membership (access) arc.
    pub const ACCESS_ARC: Self = Self(0x10);

    /// Constant.
    pub const CONST: Self = Self(0x20);
    /// Variable.
    pub const VAR: Self = Self(0x40);

    /// Positive membership.
    pub const POS: Self = Self(0x80);
    /// Negative membership.
    pub const NEG: Self = Self(0x100);
    /// Fuzzy membership.
    pub const FUZ: Self = Self(0x200);
    /// Temporary membership.
    pub const TEMP: Self = Self(0x400);
    /// Permanent membership.
    pub const PERM: Self = Self(0x800);

    /// Tuple node.
    pub const NODE_TUPLE: Self = Self(0x80);
    /// Structure node.
    pub const NODE_STRUCT: Self = Self(0x100);
    /// Role relation node.
    pub const NODE_ROLE: Self = Self(0x200);
    /// Non-role relation node.
    pub const NODE_NOROLE: Self = Self(0x400);
    /// Class node.
    pub const NODE_CLASS: Self = Self(0x800);
    /// Abstract node.
    pub const NODE_ABSTRACT: Self = Self(0x1000);
    /// Material node.
    pub const NODE_MATERIAL: Self = Self(0x2000);

    /// Bits that select the element kind.
    pub const ELEMENT_MASK: Self = Self(0x1F);
    /// Bits that select a connector kind.
    pub const CONNECTOR_MASK: Self = Self(0x1C);
    /// Constancy bits.
    pub const CONSTANCY_MASK: Self = Self(0x60);
    /// Positivity bits (connectors).
    pub const POSITIVITY_MASK: Self = Self(0x380);
    /// Permanency bits (connectors).
    pub const PERMANENCY_MASK: Self = Self(0xC00);
    /// Structure bits (nodes).
    pub const NODE_STRUCT_MASK: Self = Self(0x3F80);

    /// Constant node.
    pub const CONST_NODE: Self = Self(0x21);
    /// Variable node.
    pub const VAR_NODE: Self = Self(0x41);
    /// Constant link.
    pub const CONST_LINK: Self = Self(0x22);
    /// Constant class node.
    pub const CONST_NODE_CLASS: Self = Self(0x821);
    /// Constant tuple node.
    pub const CONST_NODE_TUPLE: Self = Self(0xA1);
    /// Constant structure node.
    pub const CONST_NODE_STRUCT: Self = Self(0x121);
    /// Constant role relation node.
    pub const CONST_NODE_ROLE: Self = Self(0x221);
    /// Constant non-role relation node.
    pub const CONST_NODE_NOROLE: Self = Self(0x421);
    /// Positive permanent membership arc of any constancy.
    pub const PERM_POS_ARC: Self = Self(0x890);
    /// Constant positive permanent membership arc.
    pub const CONST_PERM_POS_ARC: Self = Self(0x8B0);
    /// Variable positive permanent membership arc.
    pub const VAR_PERM_POS_ARC: Self = Self(0x8D0);
    /// Constant negative permanent membership arc.
    pub const CONST_PERM_NEG_ARC: Self = Self(0x930);
    /// Constant positive temporary membership arc.
    pub const CONST_TEMP_POS_ARC: Self = Self(0x4B0);
    /// Constant fuzzy membership arc.
    pub const CONST_FUZ_ARC: Self = Self(0x230);
    /// Constant common arc.
    pub const CONST_COMMON_ARC: Self = Self(0x28);
    /// Constant common edge.
    pub const CONST_COMMON_EDGE: Self = Self(0x24);

    /// Creates a type from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if every bit of `mask` is set.
    #[must_use]
    pub const fn has_subtype(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// Returns true if this type satisfies the constraint `constraint`.
    ///
    /// The empty constraint matches everything.
    #[must_use]
    pub const fn matches(self, constraint: Self) -> bool {
        self.has_subtype(constraint)
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true for nodes.
    #[must_use]
    pub const fn is_node(self) -> bool {
        self.0 & Self::NODE.0 != 0
    }

    /// Returns true for links.
    #[must_use]
    pub const fn is_link(self) -> bool {
        self.0 & Self::LINK.0 != 0
    }

    /// Returns true for any connector kind (edge or arc).
    #[must_use]
    pub const fn is_connector(self) -> bool {
        self.0 & Self::CONNECTOR_MASK.0 != 0
    }

    /// Returns true for directed connectors.
    #[must_use]
    pub const fn is_arc(self) -> bool {
        self.0 & (Self::COMMON_ARC.0 | Self::ACCESS_ARC.0) != 0
    }

    /// Returns true if exactly one element kind bit is set.
    #[must_use]
    pub const fn is_valid_element(self) -> bool {
        (self.0 & Self::ELEMENT_MASK.0).count_ones() == 1
    }

    /// Returns true if an element of this type may be refined to `target`.
    ///
    /// Refinement may add bits inside a group that is still unset; it may
    /// never change the element kind or replace a bit that is already set.
    #[must_use]
    pub fn is_extendable_to(self, target: Self) -> bool {
        if conflicts(self, target, Self::ELEMENT_MASK) || conflicts(self, target, Self::CONSTANCY_MASK)
        {
            return false;
        }

        if self.is_node() {
            target.is_node() && !conflicts(self, target, Self::NODE_STRUCT_MASK)
        } else if self.is_link() {
            target.is_link()
        } else if self.is_connector() {
            target.is_connector()
                && !conflicts(self, target, Self::CONNECTOR_MASK)
                && !conflicts(self, target, Self::POSITIVITY_MASK)
                && !conflicts(self, target, Self::PERMANENCY_MASK)
        } else {
            true
        }
    }
}

fn conflicts(current: ElementType, target: ElementType, mask: ElementType) -> bool {
    let old = current.0 & mask.0;
    old != 0 && old != target.0 & mask.0
}

impl BitOr for ElementType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ElementType {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Unique identifier for a transaction.
///
/// Ids are assigned from 1 and never reused. Id 0 marks a transaction that
/// was never handed out by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// The degenerate sentinel id.
    pub const NONE: Self = Self(0);

    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Global commit counter value.
///
/// Every committed transaction advances the epoch by one, giving a total
/// order over commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    /// Creates an epoch value.
    #[must_use]
    pub const fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following epoch.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_address() {
        assert!(Address::EMPTY.is_empty());
        assert!(!Address::new(1, 0).is_empty());
        assert_eq!(Address::default(), Address::EMPTY);
    }

    #[test]
    fn address_hash_layout() {
        assert_eq!(Address::new(2, 7).hash(), 0x0002_0007);
        assert_eq!(format!("{}", Address::new(2, 7)), "2:7");
    }

    #[test]
    fn type_constraints() {
        let arc = ElementType::CONST_PERM_POS_ARC;
        assert!(arc.matches(ElementType::PERM_POS_ARC));
        assert!(arc.matches(ElementType::EMPTY));
        assert!(!ElementType::PERM_POS_ARC.matches(arc));
        assert!(arc.is_connector() && arc.is_arc());
        assert!(!ElementType::CONST_COMMON_EDGE.is_arc());
        assert!(ElementType::CONST_COMMON_EDGE.is_connector());
        assert!(ElementType::CONST_LINK.is_link());
        assert!(!(ElementType::NODE | ElementType::LINK).is_valid_element());
    }

    #[test]
    fn extendable_types() {
        assert!(ElementType::NODE.is_extendable_to(ElementType::CONST_NODE_CLASS));
        assert!(ElementType::CONST_NODE.is_extendable_to(ElementType::CONST_NODE_TUPLE));
        assert!(!ElementType::CONST_NODE.is_extendable_to(ElementType::VAR_NODE));
        assert!(!ElementType::CONST_NODE_CLASS.is_extendable_to(ElementType::CONST_NODE_TUPLE));
        assert!(!ElementType::NODE.is_extendable_to(ElementType::LINK));
        assert!(ElementType::ACCESS_ARC.is_extendable_to(ElementType::CONST_PERM_POS_ARC));
        assert!(!ElementType::CONST_PERM_POS_ARC.is_extendable_to(ElementType::CONST_PERM_NEG_ARC));
        assert!(!ElementType::ACCESS_ARC.is_extendable_to(ElementType::CONST_COMMON_ARC));
    }

    #[test]
    fn transaction_id_sentinel() {
        assert!(TransactionId::NONE.is_none());
        assert!(TransactionId::new(1) > TransactionId::NONE);
        assert_eq!(Epoch::new(4).next().as_u64(), 5);
    }

    proptest! {
        #[test]
        fn address_round_trips_through_hash(segment in any::<u16>(), offset in any::<u16>()) {
            let addr = Address::new(segment, offset);
            prop_assert_eq!(Address::from_hash(addr.hash()), addr);
        }
    }
}
