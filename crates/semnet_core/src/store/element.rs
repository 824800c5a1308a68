//! Element records held in segment slots.

use crate::types::{Address, ElementType};

/// Lifecycle of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Unused; on the free list.
    #[default]
    Free,
    /// Allocated for a transaction that has not committed yet. Invisible to
    /// readers.
    Reserved,
    /// Holds a live element.
    Live,
    /// Unlinked by a commit that is still running. Goes back to the free
    /// list when the commit finishes, or back to `Live` if it is undone.
    Retired,
}

/// A copy of one element record.
///
/// Arc lists are threaded through the connectors themselves: an element
/// holds the heads, each connector holds its neighbours in the begin's
/// outgoing list and in the end's incoming list. Both lists are doubly
/// linked so unlinking an arc does not walk the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Element {
    pub(crate) ty: ElementType,
    pub(crate) generation: u32,
    pub(crate) version: u64,
    pub(crate) first_out: Address,
    pub(crate) first_in: Address,
    pub(crate) out_count: u32,
    pub(crate) in_count: u32,
    pub(crate) begin: Address,
    pub(crate) end: Address,
    pub(crate) next_out: Address,
    pub(crate) prev_out: Address,
    pub(crate) next_in: Address,
    pub(crate) prev_in: Address,
}

impl Element {
    pub(crate) fn new(ty: ElementType, generation: u32) -> Self {
        Self {
            ty,
            generation,
            ..Self::default()
        }
    }

    pub(crate) fn connector(ty: ElementType, generation: u32, begin: Address, end: Address) -> Self {
        Self {
            ty,
            generation,
            begin,
            end,
            ..Self::default()
        }
    }

    /// Element type.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    /// Slot generation; bumped each time the slot is reused.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Mutation counter; bumped on every change to this record.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of arcs leaving this element.
    #[must_use]
    pub fn outgoing_count(&self) -> u32 {
        self.out_count
    }

    /// Number of arcs entering this element.
    #[must_use]
    pub fn incoming_count(&self) -> u32 {
        self.in_count
    }

    /// Head of the outgoing list, or `Address::EMPTY`.
    #[must_use]
    pub fn first_outgoing(&self) -> Address {
        self.first_out
    }

    /// Head of the incoming list, or `Address::EMPTY`.
    #[must_use]
    pub fn first_incoming(&self) -> Address {
        self.first_in
    }

    /// Connector begin, or `Address::EMPTY` for nodes and links.
    #[must_use]
    pub fn begin(&self) -> Address {
        self.begin
    }

    /// Connector end, or `Address::EMPTY` for nodes and links.
    #[must_use]
    pub fn end(&self) -> Address {
        self.end
    }

    /// Next arc in the begin's outgoing list.
    #[must_use]
    pub fn next_outgoing(&self) -> Address {
        self.next_out
    }

    /// Next arc in the end's incoming list.
    #[must_use]
    pub fn next_incoming(&self) -> Address {
        self.next_in
    }

    /// Returns true if this element is a connector.
    #[must_use]
    pub fn is_connector(&self) -> bool {
        self.ty.is_connector()
    }

    pub(crate) fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

/// One slot of a segment.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Slot {
    pub(crate) state: SlotState,
    pub(crate) element: Element,
}

impl Slot {
    pub(crate) fn is_live(&self) -> bool {
        self.state == SlotState::Live
    }
}
