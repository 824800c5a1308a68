//! Segmented element storage.
//!
//! Elements live in fixed-capacity segments addressed by `(segment, offset)`.
//! Arc lists are arena-indexed: "pointers" are addresses resolved through the
//! segment table, and unlinking is a bounds-checked index splice.
//!
//! The store does not take monitors. Callers that need logical isolation
//! hold the relevant monitors (the transaction manager does this on
//! commit); the table latch only keeps each call memory-safe and is never
//! held across a monitor acquire.

mod content;
mod element;

pub use content::ContentStore;
pub use element::{Element, SlotState};

pub(crate) use element::Slot;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::types::{Address, ElementType};
use parking_lot::RwLock;
use std::sync::Arc;

/// Element counts by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementStats {
    /// Live nodes.
    pub nodes: u64,
    /// Live links.
    pub links: u64,
    /// Live connectors (arcs and edges).
    pub connectors: u64,
    /// Allocated segments.
    pub segments: u64,
    /// Slots waiting on the free list.
    pub free_slots: u64,
}

impl ElementStats {
    /// Total live elements.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.nodes + self.links + self.connectors
    }
}

/// Copy of one segment, used by dump and load.
#[derive(Debug, Clone)]
pub struct SegmentImage {
    /// Segment id.
    pub id: u16,
    /// Slot states and records, indexed by offset.
    pub slots: Vec<(SlotState, Element)>,
}

#[derive(Debug)]
struct Segment {
    id: u16,
    slots: Vec<Slot>,
}

#[derive(Debug, Default)]
struct SegmentTable {
    segments: Vec<Segment>,
    free: Vec<Address>,
}

impl SegmentTable {
    fn slot(&self, addr: Address) -> CoreResult<&Slot> {
        if addr.is_empty() || addr.segment == 0 {
            return Err(CoreError::invalid_address(addr));
        }
        self.segments
            .get(usize::from(addr.segment) - 1)
            .and_then(|segment| segment.slots.get(usize::from(addr.offset)))
            .ok_or_else(|| CoreError::invalid_address(addr))
    }

    fn slot_mut(&mut self, addr: Address) -> CoreResult<&mut Slot> {
        if addr.is_empty() || addr.segment == 0 {
            return Err(CoreError::invalid_address(addr));
        }
        self.segments
            .get_mut(usize::from(addr.segment) - 1)
            .and_then(|segment| segment.slots.get_mut(usize::from(addr.offset)))
            .ok_or_else(|| CoreError::invalid_address(addr))
    }

    fn live(&self, addr: Address) -> CoreResult<&Element> {
        let slot = self.slot(addr)?;
        if slot.is_live() {
            Ok(&slot.element)
        } else {
            Err(CoreError::not_found(addr))
        }
    }

    fn live_mut(&mut self, addr: Address) -> CoreResult<&mut Element> {
        let slot = self.slot_mut(addr)?;
        if slot.is_live() {
            Ok(&mut slot.element)
        } else {
            Err(CoreError::not_found(addr))
        }
    }

    fn require_state(&self, addr: Address, state: SlotState) -> CoreResult<Element> {
        let slot = self.slot(addr)?;
        if slot.state == state {
            Ok(slot.element)
        } else {
            Err(CoreError::invalid_operation(format!(
                "slot {addr} is {:?}, expected {state:?}",
                slot.state
            )))
        }
    }

    fn endpoint_is_live(&self, addr: Address) -> bool {
        self.slot(addr).map(Slot::is_live).unwrap_or(false)
    }

    /// Takes a free slot, bumping its generation, or appends one.
    fn take_slot(&mut self, segment_size: u16, max_segments: u16) -> CoreResult<(Address, u32)> {
        while let Some(addr) = self.free.pop() {
            if let Ok(slot) = self.slot(addr) {
                if slot.state == SlotState::Free {
                    return Ok((addr, slot.element.generation.wrapping_add(1)));
                }
            }
        }

        let needs_segment = self
            .segments
            .last()
            .map_or(true, |segment| segment.slots.len() >= usize::from(segment_size));
        if needs_segment {
            if self.segments.len() >= usize::from(max_segments) {
                return Err(CoreError::OutOfMemory {
                    segments: self.segments.len(),
                });
            }
            let id = u16::try_from(self.segments.len() + 1).map_err(|_| CoreError::OutOfMemory {
                segments: self.segments.len(),
            })?;
            tracing::debug!(segment = id, "allocating segment");
            self.segments.push(Segment {
                id,
                slots: Vec::new(),
            });
        }

        let segment = self
            .segments
            .last_mut()
            .ok_or(CoreError::OutOfMemory { segments: 0 })?;
        let offset = u16::try_from(segment.slots.len())
            .map_err(|_| CoreError::OutOfMemory { segments: 0 })?;
        segment.slots.push(Slot::default());
        Ok((Address::new(segment.id, offset), 1))
    }

    fn place(&mut self, addr: Address, state: SlotState, element: Element) -> CoreResult<()> {
        let slot = self.slot_mut(addr)?;
        slot.state = state;
        slot.element = element;
        Ok(())
    }

    fn free_slot(&mut self, addr: Address) -> CoreResult<()> {
        let slot = self.slot_mut(addr)?;
        let generation = slot.element.generation;
        slot.state = SlotState::Free;
        slot.element = Element::new(ElementType::EMPTY, generation);
        self.free.push(addr);
        Ok(())
    }

    /// Prepends `arc` to its begin's outgoing list and its end's incoming list.
    fn link(&mut self, arc: Address) -> CoreResult<()> {
        let (begin, end) = {
            let element = &self.slot(arc)?.element;
            (element.begin, element.end)
        };

        let old_out = self.slot(begin)?.element.first_out;
        if !old_out.is_empty() {
            self.slot_mut(old_out)?.element.prev_out = arc;
        }
        {
            let element = &mut self.slot_mut(arc)?.element;
            element.next_out = old_out;
            element.prev_out = Address::EMPTY;
        }
        {
            let source = &mut self.slot_mut(begin)?.element;
            source.first_out = arc;
            source.out_count += 1;
            source.touch();
        }

        let old_in = self.slot(end)?.element.first_in;
        if !old_in.is_empty() {
            self.slot_mut(old_in)?.element.prev_in = arc;
        }
        {
            let element = &mut self.slot_mut(arc)?.element;
            element.next_in = old_in;
            element.prev_in = Address::EMPTY;
        }
        let target = &mut self.slot_mut(end)?.element;
        target.first_in = arc;
        target.in_count += 1;
        target.touch();
        Ok(())
    }

    /// Splices `arc` out of both lists.
    fn unlink(&mut self, arc: Address) -> CoreResult<()> {
        let element = self.slot(arc)?.element;

        if element.prev_out.is_empty() {
            self.slot_mut(element.begin)?.element.first_out = element.next_out;
        } else {
            self.slot_mut(element.prev_out)?.element.next_out = element.next_out;
        }
        if !element.next_out.is_empty() {
            self.slot_mut(element.next_out)?.element.prev_out = element.prev_out;
        }
        {
            let source = &mut self.slot_mut(element.begin)?.element;
            source.out_count = source.out_count.saturating_sub(1);
            source.touch();
        }

        if element.prev_in.is_empty() {
            self.slot_mut(element.end)?.element.first_in = element.next_in;
        } else {
            self.slot_mut(element.prev_in)?.element.next_in = element.next_in;
        }
        if !element.next_in.is_empty() {
            self.slot_mut(element.next_in)?.element.prev_in = element.prev_in;
        }
        {
            let target = &mut self.slot_mut(element.end)?.element;
            target.in_count = target.in_count.saturating_sub(1);
            target.touch();
        }

        let unlinked = &mut self.slot_mut(arc)?.element;
        unlinked.next_out = Address::EMPTY;
        unlinked.prev_out = Address::EMPTY;
        unlinked.next_in = Address::EMPTY;
        unlinked.prev_in = Address::EMPTY;
        Ok(())
    }

    fn walk(&self, addr: Address, outgoing: bool) -> CoreResult<Vec<Address>> {
        let element = self.live(addr)?;
        let (mut cursor, count) = if outgoing {
            (element.first_out, element.out_count)
        } else {
            (element.first_in, element.in_count)
        };
        let mut arcs = Vec::with_capacity(count as usize);
        while !cursor.is_empty() {
            arcs.push(cursor);
            let arc = &self.slot(cursor)?.element;
            cursor = if outgoing { arc.next_out } else { arc.next_in };
        }
        Ok(arcs)
    }
}

/// The segmented element store.
///
/// # Example
///
/// ```rust
/// use semnet_core::{ElementStore, ElementType};
///
/// let store = ElementStore::new(1024, 8);
/// let a = store.allocate(ElementType::CONST_NODE).unwrap();
/// let b = store.allocate(ElementType::CONST_NODE).unwrap();
/// let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
/// assert_eq!(store.arc_info(arc).unwrap(), (a, b));
/// ```
#[derive(Debug)]
pub struct ElementStore {
    table: RwLock<SegmentTable>,
    content: ContentStore,
    segment_size: u16,
    max_segments: u16,
}

impl ElementStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(segment_size: u16, max_segments: u16) -> Self {
        Self {
            table: RwLock::new(SegmentTable::default()),
            content: ContentStore::new(),
            segment_size: segment_size.max(1),
            max_segments: max_segments.max(1),
        }
    }

    /// Creates an empty store sized from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.segment_size, config.max_segments)
    }

    /// Slots per segment.
    #[must_use]
    pub fn segment_size(&self) -> u16 {
        self.segment_size
    }

    /// Maximum number of segments.
    #[must_use]
    pub fn max_segments(&self) -> u16 {
        self.max_segments
    }

    /// Allocates a live node or link.
    ///
    /// # Errors
    ///
    /// `InvalidType` for connector or malformed types, `OutOfMemory` when
    /// the segment limit is reached.
    pub fn allocate(&self, ty: ElementType) -> CoreResult<Address> {
        check_plain_type("allocate", ty)?;
        let mut table = self.table.write();
        let (addr, generation) = table.take_slot(self.segment_size, self.max_segments)?;
        table.place(addr, SlotState::Live, Element::new(ty, generation))?;
        Ok(addr)
    }

    /// Allocates a node or link slot that stays invisible until published.
    pub fn reserve(&self, ty: ElementType) -> CoreResult<Address> {
        check_plain_type("reserve", ty)?;
        let mut table = self.table.write();
        let (addr, generation) = table.take_slot(self.segment_size, self.max_segments)?;
        table.place(addr, SlotState::Reserved, Element::new(ty, generation))?;
        Ok(addr)
    }

    /// Allocates a connector slot that stays unlinked until published.
    ///
    /// Endpoint liveness is checked by [`ElementStore::publish`].
    pub fn reserve_connector(
        &self,
        ty: ElementType,
        begin: Address,
        end: Address,
    ) -> CoreResult<Address> {
        check_connector_type("reserve_connector", ty)?;
        for endpoint in [begin, end] {
            if endpoint.is_empty() {
                return Err(CoreError::InvalidElement { addr: endpoint });
            }
        }
        let mut table = self.table.write();
        let (addr, generation) = table.take_slot(self.segment_size, self.max_segments)?;
        table.place(
            addr,
            SlotState::Reserved,
            Element::connector(ty, generation, begin, end),
        )?;
        Ok(addr)
    }

    /// Makes a reserved slot live, linking connectors into their lists.
    ///
    /// # Errors
    ///
    /// `InvalidElement` if a connector endpoint is not live.
    pub fn publish(&self, addr: Address) -> CoreResult<()> {
        let mut table = self.table.write();
        let element = table.require_state(addr, SlotState::Reserved)?;
        if element.is_connector() {
            for endpoint in [element.begin, element.end] {
                if !table.endpoint_is_live(endpoint) {
                    return Err(CoreError::InvalidElement { addr: endpoint });
                }
            }
            table.link(addr)?;
        }
        table.slot_mut(addr)?.state = SlotState::Live;
        Ok(())
    }

    /// Reverts a publish: the slot goes back to reserved and is unlinked.
    pub fn unpublish(&self, addr: Address) -> CoreResult<()> {
        let mut table = self.table.write();
        let element = *table.live(addr)?;
        if element.is_connector() {
            table.unlink(addr)?;
        }
        self.content.remove(addr);
        table.slot_mut(addr)?.state = SlotState::Reserved;
        Ok(())
    }

    /// Returns a reserved slot to the free list.
    pub fn release(&self, addr: Address) -> CoreResult<()> {
        let mut table = self.table.write();
        table.require_state(addr, SlotState::Reserved)?;
        table.free_slot(addr)
    }

    /// Returns the state of the slot at `addr`.
    pub fn slot_state(&self, addr: Address) -> CoreResult<SlotState> {
        Ok(self.table.read().slot(addr)?.state)
    }

    /// Reads a slot regardless of its state.
    pub(crate) fn peek(&self, addr: Address) -> CoreResult<(SlotState, Element)> {
        let table = self.table.read();
        let slot = table.slot(addr)?;
        Ok((slot.state, slot.element))
    }

    /// Refines the type of a reserved slot before it is published.
    pub(crate) fn retype_reserved(&self, addr: Address, ty: ElementType) -> CoreResult<()> {
        let mut table = self.table.write();
        let element = table.require_state(addr, SlotState::Reserved)?;
        if !element.ty.is_extendable_to(ty) {
            return Err(CoreError::invalid_type("change_subtype", ty));
        }
        table.slot_mut(addr)?.element.ty = ty;
        Ok(())
    }

    /// Returns a copy of the live element at `addr`.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for the empty or an out-of-range address, `NotFound`
    /// for a slot that is free, reserved or retired.
    pub fn get(&self, addr: Address) -> CoreResult<Element> {
        self.table.read().live(addr).copied()
    }

    /// Returns true if `addr` holds a live element.
    #[must_use]
    pub fn is_element(&self, addr: Address) -> bool {
        self.get(addr).is_ok()
    }

    /// Returns the type of the live element at `addr`.
    pub fn element_type(&self, addr: Address) -> CoreResult<ElementType> {
        Ok(self.get(addr)?.ty)
    }

    /// Creates a live connector and prepends it to both endpoint lists.
    ///
    /// # Errors
    ///
    /// `InvalidType` if `ty` is not a connector type, `InvalidElement` if an
    /// endpoint is not live, `OutOfMemory` when storage is exhausted.
    pub fn connect(&self, ty: ElementType, begin: Address, end: Address) -> CoreResult<Address> {
        check_connector_type("connect", ty)?;
        let mut table = self.table.write();
        for endpoint in [begin, end] {
            if !table.endpoint_is_live(endpoint) {
                return Err(CoreError::InvalidElement { addr: endpoint });
            }
        }
        let (addr, generation) = table.take_slot(self.segment_size, self.max_segments)?;
        table.place(
            addr,
            SlotState::Live,
            Element::connector(ty, generation, begin, end),
        )?;
        table.link(addr)?;
        Ok(addr)
    }

    /// Unlinks a connector from both lists and frees its slot.
    ///
    /// # Errors
    ///
    /// `InvalidType` for nodes and links, `HasDependents` if other arcs
    /// still point at this connector.
    pub fn disconnect(&self, addr: Address) -> CoreResult<()> {
        let mut table = self.table.write();
        let element = *table.live(addr)?;
        if !element.is_connector() {
            return Err(CoreError::invalid_type("disconnect", element.ty));
        }
        check_no_dependents(addr, &element)?;
        table.unlink(addr)?;
        table.free_slot(addr)
    }

    /// Erases an element.
    ///
    /// The element must have no arcs left (connectors can be arc endpoints
    /// too); connectors are unlinked from their endpoints' lists.
    ///
    /// # Errors
    ///
    /// `HasDependents` if a node or link still has arcs.
    pub fn erase(&self, addr: Address) -> CoreResult<()> {
        let mut table = self.table.write();
        let element = *table.live(addr)?;
        check_no_dependents(addr, &element)?;
        if element.is_connector() {
            table.unlink(addr)?;
        }
        self.content.remove(addr);
        table.free_slot(addr)
    }

    /// Unlinks an element but keeps its slot off the free list.
    ///
    /// Returns the record and content needed to [`ElementStore::revive`] it.
    pub fn retire(&self, addr: Address) -> CoreResult<(Element, Option<Arc<[u8]>>)> {
        let mut table = self.table.write();
        let element = *table.live(addr)?;
        check_no_dependents(addr, &element)?;
        if element.is_connector() {
            table.unlink(addr)?;
        }
        table.slot_mut(addr)?.state = SlotState::Retired;
        let content = self.content.remove(addr);
        Ok((element, content))
    }

    /// Brings a retired element back, relinking connectors at the list heads.
    pub fn revive(
        &self,
        addr: Address,
        element: Element,
        content: Option<Arc<[u8]>>,
    ) -> CoreResult<()> {
        let mut table = self.table.write();
        table.require_state(addr, SlotState::Retired)?;
        let mut restored = if element.is_connector() {
            Element::connector(element.ty, element.generation, element.begin, element.end)
        } else {
            Element::new(element.ty, element.generation)
        };
        restored.version = element.version;
        table.place(addr, SlotState::Live, restored)?;
        if restored.is_connector() {
            table.link(addr)?;
        }
        self.content.restore(addr, content);
        Ok(())
    }

    /// Moves retired slots to the free list.
    pub fn recycle(&self, addrs: &[Address]) -> CoreResult<()> {
        let mut table = self.table.write();
        for &addr in addrs {
            table.require_state(addr, SlotState::Retired)?;
            table.free_slot(addr)?;
        }
        Ok(())
    }

    /// Replaces the content of a link, returning the previous payload.
    ///
    /// # Errors
    ///
    /// `InvalidType` if `addr` is not a link.
    pub fn set_content(&self, addr: Address, bytes: &[u8]) -> CoreResult<Option<Arc<[u8]>>> {
        let mut table = self.table.write();
        let element = table.live_mut(addr)?;
        if !element.ty.is_link() {
            return Err(CoreError::invalid_type("set_content", element.ty));
        }
        element.touch();
        Ok(self.content.set(addr, bytes))
    }

    /// Puts back a payload returned by [`ElementStore::set_content`].
    pub(crate) fn restore_content(&self, addr: Address, previous: Option<Arc<[u8]>>) {
        self.content.restore(addr, previous);
    }

    /// Returns the content of a link.
    ///
    /// # Errors
    ///
    /// `InvalidType` if `addr` is not a link.
    pub fn get_content(&self, addr: Address) -> CoreResult<Arc<[u8]>> {
        let table = self.table.read();
        let element = table.live(addr)?;
        if !element.ty.is_link() {
            return Err(CoreError::invalid_type("get_content", element.ty));
        }
        Ok(self.content.get(addr))
    }

    /// Live links whose content equals `bytes`.
    #[must_use]
    pub fn find_links_with_content(&self, bytes: &[u8]) -> Vec<Address> {
        let table = self.table.read();
        self.content
            .find(bytes)
            .into_iter()
            .filter(|addr| table.live(*addr).is_ok())
            .collect()
    }

    /// Refines the type of a live element, returning the previous type.
    ///
    /// # Errors
    ///
    /// `InvalidType` if the current type cannot be extended to `ty`.
    pub fn change_subtype(&self, addr: Address, ty: ElementType) -> CoreResult<ElementType> {
        let mut table = self.table.write();
        let element = table.live_mut(addr)?;
        if !element.ty.is_extendable_to(ty) {
            return Err(CoreError::invalid_type("change_subtype", ty));
        }
        let previous = element.ty;
        element.ty = ty;
        element.touch();
        Ok(previous)
    }

    /// Puts back a type replaced by [`ElementStore::change_subtype`].
    pub(crate) fn restore_type(&self, addr: Address, ty: ElementType) -> CoreResult<()> {
        let mut table = self.table.write();
        let element = table.live_mut(addr)?;
        element.ty = ty;
        element.touch();
        Ok(())
    }

    /// Returns `(begin, end)` of a connector.
    pub fn arc_info(&self, addr: Address) -> CoreResult<(Address, Address)> {
        let element = self.get(addr)?;
        if !element.is_connector() {
            return Err(CoreError::invalid_type("arc_info", element.ty));
        }
        Ok((element.begin, element.end))
    }

    /// Number of arcs leaving `addr`.
    pub fn outgoing_count(&self, addr: Address) -> CoreResult<u32> {
        Ok(self.get(addr)?.out_count)
    }

    /// Number of arcs entering `addr`.
    pub fn incoming_count(&self, addr: Address) -> CoreResult<u32> {
        Ok(self.get(addr)?.in_count)
    }

    /// Arcs leaving `addr`, newest first.
    pub fn outgoing_arcs(&self, addr: Address) -> CoreResult<Vec<Address>> {
        self.table.read().walk(addr, true)
    }

    /// Arcs entering `addr`, newest first.
    pub fn incoming_arcs(&self, addr: Address) -> CoreResult<Vec<Address>> {
        self.table.read().walk(addr, false)
    }

    /// Every live element, in address order.
    #[must_use]
    pub fn live_addresses(&self) -> Vec<Address> {
        let table = self.table.read();
        let mut addrs = Vec::new();
        for segment in &table.segments {
            for (offset, slot) in segment.slots.iter().enumerate() {
                if slot.is_live() {
                    addrs.push(Address::new(segment.id, offset as u16));
                }
            }
        }
        addrs
    }

    /// Every live connector, in address order.
    #[must_use]
    pub fn live_connectors(&self) -> Vec<Address> {
        let table = self.table.read();
        let mut addrs = Vec::new();
        for segment in &table.segments {
            for (offset, slot) in segment.slots.iter().enumerate() {
                if slot.is_live() && slot.element.is_connector() {
                    addrs.push(Address::new(segment.id, offset as u16));
                }
            }
        }
        addrs
    }

    /// Element counts.
    #[must_use]
    pub fn stats(&self) -> ElementStats {
        let table = self.table.read();
        let mut stats = ElementStats {
            segments: table.segments.len() as u64,
            ..ElementStats::default()
        };
        for slot in table.segments.iter().flat_map(|s| s.slots.iter()) {
            match slot.state {
                SlotState::Live if slot.element.ty.is_connector() => stats.connectors += 1,
                SlotState::Live if slot.element.ty.is_link() => stats.links += 1,
                SlotState::Live => stats.nodes += 1,
                SlotState::Free => stats.free_slots += 1,
                SlotState::Reserved | SlotState::Retired => {}
            }
        }
        stats
    }

    /// Number of allocated segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.table.read().segments.len()
    }

    /// Borrows the content store.
    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Copies every segment. Reserved and retired slots are exported as free.
    #[must_use]
    pub fn export(&self) -> Vec<SegmentImage> {
        let table = self.table.read();
        table
            .segments
            .iter()
            .map(|segment| SegmentImage {
                id: segment.id,
                slots: segment
                    .slots
                    .iter()
                    .map(|slot| {
                        if slot.is_live() {
                            (SlotState::Live, slot.element)
                        } else {
                            let generation = slot.element.generation;
                            (SlotState::Free, Element::new(ElementType::EMPTY, generation))
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    /// Replaces the whole store with `images`.
    ///
    /// Images must be ordered by id starting at 1; slots that are not live
    /// become free.
    ///
    /// # Errors
    ///
    /// `SegmentCorruption` if ids are not contiguous or a segment is larger
    /// than the configured segment size.
    pub fn import(&self, images: Vec<SegmentImage>) -> CoreResult<()> {
        if images.len() > usize::from(self.max_segments) {
            return Err(CoreError::segment_corruption(format!(
                "{} segments exceed the limit of {}",
                images.len(),
                self.max_segments
            )));
        }

        let mut table = SegmentTable::default();
        for (index, image) in images.into_iter().enumerate() {
            if usize::from(image.id) != index + 1 {
                return Err(CoreError::segment_corruption(format!(
                    "segment id {} found at position {}",
                    image.id,
                    index + 1
                )));
            }
            if image.slots.len() > usize::from(self.segment_size) {
                return Err(CoreError::segment_corruption(format!(
                    "segment {} holds {} slots, limit is {}",
                    image.id,
                    image.slots.len(),
                    self.segment_size
                )));
            }
            let mut slots = Vec::with_capacity(image.slots.len());
            for (offset, (state, element)) in image.slots.into_iter().enumerate() {
                let state = if state == SlotState::Live {
                    SlotState::Live
                } else {
                    table.free.push(Address::new(image.id, offset as u16));
                    SlotState::Free
                };
                slots.push(Slot { state, element });
            }
            table.segments.push(Segment {
                id: image.id,
                slots,
            });
        }
        table.free.reverse();
        *self.table.write() = table;
        Ok(())
    }
}

fn check_no_dependents(addr: Address, element: &Element) -> CoreResult<()> {
    if element.in_count > 0 || element.out_count > 0 {
        return Err(CoreError::HasDependents {
            addr,
            incoming: element.in_count,
            outgoing: element.out_count,
        });
    }
    Ok(())
}

fn check_plain_type(operation: &'static str, ty: ElementType) -> CoreResult<()> {
    if ty.is_valid_element() && !ty.is_connector() {
        Ok(())
    } else {
        Err(CoreError::invalid_type(operation, ty))
    }
}

fn check_connector_type(operation: &'static str, ty: ElementType) -> CoreResult<()> {
    if ty.is_valid_element() && ty.is_connector() {
        Ok(())
    } else {
        Err(CoreError::invalid_type(operation, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> ElementStore {
        ElementStore::new(64, 4)
    }

    fn node(store: &ElementStore) -> Address {
        store.allocate(ElementType::CONST_NODE).unwrap()
    }

    #[test]
    fn first_address_is_not_empty() {
        let store = store();
        let addr = node(&store);
        assert_eq!(addr, Address::new(1, 0));
        assert_eq!(store.get(addr).unwrap().generation(), 1);
    }

    #[test]
    fn get_rejects_empty_and_out_of_range() {
        let store = store();
        assert!(matches!(
            store.get(Address::EMPTY),
            Err(CoreError::InvalidAddress { .. })
        ));
        assert!(matches!(
            store.get(Address::new(3, 0)),
            Err(CoreError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn connect_prepends_and_counts() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let first = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
        let second = store.connect(ElementType::CONST_COMMON_ARC, a, b).unwrap();

        assert_eq!(store.outgoing_arcs(a).unwrap(), vec![second, first]);
        assert_eq!(store.incoming_arcs(b).unwrap(), vec![second, first]);
        assert_eq!(store.outgoing_count(a).unwrap(), 2);
        assert_eq!(store.incoming_count(b).unwrap(), 2);
        assert_eq!(store.incoming_count(a).unwrap(), 0);
    }

    #[test]
    fn connect_validates_type_and_endpoints() {
        let store = store();
        let a = node(&store);
        assert!(matches!(
            store.connect(ElementType::CONST_NODE, a, a),
            Err(CoreError::InvalidType { .. })
        ));
        assert!(matches!(
            store.connect(ElementType::CONST_PERM_POS_ARC, a, Address::new(1, 40)),
            Err(CoreError::InvalidElement { .. })
        ));
        assert!(matches!(
            store.connect(ElementType::CONST_PERM_POS_ARC, Address::EMPTY, a),
            Err(CoreError::InvalidElement { .. })
        ));
    }

    #[test]
    fn disconnect_middle_of_list() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let arcs: Vec<_> = (0..3)
            .map(|_| store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap())
            .collect();

        store.disconnect(arcs[1]).unwrap();

        assert_eq!(store.outgoing_arcs(a).unwrap(), vec![arcs[2], arcs[0]]);
        assert_eq!(store.incoming_arcs(b).unwrap(), vec![arcs[2], arcs[0]]);
        assert_eq!(store.outgoing_count(a).unwrap(), 2);
        assert!(matches!(store.get(arcs[1]), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn erase_with_dependents_fails() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();

        assert!(matches!(
            store.erase(a),
            Err(CoreError::HasDependents { outgoing: 1, .. })
        ));
        store.erase(arc).unwrap();
        store.erase(a).unwrap();
        assert!(!store.is_element(a));
        assert_eq!(store.incoming_count(b).unwrap(), 0);
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let store = store();
        let a = node(&store);
        let generation = store.get(a).unwrap().generation();
        store.erase(a).unwrap();

        let b = node(&store);
        assert_eq!(a, b);
        assert_eq!(store.get(b).unwrap().generation(), generation + 1);
    }

    #[test]
    fn out_of_memory_past_segment_limit() {
        let store = ElementStore::new(2, 2);
        for _ in 0..4 {
            node(&store);
        }
        assert!(matches!(
            store.allocate(ElementType::CONST_NODE),
            Err(CoreError::OutOfMemory { segments: 2 })
        ));
    }

    #[test]
    fn arcs_between_arcs() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let attr = node(&store);
        let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
        let attr_arc = store.connect(ElementType::CONST_PERM_POS_ARC, attr, arc).unwrap();

        assert_eq!(store.incoming_arcs(arc).unwrap(), vec![attr_arc]);
        assert!(matches!(
            store.erase(arc),
            Err(CoreError::HasDependents { incoming: 1, .. })
        ));
        store.erase(attr_arc).unwrap();
        store.erase(arc).unwrap();
        assert_eq!(store.outgoing_count(a).unwrap(), 0);
    }

    #[test]
    fn content_only_on_links() {
        let store = store();
        let link = store.allocate(ElementType::CONST_LINK).unwrap();
        let n = node(&store);

        store.set_content(link, b"hello").unwrap();
        assert_eq!(&*store.get_content(link).unwrap(), b"hello");
        assert!(matches!(
            store.set_content(n, b"x"),
            Err(CoreError::InvalidType { .. })
        ));
        assert_eq!(store.find_links_with_content(b"hello"), vec![link]);

        store.erase(link).unwrap();
        assert!(store.find_links_with_content(b"hello").is_empty());
    }

    #[test]
    fn reserved_slots_are_invisible_until_published() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let reserved = store
            .reserve_connector(ElementType::CONST_PERM_POS_ARC, a, b)
            .unwrap();

        assert!(!store.is_element(reserved));
        assert_eq!(store.outgoing_count(a).unwrap(), 0);

        store.publish(reserved).unwrap();
        assert_eq!(store.outgoing_arcs(a).unwrap(), vec![reserved]);

        store.unpublish(reserved).unwrap();
        assert_eq!(store.outgoing_count(a).unwrap(), 0);
        store.release(reserved).unwrap();
        assert_eq!(store.slot_state(reserved).unwrap(), SlotState::Free);
    }

    #[test]
    fn publish_fails_for_dead_endpoint() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let reserved = store
            .reserve_connector(ElementType::CONST_PERM_POS_ARC, a, b)
            .unwrap();
        store.erase(b).unwrap();
        assert!(matches!(
            store.publish(reserved),
            Err(CoreError::InvalidElement { .. })
        ));
    }

    #[test]
    fn retire_and_revive_restore_connectivity() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();

        let (record, content) = store.retire(arc).unwrap();
        assert_eq!(store.outgoing_count(a).unwrap(), 0);
        assert_eq!(store.slot_state(arc).unwrap(), SlotState::Retired);
        // retired slots are not handed out again
        assert_ne!(node(&store), arc);

        store.revive(arc, record, content).unwrap();
        assert_eq!(store.outgoing_arcs(a).unwrap(), vec![arc]);
        assert_eq!(store.get(arc).unwrap().generation(), record.generation());
    }

    #[test]
    fn change_subtype_only_refines() {
        let store = store();
        let n = store.allocate(ElementType::NODE).unwrap();
        let previous = store.change_subtype(n, ElementType::CONST_NODE_CLASS).unwrap();
        assert_eq!(previous, ElementType::NODE);
        assert!(store
            .change_subtype(n, ElementType::VAR_NODE)
            .is_err());
        assert_eq!(store.element_type(n).unwrap(), ElementType::CONST_NODE_CLASS);
    }

    #[test]
    fn stats_count_kinds() {
        let store = store();
        let a = node(&store);
        let link = store.allocate(ElementType::CONST_LINK).unwrap();
        store.connect(ElementType::CONST_COMMON_ARC, a, link).unwrap();
        let stats = store.stats();
        assert_eq!((stats.nodes, stats.links, stats.connectors), (1, 1, 1));
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn export_import_preserves_graph() {
        let store = store();
        let a = node(&store);
        let b = node(&store);
        let gone = node(&store);
        let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
        store.erase(gone).unwrap();

        let copy = ElementStore::new(64, 4);
        copy.import(store.export()).unwrap();

        assert_eq!(copy.live_addresses(), store.live_addresses());
        assert_eq!(copy.arc_info(arc).unwrap(), (a, b));
        assert_eq!(copy.outgoing_arcs(a).unwrap(), vec![arc]);
        // the erased slot is reusable in the copy
        assert_eq!(copy.allocate(ElementType::CONST_NODE).unwrap(), gone);
    }

    proptest! {
        #[test]
        fn counts_match_lists(ops in prop::collection::vec((0usize..6, 0usize..6, any::<bool>()), 1..80)) {
            let store = ElementStore::new(32, 8);
            let nodes: Vec<_> = (0..6).map(|_| store.allocate(ElementType::CONST_NODE).unwrap()).collect();
            let mut arcs: Vec<(Address, usize, usize)> = Vec::new();

            for (from, to, remove) in ops {
                if remove && !arcs.is_empty() {
                    let (arc, _, _) = arcs.remove((from * 7 + to) % arcs.len());
                    store.disconnect(arc).unwrap();
                } else {
                    let arc = store.connect(ElementType::CONST_PERM_POS_ARC, nodes[from], nodes[to]).unwrap();
                    arcs.push((arc, from, to));
                }
            }

            for (index, n) in nodes.iter().enumerate() {
                let out = arcs.iter().filter(|(_, f, _)| *f == index).count();
                let inc = arcs.iter().filter(|(_, _, t)| *t == index).count();
                prop_assert_eq!(store.outgoing_count(*n).unwrap() as usize, out);
                prop_assert_eq!(store.incoming_count(*n).unwrap() as usize, inc);
                prop_assert_eq!(store.outgoing_arcs(*n).unwrap().len(), out);
                prop_assert_eq!(store.incoming_arcs(*n).unwrap().len(), inc);
            }
        }
    }
}
