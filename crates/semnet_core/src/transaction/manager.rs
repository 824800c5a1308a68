//! Transaction manager.

use crate::config::ConflictPolicy;
use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventBus, EventKind};
use crate::monitor::MonitorTable;
use crate::stats::MemoryStats;
use crate::store::{Element, ElementStore, SlotState};
use crate::stream::ContentStream;
use crate::transaction::buffer::{ElementSnapshot, TransactionBuffer};
use crate::transaction::state::{ActiveSet, Transaction};
use crate::types::{Address, ElementType, Epoch, TransactionId};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One step of a partially applied commit, recorded so it can be reverted.
enum Undo {
    Revive {
        addr: Address,
        element: Element,
        content: Option<Arc<[u8]>>,
    },
    RestoreType {
        addr: Address,
        ty: ElementType,
    },
    Unpublish(Address),
    RestoreContent {
        addr: Address,
        previous: Option<Arc<[u8]>>,
    },
}

#[derive(Default)]
struct Applied {
    events: Vec<Event>,
    retired: Vec<Address>,
    created: usize,
    content: usize,
}

/// Stages, validates and commits transactions against an element store.
///
/// Staged creations reserve slots right away so every address handed to a
/// caller is final; the slots stay invisible until commit publishes them.
/// Commit takes write monitors on every address the transaction touches
/// (plus endpoints of created and erased connectors) in canonical order,
/// validates under those monitors, then applies deletions, modifications,
/// creations and content changes in that order. A failed apply step
/// replays the undo journal before returning.
pub struct TransactionManager {
    store: Arc<ElementStore>,
    monitors: Arc<MonitorTable>,
    events: Option<Arc<EventBus>>,
    stats: Arc<MemoryStats>,
    policy: ConflictPolicy,
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Epoch of the latest commit.
    epoch: AtomicU64,
    /// Guards id assignment and epoch advance.
    lock: Mutex<()>,
    /// Transactions waiting for `execute_queued`.
    queue: RwLock<VecDeque<Transaction>>,
    /// Transactions handed out and not yet finished.
    active: Arc<ActiveSet>,
    shut_down: AtomicBool,
    /// Commits hold it shared; `quiesce` holds it exclusively.
    commit_gate: RwLock<()>,
}

impl TransactionManager {
    /// Creates a manager starting at transaction id 1 and epoch 0.
    pub fn new(store: Arc<ElementStore>, monitors: Arc<MonitorTable>, policy: ConflictPolicy) -> Self {
        Self::with_state(store, monitors, policy, 1, Epoch::new(0))
    }

    /// Creates a manager resuming from persisted counters.
    pub fn with_state(
        store: Arc<ElementStore>,
        monitors: Arc<MonitorTable>,
        policy: ConflictPolicy,
        next_txid: u64,
        epoch: Epoch,
    ) -> Self {
        let stats = Arc::new(MemoryStats::new());
        let active = Arc::new(ActiveSet::new(Arc::clone(&store), Arc::clone(&stats)));
        Self {
            store,
            monitors,
            events: None,
            stats,
            policy,
            next_txid: AtomicU64::new(next_txid.max(1)),
            epoch: AtomicU64::new(epoch.as_u64()),
            lock: Mutex::new(()),
            queue: RwLock::new(VecDeque::new()),
            active,
            shut_down: AtomicBool::new(false),
            commit_gate: RwLock::new(()),
        }
    }

    /// Emits committed changes on `bus`.
    #[must_use]
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Records counters into `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<MemoryStats>) -> Self {
        self.active = Arc::new(ActiveSet::new(Arc::clone(&self.store), Arc::clone(&stats)));
        self.stats = stats;
        self
    }

    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// `ManagerShutdown` after [`TransactionManager::shutdown`].
    pub fn new_transaction(&self) -> CoreResult<Transaction> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CoreError::ManagerShutdown);
        }
        let (id, epoch) = {
            let _guard = self.lock.lock();
            let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
            (id, self.current_epoch())
        };
        self.stats.record_transaction_start();
        Ok(Transaction::tracked(id, epoch, Arc::clone(&self.active)))
    }

    /// Stages a new node.
    pub fn create_node(&self, txn: &mut Transaction, ty: ElementType) -> CoreResult<Address> {
        if !ty.is_node() {
            return Err(CoreError::invalid_type("create_node", ty));
        }
        self.create_plain(txn, ty)
    }

    /// Stages a new link.
    pub fn create_link(&self, txn: &mut Transaction, ty: ElementType) -> CoreResult<Address> {
        if !ty.is_link() {
            return Err(CoreError::invalid_type("create_link", ty));
        }
        self.create_plain(txn, ty)
    }

    fn create_plain(&self, txn: &mut Transaction, ty: ElementType) -> CoreResult<Address> {
        let buffer = txn.buffer_mut()?;
        let addr = self.store.reserve(ty)?;
        buffer.record_created(addr)?;
        Ok(addr)
    }

    /// Stages a connector from `begin` to `end`.
    ///
    /// Endpoints must be live or created by the same transaction.
    ///
    /// # Errors
    ///
    /// `InvalidType` for non-connector types, `InvalidElement` for an
    /// endpoint that is not live or is erased by this transaction.
    pub fn create_arc(
        &self,
        txn: &mut Transaction,
        ty: ElementType,
        begin: Address,
        end: Address,
    ) -> CoreResult<Address> {
        if !ty.is_valid_element() || !ty.is_connector() {
            return Err(CoreError::invalid_type("create_arc", ty));
        }
        let buffer = txn.buffer_mut()?;

        let mut observed = Vec::with_capacity(2);
        for endpoint in [begin, end] {
            if endpoint.is_empty() || buffer.contains_removed(endpoint) {
                return Err(CoreError::InvalidElement { addr: endpoint });
            }
            if buffer.contains_created(endpoint) {
                continue;
            }
            let element = self
                .store
                .get(endpoint)
                .map_err(|_| CoreError::InvalidElement { addr: endpoint })?;
            observed.push((endpoint, ElementSnapshot::observe(&element)));
        }

        for (endpoint, snapshot) in observed {
            if buffer.snapshot(endpoint).is_none() {
                buffer.record_modified(endpoint, snapshot)?;
            }
        }
        let addr = self.store.reserve_connector(ty, begin, end)?;
        buffer.record_created(addr)?;
        Ok(addr)
    }

    /// Stages erasure of `addr` and, transitively, of every connector
    /// incident to it. Returns the number of elements staged.
    pub fn erase_element(&self, txn: &mut Transaction, addr: Address) -> CoreResult<usize> {
        txn.ensure_open()?;
        let buffer = txn.buffer();
        if !buffer.contains_created(addr) {
            self.store.get(addr)?;
        }

        let mut order = Vec::new();
        let mut snapshots = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![addr];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            if let Ok(element) = self.store.get(current) {
                snapshots.push((current, ElementSnapshot::observe(&element)));
                stack.extend(self.store.outgoing_arcs(current)?);
                stack.extend(self.store.incoming_arcs(current)?);
            }
            for created in buffer.created() {
                if let Ok((SlotState::Reserved, element)) = self.store.peek(created) {
                    if element.is_connector() && (element.begin() == current || element.end() == current)
                    {
                        stack.push(created);
                    }
                }
            }
        }

        let buffer = txn.buffer_mut()?;
        for (current, snapshot) in snapshots {
            if buffer.snapshot(current).is_none() {
                buffer.record_modified(current, snapshot)?;
            }
        }
        for current in &order {
            buffer.record_removed(*current)?;
        }
        Ok(order.len())
    }

    /// Stages a subtype refinement.
    ///
    /// # Errors
    ///
    /// `InvalidType` if the current type cannot be extended to `ty`.
    pub fn change_element_subtype(
        &self,
        txn: &mut Transaction,
        addr: Address,
        ty: ElementType,
    ) -> CoreResult<()> {
        let buffer = txn.buffer_mut()?;
        if buffer.contains_removed(addr) {
            return Err(CoreError::not_found(addr));
        }
        if buffer.contains_created(addr) {
            return self.store.retype_reserved(addr, ty);
        }
        let element = self.store.get(addr)?;
        if !element.element_type().is_extendable_to(ty) {
            return Err(CoreError::invalid_type("change_subtype", ty));
        }
        let snapshot = buffer
            .snapshot(addr)
            .copied()
            .unwrap_or_else(|| ElementSnapshot::observe(&element));
        buffer.record_modified(addr, snapshot.with_target(ty))
    }

    /// Stages new content for a link.
    pub fn set_link_content(
        &self,
        txn: &mut Transaction,
        addr: Address,
        stream: ContentStream,
    ) -> CoreResult<()> {
        let buffer = txn.buffer_mut()?;
        if buffer.contains_removed(addr) {
            return Err(CoreError::not_found(addr));
        }
        if buffer.contains_created(addr) {
            let (_, element) = self.store.peek(addr)?;
            if !element.element_type().is_link() {
                return Err(CoreError::invalid_type("set_content", element.element_type()));
            }
        } else {
            let element = self.store.get(addr)?;
            if !element.element_type().is_link() {
                return Err(CoreError::invalid_type("set_content", element.element_type()));
            }
            if buffer.snapshot(addr).is_none() {
                buffer.record_modified(addr, ElementSnapshot::observe(&element))?;
            }
        }
        buffer.record_content_change(addr, stream)
    }

    /// Queues a transaction for [`TransactionManager::execute_queued`].
    pub fn add_transaction(&self, txn: Transaction) -> CoreResult<()> {
        txn.ensure_open()?;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CoreError::ManagerShutdown);
        }
        self.queue.write().push_back(txn);
        Ok(())
    }

    /// Number of queued transactions.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.read().len()
    }

    /// Commits queued transactions in FIFO order.
    pub fn execute_queued(&self) -> Vec<(TransactionId, CoreResult<Epoch>)> {
        let mut outcomes = Vec::new();
        loop {
            let next = self.queue.write().pop_front();
            let Some(mut txn) = next else { break };
            let outcome = self.commit(&mut txn);
            outcomes.push((txn.id(), outcome));
        }
        outcomes
    }

    /// Checks the transaction against the live store without locking.
    ///
    /// Commit repeats the check under monitors; this is advisory.
    #[must_use]
    pub fn validate(&self, txn: &Transaction) -> bool {
        txn.is_open() && !txn.id().is_none() && self.check(txn.buffer()).is_ok()
    }

    /// Commits a transaction and returns the new epoch.
    ///
    /// # Errors
    ///
    /// `Conflict` if validation fails (the store is unchanged and the
    /// transaction is marked failed), `InvalidArgument` if the transaction
    /// is not open, or the error of a failed apply step after it was undone.
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<Epoch> {
        txn.ensure_open()?;
        let txid = txn.id();

        let _gate = self.commit_gate.read();
        let outcome = {
            let lock_set = self.lock_set(txn.buffer());
            let _held = self.monitors.write_n(lock_set);
            self.commit_locked(txid, txn.buffer())
        };

        self.active.finish(txid);
        match outcome {
            Ok((epoch, applied)) => {
                txn.mark_committed();
                self.stats
                    .record_commit(applied.created, applied.retired.len(), applied.content);
                tracing::debug!(
                    txn = %txid,
                    %epoch,
                    created = applied.created,
                    erased = applied.retired.len(),
                    "transaction committed"
                );
                if let Some(bus) = &self.events {
                    if let Err(err) = bus.emit_batch(applied.events) {
                        tracing::warn!(txn = %txid, error = %err, "change events partly undelivered");
                    }
                    // Subscriptions die with their element, before the slot can be reused.
                    for addr in &applied.retired {
                        bus.unsubscribe_element(*addr);
                    }
                }
                if let Err(err) = self.store.recycle(&applied.retired) {
                    tracing::warn!(txn = %txid, error = %err, "retired slots not recycled");
                }
                Ok(epoch)
            }
            Err(err) => {
                self.release_reservations(txn.buffer());
                txn.mark_failed();
                self.stats.record_rollback();
                if matches!(err, CoreError::Conflict { .. }) {
                    self.stats.record_conflict();
                }
                Err(err)
            }
        }
    }

    fn commit_locked(
        &self,
        txid: TransactionId,
        buffer: &TransactionBuffer,
    ) -> CoreResult<(Epoch, Applied)> {
        if let Err(reason) = self.check(buffer) {
            tracing::warn!(txn = %txid, %reason, "commit rejected");
            return Err(CoreError::conflict(txid, reason));
        }

        let mut journal = Vec::new();
        let mut applied = Applied::default();
        if let Err(err) = self.apply(buffer, &mut journal, &mut applied) {
            tracing::warn!(txn = %txid, error = %err, steps = journal.len(), "undoing partial commit");
            self.undo(journal);
            return Err(err);
        }

        let epoch = {
            let _guard = self.lock.lock();
            Epoch::new(self.epoch.fetch_add(1, Ordering::SeqCst) + 1)
        };
        for event in &mut applied.events {
            event.epoch = epoch;
        }

        for addr in buffer.created().filter(|a| buffer.contains_removed(*a)) {
            if let Err(err) = self.store.release(addr) {
                tracing::warn!(txn = %txid, %addr, error = %err, "reservation not released");
            }
        }
        Ok((epoch, applied))
    }

    /// Discards a transaction, releasing the slots it reserved.
    pub fn rollback(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_open()?;
        self.release_reservations(txn.buffer());
        self.active.finish(txn.id());
        txn.mark_rolled_back();
        self.stats.record_rollback();
        tracing::debug!(txn = %txn.id(), "transaction rolled back");
        Ok(())
    }

    /// Rolls back every queued transaction and refuses new ones until
    /// [`TransactionManager::restart`].
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.queue.write().drain(..).collect();
        let count = drained.len();
        for mut txn in drained {
            if let Err(err) = self.rollback(&mut txn) {
                tracing::warn!(txn = %txn.id(), error = %err, "queued transaction not rolled back");
            }
        }
        tracing::debug!(drained = count, "transaction manager shut down");
    }

    /// Accepts new transactions again after a shutdown.
    pub fn restart(&self) {
        self.shut_down.store(false, Ordering::SeqCst);
    }

    /// Returns true between `shutdown` and `restart`.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Epoch of the latest commit.
    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        Epoch::new(self.epoch.load(Ordering::SeqCst))
    }

    /// Id the next transaction will get.
    #[must_use]
    pub fn next_transaction_id(&self) -> u64 {
        self.next_txid.load(Ordering::SeqCst)
    }

    /// Number of transactions handed out and not finished.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// The conflict policy applied on commit.
    #[must_use]
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Counters shared with the owning context.
    #[must_use]
    pub fn stats(&self) -> &Arc<MemoryStats> {
        &self.stats
    }

    /// Waits for running commits and blocks new ones while the guard lives.
    pub(crate) fn quiesce(&self) -> RwLockWriteGuard<'_, ()> {
        self.commit_gate.write()
    }

    fn lock_set(&self, buffer: &TransactionBuffer) -> Vec<Address> {
        let mut addrs = buffer.touched();
        for addr in buffer.created().chain(buffer.removed()) {
            if let Ok((_, element)) = self.store.peek(addr) {
                if element.is_connector() {
                    addrs.push(element.begin());
                    addrs.push(element.end());
                }
            }
        }
        addrs
    }

    /// Returns why the buffer can no longer be applied, if it cannot.
    fn check(&self, buffer: &TransactionBuffer) -> Result<(), String> {
        for (addr, snapshot) in buffer.modified() {
            let element = self
                .store
                .get(addr)
                .map_err(|_| format!("{addr} is no longer live"))?;
            if element.generation() != snapshot.generation {
                return Err(format!("slot {addr} was reused"));
            }
            if element.element_type() != snapshot.element_type {
                return Err(format!(
                    "type of {addr} changed from {} to {}",
                    snapshot.element_type,
                    element.element_type()
                ));
            }
            if self.policy == ConflictPolicy::Strict && element.version() != snapshot.version {
                return Err(format!("{addr} was modified by another transaction"));
            }
        }

        for addr in buffer.created() {
            let (state, element) = self
                .store
                .peek(addr)
                .map_err(|_| format!("reservation {addr} is out of range"))?;
            if state != SlotState::Reserved {
                return Err(format!("reservation {addr} was lost"));
            }
            if !element.is_connector() || buffer.contains_removed(addr) {
                continue;
            }
            for endpoint in [element.begin(), element.end()] {
                if buffer.contains_removed(endpoint) {
                    return Err(format!("connector {addr} ends at erased {endpoint}"));
                }
                if !buffer.contains_created(endpoint) && !self.store.is_element(endpoint) {
                    return Err(format!("connector {addr} endpoint {endpoint} is not live"));
                }
            }
        }

        for addr in buffer.removed() {
            if buffer.contains_created(addr) {
                continue;
            }
            let mut incident = self
                .store
                .outgoing_arcs(addr)
                .map_err(|_| format!("{addr} is no longer live"))?;
            incident.extend(
                self.store
                    .incoming_arcs(addr)
                    .map_err(|_| format!("{addr} is no longer live"))?,
            );
            if let Some(arc) = incident.iter().find(|arc| !buffer.contains_removed(**arc)) {
                return Err(format!("erasing {addr} would leave connector {arc} dangling"));
            }
        }

        for (addr, _) in buffer.content_changes() {
            if buffer.contains_removed(addr) {
                continue;
            }
            let ty = if buffer.contains_created(addr) {
                self.store.peek(addr).map(|(_, element)| element.element_type())
            } else {
                self.store.element_type(addr)
            }
            .map_err(|_| format!("content target {addr} is gone"))?;
            if !ty.is_link() {
                return Err(format!("content target {addr} is not a link"));
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        buffer: &TransactionBuffer,
        journal: &mut Vec<Undo>,
        applied: &mut Applied,
    ) -> CoreResult<()> {
        let placeholder = Epoch::new(0);

        // Deletions, in rounds: an element retires once its arcs are gone.
        let mut pending: Vec<Address> = buffer
            .removed()
            .filter(|addr| !buffer.contains_created(*addr))
            .collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut blocked = Vec::new();
            for addr in pending {
                let current = self.store.get(addr)?;
                if current.incoming_count() > 0 || current.outgoing_count() > 0 {
                    blocked.push(addr);
                    continue;
                }
                let (element, content) = self.store.retire(addr)?;
                if element.is_connector() {
                    applied.events.extend(arc_events(
                        addr,
                        &element,
                        EventKind::OutgoingArcErased,
                        EventKind::IncomingArcErased,
                        placeholder,
                    ));
                }
                applied
                    .events
                    .push(Event::element(EventKind::ElementErased, addr, placeholder));
                journal.push(Undo::Revive {
                    addr,
                    element,
                    content,
                });
                applied.retired.push(addr);
            }
            if blocked.len() == before {
                let addr = blocked[0];
                let element = self.store.get(addr)?;
                return Err(CoreError::HasDependents {
                    addr,
                    incoming: element.incoming_count(),
                    outgoing: element.outgoing_count(),
                });
            }
            pending = blocked;
        }

        for (addr, snapshot) in buffer.modified() {
            let Some(target) = snapshot.target_type else {
                continue;
            };
            if buffer.contains_removed(addr) {
                continue;
            }
            let previous = self.store.change_subtype(addr, target)?;
            journal.push(Undo::RestoreType { addr, ty: previous });
        }

        // Creations: nodes and links first so connectors find live endpoints.
        let (plain, connectors): (Vec<Address>, Vec<Address>) = buffer
            .created()
            .filter(|addr| !buffer.contains_removed(*addr))
            .partition(|addr| {
                !self
                    .store
                    .peek(*addr)
                    .map(|(_, element)| element.is_connector())
                    .unwrap_or(false)
            });
        for addr in plain.into_iter().chain(connectors) {
            self.store.publish(addr)?;
            journal.push(Undo::Unpublish(addr));
            applied.created += 1;
            let element = self.store.get(addr)?;
            if element.is_connector() {
                applied.events.extend(arc_events(
                    addr,
                    &element,
                    EventKind::OutgoingArcGenerated,
                    EventKind::IncomingArcGenerated,
                    placeholder,
                ));
            }
        }

        for (addr, stream) in buffer.content_changes() {
            if buffer.contains_removed(addr) {
                continue;
            }
            let previous = self.store.set_content(addr, stream.as_bytes())?;
            journal.push(Undo::RestoreContent { addr, previous });
            applied.content += 1;
            applied
                .events
                .push(Event::element(EventKind::ContentChanged, addr, placeholder));
        }
        Ok(())
    }

    fn undo(&self, journal: Vec<Undo>) {
        for step in journal.into_iter().rev() {
            let result = match step {
                Undo::Revive {
                    addr,
                    element,
                    content,
                } => self.store.revive(addr, element, content),
                Undo::RestoreType { addr, ty } => self.store.restore_type(addr, ty),
                Undo::Unpublish(addr) => self.store.unpublish(addr),
                Undo::RestoreContent { addr, previous } => {
                    self.store.restore_content(addr, previous);
                    Ok(())
                }
            };
            if let Err(err) = result {
                tracing::error!(error = %err, "undo step failed");
            }
        }
    }

    fn release_reservations(&self, buffer: &TransactionBuffer) {
        self.active.release(buffer);
    }
}

fn arc_events(
    arc: Address,
    element: &Element,
    outgoing: EventKind,
    incoming: EventKind,
    epoch: Epoch,
) -> [Event; 2] {
    let ty = element.element_type();
    [
        Event::arc(outgoing, element.begin(), arc, ty, element.end(), epoch),
        Event::arc(incoming, element.end(), arc, ty, element.begin(), epoch),
    ]
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("epoch", &self.current_epoch())
            .field("active_count", &self.active_count())
            .field("queue_len", &self.queue_len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WorkerPool;
    use crate::transaction::state::TransactionState;
    use std::thread;
    use std::time::Duration;

    fn create_manager() -> TransactionManager {
        create_manager_with(ConflictPolicy::Structural)
    }

    fn create_manager_with(policy: ConflictPolicy) -> TransactionManager {
        let store = Arc::new(ElementStore::new(64, 16));
        let monitors = Arc::new(MonitorTable::new(31));
        TransactionManager::new(store, monitors, policy)
    }

    fn committed_node(tm: &TransactionManager) -> Address {
        let mut txn = tm.new_transaction().unwrap();
        let addr = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        tm.commit(&mut txn).unwrap();
        addr
    }

    fn committed_link(tm: &TransactionManager, content: &str) -> Address {
        let mut txn = tm.new_transaction().unwrap();
        let addr = tm.create_link(&mut txn, ElementType::CONST_LINK).unwrap();
        tm.set_link_content(&mut txn, addr, ContentStream::from_str_content(content))
            .unwrap();
        tm.commit(&mut txn).unwrap();
        addr
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let tm = create_manager();
        let a = tm.new_transaction().unwrap();
        let b = tm.new_transaction().unwrap();
        assert_eq!(a.id().as_u64(), 1);
        assert_eq!(b.id().as_u64(), 2);
        assert_eq!(tm.active_count(), 2);
    }

    #[test]
    fn commit_empty_transaction_advances_epoch() {
        let tm = create_manager();
        let mut txn = tm.new_transaction().unwrap();
        let epoch = tm.commit(&mut txn).unwrap();
        assert_eq!(epoch.as_u64(), 1);
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(tm.active_count(), 0);
        assert!(tm.commit(&mut txn).is_err());
    }

    #[test]
    fn created_elements_are_invisible_until_commit() {
        let tm = create_manager();
        let mut txn = tm.new_transaction().unwrap();
        let a = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        let b = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        let arc = tm
            .create_arc(&mut txn, ElementType::CONST_PERM_POS_ARC, a, b)
            .unwrap();
        assert!(!tm.store.is_element(a));
        assert!(!tm.store.is_element(arc));

        tm.commit(&mut txn).unwrap();
        assert_eq!(tm.store.arc_info(arc).unwrap(), (a, b));
        assert_eq!(tm.store.outgoing_count(a).unwrap(), 1);
        assert_eq!(tm.store.incoming_count(b).unwrap(), 1);
    }

    #[test]
    fn rollback_releases_reservations() {
        let tm = create_manager();
        let mut txn = tm.new_transaction().unwrap();
        let a = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        tm.rollback(&mut txn).unwrap();

        assert_eq!(txn.state(), TransactionState::RolledBack);
        assert_eq!(tm.store.slot_state(a).unwrap(), SlotState::Free);
        assert_eq!(tm.store.stats().total(), 0);
        assert!(tm.rollback(&mut txn).is_err());
    }

    #[test]
    fn dropped_transactions_release_slots_and_deregister() {
        let tm = create_manager();
        let mut reserved = Vec::new();
        for _ in 0..100 {
            let mut txn = tm.new_transaction().unwrap();
            reserved.push(tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap());
        }

        assert_eq!(tm.active_count(), 0);
        for addr in &reserved {
            assert_eq!(tm.store.slot_state(*addr).unwrap(), SlotState::Free);
        }
        assert_eq!(tm.stats().transactions_rolled_back(), 100);

        let reused = committed_node(&tm);
        assert!(reserved.contains(&reused));
    }

    #[test]
    fn failed_validation_leaves_store_untouched() {
        let tm = create_manager();
        let target = committed_node(&tm);
        let before = tm.store.stats();

        let mut txn = tm.new_transaction().unwrap();
        let fresh: Vec<_> = (0..3)
            .map(|_| tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap())
            .collect();
        tm.create_arc(&mut txn, ElementType::CONST_PERM_POS_ARC, fresh[0], target)
            .unwrap();

        // another transaction erases the endpoint first
        let mut other = tm.new_transaction().unwrap();
        tm.erase_element(&mut other, target).unwrap();
        tm.commit(&mut other).unwrap();

        assert!(!tm.validate(&txn));
        let err = tm.commit(&mut txn).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(txn.state(), TransactionState::Failed);
        assert_eq!(tm.store.stats().total(), before.total() - 1);
        for addr in fresh {
            assert_eq!(tm.store.slot_state(addr).unwrap(), SlotState::Free);
        }
        assert_eq!(tm.stats().conflicts(), 1);
    }

    #[test]
    fn erase_cascades_over_incident_arcs() {
        let tm = create_manager();
        let a = committed_node(&tm);
        let b = committed_node(&tm);
        let attr = committed_node(&tm);

        let mut txn = tm.new_transaction().unwrap();
        let arc = tm
            .create_arc(&mut txn, ElementType::CONST_PERM_POS_ARC, a, b)
            .unwrap();
        let attr_arc = tm
            .create_arc(&mut txn, ElementType::CONST_PERM_POS_ARC, attr, arc)
            .unwrap();
        tm.commit(&mut txn).unwrap();

        let mut txn = tm.new_transaction().unwrap();
        assert_eq!(tm.erase_element(&mut txn, b).unwrap(), 3);
        tm.commit(&mut txn).unwrap();

        for gone in [b, arc, attr_arc] {
            assert!(!tm.store.is_element(gone));
        }
        assert_eq!(tm.store.outgoing_count(a).unwrap(), 0);
        assert_eq!(tm.store.outgoing_count(attr).unwrap(), 0);
        assert_eq!(tm.stats().elements_erased(), 3);
    }

    #[test]
    fn create_then_erase_never_exists() {
        let tm = create_manager();
        let a = committed_node(&tm);
        let mut txn = tm.new_transaction().unwrap();
        let temp = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        tm.create_arc(&mut txn, ElementType::CONST_COMMON_ARC, a, temp)
            .unwrap();
        assert_eq!(tm.erase_element(&mut txn, temp).unwrap(), 2);
        tm.commit(&mut txn).unwrap();

        assert_eq!(tm.store.slot_state(temp).unwrap(), SlotState::Free);
        assert_eq!(tm.store.outgoing_count(a).unwrap(), 0);
    }

    #[test]
    fn arc_to_erased_endpoint_rejected_at_staging() {
        let tm = create_manager();
        let a = committed_node(&tm);
        let b = committed_node(&tm);
        let mut txn = tm.new_transaction().unwrap();
        tm.erase_element(&mut txn, b).unwrap();
        assert!(matches!(
            tm.create_arc(&mut txn, ElementType::CONST_PERM_POS_ARC, a, b),
            Err(CoreError::InvalidElement { .. })
        ));
        assert!(matches!(
            tm.create_arc(&mut txn, ElementType::CONST_NODE, a, a),
            Err(CoreError::InvalidType { .. })
        ));
    }

    #[test]
    fn content_only_staged_on_links() {
        let tm = create_manager();
        let n = committed_node(&tm);
        let mut txn = tm.new_transaction().unwrap();
        assert!(matches!(
            tm.set_link_content(&mut txn, n, ContentStream::from_str_content("x")),
            Err(CoreError::InvalidType { .. })
        ));
        let created = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        assert!(tm
            .set_link_content(&mut txn, created, ContentStream::new())
            .is_err());
    }

    #[test]
    fn subtype_change_applies_on_commit() {
        let tm = create_manager();
        let n = committed_node(&tm);
        let mut txn = tm.new_transaction().unwrap();
        tm.change_element_subtype(&mut txn, n, ElementType::CONST_NODE_CLASS)
            .unwrap();
        assert_eq!(tm.store.element_type(n).unwrap(), ElementType::CONST_NODE);
        tm.commit(&mut txn).unwrap();
        assert_eq!(
            tm.store.element_type(n).unwrap(),
            ElementType::CONST_NODE_CLASS
        );

        let mut txn = tm.new_transaction().unwrap();
        assert!(tm
            .change_element_subtype(&mut txn, n, ElementType::VAR_NODE)
            .is_err());
    }

    #[test]
    fn strict_policy_detects_concurrent_write() {
        for (policy, expect_conflict) in [
            (ConflictPolicy::Structural, false),
            (ConflictPolicy::Strict, true),
        ] {
            let tm = create_manager_with(policy);
            let link = committed_link(&tm, "v0");

            let mut slow = tm.new_transaction().unwrap();
            tm.set_link_content(&mut slow, link, ContentStream::from_str_content("slow"))
                .unwrap();
            let mut fast = tm.new_transaction().unwrap();
            tm.set_link_content(&mut fast, link, ContentStream::from_str_content("fast"))
                .unwrap();
            tm.commit(&mut fast).unwrap();

            let result = tm.commit(&mut slow);
            assert_eq!(result.is_err(), expect_conflict, "{policy:?}");
            let expected: &[u8] = if expect_conflict { b"fast" } else { b"slow" };
            assert_eq!(&*tm.store.get_content(link).unwrap(), expected);
        }
    }

    #[test]
    fn queue_executes_in_fifo_order() {
        let tm = create_manager();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut txn = tm.new_transaction().unwrap();
            tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
            ids.push(txn.id());
            tm.add_transaction(txn).unwrap();
        }
        assert_eq!(tm.queue_len(), 3);

        let outcomes = tm.execute_queued();
        let order: Vec<_> = outcomes.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, ids);
        let epochs: Vec<_> = outcomes
            .into_iter()
            .map(|(_, outcome)| outcome.unwrap().as_u64())
            .collect();
        assert_eq!(epochs, vec![1, 2, 3]);
        assert_eq!(tm.queue_len(), 0);
        assert_eq!(tm.store.stats().nodes, 3);
    }

    #[test]
    fn shutdown_drains_queue_and_rejects_new_transactions() {
        let tm = create_manager();
        let mut txn = tm.new_transaction().unwrap();
        let reserved = tm.create_node(&mut txn, ElementType::CONST_NODE).unwrap();
        tm.add_transaction(txn).unwrap();

        tm.shutdown();
        assert_eq!(tm.queue_len(), 0);
        assert_eq!(tm.store.slot_state(reserved).unwrap(), SlotState::Free);
        assert!(matches!(
            tm.new_transaction(),
            Err(CoreError::ManagerShutdown)
        ));

        tm.restart();
        assert!(tm.new_transaction().is_ok());
    }

    #[test]
    fn reversed_lock_order_commits_complete() {
        let tm = Arc::new(create_manager());
        let a = committed_link(&tm, "a");
        let b = committed_link(&tm, "b");

        let handles: Vec<_> = [[a, b], [b, a]]
            .into_iter()
            .map(|order| {
                let tm = Arc::clone(&tm);
                thread::spawn(move || {
                    for round in 0..200 {
                        let mut txn = tm.new_transaction().unwrap();
                        for addr in order {
                            tm.set_link_content(
                                &mut txn,
                                addr,
                                ContentStream::from_bytes(format!("{round}")),
                            )
                            .unwrap();
                        }
                        tm.commit(&mut txn).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tm.current_epoch().as_u64(), 2 + 400);
    }

    #[test]
    fn events_follow_commit() {
        let store = Arc::new(ElementStore::new(64, 4));
        let bus = Arc::new(EventBus::new(WorkerPool::new(1, 8).unwrap(), 100));
        let tm = TransactionManager::new(store, Arc::new(MonitorTable::new(7)), ConflictPolicy::Structural)
            .with_events(Arc::clone(&bus));
        let rx = bus.listen();

        let a = committed_node(&tm);
        let b = committed_node(&tm);
        let mut txn = tm.new_transaction().unwrap();
        let arc = tm
            .create_arc(&mut txn, ElementType::CONST_PERM_POS_ARC, a, b)
            .unwrap();
        let epoch = tm.commit(&mut txn).unwrap();

        let first = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        let second = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(first.kind, EventKind::OutgoingArcGenerated);
        assert_eq!((first.element, first.connector, first.other), (a, arc, b));
        assert_eq!(second.kind, EventKind::IncomingArcGenerated);
        assert_eq!(second.element, b);
        assert_eq!(first.epoch, epoch);
    }
}
