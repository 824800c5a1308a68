//! The memory context: one knowledge base and everything that serves it.

use crate::config::Config;
use crate::dir::StorageDir;
use crate::error::{CoreError, CoreResult};
use crate::event::{Agent, AgentRegistry, Event, EventBus, EventKind, SubscriptionId, WorkerPool};
use crate::iterator::{Iterator3, Iterator5, Param};
use crate::keynode::KeynodeRegistry;
use crate::manifest::Manifest;
use crate::monitor::MonitorTable;
use crate::persist;
use crate::stats::{MemoryStats, StatsSnapshot};
use crate::store::ElementStore;
use crate::stream::ContentStream;
use crate::transaction::{Transaction, TransactionManager};
use crate::types::{Address, ElementType, Epoch, TransactionId};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Major format version written to and accepted from the MANIFEST.
const FORMAT_MAJOR: u16 = 1;

/// An open knowledge base.
///
/// Owns the element store, the monitor table, the transaction manager, the
/// event bus with its worker pool, the agent and keynode registries and,
/// for persistent contexts, the locked storage directory.
///
/// Element operations without a transaction argument run as a single-op
/// transaction each. Group several changes with [`Memory::transaction`] or
/// [`Memory::begin`] and the `*_in_txn` methods.
///
/// # Example
///
/// ```rust
/// use semnet_core::{ElementType, Memory};
///
/// let memory = Memory::open_in_memory().unwrap();
/// let apple = memory.node_new(ElementType::CONST_NODE).unwrap();
/// let fruit = memory.node_new(ElementType::CONST_NODE_CLASS).unwrap();
/// let arc = memory
///     .arc_new(ElementType::CONST_PERM_POS_ARC, fruit, apple)
///     .unwrap();
///
/// assert_eq!(memory.get_arc_info(arc).unwrap(), (fruit, apple));
/// assert_eq!(memory.outgoing_arcs_count(fruit).unwrap(), 1);
/// ```
pub struct Memory {
    config: Config,
    dir: Option<StorageDir>,
    store: Arc<ElementStore>,
    monitors: Arc<MonitorTable>,
    manager: TransactionManager,
    events: Arc<EventBus>,
    agents: AgentRegistry,
    keynodes: KeynodeRegistry,
    stats: Arc<MemoryStats>,
    is_open: RwLock<bool>,
}

impl Memory {
    /// Opens the knowledge base stored at `path` with default settings.
    ///
    /// # Errors
    ///
    /// `DirectoryLocked` if another process has it open, `InvalidFormat`
    /// or `ChecksumMismatch` if the dump cannot be read.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the knowledge base stored at `path`.
    ///
    /// A fresh directory starts empty. An existing dump is loaded with the
    /// segment size it was written with; `config.max_segments` still caps
    /// growth.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = StorageDir::open(path, config.create_if_missing)?;
        if config.error_if_exists && !dir.is_new() {
            return Err(CoreError::invalid_format(format!(
                "{} already holds a knowledge base",
                path.display()
            )));
        }

        let manifest = match dir.load_manifest()? {
            Some(manifest) => {
                if manifest.format_version.0 != FORMAT_MAJOR {
                    return Err(CoreError::invalid_format(format!(
                        "incompatible format version: dump is v{}.{}, expected v{FORMAT_MAJOR}.x",
                        manifest.format_version.0, manifest.format_version.1
                    )));
                }
                Some(manifest)
            }
            None => None,
        };

        let store = match &manifest {
            Some(manifest) => {
                let store = ElementStore::new(
                    manifest.segment_size,
                    config.max_segments.max(manifest.segment_count),
                );
                persist::load(&dir, &store, manifest)?;
                store
            }
            None => ElementStore::from_config(&config),
        };
        let manifest = manifest.unwrap_or_default();
        info!(
            path = %path.display(),
            epoch = manifest.epoch.as_u64(),
            segments = manifest.segment_count,
            "opened knowledge base"
        );

        Self::assemble(config, Some(dir), store, &manifest)
    }

    /// Opens an empty, non-persistent knowledge base with default settings.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens an empty, non-persistent knowledge base.
    pub fn open_in_memory_with_config(config: Config) -> CoreResult<Self> {
        let store = ElementStore::from_config(&config);
        Self::assemble(config, None, store, &Manifest::new())
    }

    fn assemble(
        config: Config,
        dir: Option<StorageDir>,
        store: ElementStore,
        manifest: &Manifest,
    ) -> CoreResult<Self> {
        let store = Arc::new(store);
        let monitors = Arc::new(MonitorTable::new(config.monitor_table_size));
        let pool = WorkerPool::new(
            config.effective_event_threads(),
            config.event_queue_capacity,
        )?;
        let events = Arc::new(EventBus::new(pool, config.max_event_history));
        let stats = Arc::new(MemoryStats::new());
        let manager = TransactionManager::with_state(
            Arc::clone(&store),
            Arc::clone(&monitors),
            config.conflict_policy,
            manifest.next_transaction_id,
            manifest.epoch,
        )
        .with_events(Arc::clone(&events))
        .with_stats(Arc::clone(&stats));

        Ok(Self {
            agents: AgentRegistry::new(Arc::clone(&events)),
            keynodes: KeynodeRegistry::from_entries(manifest.keynodes.iter().cloned()),
            config,
            dir,
            store,
            monitors,
            manager,
            events,
            stats,
            is_open: RwLock::new(true),
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Dumps the graph to the storage directory.
    ///
    /// Commits wait until the dump is written.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` for an in-memory context.
    pub fn save(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.save_inner()
    }

    fn save_inner(&self) -> CoreResult<()> {
        let Some(dir) = &self.dir else {
            return Err(CoreError::invalid_operation(
                "an in-memory knowledge base cannot be saved",
            ));
        };
        let _quiet = self.manager.quiesce();
        let manifest = Manifest {
            format_version: (FORMAT_MAJOR, 0),
            epoch: self.manager.current_epoch(),
            next_transaction_id: self.manager.next_transaction_id(),
            segment_size: self.store.segment_size(),
            segment_count: u16::try_from(self.store.segment_count()).unwrap_or(u16::MAX),
            keynodes: self.keynodes.entries(),
        };
        persist::dump(dir, &self.store, &manifest)?;
        self.stats.record_save();
        debug!(epoch = manifest.epoch.as_u64(), "knowledge base saved");
        Ok(())
    }

    /// Closes the context.
    ///
    /// A persistent context is dumped first when `save_on_close` is set.
    /// Queued transactions are rolled back and the event workers joined.
    /// Closing twice is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        if self.dir.is_some() && self.config.save_on_close {
            self.save_inner()?;
        }
        self.manager.shutdown();
        self.events.shutdown();
        *is_open = false;
        debug!("knowledge base closed");
        Ok(())
    }

    /// Returns true until [`Memory::close`] succeeds.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::MemoryClosed)
        }
    }

    /// The configuration this context was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Storage directory, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StorageDir::path)
    }

    /// The element store.
    #[must_use]
    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// The monitor table.
    #[must_use]
    pub fn monitors(&self) -> &MonitorTable {
        &self.monitors
    }

    /// The transaction manager.
    #[must_use]
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// The event bus.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Counters and element totals.
    pub fn stats(&self) -> CoreResult<StatsSnapshot> {
        self.ensure_open()?;
        Ok(self.stats.snapshot(self.store.stats()))
    }

    /// Epoch of the latest commit.
    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        self.manager.current_epoch()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begins a transaction.
    pub fn begin(&self) -> CoreResult<Transaction> {
        self.ensure_open()?;
        self.manager.new_transaction()
    }

    /// Commits a transaction, returning the new epoch.
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<Epoch> {
        self.ensure_open()?;
        self.manager.commit(txn)
    }

    /// Discards a transaction.
    pub fn rollback(&self, txn: &mut Transaction) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.rollback(txn)
    }

    /// Runs `f` in a fresh transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        self.ensure_open()?;
        let mut txn = self.manager.new_transaction()?;
        match f(&mut txn) {
            Ok(value) => {
                self.manager.commit(&mut txn)?;
                Ok(value)
            }
            Err(err) => {
                if txn.is_open() {
                    if let Err(rollback_err) = self.manager.rollback(&mut txn) {
                        warn!(txn = %txn.id(), error = %rollback_err, "rollback after failed closure");
                    }
                }
                Err(err)
            }
        }
    }

    /// Queues a transaction for [`Memory::execute_queued`].
    pub fn enqueue(&self, txn: Transaction) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.add_transaction(txn)
    }

    /// Commits queued transactions in FIFO order.
    pub fn execute_queued(&self) -> CoreResult<Vec<(TransactionId, CoreResult<Epoch>)>> {
        self.ensure_open()?;
        Ok(self.manager.execute_queued())
    }

    /// Stages a node creation.
    pub fn node_new_in_txn(&self, txn: &mut Transaction, ty: ElementType) -> CoreResult<Address> {
        self.ensure_open()?;
        self.manager.create_node(txn, ty)
    }

    /// Stages a link creation.
    pub fn link_new_in_txn(&self, txn: &mut Transaction, ty: ElementType) -> CoreResult<Address> {
        self.ensure_open()?;
        self.manager.create_link(txn, ty)
    }

    /// Stages a connector creation.
    pub fn arc_new_in_txn(
        &self,
        txn: &mut Transaction,
        ty: ElementType,
        begin: Address,
        end: Address,
    ) -> CoreResult<Address> {
        self.ensure_open()?;
        self.manager.create_arc(txn, ty, begin, end)
    }

    /// Stages an erase with its incident connectors.
    pub fn erase_element_in_txn(&self, txn: &mut Transaction, addr: Address) -> CoreResult<usize> {
        self.ensure_open()?;
        self.manager.erase_element(txn, addr)
    }

    /// Stages a subtype change.
    pub fn change_element_subtype_in_txn(
        &self,
        txn: &mut Transaction,
        addr: Address,
        ty: ElementType,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.change_element_subtype(txn, addr, ty)
    }

    /// Stages new link content.
    pub fn set_link_content_in_txn(
        &self,
        txn: &mut Transaction,
        addr: Address,
        content: ContentStream,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.set_link_content(txn, addr, content)
    }

    // ------------------------------------------------------------------
    // Element API
    // ------------------------------------------------------------------

    /// Creates a node.
    pub fn node_new(&self, ty: ElementType) -> CoreResult<Address> {
        self.transaction(|txn| self.manager.create_node(txn, ty))
    }

    /// Creates a link.
    pub fn link_new(&self, ty: ElementType) -> CoreResult<Address> {
        self.transaction(|txn| self.manager.create_link(txn, ty))
    }

    /// Creates a connector from `begin` to `end`.
    pub fn arc_new(&self, ty: ElementType, begin: Address, end: Address) -> CoreResult<Address> {
        self.transaction(|txn| self.manager.create_arc(txn, ty, begin, end))
    }

    /// Erases an element and, transitively, every connector incident to it.
    ///
    /// Returns the number of elements erased.
    pub fn erase_element(&self, addr: Address) -> CoreResult<usize> {
        self.transaction(|txn| self.manager.erase_element(txn, addr))
    }

    /// Refines the type of an element.
    pub fn change_element_subtype(&self, addr: Address, ty: ElementType) -> CoreResult<()> {
        self.transaction(|txn| self.manager.change_element_subtype(txn, addr, ty))
    }

    /// Replaces the content of a link.
    pub fn set_link_content(&self, addr: Address, content: ContentStream) -> CoreResult<()> {
        self.transaction(|txn| self.manager.set_link_content(txn, addr, content))
    }

    /// Type of the element at `addr`.
    pub fn get_element_type(&self, addr: Address) -> CoreResult<ElementType> {
        self.ensure_open()?;
        let _guard = self.monitors.read(addr);
        self.store.element_type(addr)
    }

    /// `(begin, end)` of a connector.
    pub fn get_arc_info(&self, addr: Address) -> CoreResult<(Address, Address)> {
        self.ensure_open()?;
        let _guard = self.monitors.read(addr);
        self.store.arc_info(addr)
    }

    /// Number of connectors leaving `addr`.
    pub fn outgoing_arcs_count(&self, addr: Address) -> CoreResult<u32> {
        self.ensure_open()?;
        let _guard = self.monitors.read(addr);
        self.store.outgoing_count(addr)
    }

    /// Number of connectors entering `addr`.
    pub fn incoming_arcs_count(&self, addr: Address) -> CoreResult<u32> {
        self.ensure_open()?;
        let _guard = self.monitors.read(addr);
        self.store.incoming_count(addr)
    }

    /// Content of a link, positioned at its start.
    pub fn get_link_content(&self, addr: Address) -> CoreResult<ContentStream> {
        self.ensure_open()?;
        let _guard = self.monitors.read(addr);
        let bytes = self.store.get_content(addr)?;
        Ok(ContentStream::from_bytes(bytes.to_vec()))
    }

    /// Live links whose content equals `content`.
    pub fn find_links_with_content(&self, content: impl AsRef<[u8]>) -> CoreResult<Vec<Address>> {
        self.ensure_open()?;
        Ok(self.store.find_links_with_content(content.as_ref()))
    }

    /// Returns true if `addr` holds a live element.
    #[must_use]
    pub fn is_element(&self, addr: Address) -> bool {
        if !self.is_open() {
            return false;
        }
        let _guard = self.monitors.read(addr);
        self.store.is_element(addr)
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    /// Iterates `(source, connector, target)` matches.
    ///
    /// ```rust
    /// use semnet_core::{ElementType, Memory};
    ///
    /// let memory = Memory::open_in_memory().unwrap();
    /// let a = memory.node_new(ElementType::CONST_NODE).unwrap();
    /// let b = memory.node_new(ElementType::CONST_NODE).unwrap();
    /// memory.arc_new(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
    ///
    /// let targets: Vec<_> = memory
    ///     .iter3(a, ElementType::PERM_POS_ARC, ElementType::NODE)
    ///     .unwrap()
    ///     .into_triples()
    ///     .map(|[_, _, target]| target)
    ///     .collect();
    /// assert_eq!(targets, vec![b]);
    /// ```
    pub fn iter3(
        &self,
        source: impl Into<Param>,
        connector: impl Into<Param>,
        target: impl Into<Param>,
    ) -> CoreResult<Iterator3<'_>> {
        self.ensure_open()?;
        let iterator = Iterator3::new(
            &self.store,
            &self.monitors,
            [source.into(), connector.into(), target.into()],
        );
        if iterator.is_scan() {
            self.stats.record_scan();
        }
        Ok(iterator)
    }

    /// Iterates `(source, connector, target, attr_connector, attr)` matches.
    pub fn iter5(
        &self,
        source: impl Into<Param>,
        connector: impl Into<Param>,
        target: impl Into<Param>,
        attr_connector: impl Into<Param>,
        attr: impl Into<Param>,
    ) -> CoreResult<Iterator5<'_>> {
        self.ensure_open()?;
        let iterator = Iterator5::new(
            &self.store,
            &self.monitors,
            [
                source.into(),
                connector.into(),
                target.into(),
                attr_connector.into(),
                attr.into(),
            ],
        );
        if iterator.is_scan() {
            self.stats.record_scan();
        }
        Ok(iterator)
    }

    // ------------------------------------------------------------------
    // Events and agents
    // ------------------------------------------------------------------

    /// Runs `callback` on the event workers for each `kind` event on
    /// `element`.
    pub fn subscribe_element<F>(
        &self,
        element: Address,
        kind: EventKind,
        callback: F,
    ) -> CoreResult<SubscriptionId>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        if !self.is_element(element) {
            return Err(CoreError::not_found(element));
        }
        Ok(self.events.subscribe(element, kind, callback))
    }

    /// Removes a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Channel receiving every event committed from now on.
    pub fn listen(&self) -> CoreResult<Receiver<Event>> {
        self.ensure_open()?;
        Ok(self.events.listen())
    }

    /// Retained events with a sequence above `cursor`, oldest first.
    pub fn poll_events(&self, cursor: u64, limit: usize) -> CoreResult<Vec<Event>> {
        self.ensure_open()?;
        Ok(self.events.poll(cursor, limit))
    }

    /// Attaches an agent.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> CoreResult<SubscriptionId> {
        self.ensure_open()?;
        self.agents.register(agent)
    }

    /// Detaches an agent by name.
    pub fn unregister_agent(&self, name: &str) -> bool {
        self.agents.unregister(name)
    }

    /// The agent registry.
    #[must_use]
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    // ------------------------------------------------------------------
    // Keynodes
    // ------------------------------------------------------------------

    /// Returns the element bound to `name`, creating a node or link of
    /// type `ty` on first use.
    ///
    /// # Errors
    ///
    /// `InvalidType` if `ty` is not a node or link type.
    pub fn resolve_keynode(&self, name: &str, ty: ElementType) -> CoreResult<Address> {
        self.ensure_open()?;
        if !ty.is_valid_element() || ty.is_connector() {
            return Err(CoreError::invalid_type("resolve_keynode", ty));
        }
        let addr = self.keynodes.resolve(
            name,
            |addr| self.is_element(addr),
            || {
                if ty.is_link() {
                    self.link_new(ty)
                } else {
                    self.node_new(ty)
                }
            },
        )?;
        debug!(keynode = name, addr = %addr, "keynode resolved");
        Ok(addr)
    }

    /// The live element bound to `name`, if any.
    #[must_use]
    pub fn find_keynode(&self, name: &str) -> Option<Address> {
        self.keynodes
            .get(name)
            .filter(|&addr| self.is_element(addr))
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("is_open", &self.is_open())
            .field("path", &self.path())
            .field("epoch", &self.current_epoch())
            .field("elements", &self.store.stats().total())
            .finish_non_exhaustive()
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "closing knowledge base on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;
    use tempfile::tempdir;

    fn create_memory() -> Memory {
        Memory::open_in_memory_with_config(Config::new().event_threads(1)).unwrap()
    }

    #[test]
    fn open_in_memory() {
        let memory = create_memory();
        assert!(memory.is_open());
        assert!(memory.path().is_none());
        assert_eq!(memory.current_epoch(), Epoch::new(0));
    }

    #[test]
    fn single_op_calls_commit_one_epoch_each() {
        let memory = create_memory();
        let a = memory.node_new(ElementType::CONST_NODE).unwrap();
        let b = memory.link_new(ElementType::CONST_LINK).unwrap();
        memory.arc_new(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
        assert_eq!(memory.current_epoch(), Epoch::new(3));

        let stats = memory.stats().unwrap();
        assert_eq!(stats.elements.nodes, 1);
        assert_eq!(stats.elements.links, 1);
        assert_eq!(stats.elements.connectors, 1);
        assert_eq!(stats.transactions_committed, 3);
    }

    #[test]
    fn arc_accounting() {
        let memory = create_memory();
        let a = memory.node_new(ElementType::CONST_NODE).unwrap();
        let b = memory.node_new(ElementType::CONST_NODE).unwrap();
        let e = memory.arc_new(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();

        assert_eq!(memory.outgoing_arcs_count(a).unwrap(), 1);
        assert_eq!(memory.incoming_arcs_count(b).unwrap(), 1);
        assert_eq!(memory.get_arc_info(e).unwrap(), (a, b));
        assert_eq!(
            memory.get_element_type(e).unwrap(),
            ElementType::CONST_PERM_POS_ARC
        );
    }

    #[test]
    fn erase_cascades_over_arcs() {
        let memory = create_memory();
        let a = memory.node_new(ElementType::CONST_NODE).unwrap();
        let b = memory.node_new(ElementType::CONST_NODE).unwrap();
        let e = memory.arc_new(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();

        assert_eq!(memory.erase_element(a).unwrap(), 2);
        assert!(!memory.is_element(a));
        assert!(!memory.is_element(e));
        assert!(memory.is_element(b));
        assert_eq!(memory.incoming_arcs_count(b).unwrap(), 0);
    }

    #[test]
    fn link_content_round_trip() {
        let memory = create_memory();
        let link = memory.link_new(ElementType::CONST_LINK).unwrap();
        assert!(memory.get_link_content(link).unwrap().is_empty());

        memory
            .set_link_content(link, ContentStream::from_str_content("apple"))
            .unwrap();
        let content = memory.get_link_content(link).unwrap();
        assert_eq!(content.as_str(), Some("apple"));
        assert_eq!(content.position(), 0);
        assert_eq!(memory.find_links_with_content("apple").unwrap(), vec![link]);
        assert!(memory.find_links_with_content("pear").unwrap().is_empty());
    }

    #[test]
    fn content_on_node_is_rejected() {
        let memory = create_memory();
        let node = memory.node_new(ElementType::CONST_NODE).unwrap();
        let result = memory.set_link_content(node, ContentStream::from_bytes(vec![1]));
        assert!(matches!(result, Err(CoreError::InvalidType { .. })));
        assert!(matches!(
            memory.get_link_content(node),
            Err(CoreError::InvalidType { .. })
        ));
    }

    #[test]
    fn transaction_helper_rolls_back_on_error() {
        let memory = create_memory();
        let result: CoreResult<()> = memory.transaction(|txn| {
            memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
            Err(CoreError::invalid_argument("changed my mind"))
        });
        assert!(result.is_err());
        assert_eq!(memory.stats().unwrap().elements.nodes, 0);
        assert_eq!(memory.current_epoch(), Epoch::new(0));
    }

    #[test]
    fn grouped_changes_commit_together() {
        let memory = create_memory();
        let (a, b, e) = memory
            .transaction(|txn| {
                let a = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                let b = memory.link_new_in_txn(txn, ElementType::CONST_LINK)?;
                let e = memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, a, b)?;
                memory.set_link_content_in_txn(txn, b, ContentStream::from_bytes(b"v".to_vec()))?;
                Ok((a, b, e))
            })
            .unwrap();
        assert_eq!(memory.current_epoch(), Epoch::new(1));
        assert_eq!(memory.get_arc_info(e).unwrap(), (a, b));
        assert_eq!(memory.get_link_content(b).unwrap().as_bytes(), b"v");
    }

    #[test]
    fn queued_transactions_run_in_order() {
        let memory = create_memory();
        let mut first = memory.begin().unwrap();
        let a = memory.node_new_in_txn(&mut first, ElementType::CONST_NODE).unwrap();
        let mut second = memory.begin().unwrap();
        let b = memory.node_new_in_txn(&mut second, ElementType::CONST_NODE).unwrap();
        let (first_id, second_id) = (first.id(), second.id());

        memory.enqueue(first).unwrap();
        memory.enqueue(second).unwrap();
        let outcomes: Vec<_> = memory
            .execute_queued()
            .unwrap()
            .into_iter()
            .map(|(id, outcome)| (id, outcome.unwrap()))
            .collect();
        assert_eq!(
            outcomes,
            vec![(first_id, Epoch::new(1)), (second_id, Epoch::new(2))]
        );
        assert!(memory.is_element(a));
        assert!(memory.is_element(b));
    }

    #[test]
    fn subtype_refinement() {
        let memory = create_memory();
        let node = memory.node_new(ElementType::CONST_NODE).unwrap();
        memory
            .change_element_subtype(node, ElementType::CONST_NODE_CLASS)
            .unwrap();
        assert_eq!(
            memory.get_element_type(node).unwrap(),
            ElementType::CONST_NODE_CLASS
        );
        assert!(memory
            .change_element_subtype(node, ElementType::CONST_LINK)
            .is_err());
    }

    #[test]
    fn iterators_over_memory() {
        let memory = create_memory();
        let n1 = memory.node_new(ElementType::CONST_NODE).unwrap();
        let n2 = memory.node_new(ElementType::CONST_NODE).unwrap();
        let attr = memory.node_new(ElementType::CONST_NODE_ROLE).unwrap();
        let e = memory.arc_new(ElementType::CONST_PERM_POS_ARC, n1, n2).unwrap();
        let attr_arc = memory.arc_new(ElementType::CONST_PERM_POS_ARC, attr, e).unwrap();

        let mut it = memory.iter3(n1, ElementType::PERM_POS_ARC, n2).unwrap();
        assert!(it.next());
        assert_eq!(it.current(), Some([n1, e, n2]));
        assert!(!it.next());

        let mut it = memory
            .iter5(n1, ElementType::PERM_POS_ARC, n2, ElementType::PERM_POS_ARC, attr)
            .unwrap();
        assert!(it.next());
        assert_eq!(it.current(), Some([n1, e, n2, attr_arc, attr]));
        assert!(!it.next());

        let scans = memory.stats().unwrap().iterator_scans;
        memory
            .iter3(ElementType::NODE, ElementType::EMPTY, ElementType::NODE)
            .unwrap();
        assert_eq!(memory.stats().unwrap().iterator_scans, scans + 1);
    }

    #[test]
    fn events_reach_subscribers() {
        let memory = create_memory();
        let class = memory.node_new(ElementType::CONST_NODE_CLASS).unwrap();
        let member = memory.node_new(ElementType::CONST_NODE).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        memory
            .subscribe_element(class, EventKind::OutgoingArcGenerated, move |event| {
                let _ = tx.lock().send(event.connector);
            })
            .unwrap();

        let arc = memory
            .arc_new(ElementType::CONST_PERM_POS_ARC, class, member)
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(arc));
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn subscribe_to_missing_element_fails() {
        let memory = create_memory();
        let result = memory.subscribe_element(Address::new(1, 0), EventKind::ElementErased, |_| {});
        assert!(result.is_err());
    }

    #[test]
    fn keynodes_resolve_once() {
        let memory = create_memory();
        let first = memory
            .resolve_keynode("nrel_main_idtf", ElementType::CONST_NODE_NOROLE)
            .unwrap();
        let again = memory
            .resolve_keynode("nrel_main_idtf", ElementType::CONST_NODE_NOROLE)
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(memory.find_keynode("nrel_main_idtf"), Some(first));
        assert_eq!(memory.find_keynode("missing"), None);
        assert!(matches!(
            memory.resolve_keynode("bad", ElementType::CONST_PERM_POS_ARC),
            Err(CoreError::InvalidType { .. })
        ));

        memory.erase_element(first).unwrap();
        assert_eq!(memory.find_keynode("nrel_main_idtf"), None);
        let replaced = memory
            .resolve_keynode("nrel_main_idtf", ElementType::CONST_NODE_NOROLE)
            .unwrap();
        assert!(memory.is_element(replaced));
    }

    #[test]
    fn closed_memory_rejects_operations() {
        let memory = create_memory();
        let node = memory.node_new(ElementType::CONST_NODE).unwrap();
        memory.close().unwrap();
        memory.close().unwrap();

        assert!(!memory.is_open());
        assert!(!memory.is_element(node));
        assert!(matches!(
            memory.node_new(ElementType::CONST_NODE),
            Err(CoreError::MemoryClosed)
        ));
        assert!(matches!(memory.stats(), Err(CoreError::MemoryClosed)));
    }

    #[test]
    fn in_memory_save_is_rejected() {
        let memory = create_memory();
        assert!(matches!(
            memory.save(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn persistent_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("kb");
        let (a, link, e, concept) = {
            let memory = Memory::open(&path).unwrap();
            let a = memory.node_new(ElementType::CONST_NODE).unwrap();
            let link = memory.link_new(ElementType::CONST_LINK).unwrap();
            let e = memory.arc_new(ElementType::CONST_PERM_POS_ARC, a, link).unwrap();
            memory
                .set_link_content(link, ContentStream::from_str_content("label"))
                .unwrap();
            let concept = memory
                .resolve_keynode("concept", ElementType::CONST_NODE_CLASS)
                .unwrap();
            memory.close().unwrap();
            (a, link, e, concept)
        };

        let memory = Memory::open(&path).unwrap();
        assert_eq!(memory.get_arc_info(e).unwrap(), (a, link));
        assert_eq!(memory.get_link_content(link).unwrap().as_str(), Some("label"));
        assert_eq!(memory.find_keynode("concept"), Some(concept));
        assert_eq!(memory.current_epoch(), Epoch::new(5));
        let mut txn = memory.begin().unwrap();
        assert!(txn.id().as_u64() >= 6);
        memory.rollback(&mut txn).unwrap();
    }

    #[test]
    fn second_open_is_locked_out() {
        let temp = tempdir().unwrap();
        let _memory = Memory::open(temp.path()).unwrap();
        assert!(matches!(
            Memory::open(temp.path()),
            Err(CoreError::DirectoryLocked)
        ));
    }

    #[test]
    fn error_if_exists() {
        let temp = tempdir().unwrap();
        {
            let memory = Memory::open(temp.path()).unwrap();
            memory.save().unwrap();
        }
        let result = Memory::open_with_config(temp.path(), Config::new().error_if_exists(true));
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }
}
