//! Change events for committed graph mutations.
//!
//! Events are emitted by the transaction manager after a commit has been
//! applied and its monitors released, so a callback always observes the
//! post-commit graph.
//!
//! Three ways to consume them:
//! - keyed callbacks, registered for an `(element, kind)` pair and run on
//!   the bounded [`WorkerPool`]
//! - channel subscribers receiving every event in commit order
//! - polling the bounded history with a sequence cursor
//!
//! ```rust,ignore
//! use semnet_core::{EventKind, Memory};
//!
//! let memory = Memory::open_in_memory()?;
//! let class = memory.node_new(ElementType::CONST_NODE_CLASS)?;
//! memory.subscribe_element(class, EventKind::OutgoingArcGenerated, |event| {
//!     println!("new member via {}", event.connector);
//! })?;
//! ```

mod agent;
mod pool;

pub use agent::{Agent, AgentRegistry};
pub use pool::WorkerPool;

use crate::error::CoreResult;
use crate::types::{Address, ElementType, Epoch};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Kind of change an event reports, seen from the subscribed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A connector leaving the element was created.
    OutgoingArcGenerated,
    /// A connector entering the element was created.
    IncomingArcGenerated,
    /// A connector leaving the element was erased.
    OutgoingArcErased,
    /// A connector entering the element was erased.
    IncomingArcErased,
    /// The element itself was erased.
    ElementErased,
    /// The content of a link changed.
    ContentChanged,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::OutgoingArcGenerated,
        EventKind::IncomingArcGenerated,
        EventKind::OutgoingArcErased,
        EventKind::IncomingArcErased,
        EventKind::ElementErased,
        EventKind::ContentChanged,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OutgoingArcGenerated => "add_outgoing_arc",
            Self::IncomingArcGenerated => "add_incoming_arc",
            Self::OutgoingArcErased => "remove_outgoing_arc",
            Self::IncomingArcErased => "remove_incoming_arc",
            Self::ElementErased => "erase_element",
            Self::ContentChanged => "content_changed",
        };
        f.write_str(name)
    }
}

/// One committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Position in the bus's emission order, starting at 1.
    pub sequence: u64,
    /// Epoch of the commit that produced the event.
    pub epoch: Epoch,
    /// What happened.
    pub kind: EventKind,
    /// The element the event is about.
    pub element: Address,
    /// The connector involved, or `Address::EMPTY`.
    pub connector: Address,
    /// Type of `connector`, or `ElementType::EMPTY`.
    pub connector_type: ElementType,
    /// The opposite endpoint of `connector`, or `Address::EMPTY`.
    pub other: Address,
}

impl Event {
    /// An event without a connector (erase, content change).
    #[must_use]
    pub fn element(kind: EventKind, element: Address, epoch: Epoch) -> Self {
        Self {
            sequence: 0,
            epoch,
            kind,
            element,
            connector: Address::EMPTY,
            connector_type: ElementType::EMPTY,
            other: Address::EMPTY,
        }
    }

    /// An arc event as seen from `element`.
    #[must_use]
    pub fn arc(
        kind: EventKind,
        element: Address,
        connector: Address,
        connector_type: ElementType,
        other: Address,
        epoch: Epoch,
    ) -> Self {
        Self {
            sequence: 0,
            epoch,
            kind,
            element,
            connector,
            connector_type,
            other,
        }
    }
}

/// Identifies a keyed callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

/// A keyed event callback.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Registry {
    by_key: HashMap<(Address, EventKind), Vec<(SubscriptionId, Callback)>>,
    keys: HashMap<SubscriptionId, (Address, EventKind)>,
}

/// Distributes committed events to callbacks, channels and history.
pub struct EventBus {
    registry: RwLock<Registry>,
    listeners: RwLock<Vec<Sender<Event>>>,
    history: RwLock<VecDeque<Event>>,
    max_history: usize,
    next_subscription: AtomicU64,
    next_sequence: AtomicU64,
    pool: WorkerPool,
}

impl EventBus {
    /// Creates a bus dispatching callbacks on `pool`.
    #[must_use]
    pub fn new(pool: WorkerPool, max_history: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            listeners: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            next_subscription: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
            pool,
        }
    }

    /// Registers `callback` for `kind` events on `element`.
    pub fn subscribe<F>(&self, element: Address, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_shared(element, kind, Arc::new(callback))
    }

    /// Registers an already shared callback.
    pub fn subscribe_shared(
        &self,
        element: Address,
        kind: EventKind,
        callback: Callback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let mut registry = self.registry.write();
        registry
            .by_key
            .entry((element, kind))
            .or_default()
            .push((id, callback));
        registry.keys.insert(id, (element, kind));
        id
    }

    /// Removes a keyed callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write();
        let Some(key) = registry.keys.remove(&id) else {
            return false;
        };
        if let Some(callbacks) = registry.by_key.get_mut(&key) {
            callbacks.retain(|(existing, _)| *existing != id);
            if callbacks.is_empty() {
                registry.by_key.remove(&key);
            }
        }
        true
    }

    /// Drops every keyed callback on `element`.
    pub fn unsubscribe_element(&self, element: Address) -> usize {
        let mut registry = self.registry.write();
        let ids: Vec<_> = registry
            .keys
            .iter()
            .filter(|(_, (addr, _))| *addr == element)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            registry.keys.remove(id);
        }
        registry.by_key.retain(|(addr, _), _| *addr != element);
        ids.len()
    }

    /// Returns a channel receiving every future event.
    pub fn listen(&self) -> Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.listeners.write().push(tx);
        rx
    }

    /// Emits events of one commit, in order.
    ///
    /// Assigns sequence numbers, appends to history, forwards to channel
    /// listeners and queues matching callbacks on the worker pool.
    ///
    /// # Errors
    ///
    /// The first callback the pool refused. Every event still reaches
    /// history and channel listeners.
    pub fn emit_batch(&self, events: Vec<Event>) -> CoreResult<()> {
        let mut refused = None;
        for mut event in events {
            event.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            {
                let mut history = self.history.write();
                history.push_back(event.clone());
                while history.len() > self.max_history {
                    history.pop_front();
                }
            }
            self.listeners
                .write()
                .retain(|tx| tx.send(event.clone()).is_ok());

            let callbacks: Vec<Callback> = self
                .registry
                .read()
                .by_key
                .get(&(event.element, event.kind))
                .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default();
            if callbacks.is_empty() {
                continue;
            }
            let event = Arc::new(event);
            for callback in callbacks {
                let queued = Arc::clone(&event);
                if let Err(err) = self.pool.submit(move || callback(&queued)) {
                    tracing::warn!(sequence = event.sequence, kind = ?event.kind, error = %err, "callback not queued");
                    refused.get_or_insert(err);
                }
            }
        }
        refused.map_or(Ok(()), Err)
    }

    /// History events with sequence greater than `cursor`, up to `limit`.
    #[must_use]
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<Event> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence of the newest event in history, or 0.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().back().map_or(0, |e| e.sequence)
    }

    /// Number of events kept in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Number of keyed callbacks.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.read().keys.len()
    }

    /// Number of channel listeners still connected at the last emit.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// The worker pool running callbacks.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stops the worker pool after running queued callbacks.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .field("history_len", &self.history_len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
