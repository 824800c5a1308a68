//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::stats::MemoryStats;
use crate::store::{ElementStore, SlotState};
use crate::transaction::buffer::TransactionBuffer;
use crate::types::{Epoch, TransactionId};
use parking_lot::RwLock;
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and can stage changes.
    Open,
    /// Transaction has been committed.
    Committed,
    /// Transaction was rolled back by its owner.
    RolledBack,
    /// Commit was rejected and the manager rolled the transaction back.
    Failed,
}

/// Transactions handed out by a manager and not yet finished.
#[derive(Debug)]
pub(crate) struct ActiveSet {
    store: Arc<ElementStore>,
    stats: Arc<MemoryStats>,
    ids: RwLock<Vec<TransactionId>>,
}

impl ActiveSet {
    pub(crate) fn new(store: Arc<ElementStore>, stats: Arc<MemoryStats>) -> Self {
        Self {
            store,
            stats,
            ids: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, id: TransactionId) {
        self.ids.write().push(id);
    }

    pub(crate) fn finish(&self, id: TransactionId) {
        self.ids.write().retain(|&active| active != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Frees every slot the buffer still holds reserved.
    pub(crate) fn release(&self, buffer: &TransactionBuffer) {
        for addr in buffer.created() {
            if matches!(self.store.slot_state(addr), Ok(SlotState::Reserved)) {
                if let Err(err) = self.store.release(addr) {
                    tracing::warn!(%addr, error = %err, "reservation not released");
                }
            }
        }
    }

    fn abandon(&self, id: TransactionId, buffer: &TransactionBuffer) {
        self.release(buffer);
        self.finish(id);
        self.stats.record_rollback();
        tracing::debug!(txn = %id, created = buffer.created_len(), "open transaction dropped");
    }
}

/// A unit of staged changes.
///
/// Changes are recorded in the buffer and only reach the store when the
/// transaction manager commits it. Dropping a transaction that is still
/// open rolls it back.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    /// Global epoch when the transaction started.
    epoch: Epoch,
    state: TransactionState,
    buffer: TransactionBuffer,
    active: Option<Arc<ActiveSet>>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, epoch: Epoch) -> Self {
        Self {
            id,
            epoch,
            state: TransactionState::Open,
            buffer: TransactionBuffer::new(),
            active: None,
        }
    }

    pub(crate) fn tracked(id: TransactionId, epoch: Epoch, active: Arc<ActiveSet>) -> Self {
        active.register(id);
        Self {
            id,
            epoch,
            state: TransactionState::Open,
            buffer: TransactionBuffer::new(),
            active: Some(active),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the epoch the transaction started in.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction can still stage changes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// Returns the staged changes.
    #[must_use]
    pub fn buffer(&self) -> &TransactionBuffer {
        &self.buffer
    }

    /// Returns the staged changes for writing.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the transaction is the id-0 sentinel or has
    /// reached a terminal state.
    pub fn buffer_mut(&mut self) -> CoreResult<&mut TransactionBuffer> {
        self.ensure_open()?;
        Ok(&mut self.buffer)
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.state = TransactionState::RolledBack;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = TransactionState::Failed;
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.id.is_none() {
            return Err(CoreError::invalid_argument("transaction id 0 is not a valid transaction"));
        }
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Committed => {
                Err(CoreError::invalid_argument(format!("{} already committed", self.id)))
            }
            TransactionState::RolledBack | TransactionState::Failed => {
                Err(CoreError::invalid_argument(format!("{} already rolled back", self.id)))
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }
        if let Some(active) = self.active.take() {
            active.abandon(self.id, &self.buffer);
        }
    }
}
