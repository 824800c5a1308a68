//! Transactions over the element store.
//!
//! A transaction stages its effects in a [`TransactionBuffer`]; nothing is
//! visible to other callers until [`TransactionManager::commit`] validates
//! the buffer under write monitors and applies it:
//! - **Atomicity**: a failed validation or apply step leaves the store as
//!   it was
//! - **Isolation**: concurrent commits with overlapping addresses serialize
//!   on the monitor table's canonical lock order
//! - **Ordering**: every commit advances the global epoch by one

mod buffer;
mod manager;
mod state;

pub use buffer::{ElementSnapshot, TransactionBuffer};
pub use manager::TransactionManager;
pub use state::{Transaction, TransactionState};
