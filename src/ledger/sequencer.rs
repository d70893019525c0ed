//! Sequencer
//!
//! Hands out the next `(sequence_id, previous_hash)` pair under a single
//! serialization point so the chain never forks. The append lock is held
//! across claim and persist: a failed write releases its sequence id
//! instead of leaving a permanent gap.

use tokio::sync::{Mutex, MutexGuard};

use crate::error::LedgerError;
use crate::ledger::hash::GENESIS_HASH;
use crate::store::LedgerStore;

/// Position the next entry must chain from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub next_sequence_id: i64,
    pub previous_hash: String,
}

impl ChainHead {
    /// Head of an empty ledger: sequence 0, chained off the genesis hash.
    pub fn genesis() -> Self {
        Self {
            next_sequence_id: 0,
            previous_hash: GENESIS_HASH.to_string(),
        }
    }

    fn after(sequence_id: i64, entry_hash: String) -> Self {
        Self {
            next_sequence_id: sequence_id + 1,
            previous_hash: entry_hash,
        }
    }
}

/// In-process serialization point for all appends.
///
/// Cross-process safety comes from the unique `sequence_id` constraint in
/// the store: a losing writer sees a conflict, invalidates its cached head,
/// and retries from the store's maximum sequence id.
pub struct Sequencer {
    head: Mutex<Option<ChainHead>>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            head: Mutex::new(None),
        }
    }

    /// Take the append lock. At most one caller holds it per process.
    pub async fn acquire(&self) -> SequencerGuard<'_> {
        SequencerGuard {
            head: self.head.lock().await,
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive view of the chain head for the duration of one append.
pub struct SequencerGuard<'a> {
    head: MutexGuard<'a, Option<ChainHead>>,
}

impl SequencerGuard<'_> {
    /// Current claim position: the cached head, or the store's maximum
    /// sequence id when nothing is cached yet. Does not cache the store
    /// read; only a committed persist updates the cache.
    pub async fn position(&mut self, store: &dyn LedgerStore) -> Result<ChainHead, LedgerError> {
        if let Some(head) = self.head.as_ref() {
            return Ok(head.clone());
        }
        match store.head().await? {
            Some((sequence_id, entry_hash)) => Ok(ChainHead::after(sequence_id, entry_hash)),
            None => Ok(ChainHead::genesis()),
        }
    }

    /// Record a successful persist at `sequence_id` with `entry_hash`.
    pub fn commit(&mut self, sequence_id: i64, entry_hash: String) {
        *self.head = Some(ChainHead::after(sequence_id, entry_hash));
    }

    /// Drop the cached head so the next claim re-reads the store.
    pub fn invalidate(&mut self) {
        *self.head = None;
    }
}
