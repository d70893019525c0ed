//! Ledger Storage
//!
//! Durable append plus read paths for the audit ledger. Entries are
//! immutable once inserted; no update or delete is exposed.

pub mod memory;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LedgerError;
use crate::ledger::entry::LedgerEntry;

pub use memory::MemoryLedgerStore;
pub use sql::SqliteLedgerStore;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Filter for paginated entry queries. Every field is optional; absent
/// fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub project_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl EntryFilter {
    /// Effective `(limit, offset)`, clamped to sane bounds.
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// One page of entries plus the total number of matches.
#[derive(Debug, Clone)]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,
    pub total: i64,
}

/// Durable storage for ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a fully-formed entry. Fails with `Conflict` when the
    /// `sequence_id` or `entry_id` is already taken.
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// `(sequence_id, entry_hash)` of the entry with the maximum sequence
    /// id, or `None` for an empty ledger.
    async fn head(&self) -> Result<Option<(i64, String)>, LedgerError>;

    async fn find_by_entry_id(&self, entry_id: &str)
        -> Result<Option<LedgerEntry>, LedgerError>;

    /// Matching entries in ascending `sequence_id` order. Used by
    /// verification; must not reorder.
    async fn scan(
        &self,
        project_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Filtered, paginated query ordered by `created_at` descending
    /// (`sequence_id` descending as tiebreak), with a total match count.
    async fn query(&self, filter: &EntryFilter) -> Result<EntryPage, LedgerError>;
}
