//! In-memory ledger store.
//!
//! Keeps the full chain in process memory, ordered by sequence id. Used
//! by tests and by embedded deployments that do not need durability.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::LedgerError;
use crate::ledger::entry::LedgerEntry;
use crate::store::{EntryFilter, EntryPage, LedgerStore};

pub struct MemoryLedgerStore {
    entries: RwLock<BTreeMap<i64, LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(entry: &LedgerEntry, filter: &EntryFilter) -> bool {
    filter
        .project_id
        .as_deref()
        .map_or(true, |p| entry.project_id.as_deref() == Some(p))
        && filter
            .entity_type
            .as_deref()
            .map_or(true, |t| entry.entity_type == t)
        && filter
            .entity_id
            .as_deref()
            .map_or(true, |i| entry.entity_id == i)
        && filter
            .actor_id
            .as_deref()
            .map_or(true, |a| entry.actor_id == a)
        && filter.action.as_deref().map_or(true, |a| entry.action == a)
        && filter.since.map_or(true, |t| entry.created_at >= t)
        && filter.until.map_or(true, |t| entry.created_at <= t)
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.sequence_id) {
            return Err(LedgerError::Conflict(format!(
                "sequence id {} already taken",
                entry.sequence_id
            )));
        }
        if entries.values().any(|e| e.entry_id == entry.entry_id) {
            return Err(LedgerError::Conflict(format!(
                "entry id {} already taken",
                entry.entry_id
            )));
        }
        entries.insert(entry.sequence_id, entry.clone());
        Ok(())
    }

    async fn head(&self) -> Result<Option<(i64, String)>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .next_back()
            .map(|(sequence_id, entry)| (*sequence_id, entry.entry_hash.clone())))
    }

    async fn find_by_entry_id(
        &self,
        entry_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries.values().find(|e| e.entry_id == entry_id).cloned())
    }

    async fn scan(
        &self,
        project_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.entries.read().await;
        // BTreeMap iteration is already ascending by sequence id.
        Ok(entries
            .values()
            .filter(|e| project_id.map_or(true, |p| e.project_id.as_deref() == Some(p)))
            .filter(|e| since.map_or(true, |t| e.created_at >= t))
            .cloned()
            .collect())
    }

    async fn query(&self, filter: &EntryFilter) -> Result<EntryPage, LedgerError> {
        let entries = self.entries.read().await;
        let mut matching: Vec<LedgerEntry> = entries
            .values()
            .filter(|e| matches(e, filter))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence_id.cmp(&a.sequence_id))
        });

        let total = matching.len() as i64;
        let (limit, offset) = filter.page();
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(EntryPage {
            entries: page,
            total,
        })
    }
}
