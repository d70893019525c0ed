//! Audit Ledger Service
//!
//! Orchestrates append (sequencer → canonicalizer → hasher → store) and
//! chain verification. Storage failures on the write path degrade to an
//! explicit `Unpersisted` outcome so the business operation that triggered
//! the audit write is never blocked by ledger infrastructure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::canonical::canonical_envelope;
use crate::ledger::entry::{AppendRequest, LedgerEntry};
use crate::ledger::hash::{chain_hash, GENESIS_HASH};
use crate::ledger::sequencer::{ChainHead, Sequencer};
use crate::store::{EntryFilter, EntryPage, LedgerStore};

const DEFAULT_MAX_APPEND_RETRIES: u32 = 3;

/// Whether an appended entry actually reached durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Persisted,
    Unpersisted { reason: String },
}

/// Result of `append`: the finished entry plus its persistence status.
///
/// Audit writes are best-effort. Callers with compliance-grade durability
/// requirements must check `persistence`, not just the returned entry.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub entry: LedgerEntry,
    pub persistence: Persistence,
}

impl AppendOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Persisted)
    }
}

/// How a verification pass was performed.
///
/// Filtered scans cannot be checked cryptographically (the chain links all
/// entries, so a filtered view has gaps by construction) and only get a
/// structural pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    Full,
    Structural,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub valid: bool,
    pub mode: VerificationMode,
    pub checked_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_sequence_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_entry_id: Option<String>,
}

impl VerificationReport {
    fn passed(mode: VerificationMode, checked_count: usize) -> Self {
        Self {
            valid: true,
            mode,
            checked_count,
            broken_at_sequence_id: None,
            broken_at_entry_id: None,
        }
    }

    fn broken_at(mode: VerificationMode, checked_count: usize, entry: &LedgerEntry) -> Self {
        Self {
            valid: false,
            mode,
            checked_count,
            broken_at_sequence_id: Some(entry.sequence_id),
            broken_at_entry_id: Some(entry.entry_id.clone()),
        }
    }
}

/// Tamper-evident audit ledger over a pluggable store.
pub struct AuditLedgerService {
    store: Arc<dyn LedgerStore>,
    sequencer: Sequencer,
    max_append_retries: u32,
}

impl AuditLedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            sequencer: Sequencer::new(),
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
        }
    }

    pub fn with_max_append_retries(mut self, retries: u32) -> Self {
        self.max_append_retries = retries;
        self
    }

    /// Append a new entry to the chain.
    ///
    /// Errors only on invalid input (`Validation`/`Serialization`), raised
    /// before any sequencing. Storage failures return an `Unpersisted`
    /// outcome with a warning log instead of propagating.
    pub async fn append(&self, request: AppendRequest) -> Result<AppendOutcome, LedgerError> {
        request.validate()?;

        let mut guard = self.sequencer.acquire().await;

        let mut head = match guard.position(self.store.as_ref()).await {
            Ok(head) => head,
            Err(err) => {
                warn!("audit head unavailable, returning unpersisted entry: {}", err);
                let entry = Self::build_entry(&request, &ChainHead::genesis())?;
                return Ok(AppendOutcome {
                    entry,
                    persistence: Persistence::Unpersisted {
                        reason: err.to_string(),
                    },
                });
            }
        };

        let mut attempt = 0;
        loop {
            let entry = Self::build_entry(&request, &head)?;
            match self.store.insert(&entry).await {
                Ok(()) => {
                    guard.commit(entry.sequence_id, entry.entry_hash.clone());
                    debug!("appended audit entry: {}", entry.summary());
                    return Ok(AppendOutcome {
                        entry,
                        persistence: Persistence::Persisted,
                    });
                }
                // Another writer (in another process) claimed this sequence
                // id first; re-read the head and recompute the hash.
                Err(LedgerError::Conflict(_)) if attempt < self.max_append_retries => {
                    attempt += 1;
                    guard.invalidate();
                    match guard.position(self.store.as_ref()).await {
                        Ok(next) => head = next,
                        Err(err) => {
                            warn!("audit head re-read failed after conflict: {}", err);
                            return Ok(AppendOutcome {
                                entry,
                                persistence: Persistence::Unpersisted {
                                    reason: err.to_string(),
                                },
                            });
                        }
                    }
                }
                Err(err) => {
                    guard.invalidate();
                    warn!("audit write failed, returning unpersisted entry: {}", err);
                    return Ok(AppendOutcome {
                        entry,
                        persistence: Persistence::Unpersisted {
                            reason: err.to_string(),
                        },
                    });
                }
            }
        }
    }

    /// Verify chain integrity.
    ///
    /// Unfiltered: full cryptographic verification from the genesis hash,
    /// failing fast at the first break. Filtered by `project_id` and/or
    /// `since`: structural check only (sequence ids strictly ascending and
    /// duplicate-free within the filtered view).
    pub async fn verify_chain(
        &self,
        project_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<VerificationReport, LedgerError> {
        let filtered = project_id.is_some() || since.is_some();
        let entries = self.store.scan(project_id, since).await?;

        let report = if filtered {
            Self::verify_structural(&entries)
        } else {
            Self::verify_full(&entries)?
        };

        if report.valid {
            info!(
                "audit chain verification passed: {} entries ({:?})",
                report.checked_count, report.mode
            );
        } else {
            warn!(
                "audit chain verification FAILED at sequence {:?} (entry {:?})",
                report.broken_at_sequence_id, report.broken_at_entry_id
            );
        }
        Ok(report)
    }

    fn verify_full(entries: &[LedgerEntry]) -> Result<VerificationReport, LedgerError> {
        let mut running_hash = GENESIS_HASH.to_string();

        for (index, entry) in entries.iter().enumerate() {
            // Contiguity from 0, linkage, then hash recomputation. Stop at
            // the first break; everything past it is unverifiable.
            if entry.sequence_id != index as i64 {
                return Ok(VerificationReport::broken_at(
                    VerificationMode::Full,
                    index,
                    entry,
                ));
            }
            if entry.previous_hash != running_hash {
                return Ok(VerificationReport::broken_at(
                    VerificationMode::Full,
                    index,
                    entry,
                ));
            }
            let envelope = canonical_envelope(entry)?;
            if chain_hash(&running_hash, &envelope) != entry.entry_hash {
                return Ok(VerificationReport::broken_at(
                    VerificationMode::Full,
                    index,
                    entry,
                ));
            }
            running_hash = entry.entry_hash.clone();
        }

        Ok(VerificationReport::passed(
            VerificationMode::Full,
            entries.len(),
        ))
    }

    fn verify_structural(entries: &[LedgerEntry]) -> VerificationReport {
        let mut previous: Option<i64> = None;

        for (index, entry) in entries.iter().enumerate() {
            if let Some(prev) = previous {
                if entry.sequence_id <= prev {
                    return VerificationReport::broken_at(
                        VerificationMode::Structural,
                        index,
                        entry,
                    );
                }
            }
            previous = Some(entry.sequence_id);
        }

        VerificationReport::passed(VerificationMode::Structural, entries.len())
    }

    /// Paginated, filtered read. No integrity computation.
    pub async fn get_entries(&self, filter: EntryFilter) -> Result<EntryPage, LedgerError> {
        self.store.query(&filter).await
    }

    /// Point lookup by external entry id.
    pub async fn find_entry(&self, entry_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        self.store.find_by_entry_id(entry_id).await
    }

    fn build_entry(request: &AppendRequest, head: &ChainHead) -> Result<LedgerEntry, LedgerError> {
        let mut entry = LedgerEntry {
            sequence_id: head.next_sequence_id,
            entry_id: Uuid::new_v4().to_string(),
            previous_hash: head.previous_hash.clone(),
            entry_hash: String::new(),
            actor_id: request.actor_id.clone(),
            actor_type: request.actor_type,
            action: request.action.clone(),
            entity_type: request.entity_type.clone(),
            entity_id: request.entity_id.clone(),
            project_id: request.project_id.clone(),
            payload: request.payload.clone(),
            source: request.source,
            ip_address: request.ip_address.clone(),
            session_id: request.session_id.clone(),
            created_at: Utc::now(),
        };

        let envelope = canonical_envelope(&entry)?;
        entry.entry_hash = chain_hash(&entry.previous_hash, &envelope);
        Ok(entry)
    }
}
