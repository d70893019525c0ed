//! Audit Ledger
//!
//! Append-only, tamper-evident log of mutating actions with a
//! cryptographic hash chain linking every entry to its predecessor.

pub mod canonical;
pub mod entry;
pub mod hash;
pub mod sequencer;
pub mod service;

pub use entry::LedgerEntry;
pub use service::AuditLedgerService;
