pub mod config;
pub mod error;
pub mod ledger;
pub mod store;

pub use error::LedgerError;
pub use ledger::entry::{ActorType, AppendRequest, LedgerEntry, Source};
pub use ledger::service::{
    AppendOutcome, AuditLedgerService, Persistence, VerificationMode, VerificationReport,
};
pub use store::{EntryFilter, EntryPage, LedgerStore};
