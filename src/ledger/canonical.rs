//! Canonical Envelope
//!
//! Byte-for-byte deterministic serialization of the entry fields that
//! participate in hashing. Two processes canonicalizing logically equal
//! inputs must always produce identical bytes, so object keys are sorted
//! lexicographically at every nesting level of the payload.

use serde_json::Value;

use crate::error::LedgerError;
use crate::ledger::entry::LedgerEntry;

/// Marker used in the envelope when `project_id` is absent.
pub const PROJECT_ABSENT: &str = "-";

/// Build the canonical envelope for an entry.
///
/// Covers `entry_id`, `actor_id`, `actor_type`, `action`, `entity_type`,
/// `entity_id`, `project_id` (or its absence marker), `payload`, and
/// `source`. Everything else (`entry_hash`, `created_at`, request
/// metadata, `sequence_id`) stays outside the hash input.
pub fn canonical_envelope(entry: &LedgerEntry) -> Result<Vec<u8>, LedgerError> {
    let envelope = format!(
        "entry_id:{}|actor_id:{}|actor_type:{}|action:{}|entity_type:{}|entity_id:{}|project_id:{}|payload:{}|source:{}",
        entry.entry_id,
        entry.actor_id,
        entry.actor_type.as_str(),
        entry.action,
        entry.entity_type,
        entry.entity_id,
        entry.project_id.as_deref().unwrap_or(PROJECT_ABSENT),
        canonical_json(&entry.payload)?,
        entry.source.as_str(),
    );
    Ok(envelope.into_bytes())
}

/// Render a JSON value with sorted object keys at every level.
///
/// `serde_json::Map` is a `BTreeMap` by default, but the `preserve_order`
/// feature is additive across a build graph; sorting explicitly keeps the
/// rendering stable either way.
pub fn canonical_json(value: &Value) -> Result<String, LedgerError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), LedgerError> {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by_key(|(key, _)| key.as_str());

            out.push('{');
            for (i, (key, item)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}
