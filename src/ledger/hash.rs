//! Chain Hashing
//!
//! SHA-256 digest over `previous_hash ‖ canonical envelope`, rendered as
//! lowercase hex.

use sha2::{Digest, Sha256};

/// Fixed sentinel used as `previous_hash` for the very first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Length of a rendered digest in hex characters.
pub const HASH_HEX_LEN: usize = 64;

/// Compute the chained digest for an entry. Pure function.
pub fn chain_hash(previous_hash: &str, envelope: &[u8]) -> String {
    debug_assert_eq!(previous_hash.len(), HASH_HEX_LEN);

    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(envelope);
    hex::encode(hasher.finalize())
}
