// crates/atoll-core/src/hash.rs

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the previous-hash field for the first record
/// in an admission chain.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the hex-encoded SHA-256 hash of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
