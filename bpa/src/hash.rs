//! Stable bundle-id hashing for reception confirmation.

use sha2::{Digest, Sha256};

/// Hashes a bundle id to the 64-bit value advertised in peer
/// `received_hashes` sets. Peers exchange these over the air, so the hash
/// must be identical across nodes, platforms and restarts.
pub fn bundle_id_hash(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().unwrap())
}
