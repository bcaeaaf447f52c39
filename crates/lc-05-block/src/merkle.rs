//! Merkle commitment over transaction hashes.
//!
//! Double SHA-256 pairwise combination; an odd level duplicates its last
//! node. A single transaction is its own root; an empty set commits to the
//! zero hash (only unmined templates are ever empty).

use shared_crypto::double_sha256;
use shared_types::Hash;

/// Compute the merkle root of a list of transaction hashes.
pub fn merkle_root(tx_hashes: &[Hash]) -> Hash {
    if tx_hashes.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = tx_hashes.to_vec();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().expect("non-empty level");
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(&pair[1]);
                double_sha256(&buf)
            })
            .collect();
    }
    level[0]
}
