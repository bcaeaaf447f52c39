//! # SHA-256 Hashing
//!
//! Single SHA-256 for addresses, checkpoint hashes and message ids; double
//! SHA-256 for block and transaction hashes, where the extra round buys
//! length-extension margin.

use sha2::{Digest, Sha256};
use shared_types::Hash;

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256(SHA-256(data)).
pub fn double_sha256(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Hash a sequence of inputs as one message.
pub fn sha256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}
