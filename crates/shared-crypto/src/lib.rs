//! # Shared Crypto - Primitives for LogiChain
//!
//! Hashing, the two signature schemes, mnemonic key derivation and address
//! derivation.
//!
//! ## Scheme split
//!
//! - **Ed25519**: validator identities and proof-of-delivery checkpoint
//!   signatures (deterministic nonces, fast batch verification).
//! - **secp256k1 ECDSA**: user wallets (RFC 6979 deterministic nonces,
//!   compact 64-byte signatures).
//!
//! Both sit behind the [`Keypair`] capability; verification infers the scheme
//! from the public key length (32 bytes Ed25519, 33 bytes compressed SEC1).
//!
//! ## Hashing rules
//!
//! Block and transaction hashes are double SHA-256; addresses, checkpoint
//! hashes and gossip message ids are single SHA-256.

pub mod address;
pub mod digest;
pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod mnemonic;
pub mod signatures;

pub use address::{derive_address, format_address, parse_address};
pub use digest::{block_hash, checkpoint_hash, checkpoint_signing_bytes, gossip_message_id, tx_hash};
pub use errors::CryptoError;
pub use hashing::{double_sha256, sha256};
pub use mnemonic::MnemonicSeed;
pub use signatures::{Keypair, SignatureScheme};
