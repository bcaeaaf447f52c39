//! Crypto error types.

use thiserror::Error;

/// Failures from key handling, signing and verification.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("invalid address: {reason}")]
    InvalidAddress { reason: &'static str },
}
