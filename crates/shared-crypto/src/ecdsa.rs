//! # ECDSA Signatures (secp256k1)
//!
//! Wallet-side signatures on the secp256k1 curve with RFC 6979 deterministic
//! nonces and compact 64-byte `r ‖ s` encoding.

use crate::errors::CryptoError;
use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use shared_types::Signature as SignatureBytes;
use zeroize::Zeroize;

/// secp256k1 ECDSA keypair. Secret material is zeroized on drop.
pub struct Secp256k1Keypair {
    signing_key: SigningKey,
}

impl Secp256k1Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&seed).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Compressed SEC1 public key, 33 bytes.
    pub fn public_key(&self) -> [u8; 33] {
        let sec1 = self.signing_key.verifying_key().to_sec1_bytes();
        sec1.as_ref().try_into().expect("SEC1 compressed key is 33 bytes")
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        let sig: Signature = self.signing_key.sign(message);
        sig.to_bytes().into()
    }
}

impl Drop for Secp256k1Keypair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Verify a compact secp256k1 signature.
pub fn verify_secp256k1(
    pubkey: &[u8; 33],
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<(), CryptoError> {
    let verifying_key =
        VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}
