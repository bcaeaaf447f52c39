//! # Ed25519 Signatures and the Unified Keypair
//!
//! Ed25519 primitives plus the scheme-tagged [`Keypair`] capability that the
//! rest of the core signs with. Verification is scheme-inferring: a 32-byte
//! public key is Ed25519, a 33-byte compressed SEC1 key is secp256k1.

use crate::ecdsa::Secp256k1Keypair;
use crate::errors::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use shared_types::{PublicKeyBytes, Signature};
use zeroize::Zeroize;

/// The two supported signature schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Validators and proof-of-delivery checkpoints.
    Ed25519,
    /// User wallets.
    EcdsaSecp256k1,
}

impl SignatureScheme {
    /// Infer the scheme from a public key length.
    pub fn from_pubkey(pubkey: &[u8]) -> Result<SignatureScheme, CryptoError> {
        match pubkey.len() {
            32 => Ok(SignatureScheme::Ed25519),
            33 => Ok(SignatureScheme::EcdsaSecp256k1),
            _ => Err(CryptoError::InvalidPublicKey),
        }
    }
}

/// Ed25519 keypair. Secret material is zeroized on drop.
pub struct Ed25519Keypair {
    signing_key: SigningKey,
}

impl Ed25519Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Deterministic signature, no RNG involved.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message).to_bytes()
    }
}

impl Drop for Ed25519Keypair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Verify an Ed25519 signature.
pub fn verify_ed25519(
    pubkey: &[u8; 32],
    message: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    let verifying_key =
        VerifyingKey::from_bytes(pubkey).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// A scheme-tagged keypair.
pub enum Keypair {
    Ed25519(Ed25519Keypair),
    EcdsaSecp256k1(Secp256k1Keypair),
}

impl Keypair {
    pub fn generate(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::Ed25519 => Keypair::Ed25519(Ed25519Keypair::generate()),
            SignatureScheme::EcdsaSecp256k1 => {
                Keypair::EcdsaSecp256k1(Secp256k1Keypair::generate())
            }
        }
    }

    /// Deterministic keypair from 32 bytes of seed material.
    pub fn from_seed(scheme: SignatureScheme, seed: [u8; 32]) -> Result<Self, CryptoError> {
        match scheme {
            SignatureScheme::Ed25519 => Ok(Keypair::Ed25519(Ed25519Keypair::from_seed(seed))),
            SignatureScheme::EcdsaSecp256k1 => {
                Ok(Keypair::EcdsaSecp256k1(Secp256k1Keypair::from_seed(seed)?))
            }
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Keypair::Ed25519(_) => SignatureScheme::Ed25519,
            Keypair::EcdsaSecp256k1(_) => SignatureScheme::EcdsaSecp256k1,
        }
    }

    /// Raw public key bytes (32 or 33 depending on scheme).
    pub fn public_key(&self) -> PublicKeyBytes {
        match self {
            Keypair::Ed25519(kp) => kp.public_key().to_vec(),
            Keypair::EcdsaSecp256k1(kp) => kp.public_key().to_vec(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            Keypair::Ed25519(kp) => kp.sign(message),
            Keypair::EcdsaSecp256k1(kp) => kp.sign(message),
        }
    }

    /// The account address for this key.
    pub fn address(&self) -> shared_types::Address {
        crate::address::derive_address(&self.public_key())
    }
}

/// Verify a signature under either scheme, inferred from the key length.
pub fn verify(pubkey: &[u8], message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    match SignatureScheme::from_pubkey(pubkey)? {
        SignatureScheme::Ed25519 => {
            let key: [u8; 32] = pubkey.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
            verify_ed25519(&key, message, signature)
        }
        SignatureScheme::EcdsaSecp256k1 => {
            let key: [u8; 33] = pubkey.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
            crate::ecdsa::verify_secp256k1(&key, message, signature)
        }
    }
}
