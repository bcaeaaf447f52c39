//! # Mnemonic Seed Phrases
//!
//! BIP-39 twelve-word English mnemonics for wallet and validator key
//! derivation. The 64-byte BIP-39 seed is reduced to the scheme's 32-byte
//! seed by taking its first half; the full seed never leaves this module.

use crate::errors::CryptoError;
use crate::signatures::{Keypair, SignatureScheme};
use bip39::Mnemonic;
use zeroize::Zeroizing;

/// A validated 12-word mnemonic.
pub struct MnemonicSeed {
    mnemonic: Mnemonic,
}

impl MnemonicSeed {
    /// Generate a fresh 12-word mnemonic (128 bits of entropy).
    pub fn generate() -> Self {
        let mut entropy = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut entropy);
        let mnemonic = Mnemonic::from_entropy(&entropy).expect("16 bytes is valid entropy");
        Self { mnemonic }
    }

    /// Parse and validate an existing phrase.
    pub fn parse(phrase: &str) -> Result<Self, CryptoError> {
        let mnemonic = Mnemonic::parse(phrase).map_err(|_| CryptoError::InvalidMnemonic)?;
        if mnemonic.word_count() != 12 {
            return Err(CryptoError::InvalidMnemonic);
        }
        Ok(Self { mnemonic })
    }

    /// The phrase as a space-separated string.
    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    /// Derive the keypair for a scheme. Deterministic per (phrase, scheme).
    pub fn derive_keypair(&self, scheme: SignatureScheme) -> Result<Keypair, CryptoError> {
        let seed = Zeroizing::new(self.mnemonic.to_seed(""));
        let mut half = [0u8; 32];
        half.copy_from_slice(&seed[..32]);
        Keypair::from_seed(scheme, half)
    }
}
