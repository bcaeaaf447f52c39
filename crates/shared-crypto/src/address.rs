//! # Address Derivation
//!
//! `address = "LGC" ‖ last 20 bytes of SHA-256(public key)`, displayed as the
//! prefix followed by 40 hex characters.

use crate::errors::CryptoError;
use crate::hashing::sha256;
use shared_types::{Address, ADDRESS_LEN, ADDRESS_PREFIX};

/// Derive the account address for a public key (either scheme).
pub fn derive_address(pubkey: &[u8]) -> Address {
    let digest = sha256(pubkey);
    let mut address = [0u8; ADDRESS_LEN];
    address[..3].copy_from_slice(ADDRESS_PREFIX);
    address[3..].copy_from_slice(&digest[12..]);
    address
}

/// Human form: `LGC` + 40 hex chars.
pub fn format_address(address: &Address) -> String {
    let mut out = String::with_capacity(43);
    out.push_str(std::str::from_utf8(ADDRESS_PREFIX).expect("prefix is ASCII"));
    for byte in &address[3..] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Parse the human form back into address bytes.
pub fn parse_address(text: &str) -> Result<Address, CryptoError> {
    let prefix = std::str::from_utf8(ADDRESS_PREFIX).expect("prefix is ASCII");
    let hex_part = text
        .strip_prefix(prefix)
        .ok_or(CryptoError::InvalidAddress { reason: "missing LGC prefix" })?;
    if hex_part.len() != 40 {
        return Err(CryptoError::InvalidAddress { reason: "wrong length" });
    }

    let mut address = [0u8; ADDRESS_LEN];
    address[..3].copy_from_slice(ADDRESS_PREFIX);
    for (i, chunk) in hex_part.as_bytes().chunks(2).enumerate() {
        let hi = hex_val(chunk[0])?;
        let lo = hex_val(chunk[1])?;
        address[3 + i] = (hi << 4) | lo;
    }
    Ok(address)
}

fn hex_val(c: u8) -> Result<u8, CryptoError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(CryptoError::InvalidAddress { reason: "non-hex character" }),
    }
}
