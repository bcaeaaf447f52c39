//! Fixed-point monetary amounts.
//!
//! Amounts are 18-decimal fixed-point values over a signed 128-bit integer.
//! All arithmetic is checked; an overflow is a bug and surfaces as
//! `CoreError::ResourceExhausted` at the call site, never as a wrap.

use crate::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Number of decimal places in the fixed-point representation.
pub const DECIMALS: u32 = 18;

/// Atoms per whole unit (10^18).
pub const ATOMS_PER_UNIT: i128 = 1_000_000_000_000_000_000;

/// An 18-decimal fixed-point amount.
///
/// The inner value counts atoms. `Amount::units(1)` is one whole unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(i128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Whole units.
    pub const fn units(n: u64) -> Self {
        Amount(n as i128 * ATOMS_PER_UNIT)
    }

    /// Raw atoms.
    pub const fn from_atoms(atoms: i128) -> Self {
        Amount(atoms)
    }

    pub const fn atoms(&self) -> i128 {
        self.0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(CoreError::ResourceExhausted {
                resource: "amount arithmetic".into(),
            })
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount, CoreError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(CoreError::ResourceExhausted {
                resource: "amount arithmetic".into(),
            })
    }

    /// Saturating addition for statistics paths that tolerate clamping.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Proportional share in parts-per-million, rounding toward zero.
    ///
    /// Used by payout splits: `total.share_ppm(700_000)` is 70%.
    pub fn share_ppm(self, ppm: u32) -> Result<Amount, CoreError> {
        self.0
            .checked_mul(ppm as i128)
            .map(|v| Amount(v / 1_000_000))
            .ok_or(CoreError::ResourceExhausted {
                resource: "amount share".into(),
            })
    }

    /// Integer division by a power of two, used by the halving schedule.
    pub fn halved(self, times: u32) -> Amount {
        if times >= 127 {
            return Amount::ZERO;
        }
        Amount(self.0 >> times)
    }

    /// Little-endian 16-byte wire form.
    pub fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 16]) -> Amount {
        Amount(i128::from_le_bytes(bytes))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc.saturating_add(a))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ATOMS_PER_UNIT;
        let frac = (self.0 % ATOMS_PER_UNIT).unsigned_abs();
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let s = format!("{frac:018}");
            write!(f, "{}.{}", whole, s.trim_end_matches('0'))
        }
    }
}
