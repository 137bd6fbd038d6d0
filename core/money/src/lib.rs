#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

mod error;

use rust_decimal::{Decimal, prelude::ToPrimitive};
#[cfg(feature = "json-schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::ConversionError;

const CENTS_PER_KES: u64 = 100;

/// Kenyan Shilling amounts in minor units (cents). Unsigned: line items,
/// obligations and cumulative payments can never be negative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
#[serde(transparent)]
pub struct KesCents(u64);

impl KesCents {
    pub const ZERO: Self = Self(0);

    pub fn into_inner(self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn try_from_kes(amount: Decimal) -> Result<Self, ConversionError> {
        let cents = amount * Decimal::from(CENTS_PER_KES);
        if cents.is_sign_negative() {
            return Err(ConversionError::Negative(amount));
        }
        if !cents.fract().is_zero() {
            return Err(ConversionError::FractionalCents(amount));
        }
        cents
            .to_u64()
            .map(Self)
            .ok_or(ConversionError::Overflow(amount))
    }

    pub fn to_kes(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(CENTS_PER_KES)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl From<u64> for KesCents {
    fn from(cents: u64) -> Self {
        Self(cents)
    }
}

impl std::fmt::Display for KesCents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_kes())
    }
}

impl std::ops::Add for KesCents {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::AddAssign for KesCents {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl std::iter::Sum for KesCents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|c| c.0).sum())
    }
}

/// Signed Shilling amounts in minor units. Used for running balances:
/// positive = owed, negative = credit, zero = settled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
#[serde(transparent)]
pub struct SignedKesCents(i64);

impl SignedKesCents {
    pub const ZERO: Self = Self(0);

    pub fn into_inner(self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn to_kes(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(CENTS_PER_KES)
    }
}

impl From<KesCents> for SignedKesCents {
    fn from(cents: KesCents) -> Self {
        Self(cents.0 as i64)
    }
}

impl From<i64> for SignedKesCents {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl std::fmt::Display for SignedKesCents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_kes())
    }
}

impl std::ops::Add<KesCents> for SignedKesCents {
    type Output = Self;
    fn add(self, other: KesCents) -> Self {
        Self(self.0 + other.0 as i64)
    }
}

impl std::ops::AddAssign<KesCents> for SignedKesCents {
    fn add_assign(&mut self, other: KesCents) {
        self.0 += other.0 as i64;
    }
}

impl std::ops::Sub<KesCents> for SignedKesCents {
    type Output = Self;
    fn sub(self, other: KesCents) -> Self {
        Self(self.0 - other.0 as i64)
    }
}

impl std::ops::SubAssign<KesCents> for SignedKesCents {
    fn sub_assign(&mut self, other: KesCents) {
        self.0 -= other.0 as i64;
    }
}
