//! Exact on-chain amounts in the token's smallest unit.
//!
//! The indexer transmits uint256 values as decimal-digit strings. Events keep
//! the raw string ([`RawAmount`]); parsing happens when a metric needs the
//! value, so one malformed field marks that metric unknown instead of
//! rejecting the event.

use crate::domain::{Decimal, Metric};
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("amount is not a decimal integer: {0:?}")]
    NotDecimal(String),
    #[error("amount exceeds uint256: {0}")]
    Overflow(String),
}

/// Unsigned 256-bit integer amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);
    pub const MAX: Amount = Amount(U256::MAX);

    pub fn from_u64(value: u64) -> Self {
        Amount(U256::from(value))
    }

    /// Parse a decimal-digit string. Signs, decimal points, hex prefixes and
    /// exponents are all rejected.
    pub fn parse(s: &str) -> Result<Self, AmountParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::NotDecimal(s.to_string()));
        }
        U256::from_str_radix(trimmed, 10)
            .map(Amount)
            .map_err(|_| AmountParseError::Overflow(trimmed.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_mul_u64(self, rhs: u64) -> Option<Amount> {
        self.0.checked_mul(U256::from(rhs)).map(Amount)
    }

    /// `self * 10_000 / total`, clamped to `10_000`. Zero when `total` is zero.
    pub fn basis_points_of(self, total: Amount) -> u64 {
        const SCALE: u64 = 10_000;
        if total.is_zero() {
            return 0;
        }
        if self >= total {
            return SCALE;
        }
        let scale = U256::from(SCALE);
        let bp = match self.0.checked_mul(scale) {
            Some(scaled) => scaled / total.0,
            // self is huge; total > self, so total / SCALE is non-zero.
            None => self.0 / (total.0 / scale),
        };
        // bp < SCALE here, so it fits in the lowest limb.
        bp.as_limbs()[0].min(SCALE)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

// Amounts travel as decimal strings to keep precision beyond 53-bit floats.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Amount exactly as the indexer delivered it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAmount(String);

impl RawAmount {
    pub fn new(raw: impl Into<String>) -> Self {
        RawAmount(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Result<Amount, AmountParseError> {
        Amount::parse(&self.0)
    }

    /// Parsed value as a metric input.
    pub fn metric(&self) -> Metric<Amount> {
        self.parse().into()
    }
}

impl From<&str> for RawAmount {
    fn from(s: &str) -> Self {
        RawAmount::new(s)
    }
}

impl From<Amount> for RawAmount {
    fn from(amount: Amount) -> Self {
        RawAmount(amount.to_string())
    }
}

/// Scale a smallest-unit amount down by `decimals` for display.
///
/// Only for rendering; gating decisions compare [`Amount`] values directly.
pub fn format_units(amount: Amount, decimals: u32) -> Metric<Decimal> {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    let text = if decimals == 0 {
        digits
    } else if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        format!("{}.{}", int_part, frac_part)
    } else {
        format!("0.{}{}", "0".repeat(decimals - digits.len()), digits)
    };
    match Decimal::from_str_canonical(&text) {
        Ok(d) => Metric::available(Decimal::new(d.inner().normalize())),
        Err(e) => Metric::unavailable(format!("amount {} not displayable: {}", amount, e)),
    }
}
