//! Prices, in human money terms and in a token's smallest unit.
//!
//! Route prices are usually configured as money strings (`"$0.001"`), while
//! the wire format wants an integer amount of the asset's smallest unit
//! (`"1000"` for a 6-decimal stablecoin). [`MoneyAmount`] does the parsing and
//! the scale conversion; [`TokenAmount`] is what lands in a challenge.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An integer amount in an asset's smallest unit.
///
/// Serialized as a decimal string, as `maxAmountRequired` is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Creates an amount from raw smallest units.
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Raw smallest units.
    #[must_use]
    pub const fn units(self) -> u128 {
        self.0
    }

    /// Returns `true` for a zero amount.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::Invalid(s.to_owned()));
        }
        s.parse::<u128>()
            .map(Self)
            .map_err(|_| AmountError::Overflow(s.to_owned()))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors from parsing or converting amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Not a decimal number.
    #[error("invalid amount {0:?}")]
    Invalid(String),
    /// Zero or negative.
    #[error("amount must be positive, got {0}")]
    NotPositive(String),
    /// More fractional digits than the asset can represent.
    #[error("amount {amount} has more than {decimals} decimal places")]
    TooPrecise {
        /// The offending amount.
        amount: String,
        /// Decimals supported by the asset.
        decimals: u32,
    },
    /// Does not fit in the smallest-unit integer.
    #[error("amount {0} overflows")]
    Overflow(String),
}

/// A positive money amount such as `"$0.05"` or `"1.5"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoneyAmount(Decimal);

impl MoneyAmount {
    /// The amount as a decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Converts to smallest units of an asset with `decimals` decimals.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::TooPrecise`] if the amount cannot be represented
    /// exactly, or [`AmountError::Overflow`] if it does not fit.
    pub fn to_token_amount(&self, decimals: u32) -> Result<TokenAmount, AmountError> {
        let normalized = self.0.normalize();
        let scale = normalized.scale();
        if scale > decimals {
            return Err(AmountError::TooPrecise {
                amount: self.0.to_string(),
                decimals,
            });
        }
        let overflow = || AmountError::Overflow(self.0.to_string());
        let mantissa = u128::try_from(normalized.mantissa()).map_err(|_| overflow())?;
        let factor = 10u128.checked_pow(decimals - scale).ok_or_else(overflow)?;
        mantissa
            .checked_mul(factor)
            .map(TokenAmount)
            .ok_or_else(overflow)
    }
}

impl FromStr for MoneyAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
        let value =
            Decimal::from_str(digits).map_err(|_| AmountError::Invalid(trimmed.to_owned()))?;
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(trimmed.to_owned()));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}
