//! Fixed-point currency and percentage types.
//!
//! `Amount` carries exactly [`AMOUNT_SCALE`] fractional digits (one nanomina is
//! the smallest unit). `Percentage` stores a plain fraction (`0.05` is 5%) with
//! [`PERCENTAGE_SCALE`] fractional digits. Every operation that can produce
//! extra digits truncates toward zero, so derived amounts never exceed their
//! exact value.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Fractional digits kept by [`Amount`] (nanomina).
pub const AMOUNT_SCALE: u32 = 9;

/// Fractional digits kept by [`Percentage`] fractions.
pub const PERCENTAGE_SCALE: u32 = 18;

fn truncate(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::ToZero)
}

// ─── Amount ──────────────────────────────────────────────────────────────────

/// A non-negative currency amount with nanomina precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Build an amount from a decimal value, truncating extra digits.
    pub fn new(value: Decimal) -> Result<Self, IndexerError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(IndexerError::NegativeAmount(value.to_string()));
        }
        Ok(Self(truncate(value, AMOUNT_SCALE)))
    }

    /// Build an amount from the chain's integer representation (nanomina).
    pub fn from_nanos(nanos: u64) -> Self {
        Self(Decimal::from_i128_with_scale(nanos as i128, AMOUNT_SCALE))
    }

    /// Build an amount from whole currency units.
    pub fn from_units(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// The amount expressed in nanomina, if it fits in a `u64`.
    pub fn to_nanos(&self) -> Option<u64> {
        let mut scaled = self.0;
        scaled.rescale(AMOUNT_SCALE);
        u64::try_from(scaled.mantissa()).ok()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: Amount) -> Result<Amount, IndexerError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| IndexerError::Other(format!("amount overflow: {self} + {other}")))
    }

    /// Sum of `amounts`, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Amount, IndexerError>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Subtract `other`, failing instead of going below zero.
    pub fn checked_sub(&self, other: Amount) -> Result<Amount, IndexerError> {
        let diff = self
            .0
            .checked_sub(other.0)
            .ok_or_else(|| IndexerError::Other(format!("amount overflow: {self} - {other}")))?;
        Amount::new(diff)
    }

    /// `self × percentage`, truncated to nanomina.
    pub fn mul_percentage(&self, percentage: Percentage) -> Result<Amount, IndexerError> {
        let product = self.0.checked_mul(percentage.0).ok_or_else(|| {
            IndexerError::Other(format!("amount overflow: {self} × {percentage}"))
        })?;
        Amount::new(product)
    }

    /// `self / divisor` as a fraction.
    pub fn div_amount(&self, divisor: Amount) -> Result<Percentage, IndexerError> {
        if divisor.is_zero() {
            return Err(IndexerError::DivisionByZero);
        }
        let ratio = self
            .0
            .checked_div(divisor.0)
            .ok_or(IndexerError::DivisionByZero)?;
        Percentage::from_fraction(ratio)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Amount {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| IndexerError::Validation(format!("invalid amount '{s}': {e}")))?;
        Amount::new(value)
    }
}

impl TryFrom<String> for Amount {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

// ─── Percentage ──────────────────────────────────────────────────────────────

/// A non-negative fraction. `Display`/`FromStr` use percent notation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);
    pub const ONE_HUNDRED: Percentage = Percentage(Decimal::ONE);

    /// Build from a plain fraction (`0.05` is 5%).
    pub fn from_fraction(fraction: Decimal) -> Result<Self, IndexerError> {
        if fraction.is_sign_negative() && !fraction.is_zero() {
            return Err(IndexerError::Validation(format!(
                "negative percentage: {fraction}"
            )));
        }
        Ok(Self(truncate(fraction, PERCENTAGE_SCALE)))
    }

    /// Build from a percent value (`5` is 5%).
    pub fn from_percent(percent: Decimal) -> Result<Self, IndexerError> {
        let fraction = percent
            .checked_div(Decimal::ONE_HUNDRED)
            .ok_or_else(|| IndexerError::Validation(format!("invalid percentage: {percent}")))?;
        Self::from_fraction(fraction)
    }

    pub fn as_fraction(&self) -> Decimal {
        self.0
    }

    pub fn as_percent(&self) -> Decimal {
        (self.0 * Decimal::ONE_HUNDRED).normalize()
    }

    /// `100% − self`, failing when `self` exceeds 100%.
    pub fn complement(&self) -> Result<Percentage, IndexerError> {
        if self.0 > Decimal::ONE {
            return Err(IndexerError::Validation(format!(
                "percentage above 100: {self}"
            )));
        }
        Ok(Percentage(Decimal::ONE - self.0))
    }

    /// Whether this value is usable as a validator fee (`0..=100` percent).
    pub fn is_valid_fee(&self) -> bool {
        self.0 >= Decimal::ZERO && self.0 <= Decimal::ONE
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_percent())
    }
}

impl FromStr for Percentage {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| IndexerError::Validation(format!("invalid percentage '{s}': {e}")))?;
        Percentage::from_percent(value)
    }
}

impl TryFrom<String> for Percentage {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Percentage> for String {
    fn from(value: Percentage) -> Self {
        value.to_string()
    }
}
