//! Fixed-point currency amount with 2 decimal places.
//!
//! Uses `rust_decimal` internally with scale enforcement so that sums of
//! split contributions always add back up exactly to the original amounts.

use crate::error::MoneyError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A sterling amount held to exactly 2 decimal places.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use lhs_accounting_tools::Money;
///
/// let amount = Money::from_str("10.5").unwrap();
/// assert_eq!(amount.to_string(), "10.50");
/// assert_eq!(Money::from_minor(1050), amount);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 2;

    /// Zero value.
    pub const ZERO: Self = Money(Decimal::ZERO);

    /// Creates a new `Money` from a `Decimal`, normalizing to 2 decimal places.
    ///
    /// Finer values are rounded; text input goes through `FromStr`, which
    /// rejects them instead.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value.round_dp(Self::SCALE);
        normalized.rescale(Self::SCALE);
        Money(normalized)
    }

    /// Creates an amount from minor units (pence), as payment APIs report them.
    pub fn from_minor(minor: i64) -> Self {
        Money(Decimal::new(minor, Self::SCALE))
    }

    /// Whole pounds, used for CLI defaults.
    pub fn from_major(major: i64) -> Self {
        Money::new(Decimal::from(major))
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal =
            Decimal::from_str(trimmed).map_err(|_| MoneyError::Invalid(trimmed.to_string()))?;
        // Trailing zeros ("5.500") are fine; real sub-penny digits are not.
        if decimal.normalize().scale() > Self::SCALE {
            return Err(MoneyError::TooPrecise(trimmed.to_string()));
        }
        Ok(Money::new(decimal))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Money::new(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:.2}", self.0))
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}
